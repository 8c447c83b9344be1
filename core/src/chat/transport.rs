/// Transport seam for the chat socket.
///
/// A [`Connector`] opens a fresh [`Link`]: a pair of text-frame channels.
/// Everything above it (ack correlation, listeners, the session state
/// machine) only sees the link, so tests swap the websocket for
/// [`MemoryConnector`].
use crate::chat::protocol::{encode_ack, ClientEvent, ServerEvent};
use crate::config::Config;
use crate::error::{BazaarError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Client side of an open connection
#[derive(Debug)]
pub struct Link {
    /// Frames to the server; dropping it closes the connection
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames from the server; yields `None` once the server side is gone
    pub inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection. No pooling: every call is a new link.
    async fn open(&self) -> Result<Link>;
}

/// Websocket connector for the realtime message server
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.socket_url.clone())
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<Link> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        info!("Chat socket connected to {}", self.url);

        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            pump(ws_stream, out_rx, in_tx).await;
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Bridge websocket frames and link channels until either side closes
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<String>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!("Chat socket write failed: {}", e);
                        break;
                    }
                }
                None => {
                    debug!("Chat link released, closing socket");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if in_tx.send(text).is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("Chat socket closed by server: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Chat socket read failed: {}", e);
                    break;
                }
                None => break,
            },
            _ = in_tx.closed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }
}

/// Server side of an in-memory link
#[derive(Debug)]
pub struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl ServerEnd {
    /// Next raw frame from the client, `None` once the client hung up
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next client event, skipping frames that do not decode
    pub async fn recv_event(&mut self) -> Option<(ClientEvent, Option<u64>)> {
        while let Some(text) = self.from_client.recv().await {
            match ClientEvent::decode(&text) {
                Ok(decoded) => return Some(decoded),
                Err(e) => warn!("Memory server dropped frame: {}", e),
            }
        }
        None
    }

    pub fn send_raw(&self, text: impl Into<String>) -> Result<()> {
        self.to_client
            .send(text.into())
            .map_err(|_| BazaarError::Connection("client end is gone".to_string()))
    }

    pub fn push(&self, event: &ServerEvent) -> Result<()> {
        self.send_raw(event.encode()?)
    }

    pub fn ack(&self, id: u64, data: serde_json::Value) -> Result<()> {
        self.send_raw(encode_ack(id, data)?)
    }

    /// True once the client dropped its inbound side
    pub fn is_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

/// In-process connector; every `open` hands the matching [`ServerEnd`]
/// to whoever holds the accept receiver.
#[derive(Debug)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
    offline: AtomicBool,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                offline: AtomicBool::new(false),
            },
            accept_rx,
        )
    }

    /// Simulate losing the network: subsequent opens fail
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self) -> Result<Link> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BazaarError::Connection("network unreachable".to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let server = ServerEnd {
            from_client: out_rx,
            to_client: in_tx,
        };
        self.accept_tx
            .send(server)
            .map_err(|_| BazaarError::Connection("memory server is not accepting".to_string()))?;

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_link_roundtrip() {
        let (connector, mut accept) = MemoryConnector::new();
        let mut link = connector.open().await.unwrap();
        let mut server = accept.recv().await.unwrap();

        link.outbound.send("hello".to_string()).unwrap();
        assert_eq!(server.recv().await.as_deref(), Some("hello"));

        server.send_raw("world").unwrap();
        assert_eq!(link.inbound.recv().await.as_deref(), Some("world"));

        drop(link);
        assert!(server.recv().await.is_none());
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn test_offline_connector_fails_open() {
        let (connector, _accept) = MemoryConnector::new();
        connector.set_offline(true);
        let err = connector.open().await.unwrap_err();
        assert!(matches!(err, BazaarError::Connection(_)));
    }
}
