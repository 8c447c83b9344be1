/// Connection manager for one chat screen: ack correlation and
/// scope-bound event listeners on top of a [`Link`].
use crate::chat::protocol::{ClientEvent, EventKind, InboundFrame, ServerEvent};
use crate::chat::transport::Link;
use crate::error::{BazaarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Connection state of the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

struct Listener {
    kind: EventKind,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

type Listeners = Arc<Mutex<HashMap<u64, Listener>>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A registered event listener. Dropping it unregisters it.
pub struct Subscription {
    id: u64,
    kind: EventKind,
    listeners: Weak<Mutex<HashMap<u64, Listener>>>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Subscription {
    /// Next event of this kind; `None` once the socket is closed
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).remove(&self.id);
        }
    }
}

pub struct SocketClient {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Pending,
    listeners: Listeners,
    next_ack: AtomicU64,
    next_listener: AtomicU64,
    state: Arc<watch::Sender<ConnectionState>>,
    reader: JoinHandle<()>,
    ack_timeout: Duration,
}

impl SocketClient {
    /// Take ownership of an open link and start dispatching its frames
    pub fn new(link: Link, ack_timeout: Duration) -> Self {
        let Link { outbound, inbound } = link;
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(watch::Sender::new(ConnectionState::Connected));

        let reader = tokio::spawn(read_loop(
            inbound,
            pending.clone(),
            listeners.clone(),
            state.clone(),
        ));

        Self {
            outbound: Mutex::new(Some(outbound)),
            pending,
            listeners,
            next_ack: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
            state,
            reader,
            ack_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Register a listener for one event kind
    pub fn on(&self, kind: EventKind) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).insert(id, Listener { kind, tx });
        debug!("Listener {} registered for {}", id, kind.name());
        Subscription {
            id,
            kind,
            listeners: Arc::downgrade(&self.listeners),
            rx,
        }
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Fire-and-forget emit
    pub fn emit(&self, event: &ClientEvent) -> Result<()> {
        let frame = event.encode(None)?;
        self.send_frame(frame)
    }

    /// Emit and wait for the server's acknowledgement payload
    pub async fn request(&self, event: &ClientEvent) -> Result<serde_json::Value> {
        let id = self.next_ack.fetch_add(1, Ordering::Relaxed);
        let frame = event.encode(Some(id))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        if let Err(e) = self.send_frame(frame) {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match timeout(self.ack_timeout, rx).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(BazaarError::Connection(format!(
                "connection closed before {} was acknowledged",
                event.name()
            ))),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(BazaarError::Timeout(format!(
                    "no acknowledgement for {} after {:?}",
                    event.name(),
                    self.ack_timeout
                )))
            }
        }
    }

    /// Release the connection: detach every listener, fail pending
    /// requests and drop the link.
    pub fn close(&self) {
        let released = lock(&self.outbound).take();
        lock(&self.listeners).clear();
        lock(&self.pending).clear();
        self.reader.abort();
        self.state.send_replace(ConnectionState::Disconnected);
        if released.is_some() {
            debug!("Chat socket released");
        }
    }

    fn send_frame(&self, frame: String) -> Result<()> {
        let guard = lock(&self.outbound);
        let outbound = guard
            .as_ref()
            .ok_or_else(|| BazaarError::Connection("socket is closed".to_string()))?;
        outbound
            .send(frame)
            .map_err(|_| BazaarError::Connection("socket is closed".to_string()))
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut inbound: mpsc::UnboundedReceiver<String>,
    pending: Pending,
    listeners: Listeners,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    while let Some(text) = inbound.recv().await {
        match InboundFrame::decode(&text) {
            Ok(InboundFrame::Ack { id, data }) => {
                let waiter = lock(&pending).remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(data);
                    }
                    None => debug!("Ack {} has no pending request", id),
                }
            }
            Ok(InboundFrame::Event(event)) => {
                let guard = lock(&listeners);
                for listener in guard.values().filter(|l| l.kind == event.kind()) {
                    let _ = listener.tx.send(event.clone());
                }
            }
            Err(e) => warn!("Dropping inbound frame: {}", e),
        }
    }

    debug!("Chat link closed by server");
    lock(&pending).clear();
    state.send_replace(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::protocol::{ConversationId, GetHistory};
    use crate::chat::transport::{Connector, MemoryConnector};

    async fn connected(ack_timeout: Duration) -> (SocketClient, crate::chat::transport::ServerEnd) {
        let (connector, mut accept) = MemoryConnector::new();
        let link = connector.open().await.unwrap();
        let server = accept.recv().await.unwrap();
        (SocketClient::new(link, ack_timeout), server)
    }

    fn history_request() -> ClientEvent {
        ClientEvent::GetHistory(GetHistory {
            room_id: ConversationId::new("r1").unwrap(),
        })
    }

    #[tokio::test]
    async fn test_request_resolves_with_matching_ack() {
        let (socket, mut server) = connected(Duration::from_secs(2)).await;

        let responder = tokio::spawn(async move {
            let (_, ack) = server.recv_event().await.unwrap();
            let id = ack.unwrap();
            // Unrelated ack first: must not satisfy the request
            server.ack(id + 100, serde_json::json!("stray")).unwrap();
            server.ack(id, serde_json::json!([])).unwrap();
            server
        });

        let data = socket.request(&history_request()).await.unwrap();
        assert_eq!(data, serde_json::json!([]));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let (socket, _server) = connected(Duration::from_millis(50)).await;
        let err = socket.request(&history_request()).await.unwrap_err();
        assert!(matches!(err, BazaarError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_subscription_drop_detaches_listener() {
        let (socket, server) = connected(Duration::from_secs(1)).await;
        let mut rooms = socket.on(EventKind::RoomId);
        let messages = socket.on(EventKind::NewMessage);
        assert_eq!(socket.listener_count(), 2);

        server
            .push(&ServerEvent::RoomId(ConversationId::new("r9").unwrap()))
            .unwrap();
        assert_eq!(
            rooms.recv().await,
            Some(ServerEvent::RoomId(ConversationId::new("r9").unwrap()))
        );

        drop(messages);
        assert_eq!(socket.listener_count(), 1);
        drop(rooms);
        assert_eq!(socket.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_close_detaches_everything() {
        let (socket, mut server) = connected(Duration::from_secs(1)).await;
        let mut rooms = socket.on(EventKind::RoomId);

        socket.close();
        assert!(!socket.is_connected());
        assert_eq!(socket.listener_count(), 0);
        assert!(rooms.recv().await.is_none());
        assert!(socket.emit(&history_request()).is_err());
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_server_hangup_marks_disconnected() {
        let (socket, server) = connected(Duration::from_secs(1)).await;
        let mut state = socket.connection_state();
        drop(server);
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert!(!socket.is_connected());
    }
}
