/// Chat session negotiation for one mounted chat screen.
///
/// Lifecycle:
///
///   Idle → Connecting → Connected → RoomResolved → HistoryLoaded ⇄ (send | receive)
///
/// `Unmounted` is reachable from every state and tears the connection down.
/// The displayed list is always a full server snapshot: sends and
/// `new-message` pushes trigger a re-fetch instead of a local append.
use crate::chat::protocol::{
    decode_history, ClientEvent, ConversationId, EventKind, GetHistory, OutgoingMessage,
    ResolveRoom, ServerEvent,
};
use crate::chat::socket::{ConnectionState, SocketClient};
use crate::chat::transport::Connector;
use crate::config::Config;
use crate::error::{BazaarError, Result};
use crate::models::Message;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    RoomResolved,
    HistoryLoaded,
    /// The server closed the link; there is no reconnect
    Disconnected,
    Unmounted,
}

/// Who is talking about what
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContext {
    /// Current user
    pub sender: String,
    /// Counter-party
    pub recipient: String,
    /// Title of the request the conversation is about
    pub product_title: String,
}

impl ChatContext {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        product_title: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            product_title: product_title.into(),
        }
    }

    fn resolve_request(&self) -> ClientEvent {
        ClientEvent::ResolveRoom(ResolveRoom {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            product_title: self.product_title.clone(),
        })
    }
}

/// Ask the server for the backlog of a conversation, in server order
pub async fn load_history(socket: &SocketClient, room: &ConversationId) -> Result<Vec<Message>> {
    let data = socket
        .request(&ClientEvent::GetHistory(GetHistory {
            room_id: room.clone(),
        }))
        .await?;
    decode_history(data)
}

struct Shared {
    session_id: String,
    context: ChatContext,
    state: watch::Sender<SessionState>,
    room: watch::Sender<Option<ConversationId>>,
    messages: watch::Sender<Vec<Message>>,
    socket: Mutex<Option<Arc<SocketClient>>>,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        // Completions that land after unmount must not move the state
        if self.cancel.is_cancelled() && state != SessionState::Unmounted {
            return;
        }
        let prev = self.state.send_replace(state);
        if prev != state {
            debug!(session = %self.session_id, "Chat state {:?} -> {:?}", prev, state);
        }
    }

    fn socket(&self) -> Option<Arc<SocketClient>> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn room_id(&self) -> Option<ConversationId> {
        self.room.borrow().clone()
    }

    /// Replace the displayed list with a fresh snapshot. Overlapping
    /// reloads are not ordered: whichever finishes last wins.
    async fn reload_history(&self, socket: &SocketClient, reason: &str) {
        let Some(room) = self.room_id() else {
            debug!(session = %self.session_id, "No room yet, skipping reload ({})", reason);
            return;
        };

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return,
            fetched = load_history(socket, &room) => fetched,
        };

        match fetched {
            Ok(messages) => {
                if self.cancel.is_cancelled() {
                    return;
                }
                debug!(
                    session = %self.session_id,
                    "Loaded {} messages for room {} ({})",
                    messages.len(),
                    room,
                    reason
                );
                self.messages.send_replace(messages);
                self.set_state(SessionState::HistoryLoaded);
            }
            Err(e) => warn!(session = %self.session_id, "History fetch for {} failed: {}", room, e),
        }
    }

    fn teardown(&self) {
        self.cancel.cancel();
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(socket) = socket {
            socket.close();
        }
        self.set_state(SessionState::Unmounted);
    }
}

/// One mounted chat screen. Dropping it unmounts.
pub struct ChatSession {
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Open a fresh connection and start negotiating the room.
    /// Must be called inside a tokio runtime.
    pub fn mount(connector: Arc<dyn Connector>, context: ChatContext, config: &Config) -> Self {
        let shared = Arc::new(Shared {
            session_id: Uuid::new_v4().to_string(),
            context,
            state: watch::Sender::new(SessionState::Idle),
            room: watch::Sender::new(None),
            messages: watch::Sender::new(Vec::new()),
            socket: Mutex::new(None),
            cancel: CancellationToken::new(),
        });

        info!(
            session = %shared.session_id,
            "Mounting chat {} -> {} about {:?}",
            shared.context.sender,
            shared.context.recipient,
            shared.context.product_title
        );

        let driver = {
            let shared = shared.clone();
            let ack_timeout = config.ack_timeout;
            tokio::spawn(async move { drive(shared, connector, ack_timeout).await })
        };

        Self {
            shared,
            driver: Some(driver),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn context(&self) -> &ChatContext {
        &self.shared.context
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions
    pub fn states(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn room_id(&self) -> Option<ConversationId> {
        self.shared.room_id()
    }

    /// The presentation list; each update is a complete snapshot
    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.shared.messages.subscribe()
    }

    /// Send a message. Waits for room resolution first, then re-fetches
    /// history once the server acknowledges.
    pub async fn send(&self, body: &str) -> Result<()> {
        if body.trim().is_empty() {
            return Err(BazaarError::Validation("message is empty".to_string()));
        }

        let room = self.wait_for_room().await?;
        let socket = self.shared.socket().ok_or(BazaarError::SessionClosed)?;
        let ctx = &self.shared.context;
        let event = ClientEvent::SendMessage(OutgoingMessage {
            sender: ctx.sender.clone(),
            recipient: ctx.recipient.clone(),
            room_id: room,
            message: body.to_string(),
            product_title: ctx.product_title.clone(),
        });

        let ack = tokio::select! {
            _ = self.shared.cancel.cancelled() => return Err(BazaarError::SessionClosed),
            ack = socket.request(&event) => ack?,
        };
        debug!(session = %self.shared.session_id, "Send acknowledged: {}", ack);

        self.shared.reload_history(&socket, "send acknowledged").await;
        Ok(())
    }

    /// Resolve once the server has assigned a conversation id.
    /// Fails with `Connection` if the server hangs up before that.
    pub async fn wait_for_room(&self) -> Result<ConversationId> {
        let mut room = self.shared.room.subscribe();
        let mut state = self.shared.state.subscribe();
        loop {
            if self.shared.cancel.is_cancelled() {
                return Err(BazaarError::SessionClosed);
            }
            if let Some(id) = room.borrow_and_update().clone() {
                return Ok(id);
            }
            if *state.borrow_and_update() == SessionState::Disconnected {
                return Err(BazaarError::Connection(
                    "chat server closed the connection before a room was assigned".to_string(),
                ));
            }
            tokio::select! {
                _ = self.shared.cancel.cancelled() => return Err(BazaarError::SessionClosed),
                changed = room.changed() => {
                    if changed.is_err() {
                        return Err(BazaarError::SessionClosed);
                    }
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        return Err(BazaarError::SessionClosed);
                    }
                }
            }
        }
    }

    /// Tear down: cancel pending work, detach listeners, close the socket
    pub async fn unmount(mut self) {
        self.shared.teardown();
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        info!(session = %self.shared.session_id, "Chat unmounted");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

async fn drive(shared: Arc<Shared>, connector: Arc<dyn Connector>, ack_timeout: Duration) {
    shared.set_state(SessionState::Connecting);

    let link = tokio::select! {
        _ = shared.cancel.cancelled() => return,
        opened = connector.open() => match opened {
            Ok(link) => link,
            Err(e) => {
                // No retry: the screen stays in Connecting until it is unmounted
                warn!(session = %shared.session_id, "Chat connection failed: {}", e);
                return;
            }
        },
    };

    let socket = Arc::new(SocketClient::new(link, ack_timeout));
    {
        let mut slot = shared.socket.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.cancel.is_cancelled() {
            socket.close();
            return;
        }
        *slot = Some(socket.clone());
    }
    shared.set_state(SessionState::Connected);

    let mut room_events = socket.on(EventKind::RoomId);
    let mut new_messages = socket.on(EventKind::NewMessage);
    let mut connection = socket.connection_state();
    if *connection.borrow_and_update() == ConnectionState::Disconnected {
        warn!(session = %shared.session_id, "Chat server closed the connection");
        shared.set_state(SessionState::Disconnected);
        return;
    }

    if let Err(e) = socket.emit(&shared.context.resolve_request()) {
        warn!(session = %shared.session_id, "Room resolution request failed: {}", e);
    }

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            Some(event) = room_events.recv() => {
                if let ServerEvent::RoomId(id) = event {
                    if let Some(prev) = shared.room_id().filter(|prev| *prev != id) {
                        warn!(session = %shared.session_id, "Room changed from {} to {}", prev, id);
                    }
                    info!(session = %shared.session_id, "Room resolved: {}", id);
                    shared.room.send_replace(Some(id));
                    shared.set_state(SessionState::RoomResolved);
                    shared.reload_history(&socket, "room resolved").await;
                }
            }
            Some(_) = new_messages.recv() => {
                shared.reload_history(&socket, "new message").await;
            }
            changed = connection.changed() => {
                if changed.is_err() || *connection.borrow() == ConnectionState::Disconnected {
                    warn!(session = %shared.session_id, "Chat server closed the connection");
                    shared.set_state(SessionState::Disconnected);
                    break;
                }
            }
        }
    }

    drop(room_events);
    drop(new_messages);
}
