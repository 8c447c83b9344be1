/// Realtime chat: wire contract, transport, connection manager and session flow
pub mod protocol;
pub mod session;
pub mod socket;
pub mod transport;

pub use protocol::{ClientEvent, ConversationId, EventKind, InboundFrame, ServerEvent};
pub use session::{load_history, ChatContext, ChatSession, SessionState};
pub use socket::{ConnectionState, SocketClient, Subscription};
pub use transport::{Connector, Link, MemoryConnector, ServerEnd, WsConnector};
