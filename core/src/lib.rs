/// Bazaar - marketplace client core
///
/// Realtime chat session negotiation, REST access to the marketplace
/// backend, local persisted flags and form validation.

pub mod api;
pub mod chat;
pub mod cli_app;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod validation;

pub use api::ApiClient;
pub use chat::{ChatContext, ChatSession, SessionState};
pub use config::Config;
pub use error::{BazaarError, Result};
pub use store::LocalStore;
