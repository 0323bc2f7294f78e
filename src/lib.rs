//! Messaging core of the RegattaBoard crew-matching client: REST access to
//! conversations, the ActionCable conversation channel, and the store that
//! merges both.

pub mod api;
pub mod app;
pub mod chat;
pub mod storage;
pub mod utils;

pub use api::{ApiClient, ApiError, ChatApi};
pub use app::Settings;
pub use chat::{ConversationStore, StoreEvent};
pub use storage::KeyValueStore;
