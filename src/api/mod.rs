pub mod client;
pub mod error;
pub mod events;
pub mod models;

use async_trait::async_trait;

pub use client::ApiClient;
pub use error::{ApiError, GENERAL_ERROR};
pub use models::{ChatMessage, Conversation, UserData};

/// The REST endpoints the conversation store depends on. `token` overrides
/// the bearer token persisted on the device.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET chat/messages`: every conversation with its full history.
    async fn conversations(&self, token: Option<&str>) -> Result<Vec<Conversation>, ApiError>;

    /// `POST chat/create_conversation`: creates or fetches the conversation
    /// with `other_user_id`.
    async fn create_conversation(
        &self,
        other_user_id: &str,
        token: Option<&str>,
    ) -> Result<Conversation, ApiError>;

    /// `POST chat/mark_messages_as_read`: returns the updated conversation.
    async fn mark_messages_as_read(
        &self,
        conversation_id: &str,
        token: Option<&str>,
    ) -> Result<Conversation, ApiError>;
}
