//! Conversation store: the signed-in user's conversations, the one on screen,
//! and the realtime channel feeding it.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::sync::broadcast;

use crate::api::error::{report_error, ApiError};
use crate::api::events::ChannelMessage;
use crate::api::models::{ChatMessage, Conversation, UserData};
use crate::api::ChatApi;
use crate::chat::connection::{
    ChannelConnector, ChannelError, ChannelParams, ConnectionState, Inbound, RealtimeChannel,
};
use crate::chat::format::{group_by_day, MessageGroup};

const FETCH_ERROR: &str = "Error fetching conversations. Please try again.";
const MARK_READ_ERROR: &str = "Error marking messages as read. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No conversation is selected")]
    NoActiveConversation,
    #[error("Conversation {0} is not loaded")]
    UnknownConversation(String),
    #[error("Chat is not connected")]
    NotConnected,
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Emitted after each committed change to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    LoadingChanged(bool),
    ConversationsReplaced,
    ConversationAdded(String),
    ConversationSelected(String),
    ConversationUpdated(String),
    MessageAppended { conversation_id: String },
    MessagesRead,
    ErrorChanged(Option<String>),
    Reset,
}

pub struct ConversationStore {
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn ChannelConnector>,
    environment: String,
    is_loading: bool,
    is_refreshing: bool,
    error: Option<String>,
    conversations: Option<Vec<Conversation>>,
    current_conversation_id: Option<String>,
    channel: Option<Box<dyn RealtimeChannel>>,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    pub fn new(api: Arc<dyn ChatApi>, connector: Arc<dyn ChannelConnector>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            connector,
            environment: "local".to_string(),
            is_loading: false,
            is_refreshing: false,
            error: None,
            conversations: None,
            current_conversation_id: None,
            channel: None,
            events,
        }
    }

    /// Tags reported errors, e.g. with `Settings::api_environment()`.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn set_loading(&mut self, loading: bool, from_refresh: bool) {
        self.is_loading = loading;
        if from_refresh {
            self.is_refreshing = loading;
        }
        self.notify(StoreEvent::LoadingChanged(loading));
    }

    fn set_error(&mut self, error: Option<String>) {
        if self.error != error {
            self.error = error.clone();
            self.notify(StoreEvent::ErrorChanged(error));
        }
    }

    fn fail(&mut self, context: &str, err: ApiError, empty_fallback: &str) {
        report_error(&self.environment, context, &err);
        let message = match err {
            ApiError::EmptyResponse => empty_fallback.to_string(),
            other => other.to_string(),
        };
        self.set_error(Some(message));
    }

    pub fn reset(&mut self) {
        self.close_channel();
        self.is_loading = false;
        self.is_refreshing = false;
        self.error = None;
        self.conversations = None;
        self.current_conversation_id = None;
        self.notify(StoreEvent::Reset);
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `None` until a load succeeds.
    pub fn conversations(&self) -> Option<&[Conversation]> {
        self.conversations.as_deref()
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        let id = self.current_conversation_id.as_deref()?;
        self.conversations.as_ref()?.iter().find(|c| c.id == id)
    }

    fn current_conversation_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.current_conversation_id.as_deref()?;
        self.conversations.as_mut()?.iter_mut().find(|c| c.id == id)
    }

    /// Advisory: two triggers before the first flips `is_loading` both fetch.
    pub fn should_fetch(&self) -> bool {
        !self.is_loading && self.conversations.is_none()
    }

    pub fn grouped_messages(&self, now: DateTime<Local>) -> Vec<MessageGroup<'_>> {
        match self.current_conversation() {
            Some(conversation) => group_by_day(&conversation.messages, now),
            None => Vec::new(),
        }
    }

    /// Messages across every loaded conversation not sent by `user` and
    /// still unread.
    pub fn unread_count(&self, user: &UserData) -> usize {
        self.conversations
            .iter()
            .flatten()
            .flat_map(|c| c.messages.iter())
            .filter(|m| m.sender.id != user.id && !m.read)
            .count()
    }

    /// Replaces the loaded list. On failure the list keeps its previous value
    /// and the error is recorded.
    pub async fn load_conversations(&mut self, from_refresh: bool, token: Option<&str>) {
        self.set_loading(true, from_refresh);
        self.set_error(None);
        let result = self.api.conversations(token).await;
        self.set_loading(false, from_refresh);
        match result {
            Ok(conversations) => {
                log::debug!("loaded {} conversations", conversations.len());
                self.conversations = Some(conversations);
                self.notify(StoreEvent::ConversationsReplaced);
            }
            Err(e) => self.fail("load conversations", e, FETCH_ERROR),
        }
    }

    pub async fn find_or_create_conversation(&mut self, other_user_id: &str, token: Option<&str>) {
        if self.conversations.is_none() {
            self.load_conversations(false, token).await;
        }
        let existing = self
            .conversations
            .iter()
            .flatten()
            .find(|c| c.other_user.id == other_user_id)
            .map(|c| c.id.clone());
        match existing {
            Some(id) => self.select_conversation(id),
            None => self.create_conversation(other_user_id, token).await,
        }
    }

    pub async fn create_conversation(&mut self, other_user_id: &str, token: Option<&str>) {
        self.set_loading(true, false);
        self.set_error(None);
        let result = self.api.create_conversation(other_user_id, token).await;
        self.set_loading(false, false);
        match result {
            Ok(conversation) => {
                let id = conversation.id.clone();
                self.conversations.get_or_insert_with(Vec::new).push(conversation);
                self.notify(StoreEvent::ConversationAdded(id.clone()));
                self.select_conversation(id);
            }
            Err(e) => self.fail("create conversation", e, FETCH_ERROR),
        }
    }

    /// Does not check that `id` is loaded.
    pub fn select_conversation(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.current_conversation_id = Some(id.clone());
        self.notify(StoreEvent::ConversationSelected(id));
    }

    /// Opens the channel for the active conversation, closing any previous
    /// one first. Inbound messages must be fed back through
    /// [`receive_message`](Self::receive_message).
    pub async fn open_channel(&mut self, access_token: &str, sender_id: &str) -> Result<Inbound, StoreError> {
        self.close_channel();
        let conversation_id = self
            .current_conversation_id
            .clone()
            .ok_or(StoreError::NoActiveConversation)?;
        let params = ChannelParams {
            access_token: access_token.to_string(),
            conversation_id,
            sender_id: sender_id.to_string(),
        };
        let (channel, inbound) = self.connector.open(params).await?;
        self.channel = Some(channel);
        Ok(inbound)
    }

    pub fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    pub fn channel_state(&self) -> ConnectionState {
        self.channel
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Appends the message locally, then hands the text to the channel.
    /// Delivery is not tracked.
    pub fn send_message(&mut self, text: &str, author: &UserData) -> Result<(), StoreError> {
        if self.channel.is_none() {
            return Err(StoreError::NotConnected);
        }
        let conversation_id = self
            .current_conversation_id
            .clone()
            .ok_or(StoreError::NoActiveConversation)?;
        let conversation = self
            .current_conversation_mut()
            .ok_or_else(|| StoreError::UnknownConversation(conversation_id.clone()))?;
        conversation.messages.push(ChatMessage {
            created_at: Utc::now(),
            content: text.to_string(),
            sender: author.clone(),
            sent_by_me: true,
            read: false,
        });
        self.notify(StoreEvent::MessageAppended { conversation_id });
        if let Some(channel) = &self.channel {
            channel.send(text);
        }
        Ok(())
    }

    /// Appends an inbound message to the active conversation unless it was
    /// sent by `sender_id` itself (our own message echoed back).
    ///
    /// This is loop suppression by sender identity, not deduplication: any
    /// broadcast whose sender is the local user is dropped.
    pub fn receive_message(&mut self, payload: ChannelMessage, sender_id: &str) {
        if payload.sender.id == sender_id {
            return;
        }
        let Some(conversation_id) = self.current_conversation_id.clone() else {
            log::warn!("message received with no active conversation");
            return;
        };
        let Some(conversation) = self.current_conversation_mut() else {
            log::warn!("message received for unloaded conversation {}", conversation_id);
            return;
        };
        conversation.messages.push(ChatMessage {
            created_at: Utc::now(),
            content: payload.content,
            sender: payload.sender,
            sent_by_me: false,
            read: false,
        });
        self.notify(StoreEvent::MessageAppended { conversation_id });
    }

    /// Marks every received message read locally, then flushes the active
    /// conversation to the server and adopts its copy.
    pub async fn mark_messages_as_read(&mut self, token: Option<&str>) {
        let Some(conversation_id) = self.current_conversation_id.clone() else {
            return;
        };
        self.set_error(None);

        let mut flipped = false;
        for message in self.conversations.iter_mut().flatten().flat_map(|c| c.messages.iter_mut()) {
            if !message.sent_by_me && !message.read {
                message.read = true;
                flipped = true;
            }
        }
        if flipped {
            self.notify(StoreEvent::MessagesRead);
        }

        match self.api.mark_messages_as_read(&conversation_id, token).await {
            Ok(updated) => {
                let slot = self
                    .conversations
                    .iter_mut()
                    .flatten()
                    .find(|c| c.id == conversation_id);
                if let Some(slot) = slot {
                    *slot = updated;
                    self.notify(StoreEvent::ConversationUpdated(conversation_id));
                }
            }
            Err(e) => self.fail("mark messages as read", e, MARK_READ_ERROR),
        }
    }
}

impl Drop for ConversationStore {
    fn drop(&mut self) {
        self.close_channel();
    }
}
