//! ActionCable frames exchanged over the conversation websocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::{id_list, UserData};

pub const CHANNEL_NAME: &str = "ConversationChannel";

/// Subscription parameters. ActionCable echoes the serialized form back as
/// the `identifier` of every frame for this subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelIdentifier {
    pub channel: &'static str,
    pub conversation_id: String,
    pub sender: String,
}

impl ChannelIdentifier {
    pub fn new(conversation_id: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            channel: CHANNEL_NAME,
            conversation_id: conversation_id.into(),
            sender: sender.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Serialize)]
struct Command<'a> {
    command: &'a str,
    identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeakData<'a> {
    conversation_id: &'a str,
    message: &'a str,
    sender_id: &'a str,
    action: &'static str,
}

pub fn subscribe_command(identifier: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Command {
        command: "subscribe",
        identifier,
        data: None,
    })
}

/// The `speak` action: `{conversation_id, message, sender_id}`.
pub fn speak_command(
    identifier: &str,
    conversation_id: &str,
    message: &str,
    sender_id: &str,
) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(&SpeakData {
        conversation_id,
        message,
        sender_id,
        action: "speak",
    })?;
    serde_json::to_string(&Command {
        command: "message",
        identifier,
        data: Some(data),
    })
}

/// Raw frame as sent by the server. Protocol frames carry `type`, channel
/// broadcasts carry `identifier` and `message`.
#[derive(Debug, Deserialize)]
struct CableFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    identifier: Option<String>,
    message: Option<Value>,
    reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    Welcome,
    Ping,
    Confirmed { identifier: String },
    Rejected { identifier: String },
    Disconnect { reason: Option<String> },
    Broadcast { identifier: String, data: Value },
    Unknown,
}

impl IncomingEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let frame: CableFrame = serde_json::from_str(text)?;
        let identifier = frame.identifier.unwrap_or_default();
        Ok(match frame.kind.as_deref() {
            Some("welcome") => IncomingEvent::Welcome,
            Some("ping") => IncomingEvent::Ping,
            Some("confirm_subscription") => IncomingEvent::Confirmed { identifier },
            Some("reject_subscription") => IncomingEvent::Rejected { identifier },
            Some("disconnect") => IncomingEvent::Disconnect {
                reason: frame.reason,
            },
            Some(_) => IncomingEvent::Unknown,
            None => match frame.message {
                Some(data) => IncomingEvent::Broadcast { identifier, data },
                None => IncomingEvent::Unknown,
            },
        })
    }
}

/// A chat message broadcast on the conversation channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelMessage {
    #[serde(deserialize_with = "id_list")]
    pub participants: Vec<String>,
    pub sender: UserData,
    pub content: String,
}

impl ChannelMessage {
    pub fn is_addressed_to(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p == participant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn speak_command_nests_json_encoded_data() {
        let identifier = ChannelIdentifier::new("7", "1").encode().unwrap();
        assert_eq!(
            identifier,
            r#"{"channel":"ConversationChannel","conversation_id":"7","sender":"1"}"#
        );

        let frame: Value = serde_json::from_str(&speak_command(&identifier, "7", "hi", "1").unwrap()).unwrap();
        assert_eq!(frame["command"], "message");
        assert_eq!(frame["identifier"], identifier);
        let data: Value = serde_json::from_str(frame["data"].as_str().unwrap()).unwrap();
        assert_eq!(
            data,
            json!({ "conversation_id": "7", "message": "hi", "sender_id": "1", "action": "speak" })
        );
    }

    #[test]
    fn parses_protocol_frames() {
        assert_eq!(IncomingEvent::parse(r#"{"type":"welcome"}"#).unwrap(), IncomingEvent::Welcome);
        assert_eq!(
            IncomingEvent::parse(r#"{"type":"ping","message":1700000000}"#).unwrap(),
            IncomingEvent::Ping
        );
        assert_eq!(
            IncomingEvent::parse(r#"{"type":"reject_subscription","identifier":"x"}"#).unwrap(),
            IncomingEvent::Rejected { identifier: "x".into() }
        );
        assert_eq!(
            IncomingEvent::parse(r#"{"type":"disconnect","reason":"unauthorized","reconnect":false}"#).unwrap(),
            IncomingEvent::Disconnect { reason: Some("unauthorized".into()) }
        );
    }

    #[test]
    fn broadcast_decodes_into_channel_message() {
        let event = IncomingEvent::parse(
            r#"{"identifier":"x","message":{"participants":[1,42],"sender":{"id":42,"name":"Ann"},"content":"hello"}}"#,
        )
        .unwrap();
        let IncomingEvent::Broadcast { identifier, data } = event else {
            panic!("expected broadcast, got {:?}", event);
        };
        assert_eq!(identifier, "x");

        let message: ChannelMessage = serde_json::from_value(data).unwrap();
        assert!(message.is_addressed_to("1"));
        assert!(!message.is_addressed_to("3"));
        assert_eq!(message.sender.id, "42");
        assert_eq!(message.content, "hello");
    }
}
