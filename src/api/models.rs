use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The API sends ids as numbers, the channel sometimes as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Num(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Num(n) => n.to_string(),
        }
    }
}

pub(crate) fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

/// Rails sends unset columns as `null`; treat those like missing fields.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

pub(crate) fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Vec::<RawId>::deserialize(d).map(|ids| ids.into_iter().map(String::from).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Boat,
    Crew,
}

impl AccountType {
    pub fn humanize(&self) -> &'static str {
        match self {
            AccountType::Boat => "Boat Owner",
            AccountType::Crew => "Crew",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SailingType {
    Racing,
    Practice,
    Cruising,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(rename = "type", default)]
    pub account_type: Option<AccountType>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hometown: String,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub sailing_types: Option<Vec<SailingType>>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avaliable: bool,
}

impl UserData {
    /// A bare user reference carrying only what chat rendering needs.
    pub fn reference(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: String::new(),
            account_type: None,
            hometown: String::new(),
            experience: None,
            weight: None,
            sailing_types: None,
            age: None,
            gender: None,
            push_token: None,
            avaliable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    pub sender: UserData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sent_by_me: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub other_user: UserData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn unread_count(&self, user_id: &str) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender.id != user_id && !m.read)
            .count()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
