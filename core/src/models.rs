/// Typed records exchanged with the marketplace backend and chat server
use crate::error::{BazaarError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every backend response wraps its payload in `{ "data": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A published product request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub product_name: String,
    #[serde(default)]
    pub product_company: String,
    #[serde(default)]
    pub product_quantity: u32,
    #[serde(default)]
    pub product_description: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub product_image: Option<String>,
    pub author_email: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetails {
    pub post_details: Post,
    pub author_details: User,
}

/// Body for publishing a new request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub product_name: String,
    pub product_company: String,
    pub product_quantity: u32,
    pub product_description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product_image: Option<String>,
    pub author_email: String,
}

/// One row of the "my chats" listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub room_id: String,
    pub sender: String,
    pub recipient: String,
    #[serde(default)]
    pub message: String,
    pub product_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub phone_number: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub phone_number: String,
    pub password: String,
    pub agreed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub phone_number: String,
    pub old_password: String,
    pub new_password: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub access_token: String,
}

/// Chat message as shown in the conversation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Raw message record as stored by the chat server.
/// Every field is optional on the wire; conversion into [`Message`]
/// rejects records that lack the required ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub product_title: Option<String>,
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    match field {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BazaarError::Protocol(format!(
            "message record is missing `{}`",
            name
        ))),
    }
}

impl TryFrom<MessageRecord> for Message {
    type Error = BazaarError;

    fn try_from(record: MessageRecord) -> Result<Self> {
        let id = required(record.id, "_id")?;
        let author = required(record.sender, "sender")?;
        // An empty body is still a message; only absence is malformed
        let body = record.message.ok_or_else(|| {
            BazaarError::Protocol(format!("message record {} is missing `message`", id))
        })?;
        let raw_ts = required(record.created_at, "createdAt")?;
        let created_at = DateTime::parse_from_rfc3339(&raw_ts)
            .map_err(|e| {
                BazaarError::Protocol(format!("message {} has bad createdAt {}: {}", id, raw_ts, e))
            })?
            .with_timezone(&Utc);

        Ok(Message {
            id,
            author,
            body,
            created_at,
        })
    }
}
