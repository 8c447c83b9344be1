/// Event contract between the chat client and the realtime message server.
///
/// Each event travels as one JSON text frame:
///
///   client → server  `{"event": "<name>", "data": {...}, "ack": 7}`
///   server → client  `{"event": "<name>", "data": ...}`
///   server → client  `{"ack": 7, "data": ...}`   (reply to a request)
use crate::error::{BazaarError, Result};
use crate::models::{Message, MessageRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const RESOLVE_ROOM: &str = "resolve-room";
pub const ROOM_ID: &str = "room-id";
pub const GET_HISTORY: &str = "get-history";
pub const SEND_MESSAGE: &str = "send-message";
pub const NEW_MESSAGE: &str = "new-message";

/// Server-issued identifier of a (participants, product) conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(BazaarError::Protocol("empty conversation id".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRoom {
    pub sender: String,
    pub recipient: String,
    pub product_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistory {
    pub room_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender: String,
    pub recipient: String,
    pub room_id: ConversationId,
    pub message: String,
    pub product_title: String,
}

/// Events the client emits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "resolve-room")]
    ResolveRoom(ResolveRoom),

    #[serde(rename = "get-history")]
    GetHistory(GetHistory),

    #[serde(rename = "send-message")]
    SendMessage(OutgoingMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::ResolveRoom(_) => RESOLVE_ROOM,
            ClientEvent::GetHistory(_) => GET_HISTORY,
            ClientEvent::SendMessage(_) => SEND_MESSAGE,
        }
    }

    /// Serialize to a text frame, tagging it with an ack id when a reply is expected
    pub fn encode(&self, ack: Option<u64>) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let (Some(id), Some(obj)) = (ack, value.as_object_mut()) {
            obj.insert("ack".to_string(), serde_json::Value::from(id));
        }
        Ok(serde_json::to_string(&value)?)
    }

    /// Parse a client frame (server side of the contract)
    pub fn decode(text: &str) -> Result<(Self, Option<u64>)> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        let ack = value
            .as_object_mut()
            .and_then(|obj| obj.remove("ack"))
            .and_then(|v| v.as_u64());
        let event = serde_json::from_value(value)
            .map_err(|e| BazaarError::Protocol(format!("Invalid client event: {}", e)))?;
        Ok((event, ack))
    }
}

/// Kinds of server-pushed events a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoomId,
    NewMessage,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RoomId => ROOM_ID,
            EventKind::NewMessage => NEW_MESSAGE,
        }
    }
}

/// Events the server pushes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    RoomId(ConversationId),
    /// Refresh trigger; the payload is not interpreted
    NewMessage(serde_json::Value),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::RoomId(_) => EventKind::RoomId,
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let data = match self {
            ServerEvent::RoomId(id) => serde_json::Value::from(id.as_str()),
            ServerEvent::NewMessage(payload) => payload.clone(),
        };
        Ok(serde_json::to_string(&serde_json::json!({
            "event": self.kind().name(),
            "data": data,
        }))?)
    }
}

/// Encode the reply to an acknowledged client request
pub fn encode_ack(id: u64, data: serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({ "ack": id, "data": data }))?)
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    ack: Option<u64>,
}

/// A decoded server → client frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(ServerEvent),
    Ack { id: u64, data: serde_json::Value },
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)
            .map_err(|e| BazaarError::Protocol(format!("Invalid frame: {}", e)))?;

        match (raw.event, raw.ack) {
            (Some(name), _) => match name.as_str() {
                ROOM_ID => {
                    let id = raw.data.as_str().ok_or_else(|| {
                        BazaarError::Protocol(format!("{} payload must be a string", ROOM_ID))
                    })?;
                    Ok(InboundFrame::Event(ServerEvent::RoomId(ConversationId::new(id)?)))
                }
                NEW_MESSAGE => Ok(InboundFrame::Event(ServerEvent::NewMessage(raw.data))),
                other => Err(BazaarError::Protocol(format!("Unknown event: {}", other))),
            },
            (None, Some(id)) => Ok(InboundFrame::Ack { id, data: raw.data }),
            (None, None) => Err(BazaarError::Protocol(
                "frame has neither event nor ack".to_string(),
            )),
        }
    }
}

/// Turn a history acknowledgement into messages, in server order.
/// Malformed records are skipped so one bad row cannot blank the list.
pub fn decode_history(data: serde_json::Value) -> Result<Vec<Message>> {
    let records = match data {
        serde_json::Value::Array(records) => records,
        serde_json::Value::Null => Vec::new(),
        other => {
            return Err(BazaarError::Protocol(format!(
                "history payload must be an array, got {}",
                other
            )))
        }
    };

    let mut messages = Vec::with_capacity(records.len());
    for value in records {
        let parsed = serde_json::from_value::<MessageRecord>(value)
            .map_err(BazaarError::from)
            .and_then(Message::try_from);
        match parsed {
            Ok(msg) => messages.push(msg),
            Err(e) => warn!("Skipping malformed history record: {}", e),
        }
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> ConversationId {
        ConversationId::new(id).unwrap()
    }

    #[test]
    fn test_request_frame_carries_ack() {
        let event = ClientEvent::GetHistory(GetHistory { room_id: room("r1") });
        let text = event.encode(Some(4)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], GET_HISTORY);
        assert_eq!(value["data"]["roomId"], "r1");
        assert_eq!(value["ack"], 4);

        let (decoded, ack) = ClientEvent::decode(&text).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(ack, Some(4));
    }

    #[test]
    fn test_resolve_room_payload_shape() {
        let event = ClientEvent::ResolveRoom(ResolveRoom {
            sender: "u1".into(),
            recipient: "u2".into(),
            product_title: "Widget".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&event.encode(None).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "resolve-room",
                "data": {"sender": "u1", "recipient": "u2", "productTitle": "Widget"}
            })
        );
    }

    #[test]
    fn test_decode_server_frames() {
        let frame = InboundFrame::decode(r#"{"event":"room-id","data":"r1"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Event(ServerEvent::RoomId(room("r1"))));

        let frame = InboundFrame::decode(r#"{"event":"new-message"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Event(ServerEvent::NewMessage(serde_json::Value::Null))
        );

        let frame = InboundFrame::decode(r#"{"ack":9,"data":[]}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Ack {
                id: 9,
                data: serde_json::json!([])
            }
        );
    }

    #[test]
    fn test_reject_malformed_server_frames() {
        assert!(InboundFrame::decode("not json").is_err());
        assert!(InboundFrame::decode(r#"{"event":"room-id","data":42}"#).is_err());
        assert!(InboundFrame::decode(r#"{"event":"room-id","data":""}"#).is_err());
        assert!(InboundFrame::decode(r#"{"event":"typing","data":{}}"#).is_err());
        assert!(InboundFrame::decode(r#"{"data":[]}"#).is_err());
    }

    #[test]
    fn test_history_skips_bad_records() {
        let data = serde_json::json!([
            {"_id": "m1", "sender": "u1", "message": "hi", "createdAt": "2023-03-01T10:00:00Z"},
            {"_id": "m2", "message": "no author", "createdAt": "2023-03-01T10:01:00Z"},
            {"_id": "m3", "sender": "u2", "message": "hey", "createdAt": "2023-03-01T10:02:00Z"}
        ]);
        let messages = decode_history(data).unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);

        assert!(decode_history(serde_json::json!({"oops": true})).is_err());
        assert!(decode_history(serde_json::Value::Null).unwrap().is_empty());
    }
}
