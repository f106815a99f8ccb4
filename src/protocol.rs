//! Websocket frame codec shared by the hub, senders and displays.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use crate::error::TransportError;
use crate::gesture::ShotEvent;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Shot as submitted by a sender; every field is optional so the hub can
/// report exactly which ones are missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotSubmission {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selfie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl From<ShotEvent> for ShotSubmission {
    fn from(shot: ShotEvent) -> Self {
        Self {
            name: Some(shot.author_name),
            message: Some(shot.author_message),
            selfie: Some(shot.selfie_image),
            force: Some((shot.force * 10.0).round() / 10.0),
            timestamp: Some(shot.fired_at),
        }
    }
}

/// Legacy `send-message` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageSubmission {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Item broadcast to every display after a shot is committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayShot {
    pub id: String,
    pub user_name: String,
    pub message: String,
    pub image_url: String,
    pub force: f64,
    pub timestamp: u64,
    pub created_at: DateTime<Utc>,
}

/// Public view of a stored message record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub user_name: String,
    pub message: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotAck {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    pub success: bool,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageList {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Frames sent by senders and displays to the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "shotFired")]
    ShotFired(ShotSubmission),
    #[serde(rename = "send-message")]
    SendMessage(MessageSubmission),
    #[serde(rename = "get-messages")]
    GetMessages,
}

/// Frames sent by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "shotSuccess")]
    ShotSuccess(ShotAck),
    #[serde(rename = "message-sent")]
    MessageSent(MessageAck),
    #[serde(rename = "all-messages")]
    AllMessages(MessageList),
    #[serde(rename = "displayShot")]
    DisplayShot(DisplayShot),
    #[serde(rename = "receive-message")]
    ReceiveMessage(MessageView),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

fn codec_error(err: serde_json::Error) -> TransportError {
    TransportError::Codec {
        details: err.to_string(),
    }
}

fn decode_payload<T: DeserializeOwned + Default>(
    data: Option<serde_json::Value>,
) -> Result<T, TransportError> {
    match data {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(codec_error),
    }
}

impl ClientMessage {
    /// Decode a text frame. Unknown event names yield `Ok(None)` so the
    /// connection can ignore them.
    pub fn parse(text: &str) -> Result<Option<Self>, TransportError> {
        let frame: RawFrame = serde_json::from_str(text).map_err(codec_error)?;

        match frame.event.as_str() {
            "shotFired" => Ok(Some(ClientMessage::ShotFired(decode_payload(frame.data)?))),
            "send-message" => Ok(Some(ClientMessage::SendMessage(decode_payload(
                frame.data,
            )?))),
            "get-messages" => Ok(Some(ClientMessage::GetMessages)),
            _ => Ok(None),
        }
    }

    pub fn to_text(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(codec_error)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::ShotFired(_) => "shotFired",
            ClientMessage::SendMessage(_) => "send-message",
            ClientMessage::GetMessages => "get-messages",
        }
    }
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(codec_error)
    }

    pub fn to_text(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(codec_error)
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }
}
