//! Realtime websocket framing (Phoenix channels, protocol version 1.0.0).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ChangeEvent, ChangeKind, ChangeSubscription};

/// Protocol version requested in the socket URL.
pub const VSN: &str = "1.0.0";

/// Topic carrying socket-level heartbeats.
const PHOENIX_TOPIC: &str = "phoenix";

/// A frame as sent and received on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Channel topic for a subscription's channel name.
#[must_use]
pub fn topic(channel: &str) -> String {
    format!("realtime:{channel}")
}

/// `phx_join` registering a single `postgres_changes` listener.
#[must_use]
pub fn join(subscription: &ChangeSubscription, access_token: Option<&str>, reference: &str) -> Frame {
    let mut change = json!({
        "event": subscription.event.as_str(),
        "schema": subscription.schema,
        "table": subscription.table.as_str(),
    });
    if let Some(filter) = &subscription.filter {
        change["filter"] = Value::String(filter.expression());
    }

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
        },
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    Frame {
        topic: topic(&subscription.channel),
        event: "phx_join".to_string(),
        payload,
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

/// Socket keep-alive.
#[must_use]
pub fn heartbeat(reference: &str) -> Frame {
    Frame {
        topic: PHOENIX_TOPIC.to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// `phx_leave` for `topic`.
#[must_use]
pub fn leave(topic: &str, reference: &str) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// Decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to a frame we sent.
    Reply {
        topic: String,
        reference: Option<String>,
        ok: bool,
        reason: Option<String>,
    },
    /// A row change on `topic`.
    Change { topic: String, event: ChangeEvent },
    /// The server errored the channel.
    ChannelError { topic: String },
    /// The server closed the channel.
    ChannelClosed { topic: String },
    /// Anything else (presence, system messages).
    Other,
}

#[derive(Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: ChangeKind,
    schema: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// Decode a text frame.
///
/// # Errors
///
/// Returns error if the text is not a frame, or a change frame is malformed.
pub fn parse(text: &str) -> Result<Incoming, serde_json::Error> {
    let frame: Frame = serde_json::from_str(text)?;

    Ok(match frame.event.as_str() {
        "phx_reply" => {
            let ok = frame.payload.get("status").and_then(Value::as_str) == Some("ok");
            let reason = frame
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .map(str::to_string);
            Incoming::Reply {
                topic: frame.topic,
                reference: frame.reference,
                ok,
                reason,
            }
        }
        "postgres_changes" => {
            let data: ChangeData = serde_json::from_value(
                frame.payload.get("data").cloned().unwrap_or(Value::Null),
            )?;
            Incoming::Change {
                topic: frame.topic,
                event: ChangeEvent {
                    kind: data.kind,
                    schema: data.schema,
                    table: data.table,
                    record: data.record.filter(|r| !is_empty_row(r)),
                    old_record: data.old_record.filter(|r| !is_empty_row(r)),
                },
            }
        }
        "phx_error" => Incoming::ChannelError { topic: frame.topic },
        "phx_close" => Incoming::ChannelClosed { topic: frame.topic },
        _ => Incoming::Other,
    })
}

/// Inserts carry `old_record: {}` and deletes `record: {}`.
fn is_empty_row(row: &Value) -> bool {
    row.as_object().is_some_and(serde_json::Map::is_empty) || row.is_null()
}
