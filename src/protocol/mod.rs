//! # Protocol Module
//!
//! Wire types of the Bayeux protocol.
//!
//! ## Core Types
//!
//! - **Request**: client-to-server message, one constructor per request kind
//! - **Message**: any message received from the server (replies and events)
//! - **Advice**: server guidance on how to continue the connect loop
//! - **BayeuxError**: the `code:args:message` error convention
//!
//! ## Example
//!
//! ```rust
//! use tokio_bayeux::protocol::{Message, Request};
//!
//! let request = Request::subscribe("abc123", "/chat/lobby").unwrap();
//! let json = serde_json::to_string(&request).unwrap();
//! assert!(json.starts_with(r#"{"channel":"/meta/subscribe","clientId":"abc123","id":""#));
//!
//! let reply: Message = serde_json::from_str(
//!     r#"{"channel":"/meta/subscribe","successful":true,"subscription":"/chat/lobby"}"#,
//! ).unwrap();
//! assert!(reply.is_successful());
//! ```

mod error;
mod request;

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub use error::BayeuxError;
pub use request::{Request, RequestKind};

pub const HANDSHAKE: &str = "/meta/handshake";
pub const CONNECT: &str = "/meta/connect";
pub const DISCONNECT: &str = "/meta/disconnect";
pub const SUBSCRIBE: &str = "/meta/subscribe";
pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";

pub const BAYEUX_VERSION: &str = "1.0";
pub const MINIMUM_VERSION: &str = "1.0";

/// HTTP connection types this client can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    LongPolling,
    CallbackPolling,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 2] = [ConnectionType::LongPolling, ConnectionType::CallbackPolling];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::LongPolling => "long-polling",
            ConnectionType::CallbackPolling => "callback-polling",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            ConnectionType::LongPolling => 0b01,
            ConnectionType::CallbackPolling => 0b10,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl Serialize for ConnectionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Bitmask of [`ConnectionType`]s, serialized as an array of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionTypes(u8);

impl ConnectionTypes {
    pub const NONE: ConnectionTypes = ConnectionTypes(0);
    pub const ALL: ConnectionTypes = ConnectionTypes(0b11);

    pub fn contains(&self, connection_type: ConnectionType) -> bool {
        self.0 & connection_type.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnectionType> + use<> {
        let mask = *self;
        ConnectionType::ALL.into_iter().filter(move |t| mask.contains(*t))
    }

    /// Picks the first of our types the server also offers, falling back to long-polling.
    pub fn negotiate(&self, offered: &[String]) -> ConnectionType {
        self.iter()
            .find(|t| offered.iter().any(|o| o == t.as_str()))
            .unwrap_or(ConnectionType::LongPolling)
    }
}

impl Default for ConnectionTypes {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<ConnectionType> for ConnectionTypes {
    fn from(value: ConnectionType) -> Self {
        ConnectionTypes(value.bit())
    }
}

impl BitOr for ConnectionType {
    type Output = ConnectionTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        ConnectionTypes(self.bit() | rhs.bit())
    }
}

impl BitOr<ConnectionType> for ConnectionTypes {
    type Output = ConnectionTypes;

    fn bitor(self, rhs: ConnectionType) -> Self::Output {
        ConnectionTypes(self.0 | rhs.bit())
    }
}

impl Serialize for ConnectionTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|t| t.as_str()))
    }
}

/// What the server wants the client to do after a connect reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconnect {
    Retry,
    Handshake,
    None,
    Other(String),
}

/// Server advice attached to handshake and connect replies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<String>,
    /// Milliseconds to wait before the next connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Milliseconds the server will hold a connect open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
}

impl Advice {
    /// Missing reconnect advice means retry.
    pub fn reconnect(&self) -> Reconnect {
        match self.reconnect.as_deref() {
            None | Some("retry") => Reconnect::Retry,
            Some("handshake") => Reconnect::Handshake,
            Some("none") => Reconnect::None,
            Some(other) => Reconnect::Other(other.to_string()),
        }
    }

    pub fn interval(&self) -> Option<std::time::Duration> {
        self.interval
            .map(|ms| std::time::Duration::from_millis(ms.max(0) as u64))
    }
}

/// A message received from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "one_or_many")]
    pub subscription: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_connection_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Message {
    pub fn is_meta(&self) -> bool {
        crate::channel::is_meta(&self.channel)
    }

    pub fn is_successful(&self) -> bool {
        self.successful == Some(true)
    }

    /// Replies carry `successful`; events published by other clients don't.
    pub fn is_reply(&self) -> bool {
        self.is_meta() || self.successful.is_some()
    }

    /// The decoded `error` member, or a generic error for an unsuccessful reply without one.
    pub fn bayeux_error(&self) -> Option<BayeuxError> {
        match (&self.error, self.successful) {
            (Some(raw), _) => Some(BayeuxError::parse_lossy(raw)),
            (None, Some(false)) => Some(BayeuxError::new(0, "request unsuccessful")),
            _ => None,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "message id must be a string or number, got {other}"
            )));
        }
    })
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_types_bitmask() {
        let both = ConnectionType::LongPolling | ConnectionType::CallbackPolling;
        assert_eq!(both, ConnectionTypes::ALL);
        assert_eq!(
            serde_json::to_string(&both).unwrap(),
            r#"["long-polling","callback-polling"]"#
        );
        let one = ConnectionTypes::from(ConnectionType::CallbackPolling);
        assert!(!one.contains(ConnectionType::LongPolling));
        assert_eq!(serde_json::to_string(&ConnectionTypes::NONE).unwrap(), "[]");
    }

    #[test]
    fn negotiation_prefers_client_order() {
        let offered = vec!["callback-polling".to_string(), "long-polling".to_string()];
        assert_eq!(ConnectionTypes::ALL.negotiate(&offered), ConnectionType::LongPolling);
        let offered = vec!["callback-polling".to_string(), "websocket".to_string()];
        assert_eq!(ConnectionTypes::ALL.negotiate(&offered), ConnectionType::CallbackPolling);
        assert_eq!(ConnectionTypes::ALL.negotiate(&[]), ConnectionType::LongPolling);
    }

    #[test]
    fn advice_interpretation() {
        let advice: Advice =
            serde_json::from_str(r#"{"reconnect":"retry","interval":250,"timeout":30000}"#).unwrap();
        assert_eq!(advice.reconnect(), Reconnect::Retry);
        assert_eq!(advice.interval(), Some(std::time::Duration::from_millis(250)));
        assert_eq!(Advice::default().reconnect(), Reconnect::Retry);

        let advice: Advice = serde_json::from_str(r#"{"reconnect":"fly","interval":-1}"#).unwrap();
        assert_eq!(advice.reconnect(), Reconnect::Other("fly".into()));
        assert_eq!(advice.interval(), Some(std::time::Duration::ZERO));
    }

    #[test]
    fn decodes_replies_and_events() {
        let reply: Message = serde_json::from_str(
            r#"{"channel":"/meta/handshake","id":7,"successful":true,"clientId":"abc",
                "version":"1.0","supportedConnectionTypes":["long-polling"],
                "advice":{"reconnect":"retry","interval":0},"authSuccessful":true}"#,
        )
        .unwrap();
        assert_eq!(reply.id.as_deref(), Some("7"));
        assert_eq!(reply.client_id.as_deref(), Some("abc"));
        assert!(reply.is_reply());
        assert_eq!(reply.other.get("authSuccessful"), Some(&Value::Bool(true)));

        let event: Message =
            serde_json::from_str(r#"{"channel":"/chat/lobby","data":{"text":"hi"}}"#).unwrap();
        assert!(!event.is_reply());
        assert_eq!(event.data.unwrap()["text"], "hi");
    }

    #[test]
    fn unsuccessful_reply_error() {
        let reply: Message = serde_json::from_str(
            r#"{"channel":"/meta/subscribe","successful":false,"error":"403:/secret:denied",
                "subscription":["/secret"]}"#,
        )
        .unwrap();
        assert_eq!(reply.subscription, vec!["/secret"]);
        let err = reply.bayeux_error().unwrap();
        assert_eq!(err.code, 403);
        assert_eq!(err.arguments, vec!["/secret"]);

        let reply: Message =
            serde_json::from_str(r#"{"channel":"/meta/connect","successful":false}"#).unwrap();
        assert_eq!(reply.bayeux_error().unwrap().code, 0);
    }
}
