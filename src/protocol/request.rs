use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::channel::Channel;
use crate::errors::InvalidRequest;

use super::{
    BAYEUX_VERSION, CONNECT, ConnectionType, ConnectionTypes, DISCONNECT, HANDSHAKE,
    MINIMUM_VERSION, SUBSCRIBE, UNSUBSCRIBE,
};

// shared by every session, ids only need to be monotonic per session
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Fields specific to each request kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    Handshake {
        version: String,
        minimum_version: String,
        connection_types: ConnectionTypes,
    },
    Connect {
        connection_type: ConnectionType,
    },
    Disconnect,
    Subscribe {
        subscription: Channel,
    },
    Unsubscribe {
        subscription: Channel,
    },
    Publish {
        event: Value,
    },
}

/// An outbound Bayeux message.
///
/// Serializes its members in wire order: `channel`, `clientId`, `id`,
/// `data`, the kind-specific members, then `ext`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    id: u64,
    channel: Channel,
    client_id: Option<String>,
    data: Option<Value>,
    ext: Option<Value>,
    tag: Option<String>,
    kind: RequestKind,
}

impl Request {
    fn new(channel: Channel, client_id: &str, kind: RequestKind) -> Self {
        Self {
            id: next_id(),
            channel,
            client_id: (!client_id.is_empty()).then(|| client_id.to_string()),
            data: None,
            ext: None,
            tag: None,
            kind,
        }
    }

    pub fn handshake(connection_types: ConnectionTypes) -> Self {
        Self::new(
            Channel::from_static(HANDSHAKE),
            "",
            RequestKind::Handshake {
                version: BAYEUX_VERSION.into(),
                minimum_version: MINIMUM_VERSION.into(),
                connection_types,
            },
        )
    }

    /// Fails with [`InvalidRequest::MissingClientId`] when `client_id` is empty.
    pub fn connect(client_id: &str, connection_type: ConnectionType) -> Result<Self, InvalidRequest> {
        if client_id.is_empty() {
            return Err(InvalidRequest::MissingClientId(CONNECT));
        }
        Ok(Self::new(
            Channel::from_static(CONNECT),
            client_id,
            RequestKind::Connect { connection_type },
        ))
    }

    pub fn disconnect(client_id: &str) -> Self {
        Self::new(Channel::from_static(DISCONNECT), client_id, RequestKind::Disconnect)
    }

    pub fn subscribe(client_id: &str, channel: &str) -> Result<Self, InvalidRequest> {
        Ok(Self::new(
            Channel::from_static(SUBSCRIBE),
            client_id,
            RequestKind::Subscribe {
                subscription: Channel::new(channel)?,
            },
        ))
    }

    pub fn unsubscribe(client_id: &str, channel: &str) -> Result<Self, InvalidRequest> {
        Ok(Self::new(
            Channel::from_static(UNSUBSCRIBE),
            client_id,
            RequestKind::Unsubscribe {
                subscription: Channel::new(channel)?,
            },
        ))
    }

    pub fn publish(client_id: &str, channel: &str, event: Value) -> Result<Self, InvalidRequest> {
        Ok(Self::new(
            Channel::new(channel)?,
            client_id,
            RequestKind::Publish { event },
        ))
    }

    /// Overrides the protocol versions announced by a handshake; no-op for other kinds.
    pub fn with_versions(mut self, version: &str, minimum: &str) -> Self {
        if let RequestKind::Handshake {
            version: ref mut v,
            minimum_version: ref mut m,
            ..
        } = self.kind
        {
            *v = version.to_string();
            *m = minimum.to_string();
        }
        self
    }

    /// Attaches a `data` payload. On a publish this replaces the event.
    pub fn with_data(mut self, data: Value) -> Self {
        match self.kind {
            RequestKind::Publish { ref mut event } => *event = data,
            _ => self.data = Some(data),
        }
        self
    }

    pub fn with_ext(mut self, ext: Value) -> Self {
        self.ext = Some(ext);
        self
    }

    /// Local label, never sent over the wire.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        match self.kind {
            RequestKind::Publish { ref event } => Some(event),
            _ => self.data.as_ref(),
        }
    }

    pub fn ext(&self) -> Option<&Value> {
        self.ext.as_ref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// The channel a subscribe/unsubscribe targets.
    pub fn subscription(&self) -> Option<&Channel> {
        match self.kind {
            RequestKind::Subscribe { ref subscription }
            | RequestKind::Unsubscribe { ref subscription } => Some(subscription),
            _ => None,
        }
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("channel", &self.channel)?;
        if let Some(ref client_id) = self.client_id {
            map.serialize_entry("clientId", client_id)?;
        }
        map.serialize_entry("id", &self.id.to_string())?;
        if let Some(data) = self.data() {
            map.serialize_entry("data", data)?;
        }

        match self.kind {
            RequestKind::Handshake {
                ref version,
                ref minimum_version,
                ref connection_types,
            } => {
                map.serialize_entry("version", version)?;
                map.serialize_entry("minimumVersion", minimum_version)?;
                map.serialize_entry("supportedConnectionTypes", connection_types)?;
            }
            RequestKind::Connect { ref connection_type } => {
                map.serialize_entry("connectionType", connection_type)?;
            }
            RequestKind::Subscribe { ref subscription }
            | RequestKind::Unsubscribe { ref subscription } => {
                map.serialize_entry("subscription", subscription)?;
            }
            RequestKind::Disconnect | RequestKind::Publish { .. } => {}
        }

        if let Some(ref ext) = self.ext {
            map.serialize_entry("ext", ext)?;
        }
        map.end()
    }
}
