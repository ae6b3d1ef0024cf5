//! Channel names and channel-based routing.
//!
//! Bayeux channels are slash-delimited names such as `/meta/connect` or
//! `/chat/room/42`. Patterns used for routing may contain `*` (exactly one
//! segment) and a trailing `/**` (any number of trailing segments).
//!
//! ```rust
//! use tokio_bayeux::channel::Channel;
//!
//! let channel = Channel::new("/chat/room/42").unwrap();
//! assert_eq!(channel.segments().collect::<Vec<_>>(), ["chat", "room", "42"]);
//! assert!(!channel.is_meta());
//! assert!(Channel::new("/chat room").is_err());
//! ```

pub mod dispatcher;
pub mod processor;

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::errors::ChannelError;

pub use dispatcher::ChannelDispatcher;
pub use processor::{ChannelProcessor, Handler, PatternKind, ProcessorState};

pub const META_PREFIX: &str = "/meta/";
pub const SERVICE_PREFIX: &str = "/service/";

const ALLOWED_PUNCTUATION: &str = "-_!~(){}$@/*";

/// Checks the channel grammar: non-empty, alphanumerics plus `-_!~(){}$@/*`.
pub fn validate(name: &str) -> Result<(), ChannelError> {
    if name.is_empty() {
        return Err(ChannelError::Empty);
    }
    match name
        .chars()
        .find(|c| !c.is_alphanumeric() && !ALLOWED_PUNCTUATION.contains(*c))
    {
        Some(character) => Err(ChannelError::InvalidCharacter {
            channel: name.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

/// Returns true if `name` satisfies the channel grammar.
pub fn is_valid(name: &str) -> bool {
    validate(name).is_ok()
}

/// Splits a channel name into its non-empty segments.
pub fn split(name: &str) -> Vec<&str> {
    name.split('/').filter(|s| !s.is_empty()).collect()
}

/// A validated, immutable channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(Arc<str>);

impl Channel {
    pub fn new(name: &str) -> Result<Self, ChannelError> {
        validate(name)?;
        Ok(Self(name.into()))
    }

    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(is_valid(name));
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn is_meta(&self) -> bool {
        is_meta(&self.0)
    }

    pub fn is_service(&self) -> bool {
        self.0.starts_with(SERVICE_PREFIX)
    }
}

pub(crate) fn is_meta(name: &str) -> bool {
    name.starts_with(META_PREFIX)
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Channel {
    type Error = ChannelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl std::str::FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
