use thiserror::Error;

/// Rejection of a channel name or pattern, raised before anything reaches the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel name is empty")]
    Empty,
    #[error("invalid character {character:?} in channel {channel:?}")]
    InvalidCharacter { channel: String, character: char },
    #[error("unsupported wildcard placement in {0:?}, `/**` is only allowed as the last segment")]
    UnsupportedWildcard(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseBayeuxErrorError {
    #[error("error code {0:?} is not an integer")]
    InvalidCode(String),
}

/// A request that can't be built, detected before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("{0} requires a client id")]
    MissingClientId(&'static str),
}
