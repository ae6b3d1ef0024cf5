use std::fmt;
use std::str::FromStr;

use crate::errors::ParseBayeuxErrorError;

/// A Bayeux error in the `code:args:message` wire convention.
///
/// ```rust
/// use tokio_bayeux::protocol::BayeuxError;
///
/// let err: BayeuxError = "402:xj3sjdsjdsjad:Unknown Client ID".parse().unwrap();
/// assert_eq!(err.code, 402);
/// assert_eq!(err.arguments, ["xj3sjdsjdsjad"]);
/// assert_eq!(err.message, "Unknown Client ID");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BayeuxError {
    pub code: i32,
    pub arguments: Vec<String>,
    pub message: String,
}

impl BayeuxError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            arguments: Vec::new(),
            message: message.into(),
        }
    }

    /// Parses `raw`, keeping it verbatim as the message if it is malformed.
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| Self::new(0, raw))
    }
}

impl FromStr for BayeuxError {
    type Err = ParseBayeuxErrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let first = parts.next().unwrap_or_default();
        let (second, third) = (parts.next(), parts.next());

        let Some(second) = second else {
            // no colons at all, the whole string is the message
            return Ok(Self::new(0, s));
        };

        let code = first
            .trim()
            .parse::<i32>()
            .map_err(|_| ParseBayeuxErrorError::InvalidCode(first.to_string()))?;

        let Some(message) = third else {
            return Ok(Self::new(code, second));
        };

        let arguments = if second.is_empty() {
            Vec::new()
        } else {
            second.split(',').map(String::from).collect()
        };

        Ok(Self {
            code,
            arguments,
            message: message.to_string(),
        })
    }
}

impl fmt::Display for BayeuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.code, self.arguments.join(","), self.message)
    }
}

impl std::error::Error for BayeuxError {}
