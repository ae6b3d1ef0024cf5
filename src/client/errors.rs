//! Client error types and result handling.
//!
//! This module defines the error type returned by every session operation
//! and the future wrapper those operations hand back.

use std::future::Future;
use std::future::IntoFuture;

use thiserror::Error;

use crate::errors::InvalidRequest;
use crate::protocol::BayeuxError;
use crate::transport::TransportError;

/// A wrapper around futures that can be polled to get results.
///
/// The operation itself runs on the session's runtime as soon as it is
/// started, so it's totally fine to drop this if you don't need the result.
///
/// ```rust,no_run
/// use tokio_bayeux::client::Client;
/// use tokio_bayeux::config::Config;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::from_url("https://example.com/cometd", Config::new())?;
/// client.handshake().await?;
/// // fire and forget
/// client.publish("/chat/lobby", serde_json::json!({"text": "hi"}));
/// # Ok(())
/// # }
/// ```
pub struct FutureResult<T>(pub(crate) T);

impl<T, R> IntoFuture for FutureResult<T>
where
    T: Future<Output = R>,
{
    type Output = R;
    type IntoFuture = T;

    fn into_future(self) -> Self::IntoFuture {
        self.0
    }
}

/// Errors that can occur when making requests to the server.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request could not be built (bad channel name, missing client id)
    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    /// The session is in the wrong state for this operation
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The HTTP exchange failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with `successful: false`
    #[error("rejected by server: {0}")]
    Rejected(BayeuxError),

    /// The request or response body is not valid Bayeux JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// No reply arrived before the request timeout
    #[error("request timed out")]
    Timeout,

    /// The request was cancelled
    #[error("request was cancelled")]
    Cancelled,
}

impl RequestError {
    /// HTTP status of the failed exchange, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Transport(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RequestError::Cancelled | RequestError::Transport(TransportError::Cancelled)
        )
    }
}

impl From<tokio::time::error::Elapsed> for RequestError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RequestError::Timeout
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for RequestError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        RequestError::Cancelled
    }
}
