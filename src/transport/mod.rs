//! The HTTP exchange the session is driven over.
//!
//! A [`Transport`] performs one POST of a JSON body per call and reports the
//! raw response. The session owns one transport for ordinary requests and,
//! optionally, a second one reserved for long-poll connects, so a held
//! `/meta/connect` never blocks publishes.

mod http;

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

pub use http::ReqwestTransport;

/// Raw HTTP response of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("server responded with http status {0}")]
    Status(u16),
    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status(status) => Some(*status),
            TransportError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(err)
        }
    }
}

/// One asynchronous HTTP exchange per [`send`](Transport::send).
///
/// A `timeout` of `Duration::ZERO` fails immediately and `Duration::MAX`
/// disables the timeout. After [`cancel`](Transport::cancel) returns, every
/// exchange that was in flight resolves to [`TransportError::Cancelled`].
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        body: String,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<HttpResponse, TransportError>>;

    fn cancel(&self);
}
