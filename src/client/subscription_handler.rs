//! Subscribe and unsubscribe requests.
//!
//! The subscribed set only changes once the server acknowledges a request,
//! and only if the session still has the client id the request was sent
//! with.

use std::sync::{Arc, Mutex};

use crate::client::errors::RequestError;
use crate::protocol::{Request, RequestKind};

use super::inner::{ClientInner, Route};

pub(crate) struct SubscriptionHandler;

impl SubscriptionHandler {
    /// Builds a subscribe (or unsubscribe) request bound to the current client id.
    ///
    /// Returns the request, the client id and the cancellation epoch.
    pub(crate) fn begin(
        inner: &ClientInner,
        channel: &str,
        subscribe: bool,
    ) -> Result<(Request, String, u64), RequestError> {
        let client_id = match inner.client_id {
            Some(ref client_id) => client_id.clone(),
            None => {
                return Err(RequestError::InvalidOperation(
                    "subscriptions require a handshaken session",
                ));
            }
        };
        let request = if subscribe {
            Request::subscribe(&client_id, channel)?
        } else {
            Request::unsubscribe(&client_id, channel)?
        };
        Ok((request, client_id, inner.epoch))
    }

    pub(crate) async fn do_subscribe(
        client: Arc<Mutex<ClientInner>>,
        request: Request,
        client_id: String,
        epoch: u64,
    ) -> Result<(), RequestError> {
        ClientInner::exchange(client.clone(), &request, Route::Primary, epoch).await?;

        let mut inner = client.lock().unwrap();
        if inner.epoch != epoch || inner.client_id.as_deref() != Some(client_id.as_str()) {
            log::debug!("ignoring stale acknowledgement for {}", request.channel());
            return Ok(());
        }
        match request.kind() {
            RequestKind::Subscribe { subscription } => {
                log::debug!("subscribed to {}", subscription);
                inner.subscriptions.insert(subscription.to_string());
            }
            RequestKind::Unsubscribe { subscription } => {
                log::debug!("unsubscribed from {}", subscription);
                inner.subscriptions.remove(subscription.as_str());
            }
            _ => {}
        }
        Ok(())
    }
}
