use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{AbortHandle, Abortable, BoxFuture};
use reqwest::header::CONTENT_TYPE;
use slotmap::{SlotMap, new_key_type};
use url::Url;

use super::{HttpResponse, Transport, TransportError};

new_key_type! { struct ExchangeId; }

type InFlight = Arc<Mutex<SlotMap<ExchangeId, AbortHandle>>>;

/// A [`reqwest`]-backed [`Transport`] posting to a single Bayeux endpoint.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    url: Url,
    in_flight: InFlight,
}

impl ReqwestTransport {
    pub fn new(url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Uses a preconfigured client, e.g. with cookies or custom TLS roots.
    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            in_flight: Arc::default(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Unregisters an exchange once its future completes or is dropped.
struct Registration {
    in_flight: InFlight,
    id: ExchangeId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(self.id);
    }
}

async fn post(request: reqwest::RequestBuilder) -> Result<HttpResponse, TransportError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        log::debug!("http exchange failed with status {}", status);
        return Err(TransportError::Status(status.as_u16()));
    }
    Ok(HttpResponse {
        status: status.as_u16(),
        body: body.to_vec(),
    })
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        body: String,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        if timeout == Duration::ZERO {
            return futures::future::ready(Err(TransportError::Timeout)).boxed();
        }

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json;charset=UTF-8")
            .body(body);
        if timeout != Duration::MAX {
            request = request.timeout(timeout);
        }

        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let registration = Registration {
            in_flight: self.in_flight.clone(),
            id: self.in_flight.lock().unwrap().insert(abort_handle),
        };

        async move {
            let _registration = registration;
            match Abortable::new(post(request), abort_registration).await {
                Ok(result) => result,
                Err(_aborted) => Err(TransportError::Cancelled),
            }
        }
        .boxed()
    }

    fn cancel(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.is_empty() {
            log::debug!("cancelling {} http exchange(s)", in_flight.len());
        }
        for (_, handle) in in_flight.drain() {
            handle.abort();
        }
    }
}
