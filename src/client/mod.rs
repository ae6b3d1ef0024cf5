//! Bayeux session over HTTP long-polling.
//!
//! A [`Client`] handshakes with the server, keeps a long-poll
//! `/meta/connect` outstanding on a dedicated transport, and routes every
//! message the server pushes back to the registered channel handlers.
//!
//! # Example
//!
//! ```rust,no_run
//! use tokio_bayeux::client::{Client, State};
//! use tokio_bayeux::config::Config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::from_url("https://example.com/cometd", Config::new())?;
//!
//! client.register(
//!     "/chat/**",
//!     |channel, _segments, message, _state| {
//!         println!("{}: {:?}", channel, message.data);
//!     },
//!     None,
//! )?;
//!
//! client.handshake().await?;
//! assert_eq!(client.state(), State::Connected);
//!
//! client.subscribe("/chat/lobby").await?;
//! client
//!     .publish("/chat/lobby", serde_json::json!({"text": "hello"}))
//!     .await?;
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod connection;
pub mod errors;
mod handshake;
mod inner;
mod subscription_handler;
mod types;

use std::collections::HashSet;
use std::future::Future;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::channel::{ChannelDispatcher, ProcessorState};
use crate::config::Config;
use crate::errors::ChannelError;
use crate::events::{
    ConnectionFailedEvent, DataFailedEvent, DataReceivedEvent, ReceivedEvent, StateChangedEvent,
};
use crate::protocol::{Advice, ConnectionType, Message, Request};
use crate::transport::{ReqwestTransport, Transport};

use connection::ConnectionManager;
use handshake::HandshakeManager;
use inner::{ClientInner, Route};
use subscription_handler::SubscriptionHandler;
use types::PendingReplies;

pub use errors::{FutureResult, RequestError};
pub use types::State;

/// The future returned by every asynchronous session operation.
pub type Pending<T> = FutureResult<BoxFuture<'static, Result<T, RequestError>>>;

fn spawn<T, F>(rt: &Handle, future: F) -> Pending<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, RequestError>> + Send + 'static,
{
    let handle = rt.spawn(future);
    FutureResult(
        async move { handle.await.unwrap_or_else(|_| Err(RequestError::Cancelled)) }.boxed(),
    )
}

fn ready<T: Send + 'static>(result: Result<T, RequestError>) -> Pending<T> {
    FutureResult(futures::future::ready(result).boxed())
}

/// A Bayeux client session.
///
/// Cheap to clone; clones share the session. Callbacks run while the
/// session is locked, so they must not call back into the client.
#[derive(Clone)]
pub struct Client(pub(crate) Arc<Mutex<ClientInner>>);

impl Client {
    /// Creates a session sending every request over `transport`.
    ///
    /// Connects are only ever sent over a dedicated long-poll transport, so
    /// a session built this way never runs the connect loop and its
    /// long-poll timeout stays zero.
    pub fn new(transport: impl Transport, config: Config) -> Self {
        Self::build(Arc::new(transport), None, config)
    }

    /// Creates a session that keeps its long-poll connects on `long_poll`.
    pub fn with_long_poll_transport(
        transport: impl Transport,
        long_poll: impl Transport,
        config: Config,
    ) -> Self {
        Self::build(Arc::new(transport), Some(Arc::new(long_poll)), config)
    }

    /// Creates a long-polling session against `url` using two reqwest transports.
    pub fn from_url(url: &str, config: Config) -> Result<Self, url::ParseError> {
        let url = url::Url::parse(url)?;
        Ok(Self::with_long_poll_transport(
            ReqwestTransport::new(url.clone()),
            ReqwestTransport::new(url),
            config,
        ))
    }

    fn build(
        transport: Arc<dyn Transport>,
        long_poll_transport: Option<Arc<dyn Transport>>,
        config: Config,
    ) -> Self {
        // requires a tokio context unless a runtime is configured
        let rt = config.runtime.unwrap_or_else(Handle::current);
        let long_poll_timeout = if long_poll_transport.is_some() {
            config.long_poll_timeout
        } else {
            Duration::ZERO
        };

        Self(Arc::new(Mutex::new(ClientInner {
            rt,
            transport,
            long_poll_transport,
            state: State::Disconnected,
            client_id: None,
            handshake_id: None,
            connection_type: None,
            subscriptions: HashSet::new(),
            pending: PendingReplies::default(),
            timeout: config.timeout,
            long_poll_timeout,
            long_polling: config.long_polling,
            advice: None,
            epoch: 0,
            closer_write: None,
            version: config.version,
            minimum_version: config.minimum_version,
            connection_types: config.connection_types,
            ext: config.ext,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_strategy: config.reconnect_strategy,
            dispatcher: ChannelDispatcher::new(),
            on_data_received: None,
            on_data_failed: None,
            on_connection_failed: None,
            on_event_received: None,
            on_state_changed: None,
        })))
    }

    /// Establishes the session.
    ///
    /// Fails with [`RequestError::InvalidOperation`] unless the session is
    /// disconnected. On success the connect loop starts when long-polling
    /// is enabled.
    pub fn handshake(&self) -> Pending<()> {
        let mut inner = self.0.lock().unwrap();
        let (request, epoch) = match HandshakeManager::begin(&mut inner, State::Disconnected) {
            Ok(begun) => begun,
            Err(err) => return ready(Err(err)),
        };
        let rt = inner.rt.clone();
        drop(inner);
        spawn(&rt, HandshakeManager::do_handshake(self.0.clone(), request, epoch))
    }

    /// Blocking [`handshake`](Self::handshake). Must not be called from async code.
    pub fn handshake_blocking(&self) -> Result<(), RequestError> {
        self.block_on(self.handshake())
    }

    /// Enables long-polling and starts the connect loop if the session is connected.
    pub fn start_long_polling(&self) -> Result<(), RequestError> {
        let mut inner = self.0.lock().unwrap();
        if inner.long_poll_transport.is_none() {
            return Err(RequestError::InvalidOperation(
                "no long-poll transport configured",
            ));
        }
        inner.long_polling = true;
        ConnectionManager::start_loop(&mut inner, &self.0);
        Ok(())
    }

    /// Disables long-polling; a connect in flight is abandoned.
    pub fn stop_long_polling(&self) {
        let mut inner = self.0.lock().unwrap();
        inner.long_polling = false;
        ConnectionManager::stop_loop(&mut inner);
    }

    /// Subscribes to `channel`, which may be a wildcard pattern.
    ///
    /// Requires a client id. The channel shows up in
    /// [`subscribed`](Self::subscribed) once the server acknowledges it.
    pub fn subscribe(&self, channel: &str) -> Pending<()> {
        self.change_subscription(channel, true)
    }

    pub fn subscribe_blocking(&self, channel: &str) -> Result<(), RequestError> {
        self.block_on(self.subscribe(channel))
    }

    pub fn unsubscribe(&self, channel: &str) -> Pending<()> {
        self.change_subscription(channel, false)
    }

    pub fn unsubscribe_blocking(&self, channel: &str) -> Result<(), RequestError> {
        self.block_on(self.unsubscribe(channel))
    }

    fn change_subscription(&self, channel: &str, subscribe: bool) -> Pending<()> {
        let inner = self.0.lock().unwrap();
        let (request, client_id, epoch) = match SubscriptionHandler::begin(&inner, channel, subscribe)
        {
            Ok(begun) => begun,
            Err(err) => return ready(Err(err)),
        };
        let rt = inner.rt.clone();
        drop(inner);
        spawn(
            &rt,
            SubscriptionHandler::do_subscribe(self.0.clone(), request, client_id, epoch),
        )
    }

    /// Whether the server acknowledged a subscription to `channel`.
    pub fn subscribed(&self, channel: &str) -> bool {
        self.0.lock().unwrap().subscriptions.contains(channel)
    }

    /// Acknowledged subscriptions, in no particular order.
    pub fn subscriptions(&self) -> Vec<String> {
        let inner = self.0.lock().unwrap();
        inner.subscriptions.iter().cloned().collect()
    }

    /// Publishes `data` to `channel`, resolving with the server's acknowledgement.
    ///
    /// Only the channel name is validated locally. The current client id is
    /// attached when the session has one.
    pub fn publish(&self, channel: &str, data: Value) -> Pending<Message> {
        self.publish_request(channel, data, None)
    }

    /// Like [`publish`](Self::publish), attaching `ext` to this one message.
    pub fn publish_with_ext(&self, channel: &str, data: Value, ext: Value) -> Pending<Message> {
        self.publish_request(channel, data, Some(ext))
    }

    pub fn publish_blocking(&self, channel: &str, data: Value) -> Result<Message, RequestError> {
        self.block_on(self.publish(channel, data))
    }

    fn publish_request(&self, channel: &str, data: Value, ext: Option<Value>) -> Pending<Message> {
        let inner = self.0.lock().unwrap();
        let client_id = inner.client_id.clone().unwrap_or_default();
        let mut request = match Request::publish(&client_id, channel, data) {
            Ok(request) => request,
            Err(err) => return ready(Err(err.into())),
        };
        if let Some(ext) = ext {
            request = request.with_ext(ext);
        }
        let epoch = inner.epoch;
        let rt = inner.rt.clone();
        drop(inner);

        let client = self.0.clone();
        spawn(&rt, async move {
            ClientInner::exchange(client, &request, Route::Primary, epoch).await
        })
    }

    /// Ends the session.
    ///
    /// Stops the connect loop and sends `/meta/disconnect` if the session
    /// has a client id. The client id and subscriptions are dropped and the
    /// session ends up `Disconnected` even when the request fails.
    pub fn disconnect(&self) -> Pending<()> {
        let mut inner = self.0.lock().unwrap();
        ConnectionManager::stop_loop(&mut inner);
        if matches!(inner.state, State::Disconnected | State::Disconnecting) {
            return ready(Ok(()));
        }

        let request = inner.client_id.as_deref().map(Request::disconnect);
        let epoch = inner.epoch;
        let rt = inner.rt.clone();
        inner.set_state(State::Disconnecting);
        drop(inner);

        let client = self.0.clone();
        spawn(&rt, async move {
            let result = match request {
                Some(ref request) => {
                    ClientInner::exchange(client.clone(), request, Route::Primary, epoch)
                        .await
                        .map(|_| ())
                }
                None => Ok(()),
            };
            let mut inner = client.lock().unwrap();
            if inner.epoch == epoch && inner.state == State::Disconnecting {
                inner.move_to_disconnected();
            }
            result
        })
    }

    pub fn disconnect_blocking(&self) -> Result<(), RequestError> {
        self.block_on(self.disconnect())
    }

    /// Aborts every outstanding request.
    ///
    /// Operations in flight resolve to [`RequestError::Cancelled`] and none
    /// of their notifications fire once this returns. The connect loop
    /// stops; an established session stays `Connected` and can resume with
    /// [`start_long_polling`](Self::start_long_polling). A handshake or
    /// disconnect that was interrupted leaves the session `Disconnected`.
    ///
    /// Must not be called from inside a callback.
    pub fn cancel(&self) {
        let (transport, long_poll_transport) = {
            let mut inner = self.0.lock().unwrap();
            inner.epoch += 1;
            let pending = inner.pending.len();
            inner.pending.clear();
            ConnectionManager::stop_loop(&mut inner);
            if matches!(inner.state, State::Handshaking | State::Disconnecting) {
                inner.move_to_disconnected();
            }
            log::debug!("cancelled {} pending request(s), epoch {}", pending, inner.epoch);
            (inner.transport.clone(), inner.long_poll_transport.clone())
        };

        transport.cancel();
        if let Some(long_poll_transport) = long_poll_transport {
            long_poll_transport.cancel();
        }
    }

    /// Registers `handler` for events on channels matching `pattern`.
    ///
    /// Patterns are tried in registration order and the first match wins.
    /// An empty pattern sets the default handler.
    pub fn register(
        &self,
        pattern: &str,
        handler: impl FnMut(&str, &[&str], &Message, Option<&ProcessorState>) + Send + 'static,
        state: Option<ProcessorState>,
    ) -> Result<(), ChannelError> {
        let mut inner = self.0.lock().unwrap();
        inner.dispatcher.register(pattern, Box::new(handler), state)
    }

    /// Sets the handler for events no registered pattern matches.
    pub fn register_default(
        &self,
        handler: impl FnMut(&str, &[&str], &Message, Option<&ProcessorState>) + Send + 'static,
        state: Option<ProcessorState>,
    ) {
        let mut inner = self.0.lock().unwrap();
        inner.dispatcher.register_default(Box::new(handler), state);
    }

    /// Called with every decoded response body.
    pub fn on_data_received(&self, func: impl FnMut(DataReceivedEvent<'_>) + Send + 'static) {
        self.0.lock().unwrap().on_data_received = Some(Box::new(func));
    }

    /// Called when a subscribe, unsubscribe, publish or disconnect fails.
    pub fn on_data_failed(&self, func: impl FnMut(DataFailedEvent<'_>) + Send + 'static) {
        self.0.lock().unwrap().on_data_failed = Some(Box::new(func));
    }

    /// Called when a handshake or connect fails.
    ///
    /// Fires once per failed connect. When the connect loop runs out of
    /// reconnect attempts the session moves to `Disconnected`, which only
    /// [`on_state_changed`](Self::on_state_changed) reports.
    pub fn on_connection_failed(
        &self,
        func: impl FnMut(ConnectionFailedEvent<'_>) + Send + 'static,
    ) {
        self.0.lock().unwrap().on_connection_failed = Some(Box::new(func));
    }

    /// Called with every message published on a non-meta channel.
    pub fn on_event_received(&self, func: impl FnMut(ReceivedEvent<'_>) + Send + 'static) {
        self.0.lock().unwrap().on_event_received = Some(Box::new(func));
    }

    pub fn on_state_changed(&self, func: impl FnMut(StateChangedEvent) + Send + 'static) {
        self.0.lock().unwrap().on_state_changed = Some(Box::new(func));
    }

    pub fn state(&self) -> State {
        self.0.lock().unwrap().state
    }

    pub fn client_id(&self) -> Option<String> {
        self.0.lock().unwrap().client_id.clone()
    }

    /// Connection type negotiated by the last handshake.
    pub fn connection_type(&self) -> Option<ConnectionType> {
        self.0.lock().unwrap().connection_type
    }

    /// Latest advice received with a handshake or connect reply.
    pub fn advice(&self) -> Option<Advice> {
        self.0.lock().unwrap().advice.clone()
    }

    /// Whether long-polling is enabled. Always false without a long-poll transport.
    pub fn is_long_polling(&self) -> bool {
        let inner = self.0.lock().unwrap();
        inner.long_poll_transport.is_some() && inner.long_polling
    }

    pub fn timeout(&self) -> Duration {
        self.0.lock().unwrap().timeout
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.0.lock().unwrap().timeout = timeout;
    }

    pub fn long_poll_timeout(&self) -> Duration {
        self.0.lock().unwrap().long_poll_timeout
    }

    /// Ignored without a long-poll transport.
    pub fn set_long_poll_timeout(&self, timeout: Duration) {
        let mut inner = self.0.lock().unwrap();
        if inner.long_poll_transport.is_some() {
            inner.long_poll_timeout = timeout;
        }
    }

    /// Waits for `pending` on the current thread, at most for the request timeout.
    fn block_on<T: Send + 'static>(&self, pending: Pending<T>) -> Result<T, RequestError> {
        let (rt, timeout) = {
            let inner = self.0.lock().unwrap();
            (inner.rt.clone(), inner.timeout)
        };

        let (tx, rx) = std::sync::mpsc::channel();
        rt.spawn(async move {
            let _ = tx.send(pending.await);
        });
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(RequestError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(RequestError::Cancelled),
        }
    }
}
