//! Internal session state and the request/reply exchange.
//!
//! Every session mutation happens under the single mutex wrapping
//! [`ClientInner`]. The lock is never held across an `.await`: an exchange
//! locks to register its reply slot, releases while the transport works,
//! and locks again to route the response.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::channel::ChannelDispatcher;
use crate::client::errors::RequestError;
use crate::client::types::{PendingReplies, State};
use crate::config::ReconnectStrategy;
use crate::events::{
    ConnectionFailedEvent, DataFailedEvent, DataReceivedEvent, ReceivedEvent, StateChangedEvent,
};
use crate::protocol::{
    Advice, CONNECT, ConnectionType, ConnectionTypes, HANDSHAKE, Message, Request,
};
use crate::transport::Transport;
use crate::utils::{decode_messages, encode_messages};

/// Which transport, and which timeout, an exchange uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Primary,
    LongPoll,
}

pub(crate) struct ClientInner {
    /// Runtime the connect loop and every operation run on
    pub(crate) rt: Handle,
    pub(crate) transport: Arc<dyn Transport>,
    /// Reserved for `/meta/connect`, so a held poll never delays other requests
    pub(crate) long_poll_transport: Option<Arc<dyn Transport>>,
    pub(crate) state: State,
    pub(crate) client_id: Option<String>,
    /// Request id of the handshake in flight; any other handshake reply is stale
    pub(crate) handshake_id: Option<u64>,
    pub(crate) connection_type: Option<ConnectionType>,
    /// Channels the server acknowledged a subscription for
    pub(crate) subscriptions: HashSet<String>,
    pub(crate) pending: PendingReplies,
    pub(crate) timeout: Duration,
    /// Always zero without a long-poll transport
    pub(crate) long_poll_timeout: Duration,
    pub(crate) long_polling: bool,
    /// Most recent advice from a handshake or connect reply
    pub(crate) advice: Option<Advice>,
    /// Bumped by `cancel`; completions of an older epoch are dropped
    pub(crate) epoch: u64,
    /// Dropping it stops the connect loop
    pub(crate) closer_write: Option<mpsc::Sender<()>>,
    pub(crate) version: String,
    pub(crate) minimum_version: String,
    pub(crate) connection_types: ConnectionTypes,
    pub(crate) ext: Option<Value>,
    pub(crate) max_reconnect_attempts: u32,
    pub(crate) reconnect_strategy: Arc<dyn ReconnectStrategy>,
    pub(crate) dispatcher: ChannelDispatcher<Message>,
    pub(crate) on_data_received: Option<Box<dyn FnMut(DataReceivedEvent<'_>) + Send + 'static>>,
    pub(crate) on_data_failed: Option<Box<dyn FnMut(DataFailedEvent<'_>) + Send + 'static>>,
    pub(crate) on_connection_failed:
        Option<Box<dyn FnMut(ConnectionFailedEvent<'_>) + Send + 'static>>,
    pub(crate) on_event_received: Option<Box<dyn FnMut(ReceivedEvent<'_>) + Send + 'static>>,
    pub(crate) on_state_changed: Option<Box<dyn FnMut(StateChangedEvent) + Send + 'static>>,
}

impl ClientInner {
    /// Updates the state and notifies `on_state_changed`.
    pub(crate) fn set_state(&mut self, state: State) {
        if self.state == state {
            return;
        }
        log::debug!("state: {:?} -> {:?}", self.state, state);
        let event = StateChangedEvent {
            from: self.state,
            to: state,
        };
        self.state = state;
        if let Some(ref mut on_state_changed) = self.on_state_changed {
            on_state_changed(event);
        }
    }

    /// Forgets the server-side session and stops the connect loop.
    pub(crate) fn move_to_disconnected(&mut self) {
        self.client_id = None;
        self.handshake_id = None;
        self.connection_type = None;
        self.subscriptions.clear();
        self.closer_write = None;
        self.set_state(State::Disconnected);
    }

    pub(crate) fn transport_for(
        &self,
        route: Route,
    ) -> Result<(Arc<dyn Transport>, Duration), RequestError> {
        match route {
            Route::Primary => Ok((self.transport.clone(), self.timeout)),
            Route::LongPoll => match self.long_poll_transport {
                Some(ref transport) => Ok((transport.clone(), self.long_poll_timeout)),
                None => Err(RequestError::InvalidOperation(
                    "no long-poll transport configured",
                )),
            },
        }
    }

    /// Reports a failed request through the connection or data failure callback.
    pub(crate) fn report_failure(&mut self, request: &Request, error: &RequestError) {
        let status = error.status();
        let channel = request.channel().as_str();
        if channel == HANDSHAKE || channel == CONNECT {
            if let Some(ref mut on_connection_failed) = self.on_connection_failed {
                on_connection_failed(ConnectionFailedEvent {
                    request,
                    status,
                    error,
                });
            }
        } else if let Some(ref mut on_data_failed) = self.on_data_failed {
            on_data_failed(DataFailedEvent {
                request,
                status,
                error,
            });
        }
    }

    /// Hands replies to their requests and events to the subscribers.
    fn route(&mut self, status: u16, messages: Vec<Message>) {
        if let Some(ref mut on_data_received) = self.on_data_received {
            on_data_received(DataReceivedEvent {
                status,
                messages: &messages,
            });
        }

        for message in messages {
            if message.is_meta() && message.advice.is_some() {
                self.advice = message.advice.clone();
            }

            if message.is_reply() {
                if let Err(message) = self.pending.complete(message) {
                    log::debug!("dropping unmatched reply on {}", message.channel);
                }
                continue;
            }

            if let Some(ref mut on_event_received) = self.on_event_received {
                on_event_received(ReceivedEvent { message: &message });
            }
            match self.dispatcher.handle(&message.channel, &message) {
                Ok(true) => {}
                Ok(false) => log::trace!("no handler matched {}", message.channel),
                Err(err) => log::debug!("cannot dispatch event: {}", err),
            }
        }
    }

    /// Sends `request` and waits for its reply.
    ///
    /// `epoch` is the cancellation epoch the caller observed when it started.
    /// An unsuccessful reply becomes [`RequestError::Rejected`]. Failures,
    /// except cancellation, are reported through the failure callbacks.
    pub(crate) async fn exchange(
        client: Arc<Mutex<ClientInner>>,
        request: &Request,
        route: Route,
        epoch: u64,
    ) -> Result<Message, RequestError> {
        let result = Self::do_exchange(&client, request, route, epoch).await;
        match result {
            Err(ref err) if !err.is_cancelled() => {
                let mut inner = client.lock().unwrap();
                if inner.epoch == epoch {
                    inner.report_failure(request, err);
                }
            }
            _ => {}
        }
        result
    }

    async fn do_exchange(
        client: &Arc<Mutex<ClientInner>>,
        request: &Request,
        route: Route,
        epoch: u64,
    ) -> Result<Message, RequestError> {
        let body = encode_messages(std::slice::from_ref(request))?;

        let (transport, timeout, reply) = {
            let mut inner = client.lock().unwrap();
            if inner.epoch != epoch {
                return Err(RequestError::Cancelled);
            }
            let (transport, timeout) = inner.transport_for(route)?;
            (transport, timeout, inner.pending.register(request))
        };
        // Duration::MAX overflows, meaning no deadline at all
        let deadline = Instant::now().checked_add(timeout);

        let result = transport.send(body, timeout).await;

        {
            let mut inner = client.lock().unwrap();
            if inner.epoch != epoch {
                return Err(RequestError::Cancelled);
            }
            let decoded = result
                .map_err(RequestError::from)
                .and_then(|response| Ok((response.status, decode_messages(&response.body)?)));
            match decoded {
                Ok((status, messages)) => inner.route(status, messages),
                Err(err) => {
                    inner.pending.remove(request);
                    return Err(err);
                }
            }
        }

        let reply = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), reply)
                .await
                .map_err(RequestError::from)
                .and_then(|reply| reply.map_err(RequestError::from)),
            None => reply.await.map_err(RequestError::from),
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                let mut inner = client.lock().unwrap();
                inner.pending.remove(request);
                if inner.epoch != epoch {
                    return Err(RequestError::Cancelled);
                }
                return Err(err);
            }
        };

        match reply.bayeux_error() {
            Some(err) if !reply.is_successful() => Err(RequestError::Rejected(err)),
            _ => Ok(reply),
        }
    }
}
