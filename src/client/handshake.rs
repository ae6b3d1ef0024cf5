//! Session establishment through `/meta/handshake`.
//!
//! A handshake announces the protocol versions and connection types the
//! client supports, and the server answers with the client id every later
//! request is bound to. The connect loop also re-handshakes when the
//! server has forgotten the client, restoring its subscriptions after.

use std::sync::{Arc, Mutex};

use crate::client::errors::RequestError;
use crate::client::types::State;
use crate::protocol::{BayeuxError, Request};

use super::connection::ConnectionManager;
use super::inner::{ClientInner, Route};
use super::subscription_handler::SubscriptionHandler;

/// Manages the handshake process.
pub(crate) struct HandshakeManager;

impl HandshakeManager {
    /// Moves the session from `expected` to `Handshaking` and builds the request.
    ///
    /// Returns the request together with the cancellation epoch it belongs to.
    pub(crate) fn begin(
        inner: &mut ClientInner,
        expected: State,
    ) -> Result<(Request, u64), RequestError> {
        let operation = match expected {
            State::Connected => "re-handshake requires a connected session",
            _ => "handshake requires a disconnected session",
        };
        ConnectionManager::check_state(inner, expected, operation)?;

        let mut request = Request::handshake(inner.connection_types)
            .with_versions(&inner.version, &inner.minimum_version);
        if let Some(ref ext) = inner.ext {
            request = request.with_ext(ext.clone());
        }
        inner.handshake_id = Some(request.id());
        inner.set_state(State::Handshaking);
        Ok((request, inner.epoch))
    }

    /// Sends the handshake and applies its outcome to the session.
    ///
    /// On success the client id and negotiated connection type are stored,
    /// the session becomes `Connected` and the connect loop is started if
    /// long-polling is enabled. On failure the session falls back to
    /// `Disconnected`.
    pub(crate) async fn do_handshake(
        client: Arc<Mutex<ClientInner>>,
        request: Request,
        epoch: u64,
    ) -> Result<(), RequestError> {
        let result = ClientInner::exchange(client.clone(), &request, Route::Primary, epoch).await;

        let mut inner = client.lock().unwrap();
        if inner.epoch != epoch
            || inner.state != State::Handshaking
            || inner.handshake_id != Some(request.id())
        {
            // cancelled, disconnected or superseded while in flight
            return Err(RequestError::Cancelled);
        }
        inner.handshake_id = None;

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                inner.move_to_disconnected();
                return Err(err);
            }
        };

        let client_id = match reply.client_id {
            Some(ref client_id) if !client_id.is_empty() => client_id.clone(),
            _ => {
                let err = RequestError::Rejected(BayeuxError::new(0, "handshake reply without clientId"));
                inner.report_failure(&request, &err);
                inner.move_to_disconnected();
                return Err(err);
            }
        };

        let connection_type = inner
            .connection_types
            .negotiate(&reply.supported_connection_types);
        log::debug!(
            "handshake accepted, client id {}, connection type {}",
            client_id,
            connection_type
        );

        // advice the handshake reply leaves out must not linger from an older reply
        inner.advice = reply.advice.clone();
        inner.client_id = Some(client_id);
        inner.connection_type = Some(connection_type);
        inner.subscriptions.clear();
        inner.set_state(State::Connected);
        ConnectionManager::start_loop(&mut inner, &client);
        Ok(())
    }

    /// Replaces a client id the server no longer recognises.
    ///
    /// Called from the connect loop while `Connected`. Subscriptions held
    /// under the old id are requested again under the new one.
    pub(crate) async fn rehandshake(client: &Arc<Mutex<ClientInner>>) -> Result<(), RequestError> {
        let (request, epoch, channels) = {
            let mut inner = client.lock().unwrap();
            let channels: Vec<String> = inner.subscriptions.iter().cloned().collect();
            let (request, epoch) = Self::begin(&mut inner, State::Connected)?;
            (request, epoch, channels)
        };

        log::debug!("re-handshaking, {} subscription(s) to restore", channels.len());
        Self::do_handshake(client.clone(), request, epoch).await?;

        for channel in channels {
            let pending = {
                let inner = client.lock().unwrap();
                SubscriptionHandler::begin(&inner, &channel, true)
            };
            match pending {
                Ok((request, client_id, epoch)) => {
                    // failures are reported through on_data_failed
                    let _ = SubscriptionHandler::do_subscribe(client.clone(), request, client_id, epoch)
                        .await;
                }
                Err(err) => log::debug!("cannot restore subscription to {}: {}", channel, err),
            }
        }
        Ok(())
    }
}
