//! The long-poll connect loop and its reconnection policy.
//!
//! While the session is connected and long-polling is enabled, one task
//! keeps exactly one `/meta/connect` in flight on the long-poll transport.
//! Server advice decides what happens after each poll:
//!
//! - `retry` (or no advice): poll again after the advised interval
//! - `handshake`: obtain a fresh client id, then keep polling
//! - `none`, or anything unrecognised: drop the session
//!
//! Consecutive failures count against `max_reconnect_attempts` and are
//! spaced by the configured [`ReconnectStrategy`](crate::config::ReconnectStrategy).
//! Each failed connect is reported through `on_connection_failed`; giving
//! up once the budget is spent is not a separate report, it shows as the
//! `Connected -> Disconnected` transition on `on_state_changed`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::errors::RequestError;
use crate::client::types::State;
use crate::protocol::{ConnectionType, Reconnect, Request};

use super::handshake::HandshakeManager;
use super::inner::{ClientInner, Route};

/// What the loop does after a poll completes.
enum Next {
    Poll(Duration),
    Handshake(Duration),
    Stop,
}

/// Drives the long-poll connect loop.
pub(crate) struct ConnectionManager;

impl ConnectionManager {
    /// Spawns the connect loop unless it is already running or cannot run.
    pub(crate) fn start_loop(inner: &mut ClientInner, client: &Arc<Mutex<ClientInner>>) {
        if inner.closer_write.is_some()
            || inner.long_poll_transport.is_none()
            || !inner.long_polling
            || inner.state != State::Connected
        {
            return;
        }

        let (closer_write, closer_read) = mpsc::channel::<()>(1);
        let closer = closer_write.downgrade();
        inner.closer_write = Some(closer_write);

        log::debug!("starting connect loop");
        let client = client.clone();
        inner.rt.spawn(async move {
            Self::do_connect_loop(&client, closer_read).await;
            log::debug!("connect loop stopped");

            // only clear the closer if a newer loop hasn't replaced it
            let mut inner = client.lock().unwrap();
            let Some(closer) = closer.upgrade() else {
                return;
            };
            if inner
                .closer_write
                .as_ref()
                .is_some_and(|current| current.same_channel(&closer))
            {
                inner.closer_write = None;
            }
        });
    }

    /// Stops the connect loop; a poll in flight is abandoned.
    pub(crate) fn stop_loop(inner: &mut ClientInner) {
        inner.closer_write = None;
    }

    async fn do_connect_loop(client: &Arc<Mutex<ClientInner>>, mut closer_read: mpsc::Receiver<()>) {
        let mut failures: u32 = 0;

        loop {
            let (request, epoch) = match Self::next_request(client) {
                Some(next) => next,
                None => return,
            };

            let result = tokio::select! {
                biased;
                _ = closer_read.recv() => {
                    client.lock().unwrap().pending.remove(&request);
                    return;
                }
                result = ClientInner::exchange(client.clone(), &request, Route::LongPoll, epoch) => result,
            };

            let next = {
                let mut inner = client.lock().unwrap();
                if inner.epoch != epoch || inner.state != State::Connected {
                    return;
                }
                let failed = match result {
                    Ok(_) => false,
                    Err(ref err) if err.is_cancelled() => return,
                    Err(ref err) => {
                        failures += 1;
                        log::debug!(
                            "connect failed ({}/{}): {}",
                            failures,
                            inner.max_reconnect_attempts,
                            err
                        );
                        true
                    }
                };
                Self::decide(&mut inner, &mut failures, failed)
            };

            let delay = match next {
                Next::Poll(delay) | Next::Handshake(delay) => delay,
                Next::Stop => return,
            };
            if !delay.is_zero() {
                log::debug!("next connect in {:?}", delay);
                tokio::select! {
                    biased;
                    _ = closer_read.recv() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if let Next::Handshake(_) = next {
                match HandshakeManager::rehandshake(client).await {
                    Ok(()) => {}
                    Err(err) => {
                        log::debug!("re-handshake failed: {}", err);
                        return;
                    }
                }
            }
        }
    }

    /// Builds the next connect, or `None` once the loop should end.
    fn next_request(client: &Arc<Mutex<ClientInner>>) -> Option<(Request, u64)> {
        let inner = client.lock().unwrap();
        if inner.state != State::Connected || !inner.long_polling {
            return None;
        }
        let client_id = inner.client_id.as_deref()?;
        let connection_type = inner.connection_type.unwrap_or(ConnectionType::LongPolling);
        let request = Request::connect(client_id, connection_type).ok()?;
        Some((request, inner.epoch))
    }

    /// Applies the latest advice and the retry budget.
    ///
    /// `failed` connects were already counted by the caller. A handshake
    /// advice on an otherwise successful connect still counts as a failed
    /// attempt, and only a plain successful connect resets the count, so a
    /// server that keeps forgetting the client eventually exhausts the
    /// budget. Handshake advice is consumed here and never acted on twice.
    fn decide(inner: &mut ClientInner, failures: &mut u32, failed: bool) -> Next {
        let advice = inner.advice.clone().unwrap_or_default();
        let interval = advice.interval().unwrap_or_default();

        let reconnect = advice.reconnect();
        match (failed, reconnect == Reconnect::Handshake) {
            (false, true) => *failures += 1,
            (false, false) => *failures = 0,
            (true, _) => {}
        }
        if reconnect == Reconnect::Handshake {
            if let Some(ref mut advice) = inner.advice {
                advice.reconnect = None;
            }
        }
        if *failures > inner.max_reconnect_attempts {
            log::debug!("giving up after {} failed attempts", failures);
            inner.move_to_disconnected();
            return Next::Stop;
        }

        let delay = if *failures > 0 {
            inner
                .reconnect_strategy
                .time_before_next_attempt(*failures)
                .max(interval)
        } else {
            interval
        };

        match reconnect {
            Reconnect::Retry => Next::Poll(delay),
            Reconnect::Handshake => Next::Handshake(delay),
            Reconnect::None => {
                log::debug!("server advised not to reconnect");
                inner.move_to_disconnected();
                Next::Stop
            }
            Reconnect::Other(value) => {
                log::debug!("unknown reconnect advice {:?}, disconnecting", value);
                inner.move_to_disconnected();
                Next::Stop
            }
        }
    }

    /// Verifies that the session is in the expected state.
    pub(crate) fn check_state(
        inner: &ClientInner,
        expected: State,
        operation: &'static str,
    ) -> Result<(), RequestError> {
        if inner.state != expected {
            return Err(RequestError::InvalidOperation(operation));
        }
        Ok(())
    }
}
