#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio_bayeux::config::{BackoffReconnect, Config};
use tokio_bayeux::transport::{HttpResponse, Transport, TransportError};

pub const CLIENT_ID: &str = "client-1";

/// How the scripted server answers one request.
pub enum Reply {
    Body(Value),
    Status(u16),
    /// Answered after a delay, unless cancelled first
    Delayed(Duration, Value),
    /// Held until the transport is cancelled or the request times out
    Hang,
}

type Responder = dyn Fn(&Value) -> Reply + Send + Sync;

/// A transport answering from a script and recording every message it was sent.
#[derive(Clone)]
pub struct ScriptedTransport {
    responder: Arc<Responder>,
    sent: Arc<Mutex<Vec<Value>>>,
    timeouts: Arc<Mutex<Vec<(String, Duration)>>>,
    cancelled: Arc<watch::Sender<u64>>,
}

impl ScriptedTransport {
    pub fn new(responder: impl Fn(&Value) -> Reply + Send + Sync + 'static) -> Self {
        let (cancelled, _) = watch::channel(0);
        Self {
            responder: Arc::new(responder),
            sent: Arc::default(),
            timeouts: Arc::default(),
            cancelled: Arc::new(cancelled),
        }
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_on(&self, channel: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["channel"] == channel)
            .collect()
    }

    /// Timeouts passed along with every message sent on `channel`.
    pub fn timeouts_on(&self, channel: &str) -> Vec<Duration> {
        self.timeouts
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        body: String,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        if timeout.is_zero() {
            return futures::future::ready(Err(TransportError::Timeout)).boxed();
        }

        let messages: Value = serde_json::from_str(&body).unwrap();
        let message = messages[0].clone();
        let channel = message["channel"].as_str().unwrap_or_default().to_string();
        self.timeouts.lock().unwrap().push((channel, timeout));
        self.sent.lock().unwrap().push(message.clone());
        let reply = (self.responder)(&message);
        let mut cancelled = self.cancelled.subscribe();

        async move {
            match reply {
                Reply::Body(body) => Ok(HttpResponse {
                    status: 200,
                    body: serde_json::to_vec(&body).unwrap(),
                }),
                Reply::Status(status) => Err(TransportError::Status(status)),
                Reply::Delayed(delay, body) => {
                    tokio::select! {
                        _ = cancelled.changed() => Err(TransportError::Cancelled),
                        _ = tokio::time::sleep(delay) => Ok(HttpResponse {
                            status: 200,
                            body: serde_json::to_vec(&body).unwrap(),
                        }),
                    }
                }
                Reply::Hang => {
                    tokio::select! {
                        _ = cancelled.changed() => Err(TransportError::Cancelled),
                        _ = tokio::time::sleep(timeout) => Err(TransportError::Timeout),
                    }
                }
            }
        }
        .boxed()
    }

    fn cancel(&self) {
        self.cancelled.send_modify(|generation| *generation += 1);
    }
}

/// A successful reply to `request`, echoing its channel and id.
pub fn ack(request: &Value, extra: Value) -> Value {
    let mut reply = json!({
        "channel": request["channel"],
        "id": request["id"],
        "successful": true,
    });
    if let (Some(reply), Value::Object(extra)) = (reply.as_object_mut(), extra) {
        reply.extend(extra);
    }
    reply
}

/// An unsuccessful reply to `request` carrying a Bayeux error string.
pub fn nack(request: &Value, error: &str, extra: Value) -> Value {
    let mut reply = ack(request, extra);
    reply["successful"] = json!(false);
    reply["error"] = json!(error);
    reply
}

pub fn handshake_ack(request: &Value, client_id: &str) -> Value {
    ack(
        request,
        json!({
            "clientId": client_id,
            "version": "1.0",
            "supportedConnectionTypes": ["long-polling", "callback-polling"],
            "advice": {"reconnect": "retry", "interval": 0, "timeout": 30000},
        }),
    )
}

/// A well-behaved server: every request succeeds, connects are held open.
pub fn server(request: &Value) -> Reply {
    match request["channel"].as_str() {
        Some("/meta/handshake") => Reply::Body(json!([handshake_ack(request, CLIENT_ID)])),
        Some("/meta/connect") => Reply::Hang,
        Some("/meta/subscribe") | Some("/meta/unsubscribe") => Reply::Body(json!([ack(
            request,
            json!({"subscription": request["subscription"]})
        )])),
        _ => Reply::Body(json!([ack(request, json!({}))])),
    }
}

/// Short timeouts and near-instant backoff.
pub fn config() -> Config {
    Config::new()
        .with_timeout(Duration::from_secs(2))
        .with_long_poll_timeout(Duration::from_secs(5))
        .with_reconnect_strategy(BackoffReconnect {
            factor: 1.0,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polls `condition` for up to two seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
