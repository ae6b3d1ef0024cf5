use crate::client::{RequestError, State};
use crate::protocol::{Message, Request};

#[derive(Debug)]
/// DataReceivedEvent is passed to `Client::on_data_received` for every decoded response body.
pub struct DataReceivedEvent<'a> {
    pub status: u16,
    pub messages: &'a [Message],
}

#[derive(Debug)]
/// DataFailedEvent is passed to `Client::on_data_failed` when a subscribe, unsubscribe,
/// publish or disconnect request fails.
pub struct DataFailedEvent<'a> {
    pub request: &'a Request,
    pub status: Option<u16>,
    pub error: &'a RequestError,
}

#[derive(Debug)]
/// ConnectionFailedEvent is passed to `Client::on_connection_failed` when a handshake or
/// connect request fails.
pub struct ConnectionFailedEvent<'a> {
    pub request: &'a Request,
    pub status: Option<u16>,
    pub error: &'a RequestError,
}

#[derive(Debug)]
/// ReceivedEvent is passed to `Client::on_event_received` for every message published
/// on a non-meta channel.
pub struct ReceivedEvent<'a> {
    pub message: &'a Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// StateChangedEvent is passed to `Client::on_state_changed` on every transition.
pub struct StateChangedEvent {
    pub from: State,
    pub to: State,
}
