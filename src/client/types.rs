//! Client types and state management.
//!
//! This module contains the session state and the bookkeeping that pairs
//! server replies with the requests waiting for them.

use tokio::sync::oneshot;

use crate::protocol::{Message, Request};

/// Represents the current state of a Bayeux session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No client id, nothing in flight
    Disconnected,
    /// A handshake request is in flight
    Handshaking,
    /// The server assigned a client id
    Connected,
    /// A disconnect request is in flight
    Disconnecting,
}

/// A request waiting for its reply.
struct PendingReply {
    channel: String,
    id: String,
    reply: oneshot::Sender<Message>,
}

/// Outstanding requests, oldest first.
///
/// Bayeux pairs replies with requests only loosely: a reply arrives on the
/// request's channel and usually echoes its `id`. A reply with a known id
/// completes that request, otherwise it goes to the most recent outstanding
/// request on the same channel.
#[derive(Default)]
pub(crate) struct PendingReplies {
    items: Vec<PendingReply>,
}

impl PendingReplies {
    pub(crate) fn register(&mut self, request: &Request) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.items.push(PendingReply {
            channel: request.channel().to_string(),
            id: request.id().to_string(),
            reply: tx,
        });
        rx
    }

    /// Hands `message` to its request, or gives it back if nothing is waiting for it.
    pub(crate) fn complete(&mut self, message: Message) -> Result<(), Message> {
        let by_id = message.id.as_ref().and_then(|id| {
            self.items
                .iter()
                .position(|p| p.channel == message.channel && p.id == *id)
        });
        let index = by_id.or_else(|| {
            self.items
                .iter()
                .rposition(|p| p.channel == message.channel)
        });

        match index {
            Some(index) => {
                let pending = self.items.remove(index);
                // receiver may have timed out already
                let _ = pending.reply.send(message);
                Ok(())
            }
            None => Err(message),
        }
    }

    pub(crate) fn remove(&mut self, request: &Request) {
        let id = request.id().to_string();
        self.items.retain(|p| p.id != id);
    }

    /// Drops every waiter, their receivers observe the request as cancelled.
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
