//! Outbound fan-out.
//!
//! Every live connection has an unbounded channel drained by its writer
//! task. Delivery never waits, so a slow client cannot stall a handler or a
//! timer. Deliveries are applied one at a time, so every connection sees
//! them in the same order.

use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use horde_shared::net::{ConnectionId, ServerMsg};
use tokio::sync::mpsc;
use tracing::trace;

/// Who receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Only(ConnectionId),
    Everyone,
    EveryoneExcept(ConnectionId),
}

impl Audience {
    pub fn includes(self, connection: ConnectionId) -> bool {
        match self {
            Audience::Only(c) => c == connection,
            Audience::Everyone => true,
            Audience::EveryoneExcept(c) => c != connection,
        }
    }
}

/// A message together with its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub audience: Audience,
    pub msg: ServerMsg,
}

impl Dispatch {
    pub fn only(connection: ConnectionId, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Only(connection),
            msg,
        }
    }

    pub fn everyone(msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Everyone,
            msg,
        }
    }

    pub fn everyone_except(connection: ConnectionId, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::EveryoneExcept(connection),
            msg,
        }
    }
}

#[derive(Default)]
pub struct Hub {
    outboxes: DashMap<ConnectionId, mpsc::UnboundedSender<ServerMsg>>,
    order: Mutex<()>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(connection, tx);
        rx
    }

    pub fn unregister(&self, connection: ConnectionId) {
        self.outboxes.remove(&connection);
    }

    pub fn deliver(&self, dispatch: Dispatch) {
        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        self.fan_out(dispatch);
    }

    /// Builds a message and delivers it to everyone with no other delivery in
    /// between, so a snapshot never lands after an event that outdates it.
    pub fn deliver_fresh(&self, make: impl FnOnce() -> Option<ServerMsg>) {
        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(msg) = make() {
            self.fan_out(Dispatch::everyone(msg));
        }
    }

    fn fan_out(&self, dispatch: Dispatch) {
        if let Audience::Only(connection) = dispatch.audience {
            if let Some(tx) = self.outboxes.get(&connection) {
                if tx.send(dispatch.msg).is_err() {
                    trace!(%connection, "Dropped message for closed outbox");
                }
            }
            return;
        }
        for entry in self.outboxes.iter() {
            if dispatch.audience.includes(*entry.key()) {
                // A closed channel means the writer is gone; its reader will
                // unregister it shortly.
                if entry.value().send(dispatch.msg.clone()).is_err() {
                    trace!(connection = %entry.key(), "Dropped message for closed outbox");
                }
            }
        }
    }

    pub fn deliver_all(&self, dispatches: impl IntoIterator<Item = Dispatch>) {
        for d in dispatches {
            self.deliver(d);
        }
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horde_shared::net::CharacterId;

    fn left(id: &str) -> ServerMsg {
        ServerMsg::PlayerLeft {
            id: CharacterId::from(id),
        }
    }

    #[test]
    fn audiences_route_correctly() {
        let hub = Hub::new();
        let mut a = hub.register(ConnectionId(1));
        let mut b = hub.register(ConnectionId(2));

        hub.deliver(Dispatch::only(ConnectionId(1), left("x")));
        hub.deliver(Dispatch::everyone_except(ConnectionId(1), left("y")));
        hub.deliver(Dispatch::everyone(left("z")));

        assert_eq!(a.try_recv().unwrap(), left("x"));
        assert_eq!(a.try_recv().unwrap(), left("z"));
        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().unwrap(), left("y"));
        assert_eq!(b.try_recv().unwrap(), left("z"));
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn unregistered_connection_gets_nothing() {
        let hub = Hub::new();
        let mut a = hub.register(ConnectionId(1));
        hub.unregister(ConnectionId(1));
        hub.deliver(Dispatch::everyone(left("x")));
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn closed_outbox_is_skipped() {
        let hub = Hub::new();
        drop(hub.register(ConnectionId(1)));
        let mut b = hub.register(ConnectionId(2));
        hub.deliver(Dispatch::only(ConnectionId(1), left("x")));
        hub.deliver(Dispatch::everyone(left("y")));
        assert_eq!(b.try_recv().unwrap(), left("y"));
    }

    #[test]
    fn fresh_message_is_built_at_delivery() {
        let hub = Hub::new();
        let mut a = hub.register(ConnectionId(1));
        hub.deliver_fresh(|| None);
        assert!(a.try_recv().is_err());
        hub.deliver_fresh(|| Some(left("x")));
        assert_eq!(a.try_recv().unwrap(), left("x"));
        assert!(hub.is_empty());
    }
}
