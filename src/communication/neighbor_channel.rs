//! Single-slot advisory links between adjacent intersections.
//!
//! Each direction of a link is a `watch` cell holding at most one advisory.
//! A send overwrites whatever the peer has not read yet, so a slow reader
//! never builds a backlog, and neither side ever waits on the other.

use crate::communication::messages::Advisory;
use crate::simulation_engine::topology::NodeId;
use tokio::sync::watch;

/// Result of a non-blocking read.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelRead {
    /// A new advisory arrived since the last read.
    Fresh(Advisory),
    /// Nothing new; keep using the last-known value.
    Empty,
    /// The peer's endpoint is gone.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Unreachable,
}

/// One agent's end of a link to `peer`.
#[derive(Debug)]
pub struct NeighborEndpoint {
    peer: NodeId,
    outbox: watch::Sender<Option<Advisory>>,
    inbox: watch::Receiver<Option<Advisory>>,
}

/// Creates the link between `a` and `b`; the first endpoint belongs to `a`.
pub fn link(a: &NodeId, b: &NodeId) -> (NeighborEndpoint, NeighborEndpoint) {
    let (a_to_b, b_inbox) = watch::channel(None);
    let (b_to_a, a_inbox) = watch::channel(None);
    (
        NeighborEndpoint {
            peer: b.clone(),
            outbox: a_to_b,
            inbox: a_inbox,
        },
        NeighborEndpoint {
            peer: a.clone(),
            outbox: b_to_a,
            inbox: b_inbox,
        },
    )
}

impl NeighborEndpoint {
    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    pub fn is_peer_alive(&self) -> bool {
        !self.outbox.is_closed()
    }

    /// Replaces the pending advisory for the peer.
    pub fn send(&self, advisory: Advisory) -> Delivery {
        if self.outbox.is_closed() {
            return Delivery::Unreachable;
        }
        self.outbox.send_replace(Some(advisory));
        Delivery::Delivered
    }

    /// Takes the unread advisory if there is one. An advisory sent just
    /// before the peer went away is still delivered; `Stale` follows on
    /// the next read.
    pub fn try_recv(&mut self) -> ChannelRead {
        let closed = self.inbox.has_changed().is_err();
        let current = self.inbox.borrow_and_update();
        if current.has_changed() {
            if let Some(advisory) = &*current {
                return ChannelRead::Fresh(advisory.clone());
            }
        }
        if closed {
            ChannelRead::Stale
        } else {
            ChannelRead::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn advisory(from: &str, cycle: u64) -> Advisory {
        Advisory {
            from: NodeId::from(from),
            cycle,
            pressure: cycle as u32,
            handover: 0,
            admitted: 0,
            congestion: 0.0,
            requested_phase: None,
        }
    }

    #[test]
    fn empty_until_first_send() {
        let (mut a, b) = link(&"A".into(), &"B".into());
        assert_eq!(a.try_recv(), ChannelRead::Empty);
        assert_eq!(a.peer(), &NodeId::from("B"));
        assert_eq!(b.peer(), &NodeId::from("A"));
    }

    #[test]
    fn newest_advisory_overwrites_unread_one() {
        let (a, mut b) = link(&"A".into(), &"B".into());
        assert_eq!(a.send(advisory("A", 1)), Delivery::Delivered);
        assert_eq!(a.send(advisory("A", 2)), Delivery::Delivered);
        assert_eq!(b.try_recv(), ChannelRead::Fresh(advisory("A", 2)));
        assert_eq!(b.try_recv(), ChannelRead::Empty);
    }

    #[test]
    fn directions_are_independent() {
        let (mut a, mut b) = link(&"A".into(), &"B".into());
        b.send(advisory("B", 5));
        assert_eq!(b.try_recv(), ChannelRead::Empty);
        assert_eq!(a.try_recv(), ChannelRead::Fresh(advisory("B", 5)));
    }

    #[test]
    fn dropped_peer_reads_stale() {
        let (mut a, b) = link(&"A".into(), &"B".into());
        drop(b);
        assert_eq!(a.try_recv(), ChannelRead::Stale);
        assert_eq!(a.send(advisory("A", 1)), Delivery::Unreachable);
        assert!(!a.is_peer_alive());
    }

    #[test]
    fn last_advisory_before_drop_is_not_lost() {
        let (mut a, b) = link(&"A".into(), &"B".into());
        b.send(advisory("B", 3));
        drop(b);
        assert_eq!(a.try_recv(), ChannelRead::Fresh(advisory("B", 3)));
        assert_eq!(a.try_recv(), ChannelRead::Stale);
    }

    #[test]
    fn concurrent_writer_never_goes_backwards() {
        let (a, mut b) = link(&"A".into(), &"B".into());
        let writer = thread::spawn(move || {
            for cycle in 1..=2000 {
                a.send(advisory("A", cycle));
            }
            a
        });

        let mut last = 0;
        while !writer.is_finished() {
            if let ChannelRead::Fresh(adv) = b.try_recv() {
                assert!(adv.cycle > last);
                last = adv.cycle;
            }
        }
        let _a = writer.join().unwrap();
        if let ChannelRead::Fresh(adv) = b.try_recv() {
            last = adv.cycle;
        }
        assert_eq!(last, 2000);
    }
}
