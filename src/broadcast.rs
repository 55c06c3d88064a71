//! The tally broadcast channel.
//!
//! A process-wide fan-out of `voteUpdate` events to every connected viewer.
//! There is no persistence, no replay and no per-topic routing: a subscriber
//! that connects after an event was published never sees it, and must fetch
//! current tallies via the pull endpoint instead. Delivery to each subscriber
//! is FIFO in publish order.

use rocket::tokio::sync::broadcast::{self, error::SendError, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{serde_string_id, Id};

/// Per-subscriber buffer size. A subscriber that lags this far behind the
/// publisher misses events and must re-query current tallies.
const CHANNEL_CAPACITY: usize = 1024;

/// A single tally delta, emitted after every committed vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdate {
    #[serde(with = "serde_string_id")]
    pub election_id: Id,
    #[serde(with = "serde_string_id")]
    pub candidate_id: Id,
    pub new_count: u64,
}

/// Handle on the broadcast channel, kept in managed state.
pub struct UpdateChannel {
    sender: Sender<VoteUpdate>,
}

impl UpdateChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Attach a new subscriber. Only events published after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> Receiver<VoteUpdate> {
        self.sender.subscribe()
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish a tally update to all current subscribers.
    ///
    /// Best-effort by contract: the vote this update describes has already
    /// been committed, so a delivery failure is logged and swallowed rather
    /// than surfaced to the voter.
    pub fn publish(&self, update: VoteUpdate) {
        match self.sender.send(update) {
            Ok(subscribers) => trace!("voteUpdate delivered to {subscribers} subscribers"),
            Err(SendError(update)) => {
                debug!(
                    "voteUpdate for election {} dropped: no subscribers connected",
                    update.election_id
                );
            }
        }
    }
}

impl Default for UpdateChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(count: u64) -> VoteUpdate {
        VoteUpdate {
            election_id: Id::new(),
            candidate_id: Id::new(),
            new_count: count,
        }
    }

    #[rocket::async_test]
    async fn events_are_delivered_in_publish_order() {
        let channel = UpdateChannel::new();
        let mut subscriber = channel.subscribe();

        let first = update(1);
        let second = update(2);
        let third = update(3);
        channel.publish(first.clone());
        channel.publish(second.clone());
        channel.publish(third.clone());

        assert_eq!(subscriber.recv().await.unwrap(), first);
        assert_eq!(subscriber.recv().await.unwrap(), second);
        assert_eq!(subscriber.recv().await.unwrap(), third);
    }

    #[rocket::async_test]
    async fn late_subscriber_sees_nothing_retroactively() {
        let channel = UpdateChannel::new();

        // No subscribers yet: the publish is dropped, not an error.
        channel.publish(update(1));

        let mut late = channel.subscribe();
        let after = update(2);
        channel.publish(after.clone());

        // The late subscriber only sees the event published after it joined.
        assert_eq!(late.recv().await.unwrap(), after);
        assert!(late.try_recv().is_err());
    }

    #[rocket::async_test]
    async fn independent_subscribers_each_get_every_event() {
        let channel = UpdateChannel::new();
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 2);

        let event = update(7);
        channel.publish(event.clone());

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn update_serialises_with_camel_case_keys() {
        let event = update(5);
        let json = rocket::serde::json::serde_json::to_value(&event).unwrap();
        assert!(json.get("electionId").is_some());
        assert!(json.get("candidateId").is_some());
        assert_eq!(json.get("newCount").unwrap(), 5);
    }
}
