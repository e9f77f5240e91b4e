//! Cross-instance invalidation fan-out (module G).
//!
//! A [`Backplane`] turns a local invalidation (one process evicted a key or tag) into a
//! published event other instances can subscribe to, so a multi-instance deployment's L1
//! tiers stay coherent without all of them sharing an L2. Grounded on `spineldb-spineldb`'s
//! `PubSubManager`: a channel-per-topic broadcast hub, here with two fixed topics (key and
//! tag invalidation) instead of arbitrary channel names.

use cachekit_backend::hybrid::InvalidationPublisher;
use cachekit_core::CacheKey;
use smol_str::SmolStr;
use tokio::sync::broadcast;
use tracing::trace;

/// An invalidation event fanned out by a [`Backplane`].
#[derive(Debug, Clone)]
pub enum InvalidationEvent {
    /// A single key was invalidated.
    Key(CacheKey),
    /// Every key under a tag was invalidated.
    Tag(SmolStr),
}

/// Publishes and distributes invalidation events across instances.
///
/// This in-process implementation only fans out within the current instance (useful for
/// tests and single-instance deployments); a networked backplane would publish to the
/// same channel shape over Redis pub/sub, NATS, or similar, which is why `subscribe`
/// returns an owned receiver rather than exposing the sender.
#[derive(Debug)]
pub struct Backplane {
    sender: broadcast::Sender<InvalidationEvent>,
}

impl Backplane {
    /// Builds a backplane with a bounded event buffer; slow subscribers drop the oldest
    /// unread events rather than applying backpressure to publishers.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to invalidation events published from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.sender.subscribe()
    }
}

impl Default for Backplane {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InvalidationPublisher for Backplane {
    fn publish_key_invalidation(&self, key: &CacheKey) {
        trace!(?key, "publishing key invalidation");
        let _ = self.sender.send(InvalidationEvent::Key(key.clone()));
    }

    fn publish_tag_invalidation(&self, tag: &str) {
        trace!(tag, "publishing tag invalidation");
        let _ = self
            .sender
            .send(InvalidationEvent::Tag(SmolStr::new(tag)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_published_tag_invalidation() {
        let backplane = Backplane::new(16);
        let mut receiver = backplane.subscribe();

        backplane.publish_tag_invalidation("orders");

        match receiver.recv().await.unwrap() {
            InvalidationEvent::Tag(tag) => assert_eq!(tag, "orders"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
