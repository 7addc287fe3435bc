//! Camera frame relay.
//!
//! Topic-based fan-out for `/camera-stream`: every text frame a peer
//! publishes is delivered, in publish order, to every other subscribed peer
//! of the same topic. Subscribers that fall more than [`RELAY_BUFFER`]
//! frames behind skip the missed frames. A topic disappears with its last
//! peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Frames buffered per topic before slow subscribers start skipping.
pub const RELAY_BUFFER: usize = 64;

/// What a peer does on its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayRole {
    Publisher,
    Subscriber,
    #[default]
    Both,
}

impl RelayRole {
    pub fn publishes(self) -> bool {
        matches!(self, RelayRole::Publisher | RelayRole::Both)
    }

    pub fn subscribes(self) -> bool {
        matches!(self, RelayRole::Subscriber | RelayRole::Both)
    }
}

#[derive(Debug, Clone)]
struct RelayFrame {
    sender: u64,
    payload: Arc<str>,
}

struct Topic {
    tx: broadcast::Sender<RelayFrame>,
    peers: usize,
}

#[derive(Default)]
struct RelayInner {
    topics: Mutex<HashMap<String, Topic>>,
    next_peer: AtomicU64,
}

impl RelayInner {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared relay handle.
#[derive(Clone, Default)]
pub struct FrameRelay {
    inner: Arc<RelayInner>,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a topic, creating it if needed.
    pub fn join(&self, topic: &str) -> RelayPeer {
        let id = self.inner.next_peer.fetch_add(1, Ordering::Relaxed);
        let mut topics = self.inner.topics();
        let entry = topics.entry(topic.to_string()).or_insert_with(|| Topic {
            tx: broadcast::channel(RELAY_BUFFER).0,
            peers: 0,
        });
        entry.peers += 1;
        debug!(topic, peer = id, peers = entry.peers, "Relay peer joined");

        RelayPeer {
            id,
            topic: topic.to_string(),
            tx: entry.tx.clone(),
            relay: Arc::clone(&self.inner),
        }
    }

    /// Number of peers on a topic (0 when the topic does not exist).
    pub fn peer_count(&self, topic: &str) -> usize {
        self.inner.topics().get(topic).map(|t| t.peers).unwrap_or(0)
    }

    /// Active topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Membership of one connection in a topic. Leaves the topic on drop.
pub struct RelayPeer {
    id: u64,
    topic: String,
    tx: broadcast::Sender<RelayFrame>,
    relay: Arc<RelayInner>,
}

impl RelayPeer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a frame to the other peers. Returns the number of receivers
    /// the frame was queued for (including this peer's own subscription).
    pub fn publish(&self, payload: impl Into<Arc<str>>) -> usize {
        let frame = RelayFrame {
            sender: self.id,
            payload: payload.into(),
        };
        // No receivers is not an error for a relay.
        self.tx.send(frame).unwrap_or(0)
    }

    pub fn subscribe(&self) -> RelaySubscription {
        RelaySubscription {
            peer: self.id,
            topic: self.topic.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Drop for RelayPeer {
    fn drop(&mut self) {
        let mut topics = self.relay.topics();
        if let Some(topic) = topics.get_mut(&self.topic) {
            topic.peers = topic.peers.saturating_sub(1);
            if topic.peers == 0 {
                topics.remove(&self.topic);
                debug!(topic = %self.topic, "Relay topic closed");
            }
        }
    }
}

/// Frames published by other peers of a topic.
pub struct RelaySubscription {
    peer: u64,
    topic: String,
    rx: broadcast::Receiver<RelayFrame>,
}

impl RelaySubscription {
    /// Next frame from another peer; `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.sender == self.peer => continue,
                Ok(frame) => return Some(frame.payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, peer = self.peer, skipped, "Relay subscriber lagging, frames skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const QUIET: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_frames_reach_other_peers_only() {
        let relay = FrameRelay::new();
        let a = relay.join("cam");
        let b = relay.join("cam");
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.publish("frame-1");
        a.publish("frame-2");

        assert_eq!(b_rx.recv().await.as_deref(), Some("frame-1"));
        assert_eq!(b_rx.recv().await.as_deref(), Some("frame-2"));
        assert!(timeout(QUIET, a_rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let relay = FrameRelay::new();
        let kitchen = relay.join("kitchen");
        let hall = relay.join("hall");
        let mut hall_rx = hall.subscribe();

        kitchen.publish("frame");
        assert!(timeout(QUIET, hall_rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_frames() {
        let relay = FrameRelay::new();
        let publisher = relay.join("cam");
        let subscriber = relay.join("cam");
        let mut rx = subscriber.subscribe();

        let total = RELAY_BUFFER + 6;
        for i in 0..total {
            publisher.publish(format!("frame-{}", i));
        }

        // Oldest frames are gone; delivery resumes in order after the gap.
        assert_eq!(rx.recv().await.as_deref(), Some("frame-6"));
        assert_eq!(rx.recv().await.as_deref(), Some("frame-7"));
    }

    #[test]
    fn test_topic_removed_with_last_peer() {
        let relay = FrameRelay::new();
        let a = relay.join("cam");
        let b = relay.join("cam");
        assert_eq!(relay.peer_count("cam"), 2);

        drop(a);
        assert_eq!(relay.peer_count("cam"), 1);
        drop(b);
        assert_eq!(relay.peer_count("cam"), 0);
        assert!(relay.topics().is_empty());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let relay = FrameRelay::new();
        let lonely = relay.join("cam");
        assert_eq!(lonely.publish("frame"), 0);
    }

    #[test]
    fn test_role_flags() {
        assert!(RelayRole::default().publishes());
        assert!(RelayRole::default().subscribes());
        assert!(!RelayRole::Publisher.subscribes());
        assert!(!RelayRole::Subscriber.publishes());
    }
}
