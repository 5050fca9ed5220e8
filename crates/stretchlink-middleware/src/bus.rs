//! In-process multipart message bus.
//!
//! Uses [`tokio::sync::broadcast`] so every subscriber sees every message and
//! no subscriber can block a publisher.  A subscriber that falls more than
//! `capacity` messages behind loses the oldest ones and is warned about it;
//! with a small capacity this gives the keep-latest behaviour real-time
//! streams want.
//!
//! # Topic filtering
//!
//! Filtering follows pub/sub prefix semantics: a [`Subscription`] created
//! with filters `["manipulator", "base"]` receives every message whose
//! *first frame* starts with one of those byte strings.  A subscription
//! without filters receives everything, including untopiced streams such as
//! status.

use tokio::sync::broadcast;
use tracing::warn;

/// One message on the bus: an ordered list of byte frames.
pub type Multipart = Vec<Vec<u8>>;

/// Default number of buffered messages per subscriber.
const DEFAULT_CAPACITY: usize = 16;

/// Shared multipart bus.  Clones are cheap and share the same channel.
#[derive(Clone, Debug)]
pub struct MessageBus {
    sender: broadcast::Sender<Multipart>,
}

impl MessageBus {
    /// Create a bus buffering up to `capacity` messages per subscriber.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `frames` to every subscriber.
    ///
    /// Returns the number of subscribers that were handed the message.
    /// Zero subscribers is a normal condition, not an error: status and
    /// camera streams publish whether or not anyone listens.
    pub fn publish(&self, frames: Multipart) -> usize {
        self.sender.send(frames).unwrap_or(0)
    }

    /// Convenience: publish `[topic, rest...]`.
    pub fn publish_topic(&self, topic: &str, rest: Multipart) -> usize {
        let mut frames = Vec::with_capacity(rest.len() + 1);
        frames.push(topic.as_bytes().to_vec());
        frames.extend(rest);
        self.publish(frames)
    }

    /// Subscribe to messages whose first frame starts with any of `filters`.
    pub fn subscribe<S: AsRef<str>>(&self, filters: &[S]) -> Subscription {
        Subscription {
            filters: filters
                .iter()
                .map(|f| f.as_ref().as_bytes().to_vec())
                .collect(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to every message.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe::<&str>(&[])
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Filtered receiver obtained from [`MessageBus::subscribe`].
pub struct Subscription {
    filters: Vec<Vec<u8>>,
    receiver: broadcast::Receiver<Multipart>,
}

impl Subscription {
    /// Wait for the next message that passes the topic filter.
    ///
    /// Returns `None` once every [`MessageBus`] clone has been dropped.
    pub async fn recv(&mut self) -> Option<Multipart> {
        loop {
            match self.receiver.recv().await {
                Ok(frames) if self.matches(&frames) => return Some(frames),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(filters = ?self.filter_names(), lagged_by = n, "subscription lagged, oldest messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, frames: &Multipart) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let Some(first) = frames.first() else {
            return false;
        };
        self.filters.iter().any(|f| first.starts_with(f))
    }

    fn filter_names(&self) -> Vec<String> {
        self.filters
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }
}
