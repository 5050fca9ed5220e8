//! Topic-routed command dispatch.
//!
//! A [`Dispatcher`] maps topic strings to a wire schema and a handler.  For
//! each inbound `[topic, timestamp, payload]` message it strips the
//! envelope, decodes the payload with the topic's schema and calls the
//! handler.  Unknown topics are ignored.  Failures are logged by
//! [`Dispatcher::run`] and never end the loop.
//!
//! # Example
//!
//! ```rust
//! use stretchlink_driver::dispatcher::Dispatcher;
//! use stretchlink_middleware::protocol::encode_with_timestamp;
//! use stretchlink_types::{BaseCommand, ValidationMode, WireMessage};
//!
//! let dispatcher = Dispatcher::new(ValidationMode::Strict)
//!     .route("base", |command: BaseCommand| {
//!         assert_eq!(command.twist.linear, 0.2);
//!         Ok(())
//!     });
//!
//! let mut frames = vec![b"base".to_vec()];
//! frames.extend(encode_with_timestamp(BaseCommand::position(0.2, 0.0).to_bytes().unwrap()));
//! dispatcher.handle(&frames).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use stretchlink_middleware::{Subscription, decode_with_timestamp};
use stretchlink_types::{LinkError, ValidationMode, WireMessage};
use tracing::{debug, error, warn};

type Handler = Box<dyn Fn(&[u8], ValidationMode) -> Result<(), LinkError> + Send + Sync>;

/// What [`Dispatcher::handle`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    UnknownTopic,
}

pub struct Dispatcher {
    mode: ValidationMode,
    routes: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            routes: HashMap::new(),
        }
    }

    /// Decode messages on `topic` as `T` and pass them to `handler`.
    pub fn route<T, F>(mut self, topic: &str, handler: F) -> Self
    where
        T: WireMessage + 'static,
        F: Fn(T) -> Result<(), LinkError> + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(move |payload, mode| {
            let message = T::from_bytes(payload, mode)?;
            handler(message)
        });
        self.routes.insert(topic.to_string(), handler);
        self
    }

    /// Registered topics, sorted.  Used as the subscription filter.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Dispatch one multipart message.
    ///
    /// # Errors
    ///
    /// [`LinkError::Framing`] for a bad envelope, the decode error of the
    /// topic's schema, or whatever the handler returns.
    pub fn handle<F: AsRef<[u8]>>(&self, frames: &[F]) -> Result<Dispatch, LinkError> {
        let Some((topic, rest)) = frames.split_first() else {
            return Err(LinkError::Framing("empty message".to_string()));
        };
        let topic = String::from_utf8_lossy(topic.as_ref());
        let Some(handler) = self.routes.get(topic.as_ref()) else {
            warn!(topic = %topic, "unknown topic, ignoring");
            return Ok(Dispatch::UnknownTopic);
        };

        let message = decode_with_timestamp(rest)?;
        debug!(
            topic = %topic,
            timestamp_ns = message.timestamp_ns,
            bytes = message.payload.len(),
            "command received"
        );
        handler(&message.payload, self.mode)?;
        Ok(Dispatch::Handled)
    }

    /// Receive loop.  Returns when the bus closes.
    ///
    /// Handlers run on the blocking pool because they take the controller
    /// lock, which a `goto` may hold for the length of a base move.
    pub async fn run(self: Arc<Self>, mut subscription: Subscription) {
        while let Some(frames) = subscription.recv().await {
            let dispatcher = Arc::clone(&self);
            let result = tokio::task::spawn_blocking(move || dispatcher.handle(&frames)).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "command failed"),
                Err(e) => error!(error = %e, "command handler panicked"),
            }
        }
        debug!("dispatcher bus closed");
    }
}
