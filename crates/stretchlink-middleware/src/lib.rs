//! `stretchlink-middleware` – moves multipart byte messages between the
//! driver and its clients without caring what the bytes mean.
//!
//! # Modules
//!
//! - [`protocol`] – the two-frame `[timestamp, payload]` envelope.
//! - [`bus`] – in-process, topic-prefix-filtered broadcast of multipart
//!   messages built on Tokio broadcast channels.
//! - [`ws`] – WebSocket endpoints that expose a bus to remote processes
//!   (publisher, subscriber and request/reply roles).
//! - [`client`] – helpers for remote processes: command publisher, status
//!   subscriber, the `goto` RPC client and the speak/listen clients.

pub mod bus;
pub mod client;
pub mod protocol;
pub mod ws;

pub use bus::{MessageBus, Multipart, Subscription};
pub use client::{CommandPublisher, GotoClient, ListenClient, SpeakClient, StatusSubscriber};
pub use protocol::{TimestampedMessage, decode_with_timestamp, encode_with_timestamp};
pub use ws::Endpoint;
