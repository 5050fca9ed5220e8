//! WebSocket endpoints that expose a [`MessageBus`] to other processes.
//!
//! Every binary WebSocket message carries one multipart message, packed as
//! a sequence of `u32` big-endian length prefixes each followed by that many
//! bytes.  A text message is a single-frame message holding its UTF-8 bytes.
//! Three roles are provided:
//!
//! | Role | Direction | Used by |
//! |---|---|---|
//! | [`Endpoint::serve_publisher`] | bus → every connected client | status, cameras |
//! | [`Endpoint::serve_subscriber`] | client → bus | command, servo, speak |
//! | [`Endpoint::serve_reply`] | request → text reply | goto, listen |
//!
//! Malformed packed messages are logged and dropped; the connection stays
//! open.

use std::future::Future;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use stretchlink_types::LinkError;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, warn};

use crate::bus::{MessageBus, Multipart};

const LEN_PREFIX: usize = 4;

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// Pack `frames` into one buffer.
pub fn pack_frames<F: AsRef<[u8]>>(frames: &[F]) -> Vec<u8> {
    let total = frames
        .iter()
        .map(|f| LEN_PREFIX + f.as_ref().len())
        .sum::<usize>();
    let mut out = Vec::with_capacity(total);
    for frame in frames {
        let frame = frame.as_ref();
        // Frames above 4 GiB cannot be represented; camera buffers are far smaller.
        out.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        out.extend_from_slice(frame);
    }
    out
}

/// Inverse of [`pack_frames`].
///
/// # Errors
///
/// [`LinkError::Framing`] on a truncated length prefix or frame body.
pub fn unpack_frames(mut data: &[u8]) -> Result<Multipart, LinkError> {
    let mut frames = Vec::new();
    while !data.is_empty() {
        let Some((prefix, rest)) = data.split_first_chunk::<LEN_PREFIX>() else {
            return Err(LinkError::Framing(format!(
                "truncated length prefix ({} trailing bytes)",
                data.len()
            )));
        };
        let len = u32::from_be_bytes(*prefix) as usize;
        if rest.len() < len {
            return Err(LinkError::Framing(format!(
                "frame declares {len} bytes but only {} remain",
                rest.len()
            )));
        }
        let (frame, rest) = rest.split_at(len);
        frames.push(frame.to_vec());
        data = rest;
    }
    Ok(frames)
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A bound WebSocket listener, not yet serving.
///
/// Binding is separate from serving so callers can bind port `0` and read
/// [`Endpoint::local_addr`] before spawning the serve loop.
pub struct Endpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Endpoint {
    /// # Errors
    ///
    /// [`LinkError::Transport`] if the TCP listener cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LinkError::Transport(format!("bind error: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| LinkError::Transport(format!("local_addr: {e}")))?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Forward every message on `bus` to every connected client.
    pub async fn serve_publisher(self, bus: MessageBus) {
        self.accept_loop(move |stream, peer| {
            let bus = bus.clone();
            async move { publisher_session(stream, peer, bus).await }
        })
        .await;
    }

    /// Publish every packed message received from any client onto `bus`.
    pub async fn serve_subscriber(self, bus: MessageBus) {
        self.accept_loop(move |stream, peer| {
            let bus = bus.clone();
            async move { subscriber_session(stream, peer, bus).await }
        })
        .await;
    }

    /// Answer each request with the text returned by `handler`.  Text
    /// requests reach the handler as their UTF-8 bytes.
    ///
    /// Requests on one connection are answered in order; separate
    /// connections are served concurrently.
    pub async fn serve_reply<H, Fut>(self, handler: H)
    where
        H: Fn(Vec<u8>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.accept_loop(move |stream, peer| {
            let handler = handler.clone();
            async move { reply_session(stream, peer, handler).await }
        })
        .await;
    }

    async fn accept_loop<S, Fut>(self, session: S)
    where
        S: Fn(TcpStream, SocketAddr) -> Fut,
        Fut: Future<Output = Result<(), LinkError>> + Send + 'static,
    {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, endpoint = %self.local_addr, "ws client connected");
                    let fut = session(stream, peer);
                    tokio::spawn(async move {
                        if let Err(e) = fut.await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }
}

async fn publisher_session(
    stream: TcpStream,
    peer: SocketAddr,
    bus: MessageBus,
) -> Result<(), LinkError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| LinkError::Transport(format!("ws handshake from {peer}: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut subscription = bus.subscribe_all();

    loop {
        tokio::select! {
            frames = subscription.recv() => {
                let Some(frames) = frames else { break };
                let packed = pack_frames(&frames);
                if ws_tx.send(Message::Binary(packed.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
    debug!(peer = %peer, "ws publisher client disconnected");
    Ok(())
}

async fn subscriber_session(
    stream: TcpStream,
    peer: SocketAddr,
    bus: MessageBus,
) -> Result<(), LinkError> {
    let mut ws_stream = accept_async(stream)
        .await
        .map_err(|e| LinkError::Transport(format!("ws handshake from {peer}: {e}")))?;

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Binary(data)) => match unpack_frames(&data) {
                Ok(frames) => {
                    bus.publish(frames);
                }
                Err(e) => warn!(peer = %peer, error = %e, "dropping malformed message"),
            },
            Ok(Message::Text(text)) => {
                bus.publish(vec![text.as_bytes().to_vec()]);
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Ok(())
}

async fn reply_session<H, Fut>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: H,
) -> Result<(), LinkError>
where
    H: Fn(Vec<u8>) -> Fut,
    Fut: Future<Output = String>,
{
    let mut ws_stream = accept_async(stream)
        .await
        .map_err(|e| LinkError::Transport(format!("ws handshake from {peer}: {e}")))?;

    while let Some(msg) = ws_stream.next().await {
        let request = match msg {
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let reply = handler(request).await;
        ws_stream
            .send(Message::Text(reply.into()))
            .await
            .map_err(|e| LinkError::Transport(format!("reply to {peer}: {e}")))?;
    }
    Ok(())
}

pub(crate) fn transport_error(context: &str, e: impl std::fmt::Display) -> LinkError {
    LinkError::Transport(format!("{context}: {e}"))
}
