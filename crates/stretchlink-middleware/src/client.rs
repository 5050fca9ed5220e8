//! Client-side helpers for processes talking to the driver.
//!
//! Each helper owns one WebSocket connection to one driver endpoint.

use futures_util::{SinkExt, StreamExt};
use stretchlink_types::{LinkError, Status, Twist2D, ValidationMode, WireMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::bus::Multipart;
use crate::protocol::{decode_with_timestamp, encode_with_timestamp};
use crate::ws::{pack_frames, transport_error, unpack_frames};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(url: &str) -> Result<Socket, LinkError> {
    let (socket, _) = connect_async(url)
        .await
        .map_err(|e| transport_error(url, e))?;
    Ok(socket)
}

/// Next binary message from `socket`, unpacked.  `None` when the server
/// closed the connection.
async fn next_multipart(socket: &mut Socket) -> Result<Option<Multipart>, LinkError> {
    while let Some(msg) = socket.next().await {
        match msg.map_err(|e| transport_error("receive", e))? {
            Message::Binary(data) => return unpack_frames(&data).map(Some),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

/// Publishes topic-routed commands: `[topic, timestamp, payload]`.
pub struct CommandPublisher {
    socket: Socket,
}

impl CommandPublisher {
    /// Connect to a command or servo endpoint, e.g. `ws://robot:5556`.
    pub async fn connect(url: &str) -> Result<Self, LinkError> {
        Ok(Self {
            socket: connect(url).await?,
        })
    }

    pub async fn send<T: WireMessage>(&mut self, topic: &str, message: &T) -> Result<(), LinkError> {
        let mut frames = vec![topic.as_bytes().to_vec()];
        frames.extend(encode_with_timestamp(message.to_bytes()?));
        self.send_raw(&frames).await
    }

    /// Send pre-built frames verbatim.
    pub async fn send_raw(&mut self, frames: &[Vec<u8>]) -> Result<(), LinkError> {
        self.socket
            .send(Message::Binary(pack_frames(frames).into()))
            .await
            .map_err(|e| transport_error("send", e))
    }

    pub async fn close(mut self) -> Result<(), LinkError> {
        self.socket
            .close(None)
            .await
            .map_err(|e| transport_error("close", e))
    }
}

/// Receives and decodes the driver's status stream.
pub struct StatusSubscriber {
    socket: Socket,
    mode: ValidationMode,
}

impl StatusSubscriber {
    pub async fn connect(url: &str, mode: ValidationMode) -> Result<Self, LinkError> {
        Ok(Self {
            socket: connect(url).await?,
            mode,
        })
    }

    /// Wait for the next status sample and its publish timestamp.
    ///
    /// Returns `Ok(None)` once the driver closes the stream.
    pub async fn next(&mut self) -> Result<Option<(u64, Status)>, LinkError> {
        let Some(frames) = next_multipart(&mut self.socket).await? else {
            return Ok(None);
        };
        let message = decode_with_timestamp(&frames)?;
        let status = Status::from_bytes(&message.payload, self.mode)?;
        Ok(Some((message.timestamp_ns, status)))
    }
}

/// Request/reply client for the blocking base move.
pub struct GotoClient {
    socket: Socket,
}

impl GotoClient {
    pub async fn connect(url: &str) -> Result<Self, LinkError> {
        Ok(Self {
            socket: connect(url).await?,
        })
    }

    /// Send one request and wait for its reply (`"ok"` or `"error: ..."`).
    pub async fn goto(&mut self, twist: Twist2D) -> Result<String, LinkError> {
        request(&mut self.socket, Message::Binary(twist.to_bytes()?.into())).await
    }
}

/// Pushes text to the driver's speech output.
pub struct SpeakClient {
    socket: Socket,
}

impl SpeakClient {
    pub async fn connect(url: &str) -> Result<Self, LinkError> {
        Ok(Self {
            socket: connect(url).await?,
        })
    }

    /// Queue `text` to be spoken.  Does not wait for playback.
    pub async fn say(&mut self, text: &str) -> Result<(), LinkError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| transport_error("send", e))
    }
}

/// Request/reply client for one round of speech recognition.
pub struct ListenClient {
    socket: Socket,
}

impl ListenClient {
    pub async fn connect(url: &str) -> Result<Self, LinkError> {
        Ok(Self {
            socket: connect(url).await?,
        })
    }

    /// Ask the driver to listen and wait for the transcript.  An empty
    /// string means nothing was heard or recognition failed.
    pub async fn listen(&mut self) -> Result<String, LinkError> {
        request(&mut self.socket, Message::Text("listen".into())).await
    }
}

async fn request(socket: &mut Socket, message: Message) -> Result<String, LinkError> {
    socket
        .send(message)
        .await
        .map_err(|e| transport_error("send", e))?;
    while let Some(msg) = socket.next().await {
        match msg.map_err(|e| transport_error("receive", e))? {
            Message::Text(reply) => return Ok(reply.as_str().to_owned()),
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(LinkError::Transport("connection closed before reply".to_string()))
}
