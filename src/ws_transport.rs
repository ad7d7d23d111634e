//! A narrow WebSocket transport shim: connect, send text, and a stream of
//! `{opened, message_text, closed, error}` events.
//!
//! The signalling state machine in [`crate::signalling`] owns the protocol
//! logic; this module only owns the socket.

use crate::error::VoiceError;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// An inbound transport event.
#[derive(Debug)]
pub enum WsEvent {
    /// A text frame was received.
    MessageText(String),
    /// The peer closed the connection.
    Closed {
        /// Close code, 0 if the peer sent none.
        code: u16,
        /// Close reason text.
        reason: String,
    },
    /// A transport-level error occurred; the connection should be
    /// considered closed.
    Error(String),
}

/// A connected voice signalling WebSocket.
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    /// Open a WebSocket connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, VoiceError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, message: String) -> Result<(), VoiceError> {
        self.stream.send(Message::Text(message)).await?;
        Ok(())
    }

    /// Await the next event from the peer.
    pub async fn next_event(&mut self) -> WsEvent {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => WsEvent::MessageText(text),
            Some(Ok(Message::Close(frame))) => close_event(frame),
            Some(Ok(_other)) => WsEvent::Closed {
                code: 0,
                reason: "non-text frame".to_string(),
            },
            Some(Err(err)) => WsEvent::Error(err.to_string()),
            None => WsEvent::Closed {
                code: 0,
                reason: "stream ended".to_string(),
            },
        }
    }

    /// Close the connection with the given close code.
    pub async fn close(&mut self, code: u16) -> Result<(), VoiceError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}

fn close_event(frame: Option<tokio_tungstenite::tungstenite::protocol::CloseFrame<'static>>) -> WsEvent {
    match frame {
        Some(frame) => WsEvent::Closed {
            code: frame.code.into(),
            reason: frame.reason.to_string(),
        },
        None => WsEvent::Closed {
            code: 0,
            reason: String::new(),
        },
    }
}
