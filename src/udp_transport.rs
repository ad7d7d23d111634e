//! A narrow UDP transport shim over a connected datagram socket.
//!
//! Owns the socket only; RTP framing, encryption and Opus live in their own
//! modules and are composed on top by [`crate::pacer`] and
//! [`crate::receiver`].

use crate::error::VoiceError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Largest UDP datagram this engine expects to see on the media path.
pub const MAX_PACKET_SIZE: usize = 2048;

/// A connected UDP media transport.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Resolve `host:port` and connect a UDP socket to it.
    pub async fn setup(host: &str, port: u16) -> Result<Self, VoiceError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let peer: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| VoiceError::InvalidEndpoint(format!("{host}:{port}: {e}")))?;
        socket.connect(peer).await?;
        Ok(Self {
            socket: Arc::new(socket),
            peer,
        })
    }

    /// Send a datagram to the connected peer.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), VoiceError> {
        self.socket.send(bytes).await?;
        Ok(())
    }

    /// Receive one datagram.
    pub async fn receive(&self) -> Result<Vec<u8>, VoiceError> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let len = self.socket.recv(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }

    /// The peer address this transport is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setup_connects_to_loopback_peer() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let transport = UdpTransport::setup("127.0.0.1", port).await.unwrap();
        assert_eq!(transport.peer_addr().port(), port);
    }

    #[tokio::test]
    async fn send_then_receive_round_trips() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listener_addr = listener.local_addr().unwrap();

        let transport = UdpTransport::setup("127.0.0.1", listener_addr.port())
            .await
            .unwrap();
        transport.send(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let (len, peer) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");

        listener.send_to(b"world", peer).await.unwrap();
        let reply = transport.receive().await.unwrap();
        assert_eq!(reply, b"world");
    }
}
