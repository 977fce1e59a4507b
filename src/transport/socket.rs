//! Async socket wrappers for the weather-push transports.
//!
//! [`WeatherSocket`] wraps a tokio UDP socket and [`WeatherStream`] a TCP
//! stream. Both move raw packet bytes; framing is up to the caller.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::debug;

use super::error::{TransportError, TransportResult};

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Async UDP socket wrapper.
#[derive(Debug)]
pub struct WeatherSocket {
    /// The underlying UDP socket.
    socket: Arc<UdpSocket>,
    /// Receive buffer.
    recv_buffer: Vec<u8>,
}

impl WeatherSocket {
    /// Create a socket bound to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Bind an ephemeral local port of the right address family and connect
    /// it to `server`.
    pub async fn connect_to(server: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = Self::bind(local).await?;
        socket.connect(server).await?;
        Ok(socket)
    }

    /// Wrap an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
            recv_buffer: vec![0u8; DEFAULT_RECV_BUFFER_SIZE],
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Connect to a remote address.
    ///
    /// After connecting, `send` and `recv` can be used instead of
    /// `send_to` and `recv_from`.
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        self.socket.connect(addr).await
    }

    /// Send data to a specific address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    /// Send data to the connected address.
    pub async fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.socket.send(data).await
    }

    /// Receive a datagram and the sender's address.
    pub async fn recv_from(&mut self) -> io::Result<(&[u8], SocketAddr)> {
        let (len, addr) = self.socket.recv_from(&mut self.recv_buffer).await?;
        Ok((&self.recv_buffer[..len], addr))
    }

    /// Receive a datagram from the connected address.
    pub async fn recv(&mut self) -> io::Result<&[u8]> {
        let len = self.socket.recv(&mut self.recv_buffer).await?;
        Ok(&self.recv_buffer[..len])
    }
}

/// Async TCP stream wrapper.
#[derive(Debug)]
pub struct WeatherStream {
    stream: TcpStream,
    recv_buffer: Vec<u8>,
}

impl WeatherStream {
    /// Connect to `server`.
    pub async fn connect(server: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(server).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an existing TCP stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        // Records are small and latency matters more than throughput.
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "failed to disable Nagle's algorithm");
        }
        Self {
            stream,
            recv_buffer: vec![0u8; DEFAULT_RECV_BUFFER_SIZE],
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Write all of `data`.
    pub async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Read whatever bytes are available.
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the peer has closed
    /// the stream.
    pub async fn recv(&mut self) -> TransportResult<&[u8]> {
        let len = self.stream.read(&mut self.recv_buffer).await?;
        if len == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(&self.recv_buffer[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_socket_bind() {
        let socket = WeatherSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() != 0);
    }

    #[tokio::test]
    async fn test_socket_send_recv() {
        let mut server = WeatherSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut client = WeatherSocket::connect_to(server_addr).await.unwrap();
        client.send(b"station info").await.unwrap();

        let (data, from) = server.recv_from().await.unwrap();
        assert_eq!(data, b"station info");
        server.send_to(b"reply", from).await.unwrap();

        assert_eq!(client.recv().await.unwrap(), b"reply");
    }

    #[tokio::test]
    async fn test_stream_send_recv_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = WeatherStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let mut server = WeatherStream::from_stream(accepted);

        client.send(&[0x05, 0x00, 1, 2, 3, 4, 5, 6, 7, 8]).await.unwrap();
        let mut received = Vec::new();
        while received.len() < 10 {
            received.extend_from_slice(server.recv().await.unwrap());
        }
        assert_eq!(received[..2], [0x05, 0x00]);

        drop(client);
        assert!(matches!(server.recv().await, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_stream_disables_nagle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = WeatherStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let server = WeatherStream::from_stream(accepted);

        assert!(client.stream.nodelay().unwrap());
        assert!(server.stream.nodelay().unwrap());
    }
}
