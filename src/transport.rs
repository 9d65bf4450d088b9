//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the byte
//! stream under the MQTT client, and a TCP implementation on top of
//! `embassy-net`.
//!
//! Unlike a one-shot connection, a sensor node reconnects for its whole
//! lifetime, so the transport is reopenable: the connection supervisor calls
//! [`MqttTransport::open`] on every attempt and [`MqttTransport::close`] when
//! the link is considered lost.

use embassy_net::dns::{DnsQueryType, Error as DnsError};
use embassy_net::tcp::{ConnectError, Error as TcpError, TcpSocket};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use log::{debug, trace};

/// A trait representing a reopenable, ordered byte stream to the broker.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: TransportError;

    /// Establishes the stream to `host:port`, dropping any previous one.
    async fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;

    /// Tears the stream down. Never fails; a dead link is already closed.
    async fn close(&mut self);

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read. `Ok(0)` means the peer closed the stream.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Errors surfaced by a transport.
pub trait TransportError: core::fmt::Debug {
    /// `true` when a receive simply found no data before its deadline.
    ///
    /// The client treats this as "nothing to do" instead of link loss.
    fn is_timeout(&self) -> bool {
        false
    }
}

/// Failure modes of [`TcpTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpTransportError {
    /// The broker host name did not resolve.
    Dns(DnsError),
    /// Resolution succeeded but returned no address.
    NoAddress,
    /// The TCP handshake failed.
    Connect(ConnectError),
    /// Reading or writing the socket failed.
    Io(TcpError),
    /// No data arrived within the read timeout.
    Timeout,
}

// embassy-net's errors only implement `defmt::Format` with its own `defmt`
// feature, so the payloads go through their `Debug` impls.
#[cfg(feature = "defmt")]
impl defmt::Format for TcpTransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Dns(e) => defmt::write!(f, "Dns({})", defmt::Debug2Format(e)),
            Self::NoAddress => defmt::write!(f, "NoAddress"),
            Self::Connect(e) => defmt::write!(f, "Connect({})", defmt::Debug2Format(e)),
            Self::Io(e) => defmt::write!(f, "Io({})", defmt::Debug2Format(e)),
            Self::Timeout => defmt::write!(f, "Timeout"),
        }
    }
}

impl TransportError for TcpTransportError {
    fn is_timeout(&self) -> bool {
        matches!(self, TcpTransportError::Timeout)
    }
}

/// TCP transport implementation using `embassy-net`.
pub struct TcpTransport<'a> {
    stack: Stack<'a>,
    socket: TcpSocket<'a>,
    read_timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Creates a transport around an unconnected socket on `stack`.
    ///
    /// `read_timeout` bounds every receive so the runtime loop keeps cycling
    /// while the broker is silent.
    pub fn new(stack: Stack<'a>, socket: TcpSocket<'a>, read_timeout: Duration) -> Self {
        Self {
            stack,
            socket,
            read_timeout,
        }
    }
}

impl MqttTransport for TcpTransport<'_> {
    type Error = TcpTransportError;

    async fn open(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        self.close().await;

        let addrs = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(TcpTransportError::Dns)?;
        let addr = *addrs.first().ok_or(TcpTransportError::NoAddress)?;

        debug!("TCP connecting to {}:{}", host, port);
        self.socket
            .connect((addr, port))
            .await
            .map_err(TcpTransportError::Connect)
    }

    async fn close(&mut self) {
        self.socket.abort();
        // Waits until the abort has been sent; errors only mean the socket is gone.
        let _ = self.socket.flush().await;
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("TCP TX ({} bytes): {:02X?}", buf.len(), buf);

        self.socket
            .write_all(buf)
            .await
            .map_err(TcpTransportError::Io)?;
        self.socket.flush().await.map_err(TcpTransportError::Io)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // Race the read against a timer.
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.read_timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(n), _)) => {
                trace!("TCP read: {} bytes", n);
                Ok(n)
            }
            futures::future::Either::Left((Err(e), _)) => {
                debug!("TCP read error: {:?}", e);
                Err(TcpTransportError::Io(e))
            }
            futures::future::Either::Right(((), _)) => Err(TcpTransportError::Timeout),
        }
    }
}
