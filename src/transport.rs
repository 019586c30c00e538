//! Network connection to the rendering engine.
//!
//! Exactly one [`FrameTransport`] exists per pipeline. It is moved, never
//! shared, between the idle loop and the playback session, so two writers
//! can never interleave packets.

use crate::config::{TransportConfig, TransportProtocol};
use crate::defaults::{TCP_CONNECT_TIMEOUT_MS, TCP_RETRY_MS, TCP_WRITE_TIMEOUT_MS};
use crate::error::{FacelinkError, Result};
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Ordered, single-writer packet sink.
pub trait FrameTransport: Send {
    fn send(&mut self, packet: &[u8]) -> Result<()>;

    /// Human-readable peer description for logs.
    fn describe(&self) -> String;
}

/// Open the configured transport.
pub fn connect(config: &TransportConfig) -> Result<Box<dyn FrameTransport>> {
    match config.protocol {
        TransportProtocol::Udp => Ok(Box::new(UdpTransport::connect(&config.address)?)),
        TransportProtocol::Tcp => Ok(Box::new(TcpTransport::new(&config.address))),
    }
}

/// One datagram per frame over a connected UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    address: String,
}

impl UdpTransport {
    pub fn connect(address: &str) -> Result<Self> {
        let transport_err = |e: std::io::Error| FacelinkError::Transport {
            message: format!("{}: {}", address, e),
        };
        let bind = if address.starts_with('[') {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind).map_err(transport_err)?;
        socket.connect(address).map_err(transport_err)?;
        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }
}

impl FrameTransport for UdpTransport {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.socket
            .send(packet)
            .map(|_| ())
            .map_err(|e| FacelinkError::Transport {
                message: format!("udp {}: {}", self.address, e),
            })
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.address)
    }
}

/// Persistent TCP stream; reconnects on the next send after a failure.
///
/// Connecting and writing are both bounded so a stalled engine cannot hold
/// the sending thread. After a failure, sends fail fast until the retry
/// interval has passed.
pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
    retry_after: Duration,
    next_attempt: Option<Instant>,
}

impl TcpTransport {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            stream: None,
            retry_after: Duration::from_millis(TCP_RETRY_MS),
            next_attempt: None,
        }
    }

    /// Override the gap between reconnect attempts.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    fn error(&self, message: impl std::fmt::Display) -> FacelinkError {
        FacelinkError::Transport {
            message: format!("tcp {}: {}", self.address, message),
        }
    }

    fn open(&self) -> Result<TcpStream> {
        let addr = self
            .address
            .to_socket_addrs()
            .map_err(|e| self.error(e))?
            .next()
            .ok_or_else(|| self.error("address did not resolve"))?;
        let timeout = Duration::from_millis(TCP_CONNECT_TIMEOUT_MS);
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| self.error(e))?;
        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT_MS)))
            .map_err(|e| self.error(e))?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.next_attempt.is_some_and(|at| Instant::now() < at) {
            return Err(self.error("waiting to reconnect"));
        }
        match self.open() {
            Ok(stream) => {
                tracing::info!(address = %self.address, "connected to rendering engine");
                self.next_attempt = None;
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.next_attempt = Some(Instant::now() + self.retry_after);
                Err(e)
            }
        }
    }
}

impl FrameTransport for TcpTransport {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(self.error("not connected"));
        };
        if let Err(e) = stream.write_all(packet) {
            // A timed-out write may have sent part of a packet; start over on a fresh stream
            self.stream = None;
            self.next_attempt = Some(Instant::now() + self.retry_after);
            return Err(self.error(e));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

/// A packet captured by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

/// Mock transport for testing
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<SentPacket>>>,
    failing: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every send
    pub fn with_failure(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// Shared log of everything sent so far.
    pub fn sent(&self) -> Arc<Mutex<Vec<SentPacket>>> {
        self.sent.clone()
    }

    /// Shared switch to toggle failures while the mock is owned elsewhere.
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        self.failing.clone()
    }
}

impl FrameTransport for MockTransport {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FacelinkError::Transport {
                message: "mock transport failure".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentPacket {
                at: Instant::now(),
                bytes: packet.to_vec(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
