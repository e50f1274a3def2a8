//! TCP connector and framed request/response connection.
//!
//! Frames are a 4-byte big-endian length followed by a bincode-encoded
//! message. A connection carries one outstanding call at a time; the pool
//! guarantees a connection is never shared between concurrent callers.
//!
//! A call that does not run to completion (cancelled by a timeout, or failed
//! mid-frame) leaves the stream at an unknown position, so the connection
//! poisons itself and refuses every later call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::error::{Result, RpcError};
use crate::transport::Connector;

/// Largest frame payload accepted in either direction (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// TCP connector configuration.
#[derive(Debug, Clone)]
pub struct TcpConnectorConfig {
    /// Whether to enable TCP_NODELAY (disable Nagle's algorithm).
    pub nodelay: bool,
}

impl Default for TcpConnectorConfig {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

/// Dials plain TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TcpConnectorConfig,
}

impl TcpConnector {
    /// Creates a connector with the given configuration.
    pub fn new(config: TcpConnectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = Arc<TcpConnection>;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RpcError::Connection {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        tracing::debug!(addr = addr, "TCP connected");
        Ok(Arc::new(TcpConnection::from_stream(stream)))
    }

    fn is_usable(&self, conn: &Self::Conn) -> bool {
        !conn.is_poisoned()
    }
}

/// A single TCP connection carrying framed request/response pairs.
pub struct TcpConnection {
    read: Mutex<OwnedReadHalf>,
    write: Mutex<OwnedWriteHalf>,
    peer_addr: String,
    poisoned: AtomicBool,
}

/// Poisons the connection unless the call it guards finished cleanly.
struct InFlight<'a> {
    poisoned: &'a AtomicBool,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.poisoned.store(true, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("peer_addr", &self.peer_addr)
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let (read, write) = stream.into_split();
        Self {
            read: Mutex::new(read),
            write: Mutex::new(write),
            peer_addr,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Remote peer address.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Whether an interrupted or failed call left this connection unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Sends `request` and waits for the matching response.
    ///
    /// Fails fast with a connection error once the connection is poisoned.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if self.is_poisoned() {
            return Err(RpcError::Connection {
                addr: self.peer_addr.clone(),
                reason: "connection poisoned by an interrupted call".to_string(),
            });
        }
        let mut in_flight = InFlight {
            poisoned: &self.poisoned,
            finished: false,
        };
        let response = self.exchange(request).await;
        in_flight.finished = response.is_ok();
        response
    }

    async fn exchange<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        {
            let mut write = self.write.lock().await;
            write_message(&mut *write, request).await?;
        }
        let mut read = self.read.lock().await;
        read_message(&mut *read).await
    }
}

/// Encodes `message` and writes it as one frame.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: payload.len(),
            max_size: MAX_FRAME_SIZE,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame and decodes it.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: len,
            max_size: MAX_FRAME_SIZE,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}
