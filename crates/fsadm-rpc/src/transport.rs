//! Abstract connector layer.
//!
//! A [`Connector`] knows how to dial one server address. The connection
//! handles it produces are cheap to clone so the pool can hand one to a
//! bound operation while keeping ownership of the slot.

use async_trait::async_trait;

use crate::error::Result;

/// Dials server endpoints.
///
/// Implementations only establish connections; timeouts, pooling and retries
/// live in [`crate::pool::ConnectionPool`] and [`crate::executor::RpcExecutor`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Reusable connection handle bound to a single address.
    type Conn: Clone + Send + Sync + 'static;

    /// Open a new connection to `addr` (`host:port`).
    async fn connect(&self, addr: &str) -> Result<Self::Conn>;

    /// Whether `conn` may still be handed out or returned to the pool.
    ///
    /// A connection whose stream state is unknown, e.g. after a call was
    /// cancelled mid-flight, must report `false`.
    fn is_usable(&self, _conn: &Self::Conn) -> bool {
        true
    }
}
