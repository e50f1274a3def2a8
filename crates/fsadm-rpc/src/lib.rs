#![warn(missing_docs)]

//! fsadm RPC subsystem: address-keyed connection pooling, leader routing and
//! retrying multi-host dispatch of typed request/response calls.

pub mod error;
pub mod executor;
pub mod leader;
pub mod pool;
pub mod task;
pub mod tcp;
pub mod transport;

pub use error::{AddressFailure, FailureKind, Result, RpcError};
pub use executor::{ExecutorConfig, RpcExecutor};
pub use leader::{LeaderCache, LeaderProbe};
pub use pool::{ConnectionPool, PoolConfig, PoolStats};
pub use task::{CallOptions, RpcTask};
pub use tcp::{TcpConnection, TcpConnector, TcpConnectorConfig};
pub use transport::Connector;
