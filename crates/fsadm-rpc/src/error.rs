//! Error taxonomy for connection setup and RPC dispatch.

use std::fmt;

use thiserror::Error;

/// Which phase of a per-address attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The connection could not be established.
    Connection,
    /// The connection was established but every call attempt failed.
    Call,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connection => write!(f, "connection error"),
            FailureKind::Call => write!(f, "rpc call error"),
        }
    }
}

/// One candidate address and why it was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFailure {
    /// The address that was tried.
    pub addr: String,
    /// Failure phase.
    pub kind: FailureKind,
    /// Number of call attempts made against this address (0 for connection failures).
    pub attempts: u32,
    /// Rendered last error for this address.
    pub reason: String,
    /// Last status code the server answered with, if any attempt got that far.
    pub status: Option<i32>,
}

impl fmt::Display for AddressFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.addr, self.kind)?;
        if self.attempts > 0 {
            write!(f, " after {} attempt(s)", self.attempts)?;
        }
        write!(f, "): {}", self.reason)
    }
}

fn join_failures(failures: &[AddressFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by the RPC layer.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Dial or transport setup failed.
    #[error("connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// Dial did not complete within the connect timeout.
    #[error("connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    /// The call failed in flight.
    #[error("call to {addr} failed: {reason}")]
    Call { addr: String, reason: String },

    /// The call did not complete within the per-attempt timeout.
    #[error("call to {addr} timed out after {timeout_ms}ms")]
    CallTimeout { addr: String, timeout_ms: u64 },

    /// The call completed with a non-success status.
    #[error("server returned status {code}: {message}")]
    Status { code: i32, message: String },

    /// A frame exceeded the maximum payload size.
    #[error("frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    /// Message encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The task carried no candidate addresses.
    #[error("{op}: no candidate addresses")]
    NoCandidates { op: String },

    /// Every candidate address failed.
    #[error("{op}: all candidates failed: {}", join_failures(.failures))]
    Exhausted {
        op: String,
        failures: Vec<AddressFailure>,
    },

    /// Underlying socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Whether the error points at the transport rather than the request.
    ///
    /// Connections that fail this way are evicted instead of being returned
    /// to the pool.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            RpcError::Connection { .. }
                | RpcError::ConnectTimeout { .. }
                | RpcError::CallTimeout { .. }
                | RpcError::FrameTooLarge { .. }
                | RpcError::Codec(_)
                | RpcError::Io(_)
        )
    }

    /// Status code the server answered with, if any.
    ///
    /// For `Exhausted` this is the status of the last candidate that
    /// answered at all, so a reply from one server is not masked by a later
    /// connection failure on another.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            RpcError::Status { code, .. } => Some(*code),
            RpcError::Exhausted { failures, .. } => failures.iter().rev().find_map(|f| f.status),
            _ => None,
        }
    }

    /// Per-address failures carried by an `Exhausted` error.
    pub fn failures(&self) -> &[AddressFailure] {
        match self {
            RpcError::Exhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl From<bincode::Error> for RpcError {
    fn from(err: bincode::Error) -> Self {
        RpcError::Codec(err.to_string())
    }
}

/// Result alias for the RPC layer.
pub type Result<T> = std::result::Result<T, RpcError>;
