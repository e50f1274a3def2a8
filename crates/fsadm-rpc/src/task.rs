//! Description of one logical RPC.

use std::time::Duration;

/// Per-call policy shared by every task built from the same configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Per-attempt timeout; also bounds the dial (default: 10 seconds).
    pub timeout: Duration,
    /// Attempts made against one address before failing over (default: 3).
    pub retry_times: u32,
    /// Pause between attempts against the same address (default: none).
    pub retry_delay: Option<Duration>,
    /// Narrow the candidates to the cached or probed leader (default: true).
    pub leader_routing: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_times: 3,
            retry_delay: None,
            leader_routing: true,
        }
    }
}

/// A logical call: candidate addresses, policy, a request value and the
/// operation that binds the request to a connection and invokes it.
///
/// `op` is called once per attempt with a clone of the pooled connection
/// handle and a clone of the request.
pub struct RpcTask<Req, F> {
    pub(crate) name: String,
    pub(crate) addrs: Vec<String>,
    pub(crate) options: CallOptions,
    pub(crate) request: Req,
    pub(crate) op: F,
}

impl<Req, F> RpcTask<Req, F> {
    /// Creates a task with default [`CallOptions`].
    pub fn new(name: impl Into<String>, addrs: Vec<String>, request: Req, op: F) -> Self {
        Self {
            name: name.into(),
            addrs,
            options: CallOptions::default(),
            request,
            op,
        }
    }

    /// Replaces the whole call policy.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Sets the number of attempts per address.
    pub fn retry_times(mut self, retry_times: u32) -> Self {
        self.options.retry_times = retry_times;
        self
    }

    /// Sets the pause between attempts.
    pub fn retry_delay(mut self, delay: Option<Duration>) -> Self {
        self.options.retry_delay = delay;
        self
    }

    /// Enables or disables leader-first routing for this task.
    pub fn leader_routing(mut self, enabled: bool) -> Self {
        self.options.leader_routing = enabled;
        self
    }

    /// Operation name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate addresses in caller order.
    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    /// Effective call policy.
    pub fn options(&self) -> &CallOptions {
        &self.options
    }
}
