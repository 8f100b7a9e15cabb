//! Application state shared across all request handlers.

use payorch_core::context::CallContext;
use payorch_core::service::PaymentService;
use std::sync::Arc;
use std::time::Duration;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
    /// Deadline given to every request's [`CallContext`].
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<PaymentService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }

    /// A fresh context for one request. Dropping the handler future (client
    /// went away) abandons the wait as well.
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}
