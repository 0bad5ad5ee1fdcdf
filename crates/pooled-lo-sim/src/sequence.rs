use core::{convert::Infallible, time::Duration};
use std::sync::Arc;

use pooled_lo::AccessCallback;
use portable_atomic::{AtomicI64, AtomicU64, Ordering};

/// An in-memory stand-in for a database sequence created with
/// `INCREMENT BY <stride>`.
///
/// Clones share the counter, the way every connection sees the same
/// sequence. Each clone carries its own tenant tag.
#[derive(Debug, Clone)]
pub struct InMemorySequence {
    next: Arc<AtomicI64>,
    round_trips: Arc<AtomicU64>,
    stride: i64,
    latency: Duration,
    tenant: Option<String>,
}

impl InMemorySequence {
    pub fn new(start: i64, stride: i64, latency: Duration) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(start)),
            round_trips: Arc::new(AtomicU64::new(0)),
            stride,
            latency,
            tenant: None,
        }
    }

    /// A handle on the same sequence that tags requests with `tenant`.
    pub fn with_tenant(&self, tenant: Option<String>) -> Self {
        Self {
            tenant,
            ..self.clone()
        }
    }

    /// Number of `next_value` calls served across all handles.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }
}

impl AccessCallback<i64> for InMemorySequence {
    type Error = Infallible;

    fn next_value(&mut self) -> Result<i64, Infallible> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        Ok(self.next.fetch_add(self.stride, Ordering::Relaxed))
    }

    fn tenant_identifier(&self) -> Option<&str> {
        self.tenant.as_deref()
    }
}
