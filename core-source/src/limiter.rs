//! Concurrency gate for rate-sensitive backends.
//!
//! A fixed number of slots bounds in-flight requests; a released slot only
//! becomes available again after a spacing delay, which keeps sustained
//! request rate under the backend's throttling threshold.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub slots: usize,
    /// Delay before a released slot can be re-acquired
    pub spacing: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            slots: 2,
            spacing: Duration::from_millis(200),
        }
    }
}

/// FIFO request gate. Waiters acquire slots in arrival order.
pub struct RequestGate {
    semaphore: Arc<Semaphore>,
    spacing: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.slots)),
            spacing: config.spacing,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot. The returned pass holds it until dropped.
    pub async fn acquire(&self) -> GatePass {
        // The semaphore is never closed.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("gate semaphore closed");
        permit.forget();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        trace!(in_flight = self.in_flight.load(Ordering::SeqCst), "gate slot acquired");
        GatePass {
            semaphore: self.semaphore.clone(),
            spacing: self.spacing,
            in_flight: self.in_flight.clone(),
        }
    }

    /// Number of requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// A held gate slot. Dropping schedules the slot to reopen after the
/// spacing delay.
pub struct GatePass {
    semaphore: Arc<Semaphore>,
    spacing: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePass {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let semaphore = self.semaphore.clone();
        let spacing = self.spacing;
        tokio::spawn(async move {
            tokio::time::sleep(spacing).await;
            semaphore.add_permits(1);
        });
    }
}
