//! Simulated errors for the rate-limited paths
//!
//! Lets tests force a 429, a connection failure, or a SOCKS failure on the
//! next rate-limited dispatch without a misbehaving upstream. Compiled only
//! under `cfg(test)` or the `fault-injection` feature; production builds
//! carry none of this.

use std::collections::VecDeque;

use tokio::sync::Mutex;

/// A fault to inject on the next rate-limited dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    RateLimit,
    Connection,
    Socks,
}

/// FIFO of pending faults, consumed one per dispatch attempt.
#[derive(Default)]
pub struct FaultPlan {
    queue: Mutex<VecDeque<Fault>>,
}

impl FaultPlan {
    /// Queue a fault for the next dispatch attempt.
    pub async fn inject(&self, fault: Fault) {
        self.queue.lock().await.push_back(fault);
    }

    pub(crate) async fn take(&self) -> Option<Fault> {
        self.queue.lock().await.pop_front()
    }
}
