//! Process-wide pacing between outbound calls
//!
//! One gate serializes every outbound call in the process and enforces a
//! minimum interval between consecutive dispatches. The lock is held across
//! the sleep so a second caller queues behind the first instead of racing
//! the timestamp.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Minimum-interval gate over a last-call timestamp.
pub struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Sleep until at least `min_interval` has passed since the previous
    /// call, then stamp the timestamp.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn consecutive_calls_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(50));
        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        gate.wait().await;
        // First call is free; the next two wait 50 ms each.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn concurrent_callers_queue_behind_the_gate() {
        let gate = Arc::new(RateGate::new(Duration::from_millis(40)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.wait().await;
                Instant::now()
            }));
        }
        let mut stamps: Vec<Instant> = Vec::new();
        for h in handles {
            stamps.push(h.await.unwrap());
        }
        stamps.sort();
        assert!(stamps[1] - stamps[0] >= Duration::from_millis(35));
        assert!(stamps[2] - stamps[1] >= Duration::from_millis(35));
        // Sanity: the whole run took at least two intervals.
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
