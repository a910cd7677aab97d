use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ApiError;

/// Bounds how many yt-dlp processes run at once. Acquisition is cancel-safe:
/// dropping the `acquire` future (for example when a caller's timeout fires)
/// consumes no slot.
pub struct ExtractorGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Slot handle. The slot returns to the gate when this is dropped, on every
/// exit path.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ExtractorGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<GatePermit, ApiError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::internal("extraction gate is closed"))?;

        Ok(GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{Duration, timeout};

    use super::*;

    #[tokio::test]
    async fn concurrent_holders_never_exceed_capacity() {
        let gate = Arc::new(ExtractorGate::new(3));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let gate = Arc::clone(&gate);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _slot = gate.acquire().await.unwrap();
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn cancelled_acquire_consumes_no_slot() {
        let gate = ExtractorGate::new(1);
        let held = gate.acquire().await.unwrap();

        // all slots taken: the waiter times out
        let waited = timeout(Duration::from_millis(20), gate.acquire()).await;
        assert!(waited.is_err());

        // the cancelled waiter must not have eaten the slot
        drop(held);
        assert_eq!(gate.available(), 1);
        let reacquired = timeout(Duration::from_millis(20), gate.acquire()).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn permit_released_exactly_once_on_drop() {
        let gate = ExtractorGate::new(2);
        assert_eq!(gate.available(), 2);
        {
            let _a = gate.acquire().await.unwrap();
            let _b = gate.acquire().await.unwrap();
            assert_eq!(gate.available(), 0);
        }
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.capacity(), 2);
    }
}
