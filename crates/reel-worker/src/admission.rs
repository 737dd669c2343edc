//! Admission control.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::warn;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Bounds how many jobs run at once. Excess work is rejected, never queued.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// Held for the lifetime of one job; releases its slot when dropped.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        // The permit is returned after this body runs.
        let active = self
            .capacity
            .saturating_sub(self.slots.available_permits() + 1);
        metrics::set_jobs_in_flight(active);
    }
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a slot, or fail fast when all are in use.
    pub fn try_acquire(&self) -> WorkerResult<AdmissionSlot> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => {
                metrics::set_jobs_in_flight(self.active());
                Ok(AdmissionSlot {
                    _permit: permit,
                    slots: self.slots.clone(),
                    capacity: self.capacity,
                })
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                let active = self.active();
                warn!(active, max = self.capacity, "Admission rejected");
                metrics::record_admission_rejected();
                Err(WorkerError::AdmissionRejected {
                    active,
                    max: self.capacity,
                })
            }
        }
    }

    /// Jobs currently holding a slot.
    pub fn active(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
