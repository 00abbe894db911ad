//! Process-wide cap on in-flight managed-backend jobs.
//!
//! A permit is taken before a pipeline run and released when it is dropped,
//! so every exit path (success, error, timeout, cancelled future) gives the
//! unit back.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use vendorflow_forecast::ManagedCapacity;

#[derive(Debug, Clone)]
pub struct ConcurrencyBudget {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// One unit of the budget; released on drop.
#[derive(Debug)]
pub struct BudgetPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyBudget {
    /// `max` is capped at [`Semaphore::MAX_PERMITS`].
    pub fn new(max: usize) -> Self {
        let max = max.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn in_flight(&self) -> usize {
        self.max.saturating_sub(self.semaphore.available_permits())
    }

    /// Take a unit without waiting; `None` when the budget is exhausted.
    pub fn try_acquire(&self) -> Option<BudgetPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| BudgetPermit { _permit: permit })
    }

    pub fn capacity(&self, available: bool) -> ManagedCapacity {
        ManagedCapacity {
            in_flight: self.in_flight(),
            max_in_flight: self.max,
            available,
        }
    }
}
