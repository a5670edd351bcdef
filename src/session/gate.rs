//! Concurrency gate bounding in-flight page fetches
//!
//! A counting admission primitive over a [`Semaphore`]. [`ConcurrencyGate::acquire`]
//! suspends until a slot is free and hands back a [`GatePermit`]; dropping the
//! permit releases the slot, so release happens on every exit path of a fetch.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::DEFAULT_MAX_CONCURRENT;

/// Bounded admission control for remote calls
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Scoped slot in a [`ConcurrencyGate`]; the slot is returned on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl GatePermit {
    /// Time spent waiting for the slot
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `capacity` holders at once
    ///
    /// # Errors
    /// Returns [`GateError::ZeroCapacity`] for a capacity of 0, which would
    /// never admit anything.
    pub fn new(capacity: usize) -> Result<Self, GateError> {
        if capacity == 0 {
            return Err(GateError::ZeroCapacity);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GateError::Closed(e.to_string()))?;

        Ok(GatePermit {
            _permit: permit,
            waited: started.elapsed(),
        })
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
            capacity: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Concurrency gate errors
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Capacity of zero requested
    #[error("concurrency limit must be at least 1")]
    ZeroCapacity,

    /// Underlying semaphore was closed
    #[error("concurrency gate closed: {0}")]
    Closed(String),
}
