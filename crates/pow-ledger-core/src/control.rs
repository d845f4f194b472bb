use crate::MineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stop signal for a nonce search: a shared cancel flag plus an optional
/// deadline. Clones share the flag, so one clone can stop a search running on
/// another thread.
#[derive(Clone, Debug, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// A control sharing this one's cancel flag with a fresh deadline.
    pub fn expiring_in(&self, timeout: Duration) -> Self {
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Once set the flag stays set.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn check(&self) -> Result<(), MineError> {
        if self.is_cancelled() {
            return Err(MineError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(MineError::TimedOut),
            _ => Ok(()),
        }
    }
}
