//! Per-document exclusive sections.
//!
//! Locks are created lazily on first use and never removed, so two callers
//! asking for the same filename always share one mutex.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the exclusive section of `filename`.
    pub async fn lock(&self, filename: &str) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(filename.to_string()).or_default().clone();
        mutex.lock_owned().await
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
