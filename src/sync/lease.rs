// src/sync/lease.rs
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Process-local set of sources with a run in flight.
///
/// A second run for the same source is refused while the first holds its
/// lease. Leases are released when the guard drops, including on panic.
#[derive(Debug, Clone, Default)]
pub struct SourceLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl SourceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when `source` is already leased.
    pub fn try_acquire(&self, source: &str) -> Option<LeaseGuard> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(source.to_string()) {
            return None;
        }
        Some(LeaseGuard {
            held: self.held.clone(),
            source: source.to_string(),
        })
    }

    pub fn is_held(&self, source: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(source)
    }
}

#[derive(Debug)]
pub struct LeaseGuard {
    held: Arc<Mutex<HashSet<String>>>,
    source: String,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        held.remove(&self.source);
    }
}
