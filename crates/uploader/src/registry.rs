//! Process-wide exclusivity of upload targets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use appvault_protocol::UploadTarget;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Targets with an upload in flight.
///
/// Clones share the same map. Inject one registry into every orchestrator
/// that must not race for the same target.
#[derive(Debug, Clone, Default)]
pub struct UploadRegistry {
    inner: Arc<Mutex<HashMap<UploadTarget, DateTime<Utc>>>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `target`. Returns `None` if another upload holds it.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_acquire(&self, target: &UploadTarget) -> Option<UploadGuard> {
        let mut map = self.lock();
        if map.contains_key(target) {
            return None;
        }
        map.insert(target.clone(), Utc::now());
        debug!(target = %target, "upload target acquired");
        Some(UploadGuard {
            registry: self.clone(),
            target: target.clone(),
        })
    }

    /// Whether an upload to `target` is in flight.
    pub fn is_active(&self, target: &UploadTarget) -> bool {
        self.lock().contains_key(target)
    }

    /// Targets currently held, with the time each was claimed.
    pub fn active(&self) -> Vec<(UploadTarget, DateTime<Utc>)> {
        self.lock()
            .iter()
            .map(|(t, at)| (t.clone(), *at))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UploadTarget, DateTime<Utc>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds a target claim; releases it on drop.
#[derive(Debug)]
pub struct UploadGuard {
    registry: UploadRegistry,
    target: UploadTarget,
}

impl UploadGuard {
    pub fn target(&self) -> &UploadTarget {
        &self.target
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.target);
        debug!(target = %self.target, "upload target released");
    }
}
