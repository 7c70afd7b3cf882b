//! Upload lock

use std::sync::Arc;

use integrity_events::LockFamily;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One single-permit semaphore per lock family.
///
/// The permit is released when dropped, on success and failure alike.
#[derive(Debug, Clone)]
pub struct UploadLock {
    evidence: Arc<Semaphore>,
}

impl UploadLock {
    pub fn new() -> Self {
        Self {
            evidence: Arc::new(Semaphore::new(1)),
        }
    }

    fn semaphore(&self, family: LockFamily) -> &Arc<Semaphore> {
        match family {
            LockFamily::Evidence => &self.evidence,
        }
    }

    /// Take the family's permit, `None` if a cycle is already in flight
    pub fn try_acquire(&self, family: LockFamily) -> Option<OwnedSemaphorePermit> {
        self.semaphore(family).clone().try_acquire_owned().ok()
    }

    pub fn is_held(&self, family: LockFamily) -> bool {
        self.semaphore(family).available_permits() == 0
    }
}

impl Default for UploadLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_permit_released_on_drop() {
        let lock = UploadLock::new();
        let permit = lock.try_acquire(LockFamily::Evidence).unwrap();
        assert!(lock.is_held(LockFamily::Evidence));
        assert!(lock.try_acquire(LockFamily::Evidence).is_none());

        drop(permit);
        assert!(!lock.is_held(LockFamily::Evidence));
        assert!(lock.try_acquire(LockFamily::Evidence).is_some());
    }

    #[test]
    fn test_clones_share_permit() {
        let lock = UploadLock::new();
        let other = lock.clone();
        let _permit = lock.try_acquire(LockFamily::Evidence).unwrap();
        assert!(other.try_acquire(LockFamily::Evidence).is_none());
    }
}
