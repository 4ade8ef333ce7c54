use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Number of voxels visited between two cancellation checks.
pub const SCAN_CHUNK: usize = 100_000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Scan was cancelled")]
pub struct Cancelled;

/// Shared flag checked cooperatively by long voxel scans.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
