use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CompressError;

/// Cooperative cancellation token for long-running searches.
///
/// Cloning the token shares the underlying flag, so a caller can hand one
/// clone to the engine and trip the other from any thread. The target-size
/// engine checks the token at every strategy boundary and at every
/// exploration-loop iteration; inner primitives (a single encode, one SSIM
/// pass, one resize) always run to completion once entered.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Err(CompressError::Cancelled)` once tripped.
    pub(crate) fn check(&self) -> Result<(), CompressError> {
        if self.is_cancelled() {
            Err(CompressError::Cancelled)
        } else {
            Ok(())
        }
    }
}
