//! Artifact cleanup for cancelled imports.

use crate::services::metrics::{record_cleanup, record_error};
use crate::services::storage::Storage;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What happened to the cancelled import's artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Artifact removed (or was already absent).
    Removed,
    /// Nothing to remove: empty locator, or the surviving transaction
    /// still references the same artifact.
    Skipped,
    /// Removal failed. Soft error: a leaked upload is recoverable by
    /// manual cleanup, so this never breaks the decision workflow.
    Failed(String),
}

pub struct CleanupManager {
    storage: Arc<dyn Storage>,
}

impl CleanupManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Whether the cancelled import's artifact may be deleted. False when
    /// the locator is empty or when the matched transaction points at the
    /// very same artifact. Deleting a shared file is unrecoverable,
    /// leaking one is not.
    pub fn should_cleanup(new_locator: &str, existing_locator: &str) -> bool {
        if new_locator.is_empty() {
            return false;
        }
        new_locator != existing_locator
    }

    /// Remove the cancelled import's artifact when safe. Never errors for
    /// the caller's control flow.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, new_locator: &str, existing_locator: &str) -> CleanupOutcome {
        if !Self::should_cleanup(new_locator, existing_locator) {
            info!("Artifact cleanup skipped, locator empty or shared with existing transaction");
            record_cleanup("skipped");
            return CleanupOutcome::Skipped;
        }

        match self.storage.delete(new_locator).await {
            Ok(()) => {
                info!("Cancelled import artifact removed");
                record_cleanup("removed");
                CleanupOutcome::Removed
            }
            Err(e) => {
                warn!(error = %e, "Artifact cleanup failed");
                record_cleanup("failed");
                record_error("cleanup");
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }
}
