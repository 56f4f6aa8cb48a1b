//! Import decision workflow.
//!
//! One candidate moves through
//! `Parsed -> Checked -> Inserted` when nothing matches, or
//! `Parsed -> Checked -> AwaitingDecision -> Inserted | CleanedUp` when
//! the duplicate detector finds an existing transaction. The awaiting
//! state is a plain serializable value keyed by `import_id`, parked in an
//! external session store between requests; the decision usually arrives
//! in a later call, possibly never.

use crate::models::{DuplicateDecision, ImportDecision, Transaction, TransactionCandidate};
use crate::services::cache::SnapshotCache;
use crate::services::cleanup::{CleanupManager, CleanupOutcome};
use crate::services::dedup::DuplicateDetector;
use crate::services::metrics::{record_error, record_import_decision};
use crate::services::store::TransactionStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Default window a duplicate decision may stay open.
pub const DEFAULT_DECISION_TIMEOUT_MINUTES: i64 = 30;

/// An import parked in `AwaitingDecision`, serialized across the request
/// boundary by the external session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingImport {
    pub import_id: Uuid,
    pub candidate: TransactionCandidate,
    /// Existing transactions the candidate matched, most recent first.
    pub matches: Vec<Transaction>,
    pub created_utc: DateTime<Utc>,
    pub expires_utc: DateTime<Utc>,
}

impl PendingImport {
    fn new(candidate: TransactionCandidate, matches: Vec<Transaction>, timeout: Duration) -> Self {
        let created_utc = Utc::now();
        Self {
            import_id: Uuid::new_v4(),
            candidate,
            matches,
            created_utc,
            expires_utc: created_utc + timeout,
        }
    }

    /// The match a decision is recorded against.
    pub fn primary_match(&self) -> Option<&Transaction> {
        self.matches.first()
    }

    /// Whether the decision window has lapsed. Expired imports are
    /// cancelled on their next touch; nothing sweeps them in the
    /// background.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_utc
    }

    /// Serialize for the external session store.
    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to serialize: {}", e)))
    }

    /// Resume hook: rebuild from the session store's serialized form.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Invalid pending import payload: {}", e))
        })
    }
}

/// Terminal or parked result of one import step.
#[derive(Debug)]
pub enum ImportOutcome {
    /// Candidate persisted; the cache was invalidated.
    Inserted(Transaction),
    /// Duplicate found; the caller must collect an accept/cancel decision
    /// and come back through [`ImportCoordinator::resolve`].
    AwaitingDecision(PendingImport),
    /// Import cancelled; artifact cleanup ran and the decision is on
    /// record. Nothing was inserted.
    CleanedUp {
        decision: DuplicateDecision,
        cleanup: CleanupOutcome,
    },
    /// A decision for this import already exists; nothing was done.
    AlreadyResolved(DuplicateDecision),
}

pub struct ImportCoordinator {
    store: Arc<dyn TransactionStore>,
    detector: DuplicateDetector,
    cache: Arc<SnapshotCache>,
    cleanup: CleanupManager,
    decision_timeout: Duration,
}

impl ImportCoordinator {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        detector: DuplicateDetector,
        cache: Arc<SnapshotCache>,
        cleanup: CleanupManager,
        decision_timeout: Duration,
    ) -> Self {
        Self {
            store,
            detector,
            cache,
            cleanup,
            decision_timeout,
        }
    }

    /// Run the duplicate check for a parsed candidate and either insert
    /// it or park it for a decision.
    ///
    /// An insert failure leaves nothing half-done: the candidate was not
    /// persisted and the caller may submit it again.
    #[instrument(skip(self, candidate), fields(tenant_id = %candidate.tenant_id))]
    pub async fn submit(&self, candidate: TransactionCandidate) -> Result<ImportOutcome, AppError> {
        let matches = self.detector.find_matches(&candidate).await?;

        if matches.is_empty() {
            let transaction = self.store.insert_transaction(&candidate).await?;
            self.cache.invalidate();
            info!(
                transaction_id = %transaction.transaction_id,
                "Import inserted without duplicate"
            );
            return Ok(ImportOutcome::Inserted(transaction));
        }

        let pending = PendingImport::new(candidate, matches, self.decision_timeout);
        info!(
            import_id = %pending.import_id,
            match_count = pending.matches.len(),
            "Duplicate found, awaiting decision"
        );
        Ok(ImportOutcome::AwaitingDecision(pending))
    }

    /// Apply an accept/cancel decision to a parked import.
    ///
    /// Replayed decisions short-circuit on the recorded outcome; expired
    /// imports are forced to cancel no matter what the caller chose. An
    /// insert failure on accept surfaces to the caller and leaves the
    /// pending import valid for a retry.
    #[instrument(skip(self, pending), fields(import_id = %pending.import_id))]
    pub async fn resolve(
        &self,
        pending: &PendingImport,
        decision: ImportDecision,
        decided_by: &str,
    ) -> Result<ImportOutcome, AppError> {
        if let Some(existing) = self.store.find_decision_by_import(pending.import_id).await? {
            info!(
                decision = %existing.decision,
                "Import already resolved, ignoring repeated decision"
            );
            return Ok(ImportOutcome::AlreadyResolved(existing));
        }

        let primary = pending.primary_match().ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Pending import carries no matches"))
        })?;

        let decision = if pending.is_expired() && decision == ImportDecision::Accept {
            warn!("Decision window lapsed, forcing cancel");
            ImportDecision::Cancel
        } else {
            decision
        };

        match decision {
            ImportDecision::Accept => {
                let transaction = self.store.insert_transaction(&pending.candidate).await?;
                self.record_decision(pending, primary, ImportDecision::Accept, decided_by)
                    .await;
                self.cache.invalidate();
                record_import_decision("accept");
                info!(
                    transaction_id = %transaction.transaction_id,
                    "Duplicate accepted and inserted"
                );
                Ok(ImportOutcome::Inserted(transaction))
            }
            ImportDecision::Cancel => {
                let new_locator = pending.candidate.source_artifact.as_deref().unwrap_or("");
                let existing_locator = primary.source_artifact.as_deref().unwrap_or("");
                let cleanup = self.cleanup.cleanup(new_locator, existing_locator).await;

                let decision_record = self
                    .record_decision(pending, primary, ImportDecision::Cancel, decided_by)
                    .await;
                record_import_decision("cancel");
                info!(cleanup = ?cleanup, "Duplicate import cancelled");
                Ok(ImportOutcome::CleanedUp {
                    decision: decision_record,
                    cleanup,
                })
            }
        }
    }

    /// Lazy-expiry hook: cancel an import whose session lapsed or was
    /// dropped. Equivalent to resolving with cancel.
    #[instrument(skip(self, pending), fields(import_id = %pending.import_id))]
    pub async fn abandon(
        &self,
        pending: &PendingImport,
        decided_by: &str,
    ) -> Result<ImportOutcome, AppError> {
        self.resolve(pending, ImportDecision::Cancel, decided_by)
            .await
    }

    /// Build and persist the audit record. Persist failures are soft: the
    /// business effect (insert or cleanup) already happened, so the
    /// failure is logged and counted, never propagated.
    async fn record_decision(
        &self,
        pending: &PendingImport,
        primary: &Transaction,
        decision: ImportDecision,
        decided_by: &str,
    ) -> DuplicateDecision {
        let record = DuplicateDecision {
            decision_id: Uuid::new_v4(),
            import_id: pending.import_id,
            tenant_id: pending.candidate.tenant_id,
            matched_transaction_id: primary.transaction_id,
            decision: decision.as_str().to_string(),
            matched_reference: primary.reference_number.clone(),
            new_artifact: pending.candidate.source_artifact.clone(),
            decided_by: decided_by.to_string(),
            decided_utc: Utc::now(),
        };

        if let Err(e) = self.store.record_decision(&record).await {
            error!(error = %e, "Failed to persist duplicate decision record");
            record_error("decision_record");
        }

        record
    }
}
