//! Import-time duplicate detection.
//!
//! "The same financial event" means an exact match on the triple
//! `(reference_number, transaction_date, amount)`: never a fuzzy match,
//! and never a match on the secondary identity keys alone. Formats that
//! map a shared value (a card product name, an account IBAN) into the
//! slot used for matching would flag every line of a batch as a duplicate
//! of the first; keying on the parser-assigned primary reference keeps
//! that failure out of the detector.

use crate::models::{Transaction, TransactionCandidate};
use crate::services::metrics::record_duplicate_check;
use crate::services::store::TransactionStore;
use chrono::{Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Default lookback window: two years.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 730;

/// Read-only matcher over the backing store. Always queries the store
/// directly, since duplicate checks need strict read-after-write and the
/// snapshot cache does not provide it.
pub struct DuplicateDetector {
    store: Arc<dyn TransactionStore>,
    lookback_days: i64,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn TransactionStore>, lookback_days: i64) -> Self {
        Self {
            store,
            lookback_days,
        }
    }

    /// Persisted transactions that are the same event as `candidate`,
    /// most recently persisted first. Usually empty or one element; more
    /// when a source format assigned a non-unique primary reference.
    ///
    /// Candidates without a primary reference are never matched: a missed
    /// duplicate is recoverable by the importing user, an over-match that
    /// blocks a legitimate batch is not.
    #[instrument(skip(self, candidate), fields(tenant_id = %candidate.tenant_id))]
    pub async fn find_matches(
        &self,
        candidate: &TransactionCandidate,
    ) -> Result<Vec<Transaction>, AppError> {
        let Some(reference) = candidate.matching_reference() else {
            warn!("Candidate has no reference number, skipping duplicate check");
            record_duplicate_check("unkeyed");
            return Ok(Vec::new());
        };

        let since = Utc::now().date_naive() - Duration::days(self.lookback_days);

        let rows = self
            .store
            .find_by_reference_date_amount(
                reference,
                candidate.transaction_date,
                candidate.amount,
                since,
            )
            .await?;

        // The store query already keys on the triple; re-verify here so a
        // collation-lenient backend cannot widen the match.
        let matches: Vec<Transaction> = rows
            .into_iter()
            .filter(|row| {
                row.reference_number == reference
                    && row.transaction_date == candidate.transaction_date
                    && row.amount == candidate.amount
            })
            .collect();

        record_duplicate_check(match matches.len() {
            0 => "none",
            1 => "match",
            _ => "ambiguous",
        });

        Ok(matches)
    }
}
