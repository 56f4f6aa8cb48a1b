//! Backing-store seam for the cache, detector and import coordinator.

use crate::models::{DuplicateDecision, Transaction, TransactionCandidate};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// The relational store the engine reads and writes through.
///
/// The cache performs one unfiltered bulk read per refresh; the duplicate
/// detector always queries the store directly (strict read-after-write,
/// bypassing the snapshot). Production binds this to [`super::Database`];
/// tests substitute an in-memory implementation.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Bulk read of every transaction across all tenants, for a snapshot
    /// rebuild.
    async fn load_all_transactions(&self) -> Result<Vec<Transaction>, AppError>;

    /// Exact-triple duplicate lookup bounded to `since..`, most recently
    /// persisted match first.
    async fn find_by_reference_date_amount(
        &self,
        reference: &str,
        date: NaiveDate,
        amount: Decimal,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError>;

    /// Persist a candidate; the store assigns `transaction_id` and
    /// `created_utc`.
    async fn insert_transaction(
        &self,
        candidate: &TransactionCandidate,
    ) -> Result<Transaction, AppError>;

    /// Append a duplicate decision audit record.
    async fn record_decision(&self, decision: &DuplicateDecision) -> Result<(), AppError>;

    /// Look up the decision already taken for an import, if any.
    async fn find_decision_by_import(
        &self,
        import_id: Uuid,
    ) -> Result<Option<DuplicateDecision>, AppError>;
}
