//! Canonical transaction model shared by the cache and the import pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted ledger transaction.
///
/// The sign of `amount` encodes direction relative to the two account
/// codes. `reference_number` is the primary business reference and the
/// first duplicate-matching key; the three identity keys carry whatever
/// format-specific references the ingesting parser assigned (bank
/// transaction reference, account IBAN, card product name, ...).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub debit_account: String,
    pub credit_account: String,
    pub reference_number: String,
    pub identity_key1: Option<String>,
    pub identity_key2: Option<String>,
    pub identity_key3: Option<String>,
    pub source_artifact: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Transaction {
    /// The format-dependent secondary keys, in slot order.
    pub fn identity_keys(&self) -> [Option<&str>; 3] {
        [
            self.identity_key1.as_deref(),
            self.identity_key2.as_deref(),
            self.identity_key3.as_deref(),
        ]
    }
}

/// A not-yet-persisted transaction produced by a format-specific parser.
///
/// Identical to [`Transaction`] minus the store-assigned id and creation
/// timestamp. Serializable so an import awaiting a duplicate decision can
/// park in the session store across a request boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCandidate {
    pub tenant_id: Uuid,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub debit_account: String,
    pub credit_account: String,
    pub reference_number: String,
    pub identity_key1: Option<String>,
    pub identity_key2: Option<String>,
    pub identity_key3: Option<String>,
    pub source_artifact: Option<String>,
}

impl TransactionCandidate {
    /// The key the duplicate detector matches on, or `None` when the
    /// parser left the primary reference empty.
    pub fn matching_reference(&self) -> Option<&str> {
        let trimmed = self.reference_number.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}
