//! Duplicate decision audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The user's verdict on an import candidate that matched an existing
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportDecision {
    Accept,
    Cancel,
}

impl ImportDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Cancel => "cancel",
        }
    }

    /// Unknown values fall back to `Cancel`: never insert on ambiguity.
    pub fn from_str(s: &str) -> Self {
        match s {
            "accept" => Self::Accept,
            _ => Self::Cancel,
        }
    }
}

impl std::fmt::Display for ImportDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit entry written whenever a duplicate encounter is resolved.
///
/// One record per import: the record doubles as the idempotency guard
/// against replayed accept/cancel signals for the same import.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DuplicateDecision {
    pub decision_id: Uuid,
    pub import_id: Uuid,
    pub tenant_id: Uuid,
    pub matched_transaction_id: Uuid,
    pub decision: String,
    pub matched_reference: String,
    pub new_artifact: Option<String>,
    pub decided_by: String,
    pub decided_utc: DateTime<Utc>,
}

impl DuplicateDecision {
    pub fn parsed_decision(&self) -> ImportDecision {
        ImportDecision::from_str(&self.decision)
    }
}
