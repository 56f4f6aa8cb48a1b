//! Tenant scoping of snapshot reads.
//!
//! The snapshot cache holds every tenant's rows unfiltered; these pure
//! functions are the only tenant-isolation enforcement on the read path.
//! Every call site that hands snapshot rows to anything outside the
//! engine must pass them through here first.

use crate::models::Transaction;
use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

/// Restrict snapshot rows to the tenants the requesting principal is
/// authorized for. Rows outside `authorized` are never returned and never
/// logged.
pub fn authorized_rows(rows: &[Transaction], authorized: &HashSet<Uuid>) -> Vec<Transaction> {
    if authorized.is_empty() {
        return Vec::new();
    }
    rows.iter()
        .filter(|row| authorized.contains(&row.tenant_id))
        .cloned()
        .collect()
}

/// Tenant filter plus an optional inclusive reporting window on the
/// transaction date. `None` bounds leave that side open.
pub fn authorized_rows_between(
    rows: &[Transaction],
    authorized: &HashSet<Uuid>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Vec<Transaction> {
    if authorized.is_empty() {
        return Vec::new();
    }
    rows.iter()
        .filter(|row| authorized.contains(&row.tenant_id))
        .filter(|row| from.map_or(true, |d| row.transaction_date >= d))
        .filter(|row| to.map_or(true, |d| row.transaction_date <= d))
        .cloned()
        .collect()
}
