//! Domain models for transaction-service.

#![allow(clippy::should_implement_trait)]

pub mod decision;
pub mod transaction;

pub use decision::{DuplicateDecision, ImportDecision};
pub use transaction::{Transaction, TransactionCandidate};
