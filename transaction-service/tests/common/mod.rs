//! Common test utilities for transaction-service integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use transaction_service::models::{DuplicateDecision, Transaction, TransactionCandidate};
use transaction_service::services::store::TransactionStore;
use transaction_service::services::{
    CleanupManager, DuplicateDetector, ImportCoordinator, LocalStorage, SnapshotCache,
};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,transaction_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory [`TransactionStore`] standing in for the relational backing
/// store: the engine suites run hermetically against it. Counts load
/// attempts and injects failures/latency on demand.
pub struct MemoryStore {
    rows: Mutex<Vec<Transaction>>,
    decisions: Mutex<Vec<DuplicateDecision>>,
    load_attempts: AtomicUsize,
    fail_loads: AtomicBool,
    fail_inserts: AtomicBool,
    load_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            decisions: Mutex::new(Vec::new()),
            load_attempts: AtomicUsize::new(0),
            fail_loads: AtomicBool::new(false),
            fail_inserts: AtomicBool::new(false),
            load_delay: Mutex::new(None),
        })
    }

    pub fn seed(&self, rows: Vec<Transaction>) {
        self.rows.lock().unwrap().extend(rows);
    }

    pub fn replace_all(&self, rows: Vec<Transaction>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.rows.lock().unwrap().clone()
    }

    pub fn decisions(&self) -> Vec<DuplicateDecision> {
        self.decisions.lock().unwrap().clone()
    }

    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn load_all_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected load failure"
            )));
        }

        Ok(self.rows.lock().unwrap().clone())
    }

    async fn find_by_reference_date_amount(
        &self,
        reference: &str,
        date: NaiveDate,
        amount: Decimal,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut matches: Vec<Transaction> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| {
                row.reference_number == reference
                    && row.transaction_date == date
                    && row.amount == amount
                    && row.transaction_date >= since
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.created_utc
                .cmp(&a.created_utc)
                .then(b.transaction_id.cmp(&a.transaction_id))
        });
        Ok(matches)
    }

    async fn insert_transaction(
        &self,
        candidate: &TransactionCandidate,
    ) -> Result<Transaction, AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::InsertFailed(anyhow::anyhow!(
                "injected insert failure"
            )));
        }

        let transaction = Transaction {
            transaction_id: Uuid::new_v4(),
            tenant_id: candidate.tenant_id,
            transaction_date: candidate.transaction_date,
            amount: candidate.amount,
            description: candidate.description.clone(),
            debit_account: candidate.debit_account.clone(),
            credit_account: candidate.credit_account.clone(),
            reference_number: candidate.reference_number.clone(),
            identity_key1: candidate.identity_key1.clone(),
            identity_key2: candidate.identity_key2.clone(),
            identity_key3: candidate.identity_key3.clone(),
            source_artifact: candidate.source_artifact.clone(),
            created_utc: Utc::now(),
        };
        self.rows.lock().unwrap().push(transaction.clone());
        Ok(transaction)
    }

    async fn record_decision(&self, decision: &DuplicateDecision) -> Result<(), AppError> {
        let mut decisions = self.decisions.lock().unwrap();
        // Mirrors the UNIQUE (import_id) constraint.
        if decisions.iter().any(|d| d.import_id == decision.import_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "decision already recorded for import"
            )));
        }
        decisions.push(decision.clone());
        Ok(())
    }

    async fn find_decision_by_import(
        &self,
        import_id: Uuid,
    ) -> Result<Option<DuplicateDecision>, AppError> {
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.import_id == import_id)
            .cloned())
    }
}

/// Build a persisted transaction for seeding.
pub fn transaction(tenant_id: Uuid, reference: &str, date: &str, amount: &str) -> Transaction {
    Transaction {
        transaction_id: Uuid::new_v4(),
        tenant_id,
        transaction_date: parse_date(date),
        amount: parse_amount(amount),
        description: format!("Seeded transaction {}", reference),
        debit_account: "1100".to_string(),
        credit_account: "2000".to_string(),
        reference_number: reference.to_string(),
        identity_key1: None,
        identity_key2: None,
        identity_key3: None,
        source_artifact: None,
        created_utc: Utc::now(),
    }
}

/// Build an import candidate the way a format parser would.
pub fn candidate(tenant_id: Uuid, reference: &str, date: &str, amount: &str) -> TransactionCandidate {
    TransactionCandidate {
        tenant_id,
        transaction_date: parse_date(date),
        amount: parse_amount(amount),
        description: format!("Imported line {}", reference),
        debit_account: "1100".to_string(),
        credit_account: "2000".to_string(),
        reference_number: reference.to_string(),
        identity_key1: None,
        identity_key2: None,
        identity_key3: None,
        source_artifact: None,
    }
}

pub fn parse_date(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("invalid test date")
}

pub fn parse_amount(amount: &str) -> Decimal {
    Decimal::from_str(amount).expect("invalid test amount")
}

/// Wire a coordinator over the in-memory store, with artifact storage
/// rooted at `artifact_root` and the given decision window.
pub async fn build_coordinator(
    store: Arc<MemoryStore>,
    artifact_root: &std::path::Path,
    decision_timeout: chrono::Duration,
) -> (ImportCoordinator, Arc<SnapshotCache>) {
    let store: Arc<dyn TransactionStore> = store;
    let cache = Arc::new(SnapshotCache::new(
        store.clone(),
        Duration::from_secs(30 * 60),
    ));
    let storage = Arc::new(
        LocalStorage::new(artifact_root)
            .await
            .expect("artifact root"),
    );
    let coordinator = ImportCoordinator::new(
        store.clone(),
        DuplicateDetector::new(store.clone(), 730),
        cache.clone(),
        CleanupManager::new(storage),
        decision_timeout,
    );
    (coordinator, cache)
}
