//! Integration tests for artifact cleanup on cancelled imports.

mod common;

use async_trait::async_trait;
use common::init_tracing;
use service_core::error::AppError;
use std::sync::Arc;
use transaction_service::services::{CleanupManager, CleanupOutcome, LocalStorage, Storage};

#[test]
fn should_cleanup_truth_table() {
    // Identical locators: the surviving transaction still references the
    // file.
    assert!(!CleanupManager::should_cleanup(
        "uploads/a.csv",
        "uploads/a.csv"
    ));
    // Empty new locator: nothing to remove.
    assert!(!CleanupManager::should_cleanup("", "uploads/a.csv"));
    assert!(!CleanupManager::should_cleanup("", ""));
    // Distinct locators: safe to remove the new upload.
    assert!(CleanupManager::should_cleanup(
        "uploads/a.csv",
        "uploads/b.csv"
    ));
    // Existing transaction without an artifact still allows removal.
    assert!(CleanupManager::should_cleanup("uploads/a.csv", ""));
}

#[tokio::test]
async fn cleanup_removes_the_cancelled_upload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    storage
        .upload("uploads/cancelled.csv", b"a;b;c".to_vec())
        .await
        .unwrap();
    let manager = CleanupManager::new(storage);

    let outcome = manager
        .cleanup("uploads/cancelled.csv", "uploads/kept.csv")
        .await;

    assert_eq!(outcome, CleanupOutcome::Removed);
    assert!(!dir.path().join("uploads/cancelled.csv").exists());
}

#[tokio::test]
async fn deleting_an_absent_artifact_is_not_an_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    let manager = CleanupManager::new(storage.clone());

    // Nothing was ever uploaded under this key.
    let outcome = manager.cleanup("uploads/ghost.csv", "uploads/other.csv").await;
    assert_eq!(outcome, CleanupOutcome::Removed);

    // And the raw storage delete is idempotent as well.
    storage.delete("uploads/ghost.csv").await.unwrap();
}

#[tokio::test]
async fn shared_artifact_is_never_deleted() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    storage
        .upload("uploads/shared.csv", b"a;b;c".to_vec())
        .await
        .unwrap();
    let manager = CleanupManager::new(storage);

    let outcome = manager
        .cleanup("uploads/shared.csv", "uploads/shared.csv")
        .await;

    assert_eq!(outcome, CleanupOutcome::Skipped);
    assert!(dir.path().join("uploads/shared.csv").exists());
}

/// Storage backend that always fails, for the soft-error contract.
struct BrokenStorage;

#[async_trait]
impl Storage for BrokenStorage {
    async fn upload(&self, _key: &str, _data: Vec<u8>) -> Result<(), AppError> {
        Err(AppError::InternalError(anyhow::anyhow!("backend down")))
    }

    async fn delete(&self, _key: &str) -> Result<(), AppError> {
        Err(AppError::InternalError(anyhow::anyhow!("backend down")))
    }
}

#[tokio::test]
async fn cleanup_failure_is_soft_and_reported() {
    init_tracing();
    let manager = CleanupManager::new(Arc::new(BrokenStorage));

    // No panic, no Err: the decision workflow must keep going.
    let outcome = manager.cleanup("uploads/a.csv", "uploads/b.csv").await;
    assert!(matches!(outcome, CleanupOutcome::Failed(_)));
}
