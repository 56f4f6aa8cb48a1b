//! PostgreSQL backing store for transaction-service.

use crate::models::{DuplicateDecision, Transaction, TransactionCandidate};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::TransactionStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "transaction-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for Database {
    #[instrument(skip(self))]
    async fn load_all_transactions(&self) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_all_transactions"])
            .start_timer();

        // One unfiltered read across all tenants per snapshot rebuild.
        // Tenant scoping happens at the read boundary, never here.
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT transaction_id, tenant_id, transaction_date, amount, description, debit_account, credit_account, reference_number, identity_key1, identity_key2, identity_key3, source_artifact, created_utc
            FROM transactions
            ORDER BY transaction_date, created_utc
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load transactions: {}", e))
        })?;

        timer.observe_duration();
        info!(row_count = rows.len(), "Loaded transaction snapshot rows");

        Ok(rows)
    }

    #[instrument(skip(self, amount), fields(date = %date, since = %since))]
    async fn find_by_reference_date_amount(
        &self,
        reference: &str,
        date: NaiveDate,
        amount: Decimal,
        since: NaiveDate,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_reference_date_amount"])
            .start_timer();

        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT transaction_id, tenant_id, transaction_date, amount, description, debit_account, credit_account, reference_number, identity_key1, identity_key2, identity_key3, source_artifact, created_utc
            FROM transactions
            WHERE reference_number = $1 AND transaction_date = $2 AND amount = $3 AND transaction_date >= $4
            ORDER BY created_utc DESC, transaction_id DESC
            "#,
        )
        .bind(reference)
        .bind(date)
        .bind(amount)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to query duplicates: {}", e))
        })?;

        timer.observe_duration();

        Ok(rows)
    }

    #[instrument(skip(self, candidate), fields(tenant_id = %candidate.tenant_id))]
    async fn insert_transaction(
        &self,
        candidate: &TransactionCandidate,
    ) -> Result<Transaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();

        let transaction_id = Uuid::new_v4();

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (transaction_id, tenant_id, transaction_date, amount, description, debit_account, credit_account, reference_number, identity_key1, identity_key2, identity_key3, source_artifact)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING transaction_id, tenant_id, transaction_date, amount, description, debit_account, credit_account, reference_number, identity_key1, identity_key2, identity_key3, source_artifact, created_utc
            "#,
        )
        .bind(transaction_id)
        .bind(candidate.tenant_id)
        .bind(candidate.transaction_date)
        .bind(candidate.amount)
        .bind(&candidate.description)
        .bind(&candidate.debit_account)
        .bind(&candidate.credit_account)
        .bind(&candidate.reference_number)
        .bind(&candidate.identity_key1)
        .bind(&candidate.identity_key2)
        .bind(&candidate.identity_key3)
        .bind(&candidate.source_artifact)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::InsertFailed(anyhow::anyhow!("Failed to insert transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(transaction_id = %transaction.transaction_id, "Transaction inserted");

        Ok(transaction)
    }

    #[instrument(skip(self, decision), fields(import_id = %decision.import_id))]
    async fn record_decision(&self, decision: &DuplicateDecision) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_decision"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO import_decisions (decision_id, import_id, tenant_id, matched_transaction_id, decision, matched_reference, new_artifact, decided_by, decided_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(decision.decision_id)
        .bind(decision.import_id)
        .bind(decision.tenant_id)
        .bind(decision.matched_transaction_id)
        .bind(&decision.decision)
        .bind(&decision.matched_reference)
        .bind(&decision.new_artifact)
        .bind(&decision.decided_by)
        .bind(decision.decided_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record decision: {}", e))
        })?;

        timer.observe_duration();
        info!(
            decision_id = %decision.decision_id,
            decision = %decision.decision,
            "Duplicate decision recorded"
        );

        Ok(())
    }

    #[instrument(skip(self), fields(import_id = %import_id))]
    async fn find_decision_by_import(
        &self,
        import_id: Uuid,
    ) -> Result<Option<DuplicateDecision>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_decision_by_import"])
            .start_timer();

        let decision = sqlx::query_as::<_, DuplicateDecision>(
            r#"
            SELECT decision_id, import_id, tenant_id, matched_transaction_id, decision, matched_reference, new_artifact, decided_by, decided_utc
            FROM import_decisions
            WHERE import_id = $1
            "#,
        )
        .bind(import_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get decision: {}", e)))?;

        timer.observe_duration();

        Ok(decision)
    }
}
