use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::job::JobUpdate;
use crate::models::variant::NewVariant;

/// Job and variant bookkeeping consumed by the orchestrator.
#[async_trait]
pub trait JobLedger: Send + Sync {
    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> Result<(), LedgerError>;

    async fn insert_variant(&self, variant: &NewVariant) -> Result<(), LedgerError>;
}

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLedger for PgLedger {
    async fn update_job(&self, job_id: Uuid, update: &JobUpdate) -> Result<(), LedgerError> {
        let rows = queries::update_job(&self.pool, job_id, update).await?;
        if rows == 0 {
            // Missing row or already terminal; the SQL refuses both.
            return Err(LedgerError::Rejected(job_id));
        }
        Ok(())
    }

    async fn insert_variant(&self, variant: &NewVariant) -> Result<(), LedgerError> {
        queries::insert_variant(&self.pool, variant).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {0} does not exist or is already in a terminal state")]
    Rejected(Uuid),
}
