//! Database module for PostgreSQL persistence of case artifacts

pub mod models;
pub mod repository;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::env;

use crate::model::{CaseData, CommitBatch};

// Environment variable names
const ENV_POSTGRES_HOST: &str = "IOC_AGENT_POSTGRES_HOST";
const ENV_POSTGRES_PORT: &str = "IOC_AGENT_POSTGRES_PORT";
const ENV_POSTGRES_USER: &str = "IOC_AGENT_POSTGRES_USER";
const ENV_POSTGRES_PASSWORD: &str = "IOC_AGENT_POSTGRES_PASSWORD";
const ENV_POSTGRES_DB: &str = "IOC_AGENT_POSTGRES_DB";

// Default values
const DEFAULT_POSTGRES_HOST: &str = "127.0.0.1";
const DEFAULT_POSTGRES_PORT: &str = "5432";
const DEFAULT_POSTGRES_USER: &str = "incident_notebook";
const DEFAULT_POSTGRES_PASSWORD: &str = "incident_notebook";
const DEFAULT_POSTGRES_DB: &str = "incident_notebook";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistence collaborator for committed case artifacts
///
/// `write_batch` is all-or-nothing: after an error no record of the batch
/// may be visible to `read_case_data`.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn write_batch(&self, batch: &CommitBatch) -> Result<(), DbError>;

    async fn read_case_data(&self, case_id: &str) -> Result<CaseData, DbError>;
}

/// Create a new database connection pool
pub async fn create_pool() -> Result<PgPool, DbError> {
    let host = env::var(ENV_POSTGRES_HOST).unwrap_or_else(|_| DEFAULT_POSTGRES_HOST.to_string());
    let port = env::var(ENV_POSTGRES_PORT).unwrap_or_else(|_| DEFAULT_POSTGRES_PORT.to_string());
    let user = env::var(ENV_POSTGRES_USER).unwrap_or_else(|_| DEFAULT_POSTGRES_USER.to_string());
    let password =
        env::var(ENV_POSTGRES_PASSWORD).unwrap_or_else(|_| DEFAULT_POSTGRES_PASSWORD.to_string());
    let database = env::var(ENV_POSTGRES_DB).unwrap_or_else(|_| DEFAULT_POSTGRES_DB.to_string());

    let database_url = format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, database
    );

    tracing::debug!(host = %host, port = %port, database = %database, "Connecting to PostgreSQL");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    tracing::info!(host = %host, port = %port, "PostgreSQL connection established");

    Ok(pool)
}

/// Initialize database schema
///
/// Column widths come from `model::limits`, which record validation enforces.
pub async fn init_schema(pool: &PgPool) -> Result<(), DbError> {
    use crate::model::limits::*;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS host_ioc (
            indicator_id VARCHAR({RECORD_ID}) PRIMARY KEY,
            case_id VARCHAR({CASE_ID}) NOT NULL,
            run_id VARCHAR({RECORD_ID}) NOT NULL,
            indicator_type VARCHAR({INDICATOR_TYPE}) NOT NULL,
            indicator VARCHAR({INDICATOR}) NOT NULL,
            full_path VARCHAR({FULL_PATH}),
            sha256 VARCHAR({SHA256}),
            sha1 VARCHAR({SHA1}),
            md5 VARCHAR({MD5}),
            type_purpose VARCHAR({TYPE_PURPOSE}),
            size_bytes BIGINT,
            source VARCHAR({SOURCE}) NOT NULL,
            submitted_by VARCHAR({SUBMITTED_BY}),
            notes TEXT,
            status VARCHAR(32) NOT NULL,
            capability VARCHAR(32) NOT NULL,
            iteration INTEGER NOT NULL,
            model VARCHAR({MODEL_NAME}) NOT NULL,
            date_added TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS network_ioc (
            indicator_id VARCHAR({RECORD_ID}) PRIMARY KEY,
            case_id VARCHAR({CASE_ID}) NOT NULL,
            run_id VARCHAR({RECORD_ID}) NOT NULL,
            indicator_type VARCHAR({INDICATOR_TYPE}) NOT NULL,
            indicator VARCHAR({INDICATOR}) NOT NULL,
            initial_lead VARCHAR({INITIAL_LEAD}),
            details_comments TEXT,
            earliest_evidence_utc TIMESTAMPTZ,
            attack_alignment VARCHAR({ATTACK_ALIGNMENT}),
            source VARCHAR({SOURCE}) NOT NULL,
            submitted_by VARCHAR({SUBMITTED_BY}),
            notes TEXT,
            status VARCHAR(32) NOT NULL,
            capability VARCHAR(32) NOT NULL,
            iteration INTEGER NOT NULL,
            model VARCHAR({MODEL_NAME}) NOT NULL,
            date_added TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS timeline (
            event_id VARCHAR({RECORD_ID}) PRIMARY KEY,
            case_id VARCHAR({CASE_ID}) NOT NULL,
            run_id VARCHAR({RECORD_ID}) NOT NULL,
            timestamp_utc TIMESTAMPTZ NOT NULL,
            timestamp_type VARCHAR({TIMESTAMP_TYPE}) NOT NULL,
            status_tag VARCHAR({STATUS_TAG}) NOT NULL,
            system_name VARCHAR({SYSTEM_NAME}) NOT NULL,
            activity VARCHAR({ACTIVITY}) NOT NULL,
            evidence_source VARCHAR({EVIDENCE_SOURCE}) NOT NULL,
            details_comments TEXT,
            attack_alignment VARCHAR({ATTACK_ALIGNMENT}),
            size_bytes BIGINT,
            hash VARCHAR({HASH}),
            submitted_by VARCHAR({SUBMITTED_BY}),
            notes TEXT,
            status VARCHAR(32) NOT NULL,
            capability VARCHAR(32) NOT NULL,
            iteration INTEGER NOT NULL,
            model VARCHAR({MODEL_NAME}) NOT NULL,
            date_added TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ))
    .execute(pool)
    .await?;

    // Create indexes separately
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_host_ioc_case_id ON host_ioc(case_id)",
        "CREATE INDEX IF NOT EXISTS idx_network_ioc_case_id ON network_ioc(case_id)",
        "CREATE INDEX IF NOT EXISTS idx_timeline_case_id ON timeline(case_id)",
        "CREATE INDEX IF NOT EXISTS idx_timeline_timestamp_utc ON timeline(timestamp_utc)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database schema initialized");

    Ok(())
}
