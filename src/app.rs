//! Application state and service initialization
//!
//! This module centralizes service initialization and dependency injection
//! for the Actix-web handlers.

use std::sync::Arc;

use actix_web::web;
use sqlx::PgPool;

use crate::db::CaseStore;
use crate::db::repository::CaseRepository;
use crate::model::{Config, WorkflowConfig};
use crate::service::{ExtractionWorkflow, InferenceClient, OllamaRuntime};

/// Application state containing all services and shared resources
pub struct AppState {
    /// Database connection pool
    pub db_pool: PgPool,
    /// Case artifact store backed by the pool
    pub store: Arc<dyn CaseStore>,
    /// Shared inference client
    pub inference: InferenceClient,
    /// Extraction workflow
    pub workflow: Arc<ExtractionWorkflow>,
    pub workflow_config: WorkflowConfig,
}

impl AppState {
    /// Initialize all services and build application state
    ///
    /// This performs:
    /// 1. Database connection and schema initialization
    /// 2. Inference runtime client setup (`OLLAMA_HOST`)
    /// 3. Workflow construction
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let db_pool = crate::db::create_pool()
            .await
            .map_err(|e| AppError::DatabaseInit(e.to_string()))?;

        crate::db::init_schema(&db_pool)
            .await
            .map_err(|e| AppError::DatabaseInit(e.to_string()))?;

        let runtime = OllamaRuntime::new(&config.inference)
            .map_err(|e| AppError::InvalidConfig(e.to_string()))?;
        let inference = InferenceClient::new(Arc::new(runtime));

        // The runtime may come up after us; requests fail with 502 until it does
        match inference.list_models().await {
            Ok(models) => tracing::info!(models = ?models, "Inference runtime reachable"),
            Err(e) => tracing::warn!(error = %e, "Inference runtime not reachable at startup"),
        }

        let store: Arc<dyn CaseStore> = Arc::new(CaseRepository::new(db_pool.clone()));

        let workflow = Arc::new(ExtractionWorkflow::new(
            inference.clone(),
            Arc::clone(&store),
            config.workflow.clone(),
        ));

        Ok(Self {
            db_pool,
            store,
            inference,
            workflow,
            workflow_config: config.workflow,
        })
    }

    /// Register shared state with an Actix app
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.db_pool.clone()))
            .app_data(web::Data::from(Arc::clone(&self.store)))
            .app_data(web::Data::new(self.inference.clone()))
            .app_data(web::Data::from(Arc::clone(&self.workflow)))
            .app_data(web::Data::new(self.workflow_config.clone()));
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    /// Database initialization failed
    #[error("Database initialization failed: {0}")]
    DatabaseInit(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
