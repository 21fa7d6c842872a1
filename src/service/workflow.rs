//! Extraction workflow
//!
//! Model check, triage, concurrent refinement, merge and a single batch
//! commit. Nothing is written unless every stage before the commit
//! succeeded; a failed commit leaves no record of the run behind.

use std::sync::Arc;

use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

use crate::db::CaseStore;
use crate::model::extraction::{ExtractedHostIoc, ExtractedNetworkIoc, ExtractedTimelineEvent};
use crate::model::{Narrative, RoutingDecision, RunSummary, WorkflowConfig, limits};
use crate::service::evaluation::LlmEvaluator;
use crate::service::extraction::LlmExtractor;
use crate::service::llm::{InferenceClient, InferenceError};
use crate::service::merge::merge_run;
use crate::service::refinement::{Extractors, RefinementController, SessionReport};
use crate::service::triage::TriageRouter;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WorkflowError {
    #[error("Invalid extraction request: {0}")]
    InvalidRequest(String),

    #[error("Model '{0}' is not available on the inference runtime")]
    UnknownModel(String),

    #[error("Inference runtime unavailable during {stage}: {message}")]
    InferenceUnavailable { stage: String, message: String },

    #[error("Failed to commit run {run_id}: {message}")]
    PersistenceWriteFailure { run_id: String, message: String },
}

impl WorkflowError {
    /// Stage (and category, where one applies) that failed
    pub fn stage(&self) -> &str {
        match self {
            WorkflowError::InvalidRequest(_) => "request",
            WorkflowError::UnknownModel(_) => "model_validation",
            WorkflowError::InferenceUnavailable { stage, .. } => stage.as_str(),
            WorkflowError::PersistenceWriteFailure { .. } => "commit",
        }
    }

    fn inference(stage: impl Into<String>, error: InferenceError) -> Self {
        match error {
            InferenceError::UnknownModel(model) => WorkflowError::UnknownModel(model),
            InferenceError::Unavailable(message) => WorkflowError::InferenceUnavailable {
                stage: stage.into(),
                message,
            },
            InferenceError::Parse { reason, .. } => WorkflowError::InferenceUnavailable {
                stage: stage.into(),
                message: reason,
            },
        }
    }
}

/// One extraction request
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub case_id: String,
    pub narrative_text: String,
    /// Falls back to the configured default model
    pub model_name: Option<String>,
}

/// Result of a committed workflow run
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub run_id: String,
    pub model: String,
    pub routing: RoutingDecision,
    pub summary: RunSummary,
    pub sessions: Vec<SessionReport>,
}

pub struct ExtractionWorkflow {
    client: InferenceClient,
    store: Arc<dyn CaseStore>,
    config: WorkflowConfig,
}

impl ExtractionWorkflow {
    pub fn new(client: InferenceClient, store: Arc<dyn CaseStore>, config: WorkflowConfig) -> Self {
        tracing::info!(
            max_iterations = config.max_iterations(),
            deadline_secs = config.deadline_secs,
            default_model = %config.default_model,
            "Extraction workflow initialized"
        );
        Self {
            client,
            store,
            config,
        }
    }

    /// Run the whole workflow for one narrative
    ///
    /// Dropping the returned future cancels every in-flight session; the
    /// commit happens only after all sessions are done.
    pub async fn run(&self, request: ExtractionRequest) -> Result<WorkflowReport, WorkflowError> {
        let narrative = validate_request(&request)?;
        let model = request
            .model_name
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.default_model)
            .to_string();
        let run_id = Uuid::new_v4().to_string();
        let start_time = std::time::Instant::now();
        let deadline = Instant::now() + self.config.deadline();

        tracing::info!(
            case_id = %narrative.case_id,
            run_id = %run_id,
            model = %model,
            narrative_length = narrative.text.len(),
            "Starting extraction workflow"
        );

        timeout_at(deadline, self.client.ensure_model(&model))
            .await
            .map_err(|_| WorkflowError::InferenceUnavailable {
                stage: "model_validation".to_string(),
                message: "request deadline reached before the model list was returned".to_string(),
            })?
            .map_err(|e| WorkflowError::inference("model_validation", e))?;

        let router = TriageRouter::new(self.client.clone());
        let triage = router.route(&narrative, &model);
        let routing = match timeout_at(deadline, triage).await {
            Ok(routing) => routing.map_err(|e| WorkflowError::inference("triage", e))?,
            Err(_) => {
                tracing::warn!(
                    case_id = %narrative.case_id,
                    run_id = %run_id,
                    "Triage did not answer before the deadline, routing to all categories"
                );
                RoutingDecision::fail_open("triage timed out")
            }
        };

        let host = LlmExtractor::<ExtractedHostIoc>::new(self.client.clone(), &model);
        let network = LlmExtractor::<ExtractedNetworkIoc>::new(self.client.clone(), &model);
        let timeline = LlmExtractor::<ExtractedTimelineEvent>::new(self.client.clone(), &model);
        let evaluator = LlmEvaluator::new(self.client.clone(), &model);

        let outcome = RefinementController::from_config(&self.config)
            .run(
                &narrative,
                &routing,
                Extractors {
                    host: &host,
                    network: &network,
                    timeline: &timeline,
                },
                &evaluator,
                deadline,
            )
            .await
            .map_err(|e| WorkflowError::inference(e.task.to_string(), e.source))?;

        let batch = merge_run(&narrative.case_id, &run_id, &outcome);
        let summary = batch.summary();

        if let Err(e) = self.store.write_batch(&batch).await {
            tracing::error!(
                case_id = %narrative.case_id,
                run_id = %run_id,
                error = %e,
                "Failed to commit extraction batch"
            );
            return Err(WorkflowError::PersistenceWriteFailure {
                run_id,
                message: e.to_string(),
            });
        }

        tracing::info!(
            case_id = %narrative.case_id,
            run_id = %run_id,
            host = summary.host,
            network = summary.network,
            timeline = summary.timeline,
            elapsed_ms = start_time.elapsed().as_millis(),
            "Extraction workflow committed"
        );

        Ok(WorkflowReport {
            run_id,
            model,
            routing,
            summary,
            sessions: outcome.reports(),
        })
    }
}

fn validate_request(request: &ExtractionRequest) -> Result<Narrative, WorkflowError> {
    let case_id = request.case_id.trim();
    if case_id.is_empty() {
        return Err(WorkflowError::InvalidRequest(
            "case_id must not be empty".to_string(),
        ));
    }
    if case_id.chars().count() > limits::CASE_ID {
        return Err(WorkflowError::InvalidRequest(format!(
            "case_id must be at most {} characters",
            limits::CASE_ID
        )));
    }
    if let Some(model) = &request.model_name
        && model.trim().chars().count() > limits::MODEL_NAME
    {
        return Err(WorkflowError::InvalidRequest(format!(
            "model_name must be at most {} characters",
            limits::MODEL_NAME
        )));
    }
    if request.narrative_text.trim().is_empty() {
        return Err(WorkflowError::InvalidRequest(
            "narrative_text must not be empty".to_string(),
        ));
    }
    Ok(Narrative::new(case_id, request.narrative_text.clone()))
}
