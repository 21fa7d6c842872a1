//! REST API endpoint for running the extraction workflow on a narrative

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::workflow_status;
use crate::model::{Category, RunSummary};
use crate::service::refinement::SessionReport;
use crate::service::{ExtractionRequest, ExtractionWorkflow};

/// Request body for an extraction run
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtractRequest {
    /// Free-text incident narrative
    pub narrative_text: String,
    /// Model to use; must be advertised by the inference runtime
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStatus {
    Success,
    Failure,
}

/// Outcome of an extraction run
#[derive(Debug, Serialize, ToSchema)]
pub struct ExtractResponse {
    pub status: ExtractStatus,
    /// Records committed per category; zero on failure
    pub counts: RunSummary,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Failing stage, e.g. `triage` or `extract_network`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Categories the triage router selected
    pub categories: Vec<Category>,
    pub sessions: Vec<SessionReport>,
}

/// Extract host, network and timeline artifacts from a narrative
#[utoipa::path(
    post,
    path = "/v1/cases/{case_id}/extract",
    params(
        ("case_id" = String, Path, description = "Case the narrative belongs to")
    ),
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Artifacts extracted and committed", body = ExtractResponse),
        (status = 400, description = "Invalid request or unknown model", body = ExtractResponse),
        (status = 502, description = "Inference runtime unavailable", body = ExtractResponse),
        (status = 500, description = "Persistence failure", body = ExtractResponse)
    ),
    tag = "extraction"
)]
#[post("/v1/cases/{case_id}/extract")]
pub async fn extract(
    workflow: web::Data<ExtractionWorkflow>,
    path: web::Path<String>,
    body: web::Json<ExtractRequest>,
) -> HttpResponse {
    let case_id = path.into_inner();
    let body = body.into_inner();

    let request = ExtractionRequest {
        case_id: case_id.clone(),
        narrative_text: body.narrative_text,
        model_name: body.model_name,
    };

    match workflow.run(request).await {
        Ok(report) => {
            let summary = report.summary;
            HttpResponse::Ok().json(ExtractResponse {
                status: ExtractStatus::Success,
                counts: summary,
                message: format!(
                    "Extracted {} host IOCs, {} network IOCs and {} timeline events",
                    summary.host, summary.network, summary.timeline
                ),
                run_id: Some(report.run_id),
                model: Some(report.model),
                stage: None,
                categories: report.routing.routes().iter().map(|r| r.category).collect(),
                sessions: report.sessions,
            })
        }
        Err(e) => {
            tracing::error!(case_id = %case_id, stage = e.stage(), error = %e, "Extraction failed");
            HttpResponse::build(workflow_status(&e))
                .json(ExtractResponse::failure(e.stage(), e.to_string()))
        }
    }
}

impl ExtractResponse {
    fn failure(stage: &str, message: String) -> Self {
        Self {
            status: ExtractStatus::Failure,
            counts: RunSummary::default(),
            message,
            run_id: None,
            model: None,
            stage: Some(stage.to_string()),
            categories: Vec::new(),
            sessions: Vec::new(),
        }
    }
}

/// Malformed request bodies get the same failure shape as workflow errors
fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected extraction request body");
    let response = HttpResponse::BadRequest().json(ExtractResponse::failure(
        "request",
        format!("Invalid request body: {}", err),
    ));
    InternalError::from_response(err, response).into()
}

/// Configure extraction routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(extract);
}
