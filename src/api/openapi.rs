//! OpenAPI specification endpoints

use actix_web::{HttpResponse, Responder, get};
use utoipa::OpenApi;

use crate::api::{cases, error, extraction, health, models};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Incident Notebook Agents API",
        description = "Extracts host IOCs, network IOCs and timeline events from incident narratives"
    ),
    paths(
        extraction::extract,
        cases::get_case_data,
        models::list_models,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        extraction::ExtractRequest,
        extraction::ExtractResponse,
        extraction::ExtractStatus,
        models::ModelListResponse,
        error::ErrorResponse,
        health::HealthStatus,
        health::ReadinessStatus,
        health::DependencyState,
        crate::service::refinement::SessionReport,
        crate::model::CaseData,
        crate::model::HostIoc,
        crate::model::NetworkIoc,
        crate::model::TimelineEvent,
        crate::model::Provenance,
        crate::model::RecordStatus,
        crate::model::RunSummary,
        crate::model::Category,
    )),
    tags(
        (name = "extraction", description = "Narrative extraction workflow"),
        (name = "cases", description = "Committed case artifacts"),
        (name = "models", description = "Inference runtime models"),
        (name = "health", description = "Liveness and readiness checks")
    )
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Serve OpenAPI YAML specification
#[get("/openapi.yaml")]
pub async fn openapi_yaml() -> impl Responder {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => HttpResponse::Ok().content_type("text/yaml").body(yaml),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render OpenAPI YAML");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Configure OpenAPI routes
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(openapi_json).service(openapi_yaml);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_extraction_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/cases/{case_id}/extract"));
        assert!(doc.paths.paths.contains_key("/v1/cases/{case_id}/data"));
        assert!(doc.paths.paths.contains_key("/v1/models"));
    }
}
