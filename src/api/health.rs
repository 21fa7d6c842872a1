//! Liveness and readiness of the extraction service
//!
//! Ready means an extraction request could be served end to end: the case
//! store answers and the inference runtime lists the default model.

use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::model::WorkflowConfig;
use crate::service::{InferenceClient, InferenceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    Healthy,
    Unhealthy,
}

#[derive(Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessStatus {
    /// `ready` or `not_ready`
    pub status: String,
    pub version: String,
    pub case_store: DependencyState,
    pub inference: DependencyState,
    /// Models the runtime advertises; empty when it is unreachable
    pub models: Vec<String>,
    pub default_model: String,
    pub default_model_available: bool,
}

impl ReadinessStatus {
    fn is_ready(&self) -> bool {
        self.case_store == DependencyState::Healthy
            && self.inference == DependencyState::Healthy
            && self.default_model_available
    }
}

fn readiness_report(
    case_store_ok: bool,
    models: Result<Vec<String>, InferenceError>,
    default_model: &str,
) -> ReadinessStatus {
    let (inference, models) = match models {
        Ok(models) => (DependencyState::Healthy, models),
        Err(_) => (DependencyState::Unhealthy, Vec::new()),
    };
    let default_model_available = models
        .iter()
        .any(|m| m == default_model || m.strip_suffix(":latest") == Some(default_model));

    let mut report = ReadinessStatus {
        status: String::new(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        case_store: if case_store_ok {
            DependencyState::Healthy
        } else {
            DependencyState::Unhealthy
        },
        inference,
        models,
        default_model: default_model.to_string(),
        default_model_available,
    };
    report.status = if report.is_ready() { "ready" } else { "not_ready" }.to_string();
    report
}

/// Process is up
#[utoipa::path(
    get,
    path = "/health/live",
    responses(
        (status = 200, description = "Service is alive", body = HealthStatus)
    ),
    tag = "health"
)]
#[get("/health/live")]
pub async fn liveness() -> impl Responder {
    HttpResponse::Ok().json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Case store reachable and default model served
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Extraction requests can be served", body = ReadinessStatus),
        (status = 503, description = "A dependency is missing", body = ReadinessStatus)
    ),
    tag = "health"
)]
#[get("/health/ready")]
pub async fn readiness(
    db_pool: web::Data<PgPool>,
    inference: web::Data<InferenceClient>,
    config: web::Data<WorkflowConfig>,
) -> impl Responder {
    let case_store_ok = match sqlx::query("SELECT 1").fetch_one(db_pool.get_ref()).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Case store unreachable");
            false
        }
    };

    let models = inference.list_models().await;
    if let Err(e) = &models {
        tracing::error!(error = %e, "Inference runtime unreachable");
    }

    let report = readiness_report(case_store_ok, models, &config.default_model);
    if !report.default_model_available {
        tracing::warn!(default_model = %report.default_model, "Default model not served by the runtime");
    }

    if report.is_ready() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(liveness).service(readiness);
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test};

    use super::*;

    #[actix_web::test]
    async fn test_liveness() {
        let app = test::init_service(App::new().service(liveness)).await;

        let req = test::TestRequest::get().uri("/health/live").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
    }

    #[::std::prelude::v1::test]
    fn test_ready_when_default_model_is_tagged_latest() {
        let report = readiness_report(
            true,
            Ok(vec!["qwen2.5:7b".to_string(), "llama3.2:latest".to_string()]),
            "llama3.2",
        );

        assert!(report.is_ready());
        assert_eq!(report.status, "ready");
        assert_eq!(report.models.len(), 2);
    }

    #[::std::prelude::v1::test]
    fn test_not_ready_without_default_model() {
        let report = readiness_report(true, Ok(vec!["qwen2.5:7b".to_string()]), "llama3.2");

        assert_eq!(report.inference, DependencyState::Healthy);
        assert!(!report.default_model_available);
        assert_eq!(report.status, "not_ready");
    }

    #[::std::prelude::v1::test]
    fn test_not_ready_when_runtime_or_store_down() {
        let report = readiness_report(
            true,
            Err(InferenceError::Unavailable("connection refused".to_string())),
            "llama3.2",
        );
        assert_eq!(report.inference, DependencyState::Unhealthy);
        assert!(report.models.is_empty());
        assert!(!report.is_ready());

        let report = readiness_report(false, Ok(vec!["llama3.2".to_string()]), "llama3.2");
        assert_eq!(report.case_store, DependencyState::Unhealthy);
        assert!(!report.is_ready());
    }
}
