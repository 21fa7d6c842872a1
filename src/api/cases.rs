//! REST API endpoint for committed case artifacts

use actix_web::{HttpResponse, get, web};

use crate::api::error::ApiError;
use crate::db::CaseStore;

/// Get every committed host IOC, network IOC and timeline event of a case
#[utoipa::path(
    get,
    path = "/v1/cases/{case_id}/data",
    params(
        ("case_id" = String, Path, description = "Case identifier")
    ),
    responses(
        (status = 200, description = "Case artifacts retrieved successfully", body = crate::model::CaseData),
        (status = 400, description = "Empty case identifier", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Database error", body = crate::api::error::ErrorResponse)
    ),
    tag = "cases"
)]
#[get("/v1/cases/{case_id}/data")]
pub async fn get_case_data(
    store: web::Data<dyn CaseStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let case_id = path.into_inner();
    if case_id.trim().is_empty() {
        return Err(ApiError::BadRequest("case_id must not be empty".to_string()));
    }

    let data = store.read_case_data(case_id.trim()).await?;

    tracing::debug!(
        case_id = %case_id,
        host = data.host_iocs.len(),
        network = data.network_iocs.len(),
        timeline = data.timeline_events.len(),
        "Read case data"
    );

    Ok(HttpResponse::Ok().json(data))
}

/// Configure case routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_case_data);
}
