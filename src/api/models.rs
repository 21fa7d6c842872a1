//! REST API endpoint listing the models the inference runtime can serve

use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::error::ApiError;
use crate::service::InferenceClient;

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelListResponse {
    pub models: Vec<String>,
    /// Used when an extraction request names no model
    pub default_model: String,
}

/// List models advertised by the inference runtime
#[utoipa::path(
    get,
    path = "/v1/models",
    responses(
        (status = 200, description = "Models retrieved successfully", body = ModelListResponse),
        (status = 502, description = "Inference runtime unavailable", body = crate::api::error::ErrorResponse)
    ),
    tag = "models"
)]
#[get("/v1/models")]
pub async fn list_models(
    client: web::Data<InferenceClient>,
    config: web::Data<crate::model::WorkflowConfig>,
) -> Result<HttpResponse, ApiError> {
    let models = client.list_models().await?;

    Ok(HttpResponse::Ok().json(ModelListResponse {
        models,
        default_model: config.default_model.clone(),
    }))
}

/// Configure model routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_models);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test};

    use super::*;
    use crate::model::WorkflowConfig;
    use crate::service::testing::{OfflineRuntime, Reply, ScriptedRuntime};

    #[actix_web::test]
    async fn test_list_models() {
        let runtime = ScriptedRuntime::new(|_, _| Reply::text("{}")).with_models(&["llama3.2:latest"]);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(InferenceClient::new(Arc::new(runtime))))
                .app_data(web::Data::new(WorkflowConfig::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/v1/models").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["models"][0], "llama3.2:latest");
        assert_eq!(body["default_model"], "llama3.2");
    }

    #[actix_web::test]
    async fn test_list_models_runtime_down() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(InferenceClient::new(Arc::new(OfflineRuntime))))
                .app_data(web::Data::new(WorkflowConfig::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/v1/models").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
