use super::handlers::{enrol, health, validate};
use axum::response::{IntoResponse, Json};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(enrol::enrol, validate::validate, health::health),
    components(schemas(
        enrol::EnrolmentRequest,
        enrol::EnrolmentResponse,
        validate::ValidationRequest,
        health::Health
    )),
    tags(
        (name = "mfa", description = "TOTP enrolment and validation"),
        (name = "health", description = "Service build metadata")
    )
)]
struct ApiDoc;

/// `OpenAPI` document for every served route except `/openapi.json` itself.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(openapi())
}
