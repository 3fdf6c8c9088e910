use axum::{Json, Router, http, routing::get};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::adapters::{self, http::app_state::AppState};

pub const API_PREFIX: &str = "/api/v1";

pub fn create_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(app_state.config.cors_origin.clone())
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let security_headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, adapters::http::routes::router())
        .with_state(app_state)
        .layer(cors)
        .layer(security_headers)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http-request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    request_id = %request_id
                )
            }),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;

    use super::*;
    use crate::test_utils::{TEST_WEBHOOK_SECRET, TestAppStateBuilder, sign_payload};

    #[tokio::test]
    async fn health_is_ok_with_security_headers() {
        let server = TestServer::new(create_app(TestAppStateBuilder::new().build())).unwrap();

        let response = server.get("/health").await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({ "status": "ok" }));
        assert_eq!(response.header("x-content-type-options"), "nosniff");
        assert_eq!(response.header("x-frame-options"), "DENY");
    }

    #[tokio::test]
    async fn webhook_is_mounted_under_api_prefix() {
        let server = TestServer::new(create_app(TestAppStateBuilder::new().build())).unwrap();
        let body = json!({ "type": "charge.refunded", "data": { "object": {} } }).to_string();

        let response = server
            .post("/api/v1/subscriptions/stripe/webhook")
            .add_header("stripe-signature", sign_payload(&body, TEST_WEBHOOK_SECRET))
            .text(body)
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
    }
}
