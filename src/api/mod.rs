use crate::api::client_ip::ClientIpExtractor;
use crate::config::Config;
use crate::error::AppError;
use crate::services::rotation_service::RotationCoordinator;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use std::any::Any;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod client_ip;
pub mod health;
pub mod middleware;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub coordinator: RotationCoordinator,
    pub client_ip: ClientIpExtractor,
}

/// A panicking handler answers with the generic 500 body. The panic hook has already logged it.
fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    AppError::Internal.into_response()
}

/// Configures and returns the application router.
///
/// # Errors
/// Returns an error if the rate limiter configuration cannot be constructed.
pub fn app_router(config: &Config, state: AppState) -> anyhow::Result<Router> {
    // Issuance and refresh both run Argon2, so they get a per-IP limit.
    let auth_interval_ns = 1_000_000_000 / config.rate_limit.auth_per_second.max(1);
    let auth_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(auth_interval_ns))
            .burst_size(config.rate_limit.auth_burst)
            .key_extractor(state.client_ip.clone())
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid auth rate limiter configuration"))?,
    );

    let token_routes = Router::new()
        .route("/tokens", get(auth::issue_tokens))
        .route("/refresh", post(auth::refresh))
        .layer(GovernorLayer::new(auth_conf))
        .route("/logout", post(auth::logout));

    let protected_routes = Router::new().route("/user", get(auth::current_user));

    let router = Router::new()
        .route("/livez", get(health::livez))
        .nest("/auth", token_routes)
        .nest("/api", protected_routes)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        let status = response.status();
                        span.record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id"), MakeRequestUuid))
        .with_state(state);

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::panic)]
    async fn exploding_handler() -> &'static str {
        panic!("handler bug")
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let router =
            Router::new().route("/boom", get(exploding_handler)).layer(CatchPanicLayer::custom(panic_response));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let resp = reqwest::get(format!("http://{addr}/boom")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["error"], "Internal server error");

        // The server keeps serving after the panic.
        let resp = reqwest::get(format!("http://{addr}/boom")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
