pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::middleware::request_id::RequestId;
use crate::config::ServiceConfig;
use crate::services::audio_service::AudioService;
use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::audio::process_audio,
        api::handlers::audio::audio_info,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::audio::AudioUpload,
            api::error::ErrorResponse,
            services::transcoder::AudioInfo,
            services::transcoder::StreamInfo,
        )
    ),
    tags(
        (name = "audio", description = "Silence removal and MP3 transcoding"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: ServiceConfig,
    pub audio_service: Arc<AudioService>,
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Sits inside the request-id layer so the span carries the id handlers see.
    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<Body>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(RequestId::as_str)
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<Body>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<Body>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/process-audio", post(api::handlers::audio::process_audio))
        .route("/audio-info", post(api::handlers::audio::audio_info))
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(trace)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}
