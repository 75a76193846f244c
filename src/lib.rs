pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::coordinator::CoordinatorHandle;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::documents::upload_document,
        api::handlers::documents::current_session,
        api::handlers::documents::list_documents,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::documents::DocumentResponse,
            api::handlers::health::HealthResponse,
            models::RawFile,
            models::TransferProgress,
            models::ContentDescriptor,
            services::session::UploadSession,
            services::session::SessionState,
            services::session::FailureReason,
        )
    ),
    tags(
        (name = "documents", description = "Document upload and registry"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: CoordinatorHandle,
    pub config: UploadConfig,
}

pub fn create_app(state: AppState) -> Router {
    // Leave room above the document ceiling so oversize files reach the validator
    let body_limit = state.config.max_file_size as usize + 10 * 1024 * 1024;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/documents",
            post(api::handlers::documents::upload_document)
                .get(api::handlers::documents::list_documents),
        )
        .route(
            "/upload/session",
            get(api::handlers::documents::current_session),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
