use axum::{extract::FromRef, http::HeaderName, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Account lifecycle and access control.
pub mod activation;
pub mod auth;
pub mod identity;
pub mod policy;

// Content.
pub mod content;

// Infrastructure.
pub mod config;
pub mod error;
pub mod extract;
pub mod mailer;
pub mod memory;
pub mod models;
pub mod repository;
pub mod validation;

// HTTP surface.
pub mod handlers;
pub mod routes;
use routes::{admin, members, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::{HttpMailer, MailerState, MockMailer};
pub use memory::MemoryRepository;
pub use policy::{Action, Actor, Decision, Resource, authorize};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI description of the HTTP surface, served at `/api-docs/openapi.json` and
/// browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::signup, handlers::activate_account, handlers::login,
        handlers::get_users, handlers::get_user, handlers::update_user, handlers::delete_user,
        handlers::get_posts, handlers::get_post, handlers::create_post, handlers::update_post,
        handlers::delete_post, handlers::get_comments, handlers::add_comment,
        handlers::delete_comment
    ),
    components(
        schemas(
            models::Post, models::PostRequest, models::PostSummary, models::PostDetail,
            models::CommentView, models::CreateCommentRequest, models::UserProfile,
            models::RegisterUserRequest, models::UpdateUserRequest, models::LoginRequest,
            models::SessionToken, models::Role, models::ActivationState,
            error::ErrorBody, validation::FieldError,
        )
    ),
    tags(
        (name = "quillpost", description = "Posts, comments and accounts")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cheaply clonable container for the services every request needs.
#[derive(Clone)]
pub struct AppState {
    /// Identity and content persistence.
    pub repo: RepositoryState,
    /// Activation message delivery.
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors such as `Actor` pull single components out of the shared state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route group, the API documentation and the observability layers, and
/// registers the application state.
///
/// No route group carries its own authentication layer. Every handler resolves its
/// `Actor` (a guest when no valid session is presented) and asks the policy table, so a
/// refused request always answers with the same `ErrorBody` whichever group it hit.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: the generated OpenAPI document and its Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Reads, signup, activation and login. Open to guests.
        .merge(public::public_routes())
        // Profile edits and account removal. Ownership is checked per request.
        .merge(members::member_routes())
        // Post management and comment redaction.
        .merge(admin::admin_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID: a fresh UUID unless the caller sent one.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Tracing: one span per request, response logged with its latency.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Echo the request id back on the response.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens one span per request carrying method, URI and the `x-request-id`, so every log
/// line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
