use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any actor may call, guests included.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /signup
        // Creates a pending account and mails its activation link.
        .route("/signup", post(handlers::signup))
        // GET /activate/{token}
        // Target of the activation link. Unknown or used tokens answer 404.
        .route("/activate/{token}", get(handlers::activate_account))
        // POST /login
        .route("/login", post(handlers::login))
        // GET /posts?page=N
        // Newest first, ten per page by default.
        .route("/posts", get(handlers::get_posts))
        .route("/posts/{id}", get(handlers::get_post))
        // GET/POST /posts/{id}/comments
        // Guests may comment; their comments are shown as written by "Guest".
        .route(
            "/posts/{id}/comments",
            get(handlers::get_comments).post(handlers::add_comment),
        )
        // GET /users?page=N
        // Thirty per page by default.
        .route("/users", get(handlers::get_users))
        .route("/users/{id}", get(handlers::get_user))
}
