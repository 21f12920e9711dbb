use crate::{AppState, handlers};
use axum::{Router, routing::put};

/// Members Router Module
///
/// Account self-service. The gate lets a regular user act on their own id only and an
/// admin on any id; guests are always refused.
pub fn member_routes() -> Router<AppState> {
    Router::new()
        // PUT/DELETE /users/{id}
        // Blank password fields on PUT keep the current password.
        .route(
            "/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
}
