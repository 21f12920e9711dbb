use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, post, put},
};

/// Admin Router Module
///
/// Content moderation. Every handler here asks the gate first; non-admins get
/// "Access denied!" and a redirect home before anything is written.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /posts
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{id}
        // Deleting a post removes its comments in the same transaction.
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // DELETE /comments/{id}
        // Redaction, not removal: the comment stays in its thread with its text masked.
        .route("/comments/{id}", delete(handlers::delete_comment))
}
