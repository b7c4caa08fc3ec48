/// API routes and handlers
pub mod auth;
pub mod event;
pub mod query;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .nest("/api/auth", auth::routes())
        .nest("/api/event", event::routes())
        .nest("/api/query", query::routes())
}
