/// Feedback/query endpoints
use crate::{
    auth::{OptionalAuthContext, OrganizerAuth},
    context::AppContext,
    csrf,
    error::ApiResult,
    query::{CreateQueryRequest, QueryView},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

/// Build query routes
pub fn routes() -> Router<AppContext> {
    let csrf_protected = Router::new()
        .route("/event/:id/feedback", post(create_feedback))
        .route("/:id/status", patch(toggle_status))
        .route_layer(middleware::from_fn(csrf::csrf_gate));

    Router::new()
        .route("/event/:id", get(list_for_event))
        .merge(csrf_protected)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryListResponse {
    queries: Vec<QueryView>,
}

/// Submit feedback against an event. Works with or without a session;
/// anonymous submissions simply carry no sender.
async fn create_feedback(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(event_id): Path<String>,
    Json(req): Json<CreateQueryRequest>,
) -> ApiResult<(StatusCode, Json<QueryView>)> {
    req.validate()?;

    let sender_id = auth.auth.map(|a| a.account_id);
    let row = ctx
        .query_manager
        .create_query(&event_id, sender_id.as_deref(), &req)
        .await?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// List the queries raised against one of the caller's events
async fn list_for_event(
    State(ctx): State<AppContext>,
    OrganizerAuth(auth): OrganizerAuth,
    Path(event_id): Path<String>,
) -> ApiResult<Json<QueryListResponse>> {
    let queries = ctx
        .query_manager
        .list_queries_for_event(&event_id, &auth.account_id)
        .await?
        .into_iter()
        .map(QueryView::from)
        .collect();

    Ok(Json(QueryListResponse { queries }))
}

/// Flip a query between pending and resolved
async fn toggle_status(
    State(ctx): State<AppContext>,
    OrganizerAuth(auth): OrganizerAuth,
    Path(query_id): Path<String>,
) -> ApiResult<Json<QueryView>> {
    let row = ctx
        .query_manager
        .toggle_status(&query_id, &auth.account_id)
        .await?;

    Ok(Json(row.into()))
}
