/// Event endpoints: public list/detail, organizer CRUD and stats, and the
/// user-only like toggle.
use crate::{
    auth::{OptionalAuthContext, OrganizerAuth, UserAuth},
    context::AppContext,
    csrf,
    error::ApiResult,
    event::{CreateEventRequest, EventStats, EventView, UpdateEventRequest},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use validator::Validate;

/// Build event routes. All mutations sit behind the CSRF gate.
pub fn routes() -> Router<AppContext> {
    let csrf_protected = Router::new()
        .route("/", post(create_event))
        .route("/:id", patch(update_event).delete(delete_event))
        .route("/:id/stats", patch(set_stats))
        .route("/:id/like", post(toggle_like))
        .route_layer(middleware::from_fn(csrf::csrf_gate));

    Router::new()
        .route("/", get(list_events))
        .route("/:id", get(event_detail))
        .merge(csrf_protected)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    events: Vec<EventView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LikeResponse {
    liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<EventView>,
}

/// Public event list. Unpublished stats are only visible to the owning
/// organizer.
async fn list_events(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
) -> ApiResult<Json<EventListResponse>> {
    let now = Utc::now();
    let viewer = auth.auth.map(|a| a.account_id);

    let events = ctx
        .event_manager
        .list_events()
        .await?
        .into_iter()
        .map(|row| {
            let is_owner = viewer.as_deref() == Some(row.organizer_id.as_str());
            EventView::from_row(row, now, is_owner)
        })
        .collect();

    Ok(Json(EventListResponse { events }))
}

/// Public event detail; every fetch bumps the view counter
async fn event_detail(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(event_id): Path<String>,
) -> ApiResult<Json<EventView>> {
    let row = ctx.event_manager.view_event(&event_id).await?;
    let is_owner = auth
        .auth
        .map(|a| a.account_id == row.organizer_id)
        .unwrap_or(false);

    Ok(Json(EventView::from_row(row, Utc::now(), is_owner)))
}

async fn create_event(
    State(ctx): State<AppContext>,
    OrganizerAuth(auth): OrganizerAuth,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventView>)> {
    req.validate()?;

    let row = ctx.event_manager.create_event(&auth.account_id, &req).await?;

    Ok((
        StatusCode::CREATED,
        Json(EventView::from_row(row, Utc::now(), true)),
    ))
}

async fn update_event(
    State(ctx): State<AppContext>,
    OrganizerAuth(auth): OrganizerAuth,
    Path(event_id): Path<String>,
    Json(req): Json<UpdateEventRequest>,
) -> ApiResult<Json<EventView>> {
    req.validate()?;

    let row = ctx
        .event_manager
        .update_event(&event_id, &auth.account_id, &req)
        .await?;

    Ok(Json(EventView::from_row(row, Utc::now(), true)))
}

async fn delete_event(
    State(ctx): State<AppContext>,
    OrganizerAuth(auth): OrganizerAuth,
    Path(event_id): Path<String>,
) -> ApiResult<StatusCode> {
    ctx.event_manager
        .delete_event(&event_id, &auth.account_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Write post-event stats; rejected until the event's stage is completed
async fn set_stats(
    State(ctx): State<AppContext>,
    OrganizerAuth(auth): OrganizerAuth,
    Path(event_id): Path<String>,
    Json(stats): Json<EventStats>,
) -> ApiResult<Json<EventView>> {
    stats.validate()?;

    let row = ctx
        .event_manager
        .set_stats(&event_id, &auth.account_id, &stats)
        .await?;

    Ok(Json(EventView::from_row(row, Utc::now(), true)))
}

/// Toggle the caller's like on an event. `event` is absent only when an
/// unlike raced with the event's deletion.
async fn toggle_like(
    State(ctx): State<AppContext>,
    UserAuth(auth): UserAuth,
    Path(event_id): Path<String>,
) -> ApiResult<Json<LikeResponse>> {
    let outcome = ctx
        .event_manager
        .toggle_like(&event_id, &auth.account_id)
        .await?;

    let now = Utc::now();
    Ok(Json(LikeResponse {
        liked: outcome.liked,
        event: outcome.event.map(|row| EventView::from_row(row, now, false)),
    }))
}
