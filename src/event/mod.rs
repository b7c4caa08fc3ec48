/// Event domain types
///
/// The event lifecycle stage is never persisted: it is a pure projection
/// of `start_at` against the clock, computed at the read boundary.

mod manager;

pub use manager::{EventManager, LikeOutcome};

use crate::db::models::EventRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Derived event lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Unscheduled,
    Upcoming,
    Completed,
}

impl Stage {
    /// Pure function of `start_at` and the supplied clock.
    /// Absent start: unscheduled. Future: upcoming. Past or equal: completed.
    pub fn compute(start_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match start_at {
            None => Stage::Unscheduled,
            Some(t) if t > now => Stage::Upcoming,
            Some(_) => Stage::Completed,
        }
    }
}

/// Organizer-authored post-event statistics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    #[validate(range(min = 0, message = "attendance cannot be negative"))]
    pub attendance: i64,
    #[validate(range(min = 0.0, max = 5.0, message = "rating must be between 0 and 5"))]
    pub rating: f64,
    pub revenue: f64,
    pub cost: f64,
    pub highlights: Option<String>,
    pub is_published: bool,
}

/// Client-facing event projection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub organizer_id: String,
    pub title: String,
    pub location: String,
    pub description: String,
    pub likes: i64,
    pub views: i64,
    pub images: Vec<String>,
    /// First image or empty string
    pub image_url: String,
    pub start_at: Option<DateTime<Utc>>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<EventStats>,
    pub created_at: DateTime<Utc>,
}

impl EventView {
    /// Project a row. Unpublished stats are stripped unless the caller is
    /// the owning organizer.
    pub fn from_row(row: EventRow, now: DateTime<Utc>, include_unpublished_stats: bool) -> Self {
        let images: Vec<String> = serde_json::from_str(&row.images).unwrap_or_default();
        let image_url = images.first().cloned().unwrap_or_default();
        let stage = Stage::compute(row.start_at, now);

        let stats = match row.stats_attendance {
            Some(attendance) if row.stats_published || include_unpublished_stats => {
                Some(EventStats {
                    attendance,
                    rating: row.stats_rating.unwrap_or(0.0),
                    revenue: row.stats_revenue.unwrap_or(0.0),
                    cost: row.stats_cost.unwrap_or(0.0),
                    highlights: row.stats_highlights.clone(),
                    is_published: row.stats_published,
                })
            }
            _ => None,
        };

        Self {
            id: row.id,
            organizer_id: row.organizer_id,
            title: row.title,
            location: row.location,
            description: row.description,
            likes: row.likes,
            views: row.views,
            images,
            image_url,
            start_at: row.start_at,
            stage,
            stats,
            created_at: row.created_at,
        }
    }
}

/// Event creation request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 120, message = "title must be 1-120 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 200, message = "location must be 1-200 characters"))]
    pub location: String,
    #[validate(length(min = 20, message = "description must be at least 20 characters"))]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub start_at: Option<DateTime<Utc>>,
}

/// Event update request; absent fields are left untouched
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 120, message = "title must be 1-120 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 200, message = "location must be 1-200 characters"))]
    pub location: Option<String>,
    #[validate(length(min = 20, message = "description must be at least 20 characters"))]
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    /// Absent keeps the current schedule; an explicit JSON null clears it
    #[serde(default, deserialize_with = "double_option")]
    pub start_at: Option<Option<DateTime<Utc>>>,
}

/// Plain serde collapses a missing field and an explicit null into the
/// same outer `None`; this keeps them apart so null can mean "clear".
fn double_option<'de, D>(de: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stage_absent_start_is_unscheduled() {
        let now = Utc::now();
        assert_eq!(Stage::compute(None, now), Stage::Unscheduled);
    }

    #[test]
    fn stage_future_start_is_upcoming() {
        let now = Utc::now();
        assert_eq!(
            Stage::compute(Some(now + Duration::hours(1)), now),
            Stage::Upcoming
        );
    }

    #[test]
    fn stage_past_or_equal_start_is_completed() {
        let now = Utc::now();
        assert_eq!(
            Stage::compute(Some(now - Duration::seconds(1)), now),
            Stage::Completed
        );
        assert_eq!(Stage::compute(Some(now), now), Stage::Completed);
    }

    fn row_with_stats(published: bool) -> EventRow {
        let now = Utc::now();
        EventRow {
            id: "ev-1".to_string(),
            organizer_id: "org-1".to_string(),
            title: "Fest".to_string(),
            location: "Hall A".to_string(),
            description: "An evening of music and food stalls.".to_string(),
            likes: 0,
            views: 0,
            images: r#"["a.jpg","b.jpg"]"#.to_string(),
            start_at: Some(now - Duration::hours(2)),
            stats_attendance: Some(120),
            stats_rating: Some(4.2),
            stats_revenue: Some(900.0),
            stats_cost: Some(400.0),
            stats_highlights: None,
            stats_published: published,
            created_at: now,
        }
    }

    #[test]
    fn unpublished_stats_hidden_from_public_view() {
        let now = Utc::now();

        let public = EventView::from_row(row_with_stats(false), now, false);
        assert!(public.stats.is_none());

        // The owning organizer still sees their draft
        let owner = EventView::from_row(row_with_stats(false), now, true);
        assert_eq!(owner.stats.unwrap().attendance, 120);

        let published = EventView::from_row(row_with_stats(true), now, false);
        assert!(published.stats.unwrap().is_published);
    }

    #[test]
    fn update_request_keeps_null_and_absent_start_apart() {
        let absent: UpdateEventRequest = serde_json::from_str("{}").unwrap();
        assert!(absent.start_at.is_none());

        let cleared: UpdateEventRequest = serde_json::from_str(r#"{"startAt": null}"#).unwrap();
        assert_eq!(cleared.start_at, Some(None));

        let set: UpdateEventRequest =
            serde_json::from_str(r#"{"startAt": "2026-05-01T18:00:00Z"}"#).unwrap();
        assert!(matches!(set.start_at, Some(Some(_))));
    }

    #[test]
    fn image_url_is_first_image_or_empty() {
        let now = Utc::now();

        let view = EventView::from_row(row_with_stats(true), now, false);
        assert_eq!(view.image_url, "a.jpg");
        assert_eq!(view.images.len(), 2);

        let mut row = row_with_stats(true);
        row.images = "[]".to_string();
        let view = EventView::from_row(row, now, false);
        assert_eq!(view.image_url, "");
    }
}
