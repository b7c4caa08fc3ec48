/// Event manager: organizer CRUD, the view counter, post-event stats
/// gating, and the transactional like/unlike toggle.
///
/// The like toggle is the one place where a counter is tied to a derived
/// set membership. It runs in a single transaction and never issues an
/// unconditional increment: every counter change is paired with the
/// membership change that justifies it.
use crate::{
    db::models::EventRow,
    error::{ApiError, ApiResult},
    event::{CreateEventRequest, EventStats, Stage, UpdateEventRequest},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const EVENT_COLUMNS: &str =
    "id, organizer_id, title, location, description, likes, views, images, start_at,
     stats_attendance, stats_rating, stats_revenue, stats_cost, stats_highlights,
     stats_published, created_at";

/// Result of a like/unlike toggle. `event` is `None` only for the
/// "unliked, event gone" case where the event was deleted mid-flight.
#[derive(Debug, Clone)]
pub struct LikeOutcome {
    pub liked: bool,
    pub event: Option<EventRow>,
}

/// Event manager service
pub struct EventManager {
    db: SqlitePool,
}

impl EventManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create_event(
        &self,
        organizer_id: &str,
        req: &CreateEventRequest,
    ) -> ApiResult<EventRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let images = serde_json::to_string(&req.images)
            .map_err(|e| ApiError::Internal(format!("Failed to encode images: {}", e)))?;

        sqlx::query(
            "INSERT INTO events (id, organizer_id, title, location, description, images, start_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&id)
        .bind(organizer_id)
        .bind(&req.title)
        .bind(&req.location)
        .bind(&req.description)
        .bind(&images)
        .bind(req.start_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!(event_id = %id, organizer_id = %organizer_id, "event created");

        self.get_event(&id).await
    }

    pub async fn get_event(&self, event_id: &str) -> ApiResult<EventRow> {
        sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE id = ?1",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("EventNotFound".to_string()))
    }

    pub async fn list_events(&self) -> ApiResult<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events ORDER BY created_at DESC",
            EVENT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Fetch an event for the public detail page, bumping the view counter
    pub async fn view_event(&self, event_id: &str) -> ApiResult<EventRow> {
        let updated = sqlx::query("UPDATE events SET views = views + 1 WHERE id = ?1")
            .bind(event_id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(ApiError::NotFound("EventNotFound".to_string()));
        }

        self.get_event(event_id).await
    }

    /// Update an event. Only the owning organizer may mutate it.
    pub async fn update_event(
        &self,
        event_id: &str,
        organizer_id: &str,
        req: &UpdateEventRequest,
    ) -> ApiResult<EventRow> {
        let existing = self.get_event(event_id).await?;
        if existing.organizer_id != organizer_id {
            return Err(ApiError::Authorization("NotOwner".to_string()));
        }

        let title = req.title.as_deref().unwrap_or(&existing.title);
        let location = req.location.as_deref().unwrap_or(&existing.location);
        let description = req.description.as_deref().unwrap_or(&existing.description);
        let images = match &req.images {
            Some(images) => serde_json::to_string(images)
                .map_err(|e| ApiError::Internal(format!("Failed to encode images: {}", e)))?,
            None => existing.images.clone(),
        };
        // Outer None leaves start_at alone; Some(None) clears it
        let start_at = match &req.start_at {
            Some(value) => *value,
            None => existing.start_at,
        };

        sqlx::query(
            "UPDATE events
             SET title = ?1, location = ?2, description = ?3, images = ?4, start_at = ?5
             WHERE id = ?6",
        )
        .bind(title)
        .bind(location)
        .bind(description)
        .bind(&images)
        .bind(start_at)
        .bind(event_id)
        .execute(&self.db)
        .await?;

        self.get_event(event_id).await
    }

    pub async fn delete_event(&self, event_id: &str, organizer_id: &str) -> ApiResult<()> {
        let existing = self.get_event(event_id).await?;
        if existing.organizer_id != organizer_id {
            return Err(ApiError::Authorization("NotOwner".to_string()));
        }

        sqlx::query("DELETE FROM events WHERE id = ?1")
            .bind(event_id)
            .execute(&self.db)
            .await?;

        tracing::info!(event_id = %event_id, "event deleted");

        Ok(())
    }

    /// Write post-event statistics. Only allowed once the derived stage is
    /// `completed`; stats never exist for an event that has not happened.
    pub async fn set_stats(
        &self,
        event_id: &str,
        organizer_id: &str,
        stats: &EventStats,
    ) -> ApiResult<EventRow> {
        let existing = self.get_event(event_id).await?;
        if existing.organizer_id != organizer_id {
            return Err(ApiError::Authorization("NotOwner".to_string()));
        }

        if Stage::compute(existing.start_at, Utc::now()) != Stage::Completed {
            return Err(ApiError::Validation(
                "Stats can only be added once the event has completed".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE events
             SET stats_attendance = ?1, stats_rating = ?2, stats_revenue = ?3,
                 stats_cost = ?4, stats_highlights = ?5, stats_published = ?6
             WHERE id = ?7",
        )
        .bind(stats.attendance)
        .bind(stats.rating)
        .bind(stats.revenue)
        .bind(stats.cost)
        .bind(&stats.highlights)
        .bind(stats.is_published)
        .bind(event_id)
        .execute(&self.db)
        .await?;

        self.get_event(event_id).await
    }

    /// Toggle the liked relation between an account and an event inside a
    /// single transaction, keeping the `likes` counter equal to the actual
    /// membership count.
    ///
    /// Like path: conditional insert, then increment; if the increment
    /// matches no row the event vanished and the whole transaction rolls
    /// back with `EventNotFound`. Unlike path: remove membership and
    /// decrement only while the counter is positive; a failed guard still
    /// removes the membership so a drifted counter self-heals instead of
    /// going negative. The returned event snapshot is read before commit,
    /// so a concurrent delete cannot turn a committed toggle into an error.
    pub async fn toggle_like(&self, event_id: &str, account_id: &str) -> ApiResult<LikeOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO event_likes (account_id, event_id, created_at)
             VALUES (?1, ?2, ?3)",
        )
        .bind(account_id)
        .bind(event_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted > 0 {
            let updated = sqlx::query("UPDATE events SET likes = likes + 1 WHERE id = ?1")
                .bind(event_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if updated == 0 {
                // Event gone; dropping the transaction rolls back the insert
                tx.rollback().await?;
                return Err(ApiError::NotFound("EventNotFound".to_string()));
            }

            // Snapshot the row inside the transaction; the increment above
            // matched it, so it must exist here.
            let event = sqlx::query_as::<_, EventRow>(&format!(
                "SELECT {} FROM events WHERE id = ?1",
                EVENT_COLUMNS
            ))
            .bind(event_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            return Ok(LikeOutcome {
                liked: true,
                event: Some(event),
            });
        }

        // Already liked: remove the membership and decrement with a floor
        // at zero.
        sqlx::query("DELETE FROM event_likes WHERE account_id = ?1 AND event_id = ?2")
            .bind(account_id)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        let decremented = sqlx::query(
            "UPDATE events SET likes = likes - 1 WHERE id = ?1 AND likes > 0",
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if decremented == 0 {
            tracing::warn!(event_id = %event_id, "unlike with no positive counter, membership removed without decrement");
        }

        let event = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE id = ?1",
            EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(LikeOutcome {
            liked: false,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn create_test_manager() -> EventManager {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE events (
                id TEXT PRIMARY KEY,
                organizer_id TEXT NOT NULL,
                title TEXT NOT NULL,
                location TEXT NOT NULL,
                description TEXT NOT NULL,
                likes INTEGER NOT NULL DEFAULT 0,
                views INTEGER NOT NULL DEFAULT 0,
                images TEXT NOT NULL DEFAULT '[]',
                start_at DATETIME,
                stats_attendance INTEGER,
                stats_rating REAL,
                stats_revenue REAL,
                stats_cost REAL,
                stats_highlights TEXT,
                stats_published BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE event_likes (
                account_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                PRIMARY KEY (account_id, event_id)
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        EventManager::new(db)
    }

    fn sample_request(start_at: Option<chrono::DateTime<Utc>>) -> CreateEventRequest {
        CreateEventRequest {
            title: "Fest".to_string(),
            location: "Hall A".to_string(),
            description: "An evening of music and food stalls.".to_string(),
            images: vec![],
            start_at,
        }
    }

    async fn membership_count(manager: &EventManager, event_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_likes WHERE event_id = ?1")
            .bind(event_id)
            .fetch_one(&manager.db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_view_bumps_counter() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();
        assert_eq!(event.views, 0);

        let viewed = manager.view_event(&event.id).await.unwrap();
        assert_eq!(viewed.views, 1);

        let viewed = manager.view_event(&event.id).await.unwrap();
        assert_eq!(viewed.views, 2);
    }

    #[tokio::test]
    async fn update_requires_ownership() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();

        let req = UpdateEventRequest {
            title: Some("Renamed".to_string()),
            location: None,
            description: None,
            images: None,
            start_at: None,
        };

        let result = manager.update_event(&event.id, "org-2", &req).await;
        assert!(matches!(result, Err(ApiError::Authorization(_))));

        let updated = manager.update_event(&event.id, "org-1", &req).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.location, "Hall A");
    }

    #[tokio::test]
    async fn explicit_null_start_clears_schedule() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event(
                "org-1",
                &sample_request(Some(Utc::now() + Duration::hours(1))),
            )
            .await
            .unwrap();
        assert!(event.start_at.is_some());

        // The wire shape an unschedule request actually arrives as
        let req: UpdateEventRequest = serde_json::from_str(r#"{"startAt": null}"#).unwrap();
        let updated = manager.update_event(&event.id, "org-1", &req).await.unwrap();
        assert!(updated.start_at.is_none());

        // An update that omits the field leaves the schedule alone
        let req: UpdateEventRequest =
            serde_json::from_str(r#"{"title": "Renamed"}"#).unwrap();
        let set_again = manager
            .update_event(
                &event.id,
                "org-1",
                &UpdateEventRequest {
                    title: None,
                    location: None,
                    description: None,
                    images: None,
                    start_at: Some(Some(Utc::now() + Duration::hours(2))),
                },
            )
            .await
            .unwrap();
        assert!(set_again.start_at.is_some());
        let untouched = manager.update_event(&event.id, "org-1", &req).await.unwrap();
        assert!(untouched.start_at.is_some());
        assert_eq!(untouched.title, "Renamed");
    }

    #[tokio::test]
    async fn like_then_unlike_keeps_counter_consistent() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();

        let outcome = manager.toggle_like(&event.id, "user-1").await.unwrap();
        assert!(outcome.liked);
        assert_eq!(outcome.event.unwrap().likes, 1);
        assert_eq!(membership_count(&manager, &event.id).await, 1);

        // Second toggle from the same account unlikes
        let outcome = manager.toggle_like(&event.id, "user-1").await.unwrap();
        assert!(!outcome.liked);
        assert_eq!(outcome.event.unwrap().likes, 0);
        assert_eq!(membership_count(&manager, &event.id).await, 0);
    }

    #[tokio::test]
    async fn counter_tracks_membership_across_interleavings() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();

        for round in 0..10 {
            for user in ["user-1", "user-2", "user-3"] {
                if (round + user.len()) % 2 == 0 {
                    manager.toggle_like(&event.id, user).await.unwrap();
                }
            }

            let current = manager.get_event(&event.id).await.unwrap();
            assert_eq!(current.likes, membership_count(&manager, &event.id).await);
        }
    }

    #[tokio::test]
    async fn like_on_missing_event_rolls_back() {
        let manager = create_test_manager().await;

        let result = manager.toggle_like("no-such-event", "user-1").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));

        // The conditional insert was rolled back
        assert_eq!(membership_count(&manager, "no-such-event").await, 0);
    }

    #[tokio::test]
    async fn unlike_after_event_deleted_reports_event_gone() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();

        manager.toggle_like(&event.id, "user-1").await.unwrap();

        sqlx::query("DELETE FROM events WHERE id = ?1")
            .bind(&event.id)
            .execute(&manager.db)
            .await
            .unwrap();

        let outcome = manager.toggle_like(&event.id, "user-1").await.unwrap();
        assert!(!outcome.liked);
        assert!(outcome.event.is_none());
        assert_eq!(membership_count(&manager, &event.id).await, 0);
    }

    #[tokio::test]
    async fn drifted_zero_counter_self_heals_without_going_negative() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();

        // Simulate drift: membership exists while the counter reads zero
        sqlx::query(
            "INSERT INTO event_likes (account_id, event_id, created_at) VALUES ('user-1', ?1, ?2)",
        )
        .bind(&event.id)
        .bind(Utc::now())
        .execute(&manager.db)
        .await
        .unwrap();

        let outcome = manager.toggle_like(&event.id, "user-1").await.unwrap();
        assert!(!outcome.liked);
        assert_eq!(outcome.event.unwrap().likes, 0);
        assert_eq!(membership_count(&manager, &event.id).await, 0);
    }

    #[tokio::test]
    async fn stats_rejected_before_completion() {
        let manager = create_test_manager().await;
        let now = Utc::now();

        let upcoming = manager
            .create_event("org-1", &sample_request(Some(now + Duration::hours(1))))
            .await
            .unwrap();

        let stats = EventStats {
            attendance: 250,
            rating: 4.5,
            revenue: 1200.0,
            cost: 800.0,
            highlights: Some("Great turnout".to_string()),
            is_published: true,
        };

        let result = manager.set_stats(&upcoming.id, "org-1", &stats).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));

        // Unscheduled events cannot take stats either
        let unscheduled = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();
        assert!(manager
            .set_stats(&unscheduled.id, "org-1", &stats)
            .await
            .is_err());

        // Completed events can
        let completed = manager
            .create_event("org-1", &sample_request(Some(now - Duration::hours(1))))
            .await
            .unwrap();
        let updated = manager.set_stats(&completed.id, "org-1", &stats).await.unwrap();
        assert_eq!(updated.stats_attendance, Some(250));
        assert!(updated.stats_published);

        // But not by a different organizer
        let result = manager.set_stats(&completed.id, "org-2", &stats).await;
        assert!(matches!(result, Err(ApiError::Authorization(_))));
    }

    #[tokio::test]
    async fn delete_requires_ownership_and_removes_event() {
        let manager = create_test_manager().await;
        let event = manager
            .create_event("org-1", &sample_request(None))
            .await
            .unwrap();

        assert!(matches!(
            manager.delete_event(&event.id, "org-2").await,
            Err(ApiError::Authorization(_))
        ));

        manager.delete_event(&event.id, "org-1").await.unwrap();
        assert!(matches!(
            manager.get_event(&event.id).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
