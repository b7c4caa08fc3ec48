/// Query manager: attendee feedback records and the organizer-side
/// resolution toggle.
///
/// A query outlives the event it was raised against. Event deletion
/// intentionally leaves queries behind, so reads tolerate a dangling
/// `event_id` while writes that gate on ownership require the event row.
use crate::{
    db::models::{QueryRow, QueryStatus},
    error::{ApiError, ApiResult},
    query::CreateQueryRequest,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const QUERY_COLUMNS: &str = "id, sender_id, event_id, subject, message, status, created_at";

/// Query manager service
pub struct QueryManager {
    db: SqlitePool,
}

impl QueryManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record a feedback query against an event. `sender_id` is `None`
    /// for anonymous submissions.
    pub async fn create_query(
        &self,
        event_id: &str,
        sender_id: Option<&str>,
        req: &CreateQueryRequest,
    ) -> ApiResult<QueryRow> {
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM events WHERE id = ?1")
            .bind(event_id)
            .fetch_optional(&self.db)
            .await?;
        if exists.is_none() {
            return Err(ApiError::NotFound("EventNotFound".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO queries (id, sender_id, event_id, subject, message, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        )
        .bind(&id)
        .bind(sender_id)
        .bind(event_id)
        .bind(&req.subject)
        .bind(&req.message)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!(query_id = %id, event_id = %event_id, anonymous = sender_id.is_none(), "query created");

        self.get_query(&id).await
    }

    pub async fn get_query(&self, query_id: &str) -> ApiResult<QueryRow> {
        sqlx::query_as::<_, QueryRow>(&format!(
            "SELECT {} FROM queries WHERE id = ?1",
            QUERY_COLUMNS
        ))
        .bind(query_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("QueryNotFound".to_string()))
    }

    /// List all queries raised against an event. Only the owning
    /// organizer may read them.
    pub async fn list_queries_for_event(
        &self,
        event_id: &str,
        organizer_id: &str,
    ) -> ApiResult<Vec<QueryRow>> {
        self.require_event_owner(event_id, organizer_id).await?;

        let rows = sqlx::query_as::<_, QueryRow>(&format!(
            "SELECT {} FROM queries WHERE event_id = ?1 ORDER BY created_at DESC",
            QUERY_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Flip a query between pending and resolved. The toggle is gated on
    /// owning the event the query was raised against.
    pub async fn toggle_status(&self, query_id: &str, organizer_id: &str) -> ApiResult<QueryRow> {
        let query = self.get_query(query_id).await?;
        self.require_event_owner(&query.event_id, organizer_id).await?;

        let next = query.status.toggled();

        sqlx::query("UPDATE queries SET status = ?1 WHERE id = ?2")
            .bind(next)
            .bind(query_id)
            .execute(&self.db)
            .await?;

        tracing::info!(query_id = %query_id, status = ?next, "query status toggled");

        self.get_query(query_id).await
    }

    async fn require_event_owner(&self, event_id: &str, organizer_id: &str) -> ApiResult<()> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT organizer_id FROM events WHERE id = ?1")
                .bind(event_id)
                .fetch_optional(&self.db)
                .await?;

        match owner {
            None => Err(ApiError::NotFound("EventNotFound".to_string())),
            Some(owner) if owner != organizer_id => {
                Err(ApiError::Authorization("NotOwner".to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_manager() -> QueryManager {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE events (
                id TEXT PRIMARY KEY,
                organizer_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE queries (
                id TEXT PRIMARY KEY,
                sender_id TEXT,
                event_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        QueryManager::new(db)
    }

    async fn insert_event(manager: &QueryManager, event_id: &str, organizer_id: &str) {
        sqlx::query("INSERT INTO events (id, organizer_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(event_id)
            .bind(organizer_id)
            .bind(Utc::now())
            .execute(&manager.db)
            .await
            .unwrap();
    }

    fn sample_request() -> CreateQueryRequest {
        CreateQueryRequest {
            subject: "Parking".to_string(),
            message: "Is there parking near the venue?".to_string(),
        }
    }

    #[tokio::test]
    async fn create_query_records_sender_when_present() {
        let manager = create_test_manager().await;
        insert_event(&manager, "ev-1", "org-1").await;

        let query = manager
            .create_query("ev-1", Some("user-1"), &sample_request())
            .await
            .unwrap();
        assert_eq!(query.sender_id.as_deref(), Some("user-1"));
        assert_eq!(query.status, QueryStatus::Pending);

        let anon = manager
            .create_query("ev-1", None, &sample_request())
            .await
            .unwrap();
        assert!(anon.sender_id.is_none());
    }

    #[tokio::test]
    async fn create_query_requires_existing_event() {
        let manager = create_test_manager().await;

        let result = manager
            .create_query("no-such-event", None, &sample_request())
            .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_is_restricted_to_event_owner() {
        let manager = create_test_manager().await;
        insert_event(&manager, "ev-1", "org-1").await;

        manager
            .create_query("ev-1", Some("user-1"), &sample_request())
            .await
            .unwrap();
        manager
            .create_query("ev-1", None, &sample_request())
            .await
            .unwrap();

        let result = manager.list_queries_for_event("ev-1", "org-2").await;
        assert!(matches!(result, Err(ApiError::Authorization(_))));

        let queries = manager.list_queries_for_event("ev-1", "org-1").await.unwrap();
        assert_eq!(queries.len(), 2);
    }

    #[tokio::test]
    async fn status_toggle_flips_both_ways() {
        let manager = create_test_manager().await;
        insert_event(&manager, "ev-1", "org-1").await;

        let query = manager
            .create_query("ev-1", Some("user-1"), &sample_request())
            .await
            .unwrap();

        let resolved = manager.toggle_status(&query.id, "org-1").await.unwrap();
        assert_eq!(resolved.status, QueryStatus::Resolved);

        let pending = manager.toggle_status(&query.id, "org-1").await.unwrap();
        assert_eq!(pending.status, QueryStatus::Pending);
    }

    #[tokio::test]
    async fn status_toggle_requires_event_ownership() {
        let manager = create_test_manager().await;
        insert_event(&manager, "ev-1", "org-1").await;

        let query = manager
            .create_query("ev-1", None, &sample_request())
            .await
            .unwrap();

        let result = manager.toggle_status(&query.id, "org-2").await;
        assert!(matches!(result, Err(ApiError::Authorization(_))));

        // A query whose event has since been deleted cannot be toggled
        sqlx::query("DELETE FROM events WHERE id = 'ev-1'")
            .execute(&manager.db)
            .await
            .unwrap();
        let result = manager.toggle_status(&query.id, "org-1").await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
