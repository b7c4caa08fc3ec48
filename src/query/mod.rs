/// Feedback/query domain

mod manager;

pub use manager::QueryManager;

use crate::db::models::{QueryRow, QueryStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Client-facing query projection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryView {
    pub id: String,
    pub sender_id: Option<String>,
    pub event_id: String,
    pub subject: String,
    pub message: String,
    pub status: QueryStatus,
    pub created_at: DateTime<Utc>,
}

impl From<QueryRow> for QueryView {
    fn from(row: QueryRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            event_id: row.event_id,
            subject: row.subject,
            message: row.message,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Feedback creation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQueryRequest {
    #[validate(length(min = 1, max = 150, message = "subject must be 1-150 characters"))]
    pub subject: String,
    #[validate(length(min = 1, max = 2000, message = "message must be 1-2000 characters"))]
    pub message: String,
}
