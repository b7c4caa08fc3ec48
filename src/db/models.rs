/// Database row types
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account role, fixed at creation and never mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Organizer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Organizer => "organizer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account record in the database
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub reset_otp: Option<String>,
    pub reset_otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Refresh token record, keyed by the token digest.
///
/// Only the digest is ever stored; the plaintext is returned once to the
/// caller and never persisted.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub account_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuing_ip: String,
    pub user_agent: String,
}

/// Event record in the database. Post-event stats are stored flat and
/// projected into `EventStats` at the API boundary.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub organizer_id: String,
    pub title: String,
    pub location: String,
    pub description: String,
    pub likes: i64,
    pub views: i64,
    /// JSON array of image URLs
    pub images: String,
    pub start_at: Option<DateTime<Utc>>,
    pub stats_attendance: Option<i64>,
    pub stats_rating: Option<f64>,
    pub stats_revenue: Option<f64>,
    pub stats_cost: Option<f64>,
    pub stats_highlights: Option<String>,
    pub stats_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Feedback/query resolution status (a toggle, not a one-way transition)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Resolved,
}

impl QueryStatus {
    pub fn toggled(self) -> Self {
        match self {
            QueryStatus::Pending => QueryStatus::Resolved,
            QueryStatus::Resolved => QueryStatus::Pending,
        }
    }
}

/// Feedback/query record
#[derive(Debug, Clone, FromRow)]
pub struct QueryRow {
    pub id: String,
    pub sender_id: Option<String>,
    pub event_id: String,
    pub subject: String,
    pub message: String,
    pub status: QueryStatus,
    pub created_at: DateTime<Utc>,
}
