/// Account management
///
/// Account records, the sanitized client projection, and the request
/// shapes for the auth endpoints.

mod manager;

pub use manager::{AccountManager, IssuedRefreshToken, ResolvedRefreshToken};

use crate::db::models::{Account, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Sanitized account projection: the subset of account fields safe to
/// return to a client. Never contains the password hash or token material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            display_name: account.display_name,
            email: account.email,
            role: account.role,
            is_email_verified: account.is_email_verified,
            created_at: account.created_at,
        }
    }
}

/// Registration request (role chosen explicitly)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 80, message = "display name must be 2-80 characters"))]
    pub display_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    pub password: String,
    pub role: Role,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// Request an OTP for password reset
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetOtpRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

/// Consume an OTP and set a new password
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(equal = 6, message = "otp must be 6 digits"))]
    pub otp: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    pub new_password: String,
}

/// Session response: the sanitized account (tokens travel in cookies)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub account: AccountView,
}
