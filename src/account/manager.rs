/// Account manager: registration, credential checks, and the refresh-token
/// service (issue / resolve / rotate / revoke), using sqlx runtime queries
/// so no DATABASE_URL is needed during compilation.
use crate::{
    config::AppConfig,
    db::models::{Account, RefreshTokenRecord, Role},
    error::{ApiError, ApiResult},
    tokens,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Size of opaque refresh / verification tokens in bytes (before hex)
const OPAQUE_TOKEN_BYTES: usize = 32;

/// A freshly issued refresh token. The plaintext exists only in this value
/// and in the cookie set from it; the store keeps the digest.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub plaintext: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of resolving a presented refresh token
#[derive(Debug, Clone)]
pub struct ResolvedRefreshToken {
    pub account: Account,
    pub record: RefreshTokenRecord,
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<AppConfig>,
}

impl AccountManager {
    pub fn new(db: SqlitePool, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    // ==================== Accounts ====================

    /// Create a new account. Email is normalized to lowercase before the
    /// uniqueness check and the insert; the role is fixed for the account's
    /// lifetime.
    pub async fn register(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> ApiResult<Account> {
        let email = email.trim().to_lowercase();

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE email = ?1")
            .bind(&email)
            .fetch_one(&self.db)
            .await?;

        if existing > 0 {
            return Err(ApiError::Conflict("Email already registered".to_string()));
        }

        let password_hash = Self::hash_password(password)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO accounts (id, display_name, email, password_hash, role, is_email_verified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(display_name)
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .bind(false)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!(account_id = %id, role = %role, "account created");

        Ok(Account {
            id,
            display_name: display_name.to_string(),
            email,
            password_hash,
            role,
            is_email_verified: false,
            reset_otp: None,
            reset_otp_expires_at: None,
            created_at: now,
        })
    }

    /// Look up an account by normalized email within the declared role and
    /// verify the password. Unknown email and wrong password produce the
    /// same error so callers cannot enumerate accounts.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> ApiResult<Account> {
        let email = email.trim().to_lowercase();

        let account = sqlx::query_as::<_, Account>(
            "SELECT id, display_name, email, password_hash, role, is_email_verified,
                    reset_otp, reset_otp_expires_at, created_at
             FROM accounts WHERE email = ?1 AND role = ?2",
        )
        .bind(&email)
        .bind(role)
        .fetch_optional(&self.db)
        .await?;

        let account = match account {
            Some(a) => a,
            None => {
                return Err(ApiError::Authentication("InvalidCredentials".to_string()));
            }
        };

        if !Self::verify_password(password, &account.password_hash)? {
            return Err(ApiError::Authentication("InvalidCredentials".to_string()));
        }

        Ok(account)
    }

    /// Get account by id
    pub async fn get_account(&self, account_id: &str) -> ApiResult<Account> {
        sqlx::query_as::<_, Account>(
            "SELECT id, display_name, email, password_hash, role, is_email_verified,
                    reset_otp, reset_otp_expires_at, created_at
             FROM accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("AccountNotFound".to_string()))
    }

    // ==================== Refresh token service ====================

    /// Issue a new refresh token for an account. Only the digest is stored,
    /// together with the issuing IP and user agent; the plaintext is
    /// returned exactly once. Fails with `AccountNotFound` if the account
    /// vanished between authentication and persistence, which indicates a
    /// consistency bug and is not retryable.
    pub async fn issue_refresh_token(
        &self,
        account_id: &str,
        role: Role,
        issuing_ip: &str,
        user_agent: &str,
    ) -> ApiResult<IssuedRefreshToken> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE id = ?1")
            .bind(account_id)
            .fetch_one(&self.db)
            .await?;

        if exists == 0 {
            return Err(ApiError::NotFound("AccountNotFound".to_string()));
        }

        let plaintext = tokens::generate_opaque_token(OPAQUE_TOKEN_BYTES);
        let token_hash = tokens::hash_token(&plaintext);
        let now = Utc::now();
        let expires_at = now + Duration::days(self.config.auth.refresh_ttl_days);

        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, account_id, role, created_at, expires_at, issuing_ip, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&token_hash)
        .bind(account_id)
        .bind(role)
        .bind(now)
        .bind(expires_at)
        .bind(issuing_ip)
        .bind(user_agent)
        .execute(&self.db)
        .await?;

        Ok(IssuedRefreshToken {
            plaintext,
            expires_at,
        })
    }

    /// Resolve a presented refresh token to its account and record.
    ///
    /// Returns `None` (not an error) when no record matches the digest;
    /// that is the expected outcome for a forged or already-revoked token.
    /// Expiry is NOT checked here so the caller can distinguish
    /// `RefreshTokenExpired` from `InvalidRefreshToken`.
    pub async fn resolve_refresh_token(
        &self,
        plaintext: &str,
    ) -> ApiResult<Option<ResolvedRefreshToken>> {
        let token_hash = tokens::hash_token(plaintext);

        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token_hash, account_id, role, created_at, expires_at, issuing_ip, user_agent
             FROM refresh_tokens WHERE token_hash = ?1",
        )
        .bind(&token_hash)
        .fetch_optional(&self.db)
        .await?;

        let record = match record {
            Some(r) => r,
            None => return Ok(None),
        };

        match self.get_account(&record.account_id).await {
            Ok(account) => Ok(Some(ResolvedRefreshToken { account, record })),
            Err(ApiError::NotFound(_)) => {
                // Orphaned record; the owning account is gone
                tracing::warn!(account_id = %record.account_id, "refresh token without account, purging");
                self.purge_refresh_token(&record.token_hash).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Rotate a refresh token: replace-if-present inside one transaction.
    ///
    /// If the old digest is already gone the token was rotated or revoked
    /// by another request, which is indistinguishable from replay. In that
    /// case every refresh token for the account is revoked and the call
    /// fails, forcing a fresh login on all of the account's sessions.
    pub async fn rotate_refresh_token(
        &self,
        account_id: &str,
        old_plaintext: &str,
        issuing_ip: &str,
        user_agent: &str,
    ) -> ApiResult<IssuedRefreshToken> {
        let old_hash = tokens::hash_token(old_plaintext);

        let mut tx = self.db.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM refresh_tokens WHERE token_hash = ?1 AND account_id = ?2",
        )
        .bind(&old_hash)
        .bind(account_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            // Possible token reuse: revoke the whole session set
            sqlx::query("DELETE FROM refresh_tokens WHERE account_id = ?1")
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::warn!(
                account_id = %account_id,
                "refresh token reuse detected, revoked all sessions"
            );
            return Err(ApiError::Authentication("InvalidRefreshToken".to_string()));
        }

        let role: Option<Role> =
            sqlx::query_scalar("SELECT role FROM accounts WHERE id = ?1")
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await?;

        let role = role.ok_or_else(|| ApiError::NotFound("AccountNotFound".to_string()))?;

        let plaintext = tokens::generate_opaque_token(OPAQUE_TOKEN_BYTES);
        let token_hash = tokens::hash_token(&plaintext);
        let now = Utc::now();
        let expires_at = now + Duration::days(self.config.auth.refresh_ttl_days);

        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, account_id, role, created_at, expires_at, issuing_ip, user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&token_hash)
        .bind(account_id)
        .bind(role)
        .bind(now)
        .bind(expires_at)
        .bind(issuing_ip)
        .bind(user_agent)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(IssuedRefreshToken {
            plaintext,
            expires_at,
        })
    }

    /// Revoke exactly the refresh token matching the plaintext. Idempotent:
    /// revoking an absent token is not an error.
    pub async fn revoke_refresh_token(&self, account_id: &str, plaintext: &str) -> ApiResult<()> {
        let token_hash = tokens::hash_token(plaintext);

        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?1 AND account_id = ?2")
            .bind(&token_hash)
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Clear every refresh token for the account ("logout everywhere")
    pub async fn revoke_all_refresh_tokens(&self, account_id: &str) -> ApiResult<()> {
        let removed = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = ?1")
            .bind(account_id)
            .execute(&self.db)
            .await?
            .rows_affected();

        tracing::info!(account_id = %account_id, removed, "revoked all refresh tokens");

        Ok(())
    }

    /// Delete a single refresh-token record by digest (lazy expiry path)
    pub async fn purge_refresh_token(&self, token_hash: &str) -> ApiResult<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?1")
            .bind(token_hash)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Cleanup expired refresh and email tokens.
    ///
    /// Expiry is enforced lazily at resolve time; this is a periodic sweep
    /// to keep the tables small. Returns (refresh_deleted, email_deleted).
    pub async fn cleanup_expired_tokens(&self) -> ApiResult<(u64, u64)> {
        let now = Utc::now();

        let refresh_deleted = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        let email_deleted = sqlx::query("DELETE FROM email_tokens WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        if refresh_deleted > 0 || email_deleted > 0 {
            tracing::info!(refresh_deleted, email_deleted, "cleaned up expired tokens");
        }

        Ok((refresh_deleted, email_deleted))
    }

    // ==================== Email verification ====================

    /// Generate an email-verification token (24 hour expiry). Stores the
    /// digest; the plaintext goes into the verification link.
    pub async fn create_email_verification_token(&self, account_id: &str) -> ApiResult<String> {
        let plaintext = tokens::generate_opaque_token(OPAQUE_TOKEN_BYTES);
        let token_hash = tokens::hash_token(&plaintext);
        let now = Utc::now();
        let expires_at = now + Duration::hours(24);

        sqlx::query(
            "INSERT INTO email_tokens (token_hash, account_id, purpose, created_at, expires_at)
             VALUES (?1, ?2, 'verify_email', ?3, ?4)",
        )
        .bind(&token_hash)
        .bind(account_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(plaintext)
    }

    /// Consume an email-verification token and flip `is_email_verified`.
    /// Single-use: the row is deleted on success and on expiry.
    pub async fn confirm_email(&self, plaintext: &str) -> ApiResult<String> {
        let token_hash = tokens::hash_token(plaintext);
        let now = Utc::now();

        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT account_id, expires_at FROM email_tokens
             WHERE token_hash = ?1 AND purpose = 'verify_email'",
        )
        .bind(&token_hash)
        .fetch_optional(&self.db)
        .await?;

        let (account_id, expires_at) = row
            .ok_or_else(|| ApiError::NotFound("Invalid verification token".to_string()))?;

        sqlx::query("DELETE FROM email_tokens WHERE token_hash = ?1")
            .bind(&token_hash)
            .execute(&self.db)
            .await?;

        if now > expires_at {
            return Err(ApiError::Validation(
                "Verification token has expired".to_string(),
            ));
        }

        sqlx::query("UPDATE accounts SET is_email_verified = 1 WHERE id = ?1")
            .bind(&account_id)
            .execute(&self.db)
            .await?;

        tracing::info!(account_id = %account_id, "email verified");

        Ok(account_id)
    }

    // ==================== Password reset (OTP) ====================

    /// Generate a 6-digit OTP for password reset and store its digest on
    /// the account. Returns `None` when no account matches so the caller
    /// can keep the response uniform.
    pub async fn issue_password_reset_otp(
        &self,
        email: &str,
    ) -> ApiResult<Option<(String, Account)>> {
        let email = email.trim().to_lowercase();

        let account = sqlx::query_as::<_, Account>(
            "SELECT id, display_name, email, password_hash, role, is_email_verified,
                    reset_otp, reset_otp_expires_at, created_at
             FROM accounts WHERE email = ?1",
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?;

        let account = match account {
            Some(a) => a,
            None => return Ok(None),
        };

        let otp = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let otp_hash = tokens::hash_token(&otp);
        let expires_at = Utc::now() + Duration::minutes(self.config.auth.otp_ttl_minutes);

        sqlx::query(
            "UPDATE accounts SET reset_otp = ?1, reset_otp_expires_at = ?2 WHERE id = ?3",
        )
        .bind(&otp_hash)
        .bind(expires_at)
        .bind(&account.id)
        .execute(&self.db)
        .await?;

        Ok(Some((otp, account)))
    }

    /// Consume an OTP and set a new password. The OTP is cleared on success
    /// (single consumption) and every refresh token for the account is
    /// revoked so old sessions cannot outlive the old password.
    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> ApiResult<()> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();

        let account = sqlx::query_as::<_, Account>(
            "SELECT id, display_name, email, password_hash, role, is_email_verified,
                    reset_otp, reset_otp_expires_at, created_at
             FROM accounts WHERE email = ?1",
        )
        .bind(&email)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::Validation("Invalid or expired OTP".to_string()))?;

        let stored_hash = account
            .reset_otp
            .as_deref()
            .ok_or_else(|| ApiError::Validation("Invalid or expired OTP".to_string()))?;

        let expired = account
            .reset_otp_expires_at
            .map(|t| now > t)
            .unwrap_or(true);

        if expired || tokens::hash_token(otp) != stored_hash {
            return Err(ApiError::Validation("Invalid or expired OTP".to_string()));
        }

        let password_hash = Self::hash_password(new_password)?;

        sqlx::query(
            "UPDATE accounts
             SET password_hash = ?1, reset_otp = NULL, reset_otp_expires_at = NULL
             WHERE id = ?2",
        )
        .bind(&password_hash)
        .bind(&account.id)
        .execute(&self.db)
        .await?;

        self.revoke_all_refresh_tokens(&account.id).await?;

        tracing::info!(account_id = %account.id, "password reset completed");

        Ok(())
    }

    // ==================== Password hashing ====================

    fn hash_password(password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify_password(password: &str, stored: &str) -> ApiResult<bool> {
        let parsed = PasswordHash::new(stored)
            .map_err(|e| ApiError::Internal(format!("Corrupt password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
