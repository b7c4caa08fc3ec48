/// Token utilities: opaque token generation, one-way digests, and the
/// stateless access-token issuer.
///
/// Opaque tokens (refresh, email verification, CSRF) are returned once in
/// plaintext and only their SHA-256 digest is ever stored or compared.
/// Access tokens are HS256 JWTs carrying {account id, role}; verifying one
/// requires no database lookup.
use crate::{
    db::models::Role,
    error::{ApiError, ApiResult},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure opaque token, hex-encoded
pub fn generate_opaque_token(size_bytes: usize) -> String {
    let mut bytes = vec![0u8; size_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One-way digest used as the storage/lookup key for opaque tokens
pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Access token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issue a signed access token for an authenticated account
pub fn issue_access_token(
    account_id: &str,
    role: Role,
    jwt_secret: &str,
    ttl_minutes: i64,
) -> ApiResult<String> {
    let now = Utc::now().timestamp();
    let claims = AccessClaims {
        sub: account_id.to_string(),
        role,
        iat: now,
        exp: now + ttl_minutes * 60,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to sign access token: {}", e)))
}

/// Verify an access token. Bad signature, malformed payload, and expiry all
/// collapse into a 401; the request pipeline never panics on a bad token.
pub fn verify_access_token(token: &str, jwt_secret: &str) -> ApiResult<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 30;

    decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "access token verification failed");
        ApiError::Authentication("InvalidAccessToken".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-that-is-long-enough!";

    #[test]
    fn opaque_tokens_are_unique_and_sized() {
        let a = generate_opaque_token(32);
        let b = generate_opaque_token(32);
        assert_eq!(a.len(), 64); // hex doubles the byte count
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_deterministic_and_opaque() {
        let token = generate_opaque_token(32);
        assert_eq!(hash_token(&token), hash_token(&token));
        assert_ne!(hash_token(&token), token);
    }

    #[test]
    fn access_token_round_trip() {
        let token = issue_access_token("acct-1", Role::Organizer, SECRET, 15).unwrap();
        let claims = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.role, Role::Organizer);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue_access_token("acct-1", Role::User, SECRET, 15).unwrap();
        let result = verify_access_token(&token, "another-secret-also-long-enough!!");
        assert!(matches!(result, Err(ApiError::Authentication(_))));
    }

    #[test]
    fn expired_token_rejected() {
        // Negative TTL puts exp in the past, beyond the 30s leeway
        let token = issue_access_token("acct-1", Role::User, SECRET, -5).unwrap();
        assert!(verify_access_token(&token, SECRET).is_err());
    }

    #[test]
    fn garbage_token_rejected() {
        assert!(verify_access_token("not-a-jwt", SECRET).is_err());
    }
}
