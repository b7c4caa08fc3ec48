/// Authentication extractors
///
/// Access tokens are stateless JWTs; every extractor here verifies the
/// signature and expiry without touching the database. Role checks also
/// stay in-memory since the role claim is immutable per account.
use crate::{
    context::AppContext,
    db::models::Role,
    error::ApiError,
    tokens,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Authenticated identity attached to a request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
    pub role: Role,
}

/// Extract the access token from the `accessToken` cookie or an
/// `Authorization: Bearer` header
fn extract_access_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_access_token(parts)
            .ok_or_else(|| ApiError::Authentication("NoAccessToken".to_string()))?;

        let claims = tokens::verify_access_token(&token, &state.config.auth.jwt_secret)?;

        Ok(AuthContext {
            account_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Optional authenticated identity - does not fail when absent or invalid
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_access_token(parts) {
            Some(token) => tokens::verify_access_token(&token, &state.config.auth.jwt_secret)
                .ok()
                .map(|claims| AuthContext {
                    account_id: claims.sub,
                    role: claims.role,
                }),
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Authenticated identity that must be an organizer
#[derive(Debug, Clone)]
pub struct OrganizerAuth(pub AuthContext);

#[async_trait]
impl FromRequestParts<AppContext> for OrganizerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_request_parts(parts, state).await?;
        if ctx.role != Role::Organizer {
            return Err(ApiError::Authorization("WrongRole".to_string()));
        }
        Ok(OrganizerAuth(ctx))
    }
}

/// Authenticated identity that must be a regular user
#[derive(Debug, Clone)]
pub struct UserAuth(pub AuthContext);

#[async_trait]
impl FromRequestParts<AppContext> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_request_parts(parts, state).await?;
        if ctx.role != Role::User {
            return Err(ApiError::Authorization("WrongRole".to_string()));
        }
        Ok(UserAuth(ctx))
    }
}

/// Client metadata recorded on refresh-token records
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First forwarded hop when behind a proxy, otherwise the peer
        // address recorded by the listener
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(ClientMeta { ip, user_agent })
    }
}
