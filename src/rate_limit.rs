/// Rate limiting
use crate::{
    config::RateLimitSettings,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

fn non_zero(value: u32, fallback: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or_else(|| NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN)
}

/// Rate limiter manager with separate quotas for authenticated and
/// anonymous traffic
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    unauthenticated: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let auth_quota = Quota::per_second(non_zero(settings.authenticated_rps, 100))
            .allow_burst(non_zero(settings.burst_size, 50));

        // Anonymous traffic gets a fifth of the burst allowance
        let unauth_quota = Quota::per_second(non_zero(settings.unauthenticated_rps, 20))
            .allow_burst(non_zero(settings.burst_size / 5, 10));

        Self {
            enabled: settings.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    pub fn check_authenticated(&self) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.authenticated
            .check()
            .map_err(|_| ApiError::RateLimitExceeded)
    }

    pub fn check_unauthenticated(&self) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.unauthenticated
            .check()
            .map_err(|_| ApiError::RateLimitExceeded)
    }
}

/// Rate limiting middleware. A request counts as authenticated if it
/// carries an access token cookie or an Authorization header; the check
/// is coarse on purpose, signature verification happens later in the
/// extractors.
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let has_credentials = request.headers().get("authorization").is_some()
        || request
            .headers()
            .get("cookie")
            .and_then(|h| h.to_str().ok())
            .map(|c| c.contains(crate::auth::ACCESS_COOKIE))
            .unwrap_or(false);

    if has_credentials {
        ctx.rate_limiter.check_authenticated()?;
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool) -> RateLimitSettings {
        RateLimitSettings {
            enabled,
            authenticated_rps: 10,
            unauthenticated_rps: 5,
            burst_size: 5,
        }
    }

    #[test]
    fn first_requests_pass() {
        let limiter = RateLimiter::new(&settings(true));
        assert!(limiter.check_authenticated().is_ok());
        assert!(limiter.check_unauthenticated().is_ok());
    }

    #[test]
    fn burst_is_bounded() {
        let limiter = RateLimiter::new(&settings(true));

        for _ in 0..5 {
            assert!(limiter.check_authenticated().is_ok());
        }
        assert!(limiter.check_authenticated().is_err());
    }

    #[test]
    fn disabled_limiter_never_rejects() {
        let limiter = RateLimiter::new(&settings(false));

        for _ in 0..100 {
            assert!(limiter.check_unauthenticated().is_ok());
        }
    }
}
