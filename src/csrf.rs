/// CSRF protection (double-submit cookie)
///
/// `GET /api/csrf-token` issues a random secret as a non-httpOnly cookie
/// and echoes the same value in the body; every state-mutating route is
/// wrapped in `csrf_gate`, which requires the `x-csrf-token` header to
/// match the cookie. The refresh-token endpoint is deliberately exempt:
/// it is the recovery path for a session whose csrf cookie may be gone.
use crate::{context::AppContext, error::ApiError, tokens};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;

pub const CSRF_COOKIE: &str = "csrfToken";
pub const CSRF_HEADER: &str = "x-csrf-token";

const CSRF_TOKEN_BYTES: usize = 24;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Issue a CSRF cookie/token pair
pub async fn issue_csrf_token(
    State(ctx): State<AppContext>,
    jar: CookieJar,
) -> (CookieJar, Json<CsrfTokenResponse>) {
    let token = tokens::generate_opaque_token(CSRF_TOKEN_BYTES);

    // Readable by the frontend so it can echo the header; that is the point
    // of the double-submit pattern.
    let mut cookie = Cookie::new(CSRF_COOKIE, token.clone());
    cookie.set_path("/");
    cookie.set_http_only(false);
    cookie.set_secure(ctx.config.cookies.secure);
    cookie.set_same_site(if ctx.config.cookies.secure {
        SameSite::None
    } else {
        SameSite::Lax
    });
    if let Some(domain) = &ctx.config.cookies.domain {
        cookie.set_domain(domain.clone());
    }

    (jar.add(cookie), Json(CsrfTokenResponse { csrf_token: token }))
}

/// Middleware rejecting mutations whose header token does not match the
/// cookie-bound secret
pub async fn csrf_gate(
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let cookie_value = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Authorization("Missing CSRF token".to_string()))?;

    let header_value = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Authorization("Missing CSRF token".to_string()))?;

    // Compare digests rather than raw strings to keep the comparison
    // constant-time with respect to the secret.
    if tokens::hash_token(header_value) != tokens::hash_token(&cookie_value) {
        return Err(ApiError::Authorization("Invalid CSRF token".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn gated_router() -> Router {
        Router::new()
            .route("/mutate", post(|| async { "ok" }))
            .route_layer(middleware::from_fn(csrf_gate))
    }

    fn mutate_request(cookie: Option<&str>, header: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("POST").uri("/mutate");
        if let Some(token) = cookie {
            builder = builder.header("cookie", format!("{}={}", CSRF_COOKIE, token));
        }
        if let Some(token) = header {
            builder = builder.header(CSRF_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn matching_cookie_and_header_pass() {
        let response = gated_router()
            .oneshot(mutate_request(Some("secret-token"), Some("secret-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mismatched_header_is_forbidden() {
        let response = gated_router()
            .oneshot(mutate_request(Some("secret-token"), Some("other-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_header_is_forbidden() {
        let response = gated_router()
            .oneshot(mutate_request(Some("secret-token"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_cookie_is_forbidden() {
        let response = gated_router()
            .oneshot(mutate_request(None, Some("secret-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
