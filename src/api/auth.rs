/// Auth endpoints: registration, login, session refresh, logout, email
/// verification, and the OTP password-reset flow.
///
/// Tokens travel exclusively in httpOnly cookies; response bodies only
/// ever carry the sanitized account projection.
use crate::{
    account::{
        AccountView, LoginRequest, RegisterRequest, ResetOtpRequest, ResetPasswordRequest,
        SessionResponse,
    },
    auth::{AuthContext, ClientMeta, ACCESS_COOKIE, REFRESH_COOKIE},
    config::CookieConfig,
    context::AppContext,
    csrf,
    db::models::Role,
    error::{ApiError, ApiResult},
    tokens,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build auth routes. Login and logout mutate session state from a
/// browser context, so they sit behind the CSRF gate; the refresh
/// endpoint is exempt because it is the recovery path for a session
/// whose csrf cookie may already be gone.
pub fn routes() -> Router<AppContext> {
    let csrf_protected = Router::new()
        .route("/login-user", post(login_user))
        .route("/login-organizer", post(login_organizer))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route_layer(middleware::from_fn(csrf::csrf_gate));

    Router::new()
        .route("/register", post(register))
        .route("/refresh-token", post(refresh_token))
        .route("/reset-pass-otp", post(reset_pass_otp))
        .route("/reset-password", post(reset_password))
        .route("/verify-email", get(verify_email))
        .merge(csrf_protected)
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ==================== Cookie helpers ====================

fn session_cookie(
    name: &'static str,
    value: String,
    max_age: time::Duration,
    config: &CookieConfig,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_max_age(max_age);
    cookie.set_secure(config.secure);
    cookie.set_same_site(if config.secure {
        SameSite::None
    } else {
        SameSite::Lax
    });
    if let Some(domain) = &config.domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

fn clear_cookie(name: &'static str, config: &CookieConfig) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), time::Duration::ZERO, config);
    cookie.make_removal();
    cookie
}

/// Set both session cookies from a fresh access token and refresh token
fn set_session_cookies(
    jar: CookieJar,
    ctx: &AppContext,
    access_token: String,
    refresh_token: String,
) -> CookieJar {
    let access_ttl = time::Duration::minutes(ctx.config.auth.access_ttl_minutes);
    let refresh_ttl = time::Duration::days(ctx.config.auth.refresh_ttl_days);

    jar.add(session_cookie(
        ACCESS_COOKIE,
        access_token,
        access_ttl,
        &ctx.config.cookies,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        refresh_token,
        refresh_ttl,
        &ctx.config.cookies,
    ))
}

fn clear_session_cookies(jar: CookieJar, ctx: &AppContext) -> CookieJar {
    jar.add(clear_cookie(ACCESS_COOKIE, &ctx.config.cookies))
        .add(clear_cookie(REFRESH_COOKIE, &ctx.config.cookies))
}

// ==================== Handlers ====================

/// Create an account. The role is chosen at registration and fixed for
/// the account's lifetime.
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()?;

    let account = ctx
        .account_manager
        .register(&req.display_name, &req.email, &req.password, req.role)
        .await?;

    let token = ctx
        .account_manager
        .create_email_verification_token(&account.id)
        .await?;

    if let Err(e) = ctx
        .mailer
        .send_verification_email(
            &account.email,
            &account.display_name,
            &token,
            &ctx.config.service.public_url,
        )
        .await
    {
        // Registration stands even when the mail bounces; the token can be
        // re-requested later
        tracing::warn!(account_id = %account.id, error = %e, "verification email failed");
    }

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            account: account.into(),
        }),
    ))
}

async fn login_user(
    State(ctx): State<AppContext>,
    meta: ClientMeta,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    login(ctx, meta, jar, req, Role::User).await
}

async fn login_organizer(
    State(ctx): State<AppContext>,
    meta: ClientMeta,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    login(ctx, meta, jar, req, Role::Organizer).await
}

/// Shared login path: verify credentials within the declared role, then
/// issue the access JWT and a refresh token bound to the client metadata.
async fn login(
    ctx: AppContext,
    meta: ClientMeta,
    jar: CookieJar,
    req: LoginRequest,
    role: Role,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    req.validate()?;

    let account = ctx
        .account_manager
        .verify_credentials(&req.email, &req.password, role)
        .await?;

    let access = tokens::issue_access_token(
        &account.id,
        account.role,
        &ctx.config.auth.jwt_secret,
        ctx.config.auth.access_ttl_minutes,
    )?;
    let refresh = ctx
        .account_manager
        .issue_refresh_token(&account.id, account.role, &meta.ip, &meta.user_agent)
        .await?;

    tracing::info!(account_id = %account.id, role = %account.role, "login");

    let jar = set_session_cookies(jar, &ctx, access, refresh.plaintext);

    Ok((
        jar,
        Json(SessionResponse {
            account: account.into(),
        }),
    ))
}

/// Rotate the refresh token and mint a fresh access token.
///
/// Expired tokens are deleted and reported as expired, never silently
/// rotated. An unknown digest means the token was forged, already
/// rotated, or revoked.
async fn refresh_token(
    State(ctx): State<AppContext>,
    meta: ClientMeta,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    let plaintext = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Authentication("NoRefreshToken".to_string()))?;

    let resolved = ctx
        .account_manager
        .resolve_refresh_token(&plaintext)
        .await?
        .ok_or_else(|| ApiError::Authentication("InvalidRefreshToken".to_string()))?;

    if Utc::now() > resolved.record.expires_at {
        ctx.account_manager
            .purge_refresh_token(&resolved.record.token_hash)
            .await?;
        return Err(ApiError::Authentication("RefreshTokenExpired".to_string()));
    }

    let rotated = ctx
        .account_manager
        .rotate_refresh_token(&resolved.account.id, &plaintext, &meta.ip, &meta.user_agent)
        .await?;
    let access = tokens::issue_access_token(
        &resolved.account.id,
        resolved.account.role,
        &ctx.config.auth.jwt_secret,
        ctx.config.auth.access_ttl_minutes,
    )?;

    let jar = set_session_cookies(jar, &ctx, access, rotated.plaintext);

    Ok((
        jar,
        Json(SessionResponse {
            account: resolved.account.into(),
        }),
    ))
}

/// Revoke exactly the session behind the refresh cookie. Idempotent: the
/// cookies are cleared whether or not a record matched.
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        ctx.account_manager
            .revoke_refresh_token(&auth.account_id, cookie.value())
            .await?;
    }

    let jar = clear_session_cookies(jar, &ctx);

    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// Revoke every session for the account ("logout everywhere")
async fn logout_all(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    ctx.account_manager
        .revoke_all_refresh_tokens(&auth.account_id)
        .await?;

    let jar = clear_session_cookies(jar, &ctx);

    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out everywhere".to_string(),
        }),
    ))
}

/// Issue a password-reset OTP. The response is uniform whether or not the
/// email matches an account, so this endpoint cannot be used to
/// enumerate accounts.
async fn reset_pass_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetOtpRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    if let Some((otp, account)) = ctx.account_manager.issue_password_reset_otp(&req.email).await? {
        if let Err(e) = ctx
            .mailer
            .send_password_reset_otp(
                &account.email,
                &account.display_name,
                &otp,
                ctx.config.auth.otp_ttl_minutes,
            )
            .await
        {
            tracing::warn!(account_id = %account.id, error = %e, "reset OTP email failed");
        }
    }

    Ok(Json(MessageResponse {
        message: "If that email is registered, a reset code has been sent".to_string(),
    }))
}

/// Consume the OTP and set a new password. All of the account's sessions
/// are revoked by the manager on success.
async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    ctx.account_manager
        .reset_password(&req.email, &req.otp, &req.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
struct VerifyEmailParams {
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyEmailResponse {
    account: AccountView,
}

/// Consume an email-verification token from the emailed link
async fn verify_email(
    State(ctx): State<AppContext>,
    Query(params): Query<VerifyEmailParams>,
) -> ApiResult<Json<VerifyEmailResponse>> {
    let account_id = ctx.account_manager.confirm_email(&params.token).await?;
    let account = ctx.account_manager.get_account(&account_id).await?;

    Ok(Json(VerifyEmailResponse {
        account: account.into(),
    }))
}
