use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::auth::dto::{LoginRequest, RegisterRequest, ResetPasswordRequest, ResetRequest};
use crate::auth::password::{hash_password, verify_password};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::models::{SafeUser, TokenRedemption};

pub const MIN_PASSWORD_LEN: usize = 6;

pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists with this email, a reset link has been sent.";

pub const PASSWORD_RESET_MESSAGE: &str = "Password has been reset successfully";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 256 bits from the OS RNG, hex encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Trimmed value, or `None` when absent or blank.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_password_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

pub async fn register(st: &AppState, req: RegisterRequest) -> Result<SafeUser, AppError> {
    let (Some(email), Some(password), Some(name)) =
        (present(req.email), present(req.password), present(req.name))
    else {
        return Err(AppError::validation("All fields are required"));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation(
            "Please provide a valid email address format",
        ));
    }
    check_password_strength(&password)?;

    let users = &st.store.credentials;
    if users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::Conflict(
            "An account with this email already exists".into(),
        ));
    }

    let hash = hash_password(&password, &st.config.password)?;
    // The store re-checks uniqueness, which covers a concurrent registration.
    let user = users.create(&email, &hash, &name).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user.into())
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<SafeUser, AppError> {
    let (Some(email), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(AppError::validation("Email and password required"));
    };
    let email = normalize_email(&email);

    let Some(user) = st.store.credentials.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let matches = verify_password(&password, &user.password_hash).unwrap_or_else(|e| {
        // Legacy rows may hold plaintext until the rehash pass has run.
        error!(user_id = %user.id, error = %e, "stored password hash unreadable");
        false
    });
    if !matches {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    info!(user_id = %user.id, "user logged in");
    Ok(user.into())
}

/// Always answers with [`RESET_REQUESTED_MESSAGE`] so callers cannot tell which emails have accounts.
pub async fn request_reset(st: &AppState, req: ResetRequest) -> Result<&'static str, AppError> {
    let Some(email) = present(req.email) else {
        return Err(AppError::validation("Email is required"));
    };
    let email = normalize_email(&email);

    let users = &st.store.credentials;
    let Some(user) = users.find_by_email(&email).await? else {
        info!("reset requested for unknown email");
        return Ok(RESET_REQUESTED_MESSAGE);
    };

    let token = random_token();
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(st.config.reset_token_ttl_minutes);
    users.set_reset_token(&user.id, &token, expires_at).await?;

    let reset_url = format!(
        "{}/reset-password?token={}",
        st.config.app_url.trim_end_matches('/'),
        token
    );
    if let Err(e) = st.notifier.send_reset_link(&user.email, &reset_url).await {
        error!(error = %e, user_id = %user.id, "reset notification failed");
    }

    info!(user_id = %user.id, %expires_at, "reset token issued");
    Ok(RESET_REQUESTED_MESSAGE)
}

pub async fn reset_password(st: &AppState, req: ResetPasswordRequest) -> Result<&'static str, AppError> {
    let (Some(token), Some(password)) = (present(req.token), present(req.password)) else {
        return Err(AppError::validation("Token and new password required"));
    };

    let users = &st.store.credentials;
    let Some(user) = users.find_by_reset_token(&token).await? else {
        warn!("reset attempted with unknown token");
        return Err(AppError::InvalidOrExpiredToken);
    };

    if user
        .reset
        .as_ref()
        .map_or(true, |r| r.is_expired(OffsetDateTime::now_utc()))
    {
        warn!(user_id = %user.id, "reset attempted with expired token");
        users.clear_reset_token(&user.id).await?;
        return Err(AppError::InvalidOrExpiredToken);
    }

    check_password_strength(&password)?;
    let hash = hash_password(&password, &st.config.password)?;

    // Another request may have spent the token while we were hashing.
    match users
        .redeem_reset_token(&token, OffsetDateTime::now_utc(), &hash)
        .await?
    {
        TokenRedemption::Redeemed { user_id } => {
            info!(%user_id, "password reset");
            Ok(PASSWORD_RESET_MESSAGE)
        }
        TokenRedemption::Expired | TokenRedemption::Unknown => {
            warn!(user_id = %user.id, "reset token spent or expired before redemption");
            Err(AppError::InvalidOrExpiredToken)
        }
    }
}
