use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{config::AdminConfig, error::AppError, state::AppState, store::Store};

const ADMIN_SUBJECT: &str = "admin";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Admin,
}

/// Capability token payload. Carries no identity, only proof of passing the secret gate.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
    /// Whether the gate was passed with the bootstrap secret.
    pub bootstrap: bool,
}

#[derive(Clone)]
pub struct AdminKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for AdminKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.admin)
    }
}

impl AdminKeys {
    pub fn new(config: &AdminConfig) -> Self {
        let AdminConfig {
            token_secret,
            issuer,
            audience,
            ttl_minutes,
            ..
        } = config;
        Self {
            encoding: EncodingKey::from_secret(token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(token_secret.as_bytes()),
            issuer: issuer.clone(),
            audience: audience.clone(),
            ttl: Duration::from_secs((*ttl_minutes).max(1) as u64 * 60),
        }
    }

    pub fn sign(&self, bootstrap: bool) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = AdminClaims {
            sub: ADMIN_SUBJECT.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind: TokenKind::Admin,
            bootstrap,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(bootstrap, "admin token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<AdminClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<AdminClaims>(token, &self.decoding, &validation)?;
        if data.claims.kind != TokenKind::Admin {
            anyhow::bail!("not an admin token");
        }
        debug!(bootstrap = data.claims.bootstrap, "admin token verified");
        Ok(data.claims)
    }
}

/// Proof that the request carries a valid admin capability token.
#[derive(Debug, Clone, Copy)]
pub struct AdminCapability {
    pub bootstrap: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminCapability
where
    S: Send + Sync,
    AdminKeys: FromRef<S>,
    Store: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = AdminKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized)?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired admin token");
            AppError::Unauthorized
        })?;

        // Bootstrap tokens stop working once the first secret record exists.
        if claims.bootstrap && Store::from_ref(state).credentials.has_admin_secrets().await? {
            warn!("bootstrap admin token presented after secrets were created");
            return Err(AppError::Unauthorized);
        }

        Ok(AdminCapability {
            bootstrap: claims.bootstrap,
        })
    }
}
