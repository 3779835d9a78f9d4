use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::admin::capability::{AdminCapability, AdminKeys};
use crate::admin::dto::{AdminSecretView, CreateSecretRequest};
use crate::auth::password::{hash_password, verify_password};
use crate::error::AppError;
use crate::state::AppState;

pub const MIN_SECRET_LEN: usize = 8;

fn secrets_match(expected: &str, given: &str) -> bool {
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

/// Outcome of a successful secret check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminGrant {
    pub bootstrap: bool,
}

/// Checks a submitted admin secret. Until the first admin-secret record exists
/// only the configured bootstrap secret is accepted; afterwards only stored ones.
pub async fn verify_admin_secret(st: &AppState, secret: Option<String>) -> Result<AdminGrant, AppError> {
    let secret = secret.map(|s| s.trim().to_string()).unwrap_or_default();
    if secret.is_empty() {
        warn!("admin auth without secret");
        return Err(AppError::Unauthorized);
    }

    let creds = &st.store.credentials;
    if !creds.has_admin_secrets().await? {
        return match st.config.admin.initial_secret.as_deref() {
            Some(initial) if secrets_match(initial, &secret) => {
                info!("admin bootstrap access granted");
                Ok(AdminGrant { bootstrap: true })
            }
            Some(_) => {
                warn!("admin bootstrap secret mismatch");
                Err(AppError::Unauthorized)
            }
            None => {
                warn!("admin auth attempted with bootstrap disabled");
                Err(AppError::Unauthorized)
            }
        };
    }

    for record in creds.list_admin_secrets().await? {
        if verify_password(&secret, &record.secret_hash)? {
            info!(secret_id = %record.id, "admin access granted");
            return Ok(AdminGrant { bootstrap: false });
        }
    }

    warn!("admin secret mismatch");
    Err(AppError::Unauthorized)
}

pub fn issue_token(keys: &AdminKeys, grant: AdminGrant) -> Result<String, AppError> {
    Ok(keys.sign(grant.bootstrap)?)
}

pub async fn create_admin_secret(st: &AppState, req: CreateSecretRequest) -> Result<AdminSecretView, AppError> {
    let label = req
        .label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "admin".to_string());
    let secret = req.secret.map(|s| s.trim().to_string()).unwrap_or_default();
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(AppError::validation(format!(
            "Secret must be at least {MIN_SECRET_LEN} characters long"
        )));
    }

    let hash = hash_password(&secret, &st.config.password)?;
    let record = st.store.credentials.create_admin_secret(&label, &hash).await?;

    info!(secret_id = %record.id, label = %record.label, "admin secret created");
    Ok(record.into())
}

/// Write guard for listing mutations. Only enforced when configured.
pub fn ensure_admin(st: &AppState, cap: Option<&AdminCapability>) -> Result<(), AppError> {
    if st.config.admin.require_token_for_writes && cap.is_none() {
        warn!("listing write without admin token");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::notifier::LogNotifier;
    use crate::state::test_config;
    use crate::store::Store;

    fn secret(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    fn create_req(label: &str, secret: &str) -> CreateSecretRequest {
        CreateSecretRequest {
            label: Some(label.into()),
            secret: Some(secret.into()),
        }
    }

    #[tokio::test]
    async fn bootstrap_secret_works_until_first_record() {
        let st = AppState::fake();
        let grant = verify_admin_secret(&st, secret("  bootstrap-secret ")).await.unwrap();
        assert!(grant.bootstrap);

        let view = create_admin_secret(&st, create_req("ops", "long-enough-secret"))
            .await
            .unwrap();
        assert_eq!(view.label, "ops");

        let err = verify_admin_secret(&st, secret("bootstrap-secret")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let grant = verify_admin_secret(&st, secret("long-enough-secret")).await.unwrap();
        assert!(!grant.bootstrap);
    }

    #[tokio::test]
    async fn failures_are_generic() {
        let st = AppState::fake();
        let wrong = verify_admin_secret(&st, secret("nope")).await.unwrap_err();
        let missing = verify_admin_secret(&st, None).await.unwrap_err();
        assert!(matches!(wrong, AppError::Unauthorized));
        assert!(matches!(missing, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn unset_bootstrap_disables_gate() {
        let mut config = test_config();
        config.admin.initial_secret = None;
        let st = AppState::from_parts(Arc::new(config), Store::memory(), Arc::new(LogNotifier));
        let err = verify_admin_secret(&st, secret("bootstrap-secret")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn stored_secret_is_hashed() {
        let st = AppState::fake();
        create_admin_secret(&st, create_req("ops", "long-enough-secret"))
            .await
            .unwrap();
        let stored = st.store.credentials.list_admin_secrets().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].secret_hash, "long-enough-secret");
        assert!(stored[0].secret_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn short_secret_is_rejected() {
        let st = AppState::fake();
        let err = create_admin_secret(&st, create_req("ops", "short")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!st.store.credentials.has_admin_secrets().await.unwrap());
    }

    #[test]
    fn bootstrap_comparison_is_exact() {
        assert!(secrets_match("bootstrap-secret", "bootstrap-secret"));
        assert!(!secrets_match("bootstrap-secret", "bootstrap-secreT"));
        assert!(!secrets_match("bootstrap-secret", "bootstrap"));
        assert!(!secrets_match("bootstrap-secret", "bootstrap-secret-and-more"));
        assert!(!secrets_match("", "x"));
    }

    #[test]
    fn write_guard_follows_config() {
        let st = AppState::fake();
        assert!(ensure_admin(&st, None).is_ok());

        let mut config = test_config();
        config.admin.require_token_for_writes = true;
        let strict = AppState::from_parts(Arc::new(config), Store::memory(), Arc::new(LogNotifier));
        assert!(matches!(ensure_admin(&strict, None), Err(AppError::Unauthorized)));
        assert!(ensure_admin(&strict, Some(&AdminCapability { bootstrap: false })).is_ok());
    }
}
