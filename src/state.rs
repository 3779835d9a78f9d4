use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;

use crate::auth::notifier::{LogNotifier, ResetNotifier};
use crate::config::AppConfig;
use crate::store::{self, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
    pub notifier: Arc<dyn ResetNotifier>,
}

impl FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = store::initialize(&config.store)
            .await
            .with_context(|| format!("open {:?} store", config.store.backend))?;

        let notifier = Arc::new(LogNotifier) as Arc<dyn ResetNotifier>;

        Ok(Self {
            config,
            store,
            notifier,
        })
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Store, notifier: Arc<dyn ResetNotifier>) -> Self {
        Self {
            config,
            store,
            notifier,
        }
    }

    /// In-memory state with cheap hashing, for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(test_config()),
            Store::memory(),
            Arc::new(LogNotifier),
        )
    }
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    use crate::config::{AdminConfig, ListingDefaults, StoreBackend, StoreConfig};

    AppConfig {
        store: StoreConfig {
            backend: StoreBackend::Memory,
            data_dir: "./data".into(),
            database_url: None,
            max_connections: 1,
        },
        admin: AdminConfig {
            initial_secret: Some("bootstrap-secret".into()),
            token_secret: "test-token-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            require_token_for_writes: false,
        },
        listings: ListingDefaults::default(),
        password: crate::auth::password::cheap_params(),
        app_url: "http://localhost:3000".into(),
        reset_token_ttl_minutes: 60,
    }
}
