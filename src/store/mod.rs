//! Data-access contract and its interchangeable backends.
//!
//! Services only ever see the traits below through [`Store`]. Which backend
//! sits behind them is decided once, in [`initialize`].

pub mod file;
pub mod memory;
pub mod models;
pub mod postgres;
mod tables;

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use models::{AdminSecret, Listing, ListingPatch, NewListing, TokenRedemption, User};

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// All listings, newest first.
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError>;
    async fn get_by_id(&self, id: &str) -> Result<Listing, StoreError>;
    async fn create(&self, listing: NewListing) -> Result<Listing, StoreError>;
    async fn update(&self, id: &str, patch: ListingPatch) -> Result<Listing, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// Inserts a complete record from another store as-is. `false` when the id exists.
    async fn import(&self, listing: Listing) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SavedListingIndex: Send + Sync {
    /// Flips the bookmark and returns the new state.
    async fn toggle(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError>;
    async fn is_saved(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError>;
    /// Saved listings, newest bookmark first. Bookmarks of deleted listings are skipped.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Listing>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, email: &str, password_hash: &str, name: &str) -> Result<User, StoreError>;
    async fn set_reset_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
    async fn clear_reset_token(&self, user_id: &str) -> Result<(), StoreError>;
    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Replaces the hash and drops any pending reset token in one step.
    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), StoreError>;
    /// Consumes a live reset token and installs the new hash atomically, so a
    /// token can never be redeemed twice. An expired token is cleared.
    async fn redeem_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<TokenRedemption, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Inserts a complete record from another store. `false` when the id or email exists.
    async fn import_user(&self, user: User) -> Result<bool, StoreError>;

    async fn has_admin_secrets(&self) -> Result<bool, StoreError>;
    async fn list_admin_secrets(&self) -> Result<Vec<AdminSecret>, StoreError>;
    async fn create_admin_secret(&self, label: &str, secret_hash: &str) -> Result<AdminSecret, StoreError>;
}

/// The active backend, seen through each of its contracts.
#[derive(Clone)]
pub struct Store {
    pub listings: Arc<dyn ListingStore>,
    pub saved: Arc<dyn SavedListingIndex>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Store {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ListingStore + SavedListingIndex + CredentialStore + 'static,
    {
        Self {
            listings: backend.clone(),
            saved: backend.clone(),
            credentials: backend,
        }
    }

    pub fn memory() -> Self {
        Self::from_backend(Arc::new(memory::MemoryStore::default()))
    }
}

/// Opens the configured backend. Called once at startup; failures abort startup.
pub async fn initialize(config: &StoreConfig) -> Result<Store, StoreError> {
    let store = match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Store::memory()
        }
        StoreBackend::File => {
            let backend = file::FileStore::open(&config.data_dir).await?;
            tracing::info!(data_dir = %config.data_dir, "file store ready");
            Store::from_backend(Arc::new(backend))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| StoreError::NotConfigured("DATABASE_URL".into()))?;
            let backend = postgres::PgStore::connect(url, config.max_connections).await?;
            tracing::info!("postgres store ready");
            Store::from_backend(Arc::new(backend))
        }
    };
    Ok(store)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
