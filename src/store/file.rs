//! Flat-file JSON backend.
//!
//! Four collections (`listings.json`, `users.json`, `saved.json`,
//! `admins.json`), each a JSON array. Every operation reads the files it
//! needs and rewrites the collections it changed. Writes go to a sibling
//! temp file that is renamed over the original.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::models::{
    AdminSecret, Listing, ListingPatch, NewListing, PendingReset, TokenRedemption, User,
};
use super::tables::Tables;
use super::{CredentialStore, ListingStore, SavedListingIndex};
use crate::error::StoreError;

const LISTINGS: &str = "listings.json";
const USERS: &str = "users.json";
const SAVED: &str = "saved.json";
const ADMINS: &str = "admins.json";

pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates the data directory and any missing collection files, then checks
    /// that the existing ones parse.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        for name in [LISTINGS, USERS, SAVED, ADMINS] {
            let path = dir.join(name);
            if !tokio::fs::try_exists(&path).await? {
                tokio::fs::write(&path, b"[]\n").await?;
                tracing::debug!(path = %path.display(), "created empty collection");
            }
        }

        let store = Self {
            dir,
            lock: Mutex::new(()),
        };
        store.load().await?;
        Ok(store)
    }

    async fn read_collection<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(name);
        let raw = tokio::fs::read(&path).await?;
        serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
    }

    async fn write_collection<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let body = serde_json::to_vec_pretty(rows)
            .map_err(|e| StoreError::Corrupt(format!("encode {name}: {e}")))?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Tables, StoreError> {
        Ok(Tables {
            listings: self.read_collection(LISTINGS).await?,
            users: self.read_collection(USERS).await?,
            saved: self.read_collection(SAVED).await?,
            admins: self.read_collection(ADMINS).await?,
            dirty: Default::default(),
        })
    }

    async fn save(&self, tables: &Tables) -> Result<(), StoreError> {
        if tables.dirty.listings {
            self.write_collection(LISTINGS, &tables.listings).await?;
        }
        if tables.dirty.users {
            self.write_collection(USERS, &tables.users).await?;
        }
        if tables.dirty.saved {
            self.write_collection(SAVED, &tables.saved).await?;
        }
        if tables.dirty.admins {
            self.write_collection(ADMINS, &tables.admins).await?;
        }
        Ok(())
    }

    /// Runs `op` against a fresh snapshot and persists whatever it changed.
    async fn with_tables<R>(
        &self,
        op: impl FnOnce(&mut Tables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut tables = self.load().await?;
        let out = op(&mut tables)?;
        self.save(&tables).await?;
        Ok(out)
    }
}

#[async_trait]
impl ListingStore for FileStore {
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError> {
        self.with_tables(|t| Ok(t.list_listings())).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Listing, StoreError> {
        self.with_tables(|t| t.get_listing(id)).await
    }

    async fn create(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.with_tables(|t| Ok(t.create_listing(listing, now))).await
    }

    async fn update(&self, id: &str, patch: ListingPatch) -> Result<Listing, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.with_tables(|t| t.update_listing(id, patch, now)).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.with_tables(|t| t.delete_listing(id)).await
    }

    async fn import(&self, listing: Listing) -> Result<bool, StoreError> {
        self.with_tables(|t| Ok(t.import_listing(listing))).await
    }
}

#[async_trait]
impl SavedListingIndex for FileStore {
    async fn toggle(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.with_tables(|t| t.toggle_saved(user_id, listing_id, now))
            .await
    }

    async fn is_saved(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError> {
        self.with_tables(|t| Ok(t.is_saved(user_id, listing_id)))
            .await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Listing>, StoreError> {
        self.with_tables(|t| Ok(t.saved_for_user(user_id))).await
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.with_tables(|t| Ok(t.find_user_by_email(email))).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.with_tables(|t| Ok(t.find_user_by_id(id))).await
    }

    async fn create(&self, email: &str, password_hash: &str, name: &str) -> Result<User, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.with_tables(|t| t.create_user(email, password_hash, name, now))
            .await
    }

    async fn set_reset_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let reset = PendingReset {
            token: token.to_string(),
            expires_at,
        };
        self.with_tables(|t| t.set_reset(user_id, Some(reset))).await
    }

    async fn clear_reset_token(&self, user_id: &str) -> Result<(), StoreError> {
        self.with_tables(|t| t.set_reset(user_id, None)).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.with_tables(|t| Ok(t.find_user_by_reset_token(token)))
            .await
    }

    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), StoreError> {
        self.with_tables(|t| t.set_password_hash(user_id, password_hash))
            .await
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<TokenRedemption, StoreError> {
        self.with_tables(|t| Ok(t.redeem_reset(token, now, password_hash)))
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.read_collection(USERS).await
    }

    async fn import_user(&self, user: User) -> Result<bool, StoreError> {
        self.with_tables(|t| Ok(t.import_user(user))).await
    }

    async fn has_admin_secrets(&self) -> Result<bool, StoreError> {
        let admins: Vec<AdminSecret> = self.read_collection(ADMINS).await?;
        Ok(!admins.is_empty())
    }

    async fn list_admin_secrets(&self) -> Result<Vec<AdminSecret>, StoreError> {
        self.read_collection(ADMINS).await
    }

    async fn create_admin_secret(&self, label: &str, secret_hash: &str) -> Result<AdminSecret, StoreError> {
        let now = OffsetDateTime::now_utc();
        self.with_tables(|t| Ok(t.create_admin_secret(label, secret_hash, now)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::ListingKind;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("propfeed-test-{}", uuid::Uuid::new_v4()))
    }

    fn sample(title: &str) -> NewListing {
        NewListing {
            title: title.into(),
            location: "Diani".into(),
            description: String::new(),
            price: 45_000_000.0,
            beds: 4,
            baths: 3,
            sqft: 3000,
            kind: ListingKind::Sale,
            video_url: None,
            thumbnail_url: None,
            images: vec![],
            tags: vec!["Beach".into()],
            agent_name: "Admin User".into(),
            agent_avatar_url: "https://i.pravatar.cc/150?u=admin".into(),
        }
    }

    #[tokio::test]
    async fn open_creates_empty_collections() {
        let dir = temp_dir();
        let store = FileStore::open(&dir).await.unwrap();
        for name in [LISTINGS, USERS, SAVED, ADMINS] {
            assert!(dir.join(name).exists(), "{name} missing");
        }
        assert!(store.list_all().await.unwrap().is_empty());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let dir = temp_dir();
        let store = FileStore::open(&dir).await.unwrap();
        let listing = ListingStore::create(&store, sample("Diani Beach Villa")).await.unwrap();
        let user = CredentialStore::create(&store, "bob@x.com", "hash", "Bob").await.unwrap();
        assert!(store.toggle(&user.id, &listing.id).await.unwrap());
        drop(store);

        let reopened = FileStore::open(&dir).await.unwrap();
        assert_eq!(reopened.get_by_id(&listing.id).await.unwrap(), listing);
        assert_eq!(reopened.find_by_email("bob@x.com").await.unwrap(), Some(user.clone()));
        assert!(reopened.is_saved(&user.id, &listing.id).await.unwrap());
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn open_rejects_corrupt_collection() {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(LISTINGS), b"{not json").await.unwrap();

        let err = FileStore::open(&dir).await.err().expect("corrupt file must fail startup");
        assert!(matches!(err, StoreError::Corrupt(_)));
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn failed_operation_writes_nothing() {
        let dir = temp_dir();
        let store = FileStore::open(&dir).await.unwrap();
        let before = tokio::fs::read(dir.join(LISTINGS)).await.unwrap();
        assert!(matches!(store.delete("missing").await, Err(StoreError::NotFound)));
        let after = tokio::fs::read(dir.join(LISTINGS)).await.unwrap();
        assert_eq!(before, after);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
