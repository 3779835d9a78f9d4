use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::models::{
    AdminSecret, Listing, ListingPatch, NewListing, PendingReset, TokenRedemption, User,
};
use super::tables::Tables;
use super::{CredentialStore, ListingStore, SavedListingIndex};
use crate::error::StoreError;

/// Process-local backend. Used by tests and throwaway dev servers.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError> {
        Ok(self.tables.lock().await.list_listings())
    }

    async fn get_by_id(&self, id: &str) -> Result<Listing, StoreError> {
        self.tables.lock().await.get_listing(id)
    }

    async fn create(&self, listing: NewListing) -> Result<Listing, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .create_listing(listing, OffsetDateTime::now_utc()))
    }

    async fn update(&self, id: &str, patch: ListingPatch) -> Result<Listing, StoreError> {
        self.tables
            .lock()
            .await
            .update_listing(id, patch, OffsetDateTime::now_utc())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.tables.lock().await.delete_listing(id)
    }

    async fn import(&self, listing: Listing) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.import_listing(listing))
    }
}

#[async_trait]
impl SavedListingIndex for MemoryStore {
    async fn toggle(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError> {
        self.tables
            .lock()
            .await
            .toggle_saved(user_id, listing_id, OffsetDateTime::now_utc())
    }

    async fn is_saved(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.is_saved(user_id, listing_id))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Listing>, StoreError> {
        Ok(self.tables.lock().await.saved_for_user(user_id))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.find_user_by_email(email))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.find_user_by_id(id))
    }

    async fn create(&self, email: &str, password_hash: &str, name: &str) -> Result<User, StoreError> {
        self.tables
            .lock()
            .await
            .create_user(email, password_hash, name, OffsetDateTime::now_utc())
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
        self.tables.lock().await.set_reset(user_id, Some(reset))
    }

    async fn clear_reset_token(&self, user_id: &str) -> Result<(), StoreError> {
        self.tables.lock().await.set_reset(user_id, None)
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.find_user_by_reset_token(token))
    }

    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .set_password_hash(user_id, password_hash)
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<TokenRedemption, StoreError> {
        Ok(self.tables.lock().await.redeem_reset(token, now, password_hash))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.lock().await.list_users())
    }

    async fn import_user(&self, user: User) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.import_user(user))
    }

    async fn has_admin_secrets(&self) -> Result<bool, StoreError> {
        Ok(!self.tables.lock().await.admins.is_empty())
    }

    async fn list_admin_secrets(&self) -> Result<Vec<AdminSecret>, StoreError> {
        Ok(self.tables.lock().await.admins.clone())
    }

    async fn create_admin_secret(&self, label: &str, secret_hash: &str) -> Result<AdminSecret, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .create_admin_secret(label, secret_hash, OffsetDateTime::now_utc()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::models::ListingKind;

    fn sample() -> NewListing {
        NewListing {
            title: "Karen Country Home".into(),
            location: "Karen, Nairobi".into(),
            description: "Villa with pool".into(),
            price: 85_000_000.0,
            beds: 5,
            baths: 6,
            sqft: 6500,
            kind: ListingKind::Sale,
            video_url: Some("https://cdn.example/v.mp4".into()),
            thumbnail_url: Some("https://cdn.example/t.jpg".into()),
            images: vec!["https://cdn.example/1.jpg".into()],
            tags: vec!["Luxury".into(), "Pool".into()],
            agent_name: "Admin User".into(),
            agent_avatar_url: "https://i.pravatar.cc/150?u=admin".into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_every_field() {
        let store = MemoryStore::default();
        let created = ListingStore::create(&store, sample()).await.unwrap();
        let fetched = store.get_by_id(&created.id).await.unwrap();

        let expected = sample().into_listing(created.id.clone(), created.created_at);
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn update_merges_only_supplied_fields() {
        let store = MemoryStore::default();
        let created = ListingStore::create(&store, sample()).await.unwrap();
        let patch = ListingPatch {
            price: Some(80_000_000.0),
            tags: Some(vec!["Reduced".into()]),
            ..Default::default()
        };
        let updated = store.update(&created.id, patch).await.unwrap();

        assert_eq!(updated.price, 80_000_000.0);
        assert_eq!(updated.tags, vec!["Reduced"]);
        assert_eq!(updated.title, created.title);
        assert!(updated.updated_at >= created.updated_at);
        assert!(matches!(
            store.update("missing", ListingPatch::default()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_toggles_never_double_insert() {
        let store = Arc::new(MemoryStore::default());
        let listing = ListingStore::create(store.as_ref(), sample()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let id = listing.id.clone();
            handles.push(tokio::spawn(async move { store.toggle("u1", &id).await.unwrap() }));
        }
        let mut on = 0;
        for h in handles {
            if h.await.unwrap() {
                on += 1;
            }
        }
        // Ten flips: five reported saved, five reported unsaved, back to the start.
        assert_eq!(on, 5);
        assert!(!store.is_saved("u1", &listing.id).await.unwrap());
    }
}
