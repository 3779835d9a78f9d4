//! Collection logic shared by the in-process backends.
//!
//! `Tables` holds the four flat collections and implements every store
//! operation on them synchronously. The memory backend keeps one instance
//! behind a mutex; the file backend loads one per operation and writes back
//! whichever collections were marked dirty.

use time::OffsetDateTime;

use super::models::{
    AdminSecret, Listing, ListingPatch, NewListing, PendingReset, SavedListing, TokenRedemption, User,
};
use super::new_id;
use crate::error::StoreError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dirty {
    pub listings: bool,
    pub users: bool,
    pub saved: bool,
    pub admins: bool,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    pub listings: Vec<Listing>,
    pub users: Vec<User>,
    pub saved: Vec<SavedListing>,
    pub admins: Vec<AdminSecret>,
    pub dirty: Dirty,
}

/// Newest first; among equal timestamps the later insertion wins.
fn newest_first<T, F>(items: impl DoubleEndedIterator<Item = T>, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> OffsetDateTime,
{
    let mut out: Vec<T> = items.rev().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

impl Tables {
    // ---- listings ----

    pub fn list_listings(&self) -> Vec<Listing> {
        newest_first(self.listings.iter().cloned(), |l| l.created_at)
    }

    pub fn get_listing(&self, id: &str) -> Result<Listing, StoreError> {
        self.listings
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    pub fn create_listing(&mut self, new: NewListing, now: OffsetDateTime) -> Listing {
        let listing = new.into_listing(new_id(), now);
        self.listings.push(listing.clone());
        self.dirty.listings = true;
        listing
    }

    pub fn update_listing(
        &mut self,
        id: &str,
        patch: ListingPatch,
        now: OffsetDateTime,
    ) -> Result<Listing, StoreError> {
        let listing = self
            .listings
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(StoreError::NotFound)?;
        patch.apply(listing, now);
        self.dirty.listings = true;
        Ok(listing.clone())
    }

    /// Inserts a listing carried over from another store, keeping its id and
    /// timestamps. Returns `false` when the id is already taken.
    pub fn import_listing(&mut self, listing: Listing) -> bool {
        if self.listings.iter().any(|l| l.id == listing.id) {
            return false;
        }
        self.listings.push(listing);
        self.dirty.listings = true;
        true
    }

    /// Saved rows pointing at the listing are left in place; readers skip them.
    pub fn delete_listing(&mut self, id: &str) -> Result<(), StoreError> {
        let before = self.listings.len();
        self.listings.retain(|l| l.id != id);
        if self.listings.len() == before {
            return Err(StoreError::NotFound);
        }
        self.dirty.listings = true;
        Ok(())
    }

    // ---- saved ----

    pub fn toggle_saved(
        &mut self,
        user_id: &str,
        listing_id: &str,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        if let Some(pos) = self
            .saved
            .iter()
            .position(|s| s.user_id == user_id && s.listing_id == listing_id)
        {
            self.saved.remove(pos);
            self.dirty.saved = true;
            return Ok(false);
        }
        if !self.listings.iter().any(|l| l.id == listing_id) {
            return Err(StoreError::NotFound);
        }
        self.saved.push(SavedListing {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
            created_at: now,
        });
        self.dirty.saved = true;
        Ok(true)
    }

    /// A bookmark of a deleted listing does not count.
    pub fn is_saved(&self, user_id: &str, listing_id: &str) -> bool {
        self.saved
            .iter()
            .any(|s| s.user_id == user_id && s.listing_id == listing_id)
            && self.listings.iter().any(|l| l.id == listing_id)
    }

    pub fn saved_for_user(&self, user_id: &str) -> Vec<Listing> {
        let rows = self.saved.iter().filter(|s| s.user_id == user_id);
        newest_first(rows, |s| s.created_at)
            .into_iter()
            .filter_map(|s| self.listings.iter().find(|l| l.id == s.listing_id).cloned())
            .collect()
    }

    // ---- users ----

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub fn find_user_by_id(&self, id: &str) -> Option<User> {
        self.users.iter().find(|u| u.id == id).cloned()
    }

    pub fn find_user_by_reset_token(&self, token: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.reset.as_ref().is_some_and(|r| r.token == token))
            .cloned()
    }

    pub fn create_user(
        &mut self,
        email: &str,
        password_hash: &str,
        name: &str,
        now: OffsetDateTime,
    ) -> Result<User, StoreError> {
        if self.find_user_by_email(email).is_some() {
            return Err(StoreError::Conflict(
                "An account with this email already exists".into(),
            ));
        }
        let user = User {
            id: new_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            created_at: now,
            reset: None,
        };
        self.users.push(user.clone());
        self.dirty.users = true;
        Ok(user)
    }

    pub fn list_users(&self) -> Vec<User> {
        self.users.clone()
    }

    /// Inserts a user carried over from another store. Skipped when the id or
    /// the email (in any case) is already present.
    pub fn import_user(&mut self, user: User) -> bool {
        if self.find_user_by_id(&user.id).is_some() || self.find_user_by_email(&user.email).is_some() {
            return false;
        }
        self.users.push(user);
        self.dirty.users = true;
        true
    }

    fn user_mut(&mut self, user_id: &str) -> Result<&mut User, StoreError> {
        self.users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound)
    }

    pub fn set_reset(&mut self, user_id: &str, reset: Option<PendingReset>) -> Result<(), StoreError> {
        self.user_mut(user_id)?.reset = reset;
        self.dirty.users = true;
        Ok(())
    }

    pub fn set_password_hash(&mut self, user_id: &str, password_hash: &str) -> Result<(), StoreError> {
        let user = self.user_mut(user_id)?;
        user.password_hash = password_hash.to_string();
        user.reset = None;
        self.dirty.users = true;
        Ok(())
    }

    /// Checks the token and swaps the password hash in one step.
    pub fn redeem_reset(&mut self, token: &str, now: OffsetDateTime, password_hash: &str) -> TokenRedemption {
        let Some(user) = self
            .users
            .iter_mut()
            .find(|u| u.reset.as_ref().is_some_and(|r| r.token == token))
        else {
            return TokenRedemption::Unknown;
        };
        let expired = user.reset.as_ref().is_some_and(|r| r.is_expired(now));
        user.reset = None;
        self.dirty.users = true;
        if expired {
            return TokenRedemption::Expired;
        }
        user.password_hash = password_hash.to_string();
        TokenRedemption::Redeemed {
            user_id: user.id.clone(),
        }
    }

    // ---- admin secrets ----

    pub fn create_admin_secret(&mut self, label: &str, secret_hash: &str, now: OffsetDateTime) -> AdminSecret {
        let record = AdminSecret {
            id: new_id(),
            label: label.to_string(),
            secret_hash: secret_hash.to_string(),
            created_at: now,
        };
        self.admins.push(record.clone());
        self.dirty.admins = true;
        record
    }
}
