//! One-off data tools: importing legacy JSON exports into the active store and
//! hashing passwords that were stored before hashing existed.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::auth::password::{classify_stored, hash_password, StoredPassword};
use crate::auth::services::normalize_email;
use crate::config::{ListingDefaults, PasswordParams};
use crate::listings::dto::{AgentInput, ListingPayload};
use crate::listings::services::build_new;
use crate::store::models::{Listing, User};
use crate::store::{new_id, Store};

const LISTING_FILES: [&str; 2] = ["listings.json", "data.json"];
const USER_FILE: &str = "users.json";

/// A listing as older exports wrote it: flat agent fields or a nested `agent`,
/// numbers as strings, timestamps optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyListing {
    id: Option<String>,
    #[serde(flatten)]
    payload: ListingPayload,
    agent_name: Option<String>,
    #[serde(alias = "agentAvatar")]
    agent_avatar_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

impl LegacyListing {
    fn into_listing(mut self, defaults: &ListingDefaults) -> anyhow::Result<Listing> {
        if self.payload.agent.is_none() && (self.agent_name.is_some() || self.agent_avatar_url.is_some()) {
            self.payload.agent = Some(AgentInput {
                name: self.agent_name,
                avatar: self.agent_avatar_url,
            });
        }
        let new = build_new(defaults, self.payload)?;
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        let created_at = self.created_at.unwrap_or_else(OffsetDateTime::now_utc);
        let mut listing = new.into_listing(id, created_at);
        listing.updated_at = self.updated_at.unwrap_or(created_at);
        Ok(listing)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyUser {
    id: Option<String>,
    email: Option<String>,
    #[serde(alias = "password")]
    password_hash: Option<String>,
    name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
}

impl LegacyUser {
    fn into_user(self) -> anyhow::Result<User> {
        let email = self
            .email
            .map(|e| normalize_email(&e))
            .filter(|e| !e.is_empty())
            .context("user without email")?;
        let password_hash = self
            .password_hash
            .filter(|p| !p.trim().is_empty())
            .with_context(|| format!("user {email} without password"))?;
        Ok(User {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_id),
            email,
            password_hash,
            name: self.name.map(|n| n.trim().to_string()).unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(OffsetDateTime::now_utc),
            reset: None,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub listings_imported: usize,
    pub listings_skipped: usize,
    pub users_imported: usize,
    pub users_skipped: usize,
    /// Records that could not be read or written. Each one is logged.
    pub failed: usize,
}

async fn read_records(path: &Path) -> anyhow::Result<Option<Vec<Value>>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let records = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;
    Ok(Some(records))
}

/// Copies listings and users from `dir` into `target`, keeping their ids.
/// Listings already present by id and users present by id or email are left
/// untouched, so running it twice imports nothing the second time.
pub async fn import_from_dir(
    dir: &Path,
    target: &Store,
    defaults: &ListingDefaults,
) -> anyhow::Result<ImportReport> {
    let mut report = ImportReport::default();

    let mut listings = None;
    for name in LISTING_FILES {
        let path = dir.join(name);
        if let Some(records) = read_records(&path).await? {
            info!(file = %path.display(), count = records.len(), "importing listings");
            listings = Some(records);
            break;
        }
    }
    if listings.is_none() {
        info!(dir = %dir.display(), "no listing export found");
    }

    for record in listings.unwrap_or_default() {
        let listing = match serde_json::from_value::<LegacyListing>(record)
            .map_err(anyhow::Error::from)
            .and_then(|l| l.into_listing(defaults))
        {
            Ok(listing) => listing,
            Err(e) => {
                error!(error = %e, "listing record rejected");
                report.failed += 1;
                continue;
            }
        };
        let id = listing.id.clone();
        match target.listings.import(listing).await {
            Ok(true) => report.listings_imported += 1,
            Ok(false) => report.listings_skipped += 1,
            Err(e) => {
                error!(listing_id = %id, error = %e, "listing import failed");
                report.failed += 1;
            }
        }
    }

    let users_path = dir.join(USER_FILE);
    match read_records(&users_path).await? {
        Some(records) => {
            info!(file = %users_path.display(), count = records.len(), "importing users");
            for record in records {
                let user = match serde_json::from_value::<LegacyUser>(record)
                    .map_err(anyhow::Error::from)
                    .and_then(LegacyUser::into_user)
                {
                    Ok(user) => user,
                    Err(e) => {
                        error!(error = %e, "user record rejected");
                        report.failed += 1;
                        continue;
                    }
                };
                let email = user.email.clone();
                match target.credentials.import_user(user).await {
                    Ok(true) => report.users_imported += 1,
                    Ok(false) => report.users_skipped += 1,
                    Err(e) => {
                        error!(%email, error = %e, "user import failed");
                        report.failed += 1;
                    }
                }
            }
        }
        None => info!(dir = %dir.display(), "no user export found"),
    }

    info!(?report, "import finished");
    Ok(report)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RehashReport {
    pub rehashed: usize,
    pub current: usize,
    pub foreign: usize,
}

/// Replaces plaintext passwords with argon2 hashes of the same value.
pub async fn rehash_legacy_passwords(store: &Store, params: &PasswordParams) -> anyhow::Result<RehashReport> {
    let mut report = RehashReport::default();
    let users = store.credentials.list_users().await?;
    info!(count = users.len(), "checking stored passwords");

    for user in users {
        match classify_stored(&user.password_hash) {
            StoredPassword::Argon2 => report.current += 1,
            StoredPassword::Foreign => {
                warn!(user_id = %user.id, "password stored under an unsupported scheme; user must reset");
                report.foreign += 1;
            }
            StoredPassword::Plaintext => {
                let hash = hash_password(user.password_hash.trim(), params)?;
                store
                    .credentials
                    .update_password_hash(&user.id, &hash)
                    .await
                    .with_context(|| format!("store hash for user {}", user.id))?;
                info!(user_id = %user.id, "password hashed");
                report.rehashed += 1;
            }
        }
    }

    info!(?report, "rehash finished");
    Ok(report)
}
