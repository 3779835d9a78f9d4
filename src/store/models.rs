use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// For-sale or for-rent. Legacy spellings (`Buy`, `for-sale`, ...) are folded in by `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingKind {
    #[serde(alias = "Buy", alias = "sale", alias = "buy")]
    Sale,
    #[serde(alias = "rent")]
    Rent,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "Sale",
            Self::Rent => "Rent",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "sale" | "buy" | "forsale" => Ok(Self::Sale),
            "rent" | "forrent" => Ok(Self::Rent),
            _ => Err(format!("unknown listing type {s:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub location: String,
    pub description: String,
    pub price: f64,
    pub beds: i32,
    pub baths: i32,
    pub sqft: i32,
    #[serde(rename = "type")]
    pub kind: ListingKind,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub agent_name: String,
    pub agent_avatar_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A fully validated listing ready to be persisted; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub title: String,
    pub location: String,
    pub description: String,
    pub price: f64,
    pub beds: i32,
    pub baths: i32,
    pub sqft: i32,
    pub kind: ListingKind,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub agent_name: String,
    pub agent_avatar_url: String,
}

impl NewListing {
    pub fn into_listing(self, id: String, now: OffsetDateTime) -> Listing {
        Listing {
            id,
            title: self.title,
            location: self.location,
            description: self.description,
            price: self.price,
            beds: self.beds,
            baths: self.baths,
            sqft: self.sqft,
            kind: self.kind,
            video_url: self.video_url,
            thumbnail_url: self.thumbnail_url,
            images: self.images,
            tags: self.tags,
            agent_name: self.agent_name,
            agent_avatar_url: self.agent_avatar_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields to merge into an existing listing. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub beds: Option<i32>,
    pub baths: Option<i32>,
    pub sqft: Option<i32>,
    pub kind: Option<ListingKind>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub agent_name: Option<String>,
    pub agent_avatar_url: Option<String>,
}

impl ListingPatch {
    pub fn apply(self, listing: &mut Listing, now: OffsetDateTime) {
        if let Some(v) = self.title {
            listing.title = v;
        }
        if let Some(v) = self.location {
            listing.location = v;
        }
        if let Some(v) = self.description {
            listing.description = v;
        }
        if let Some(v) = self.price {
            listing.price = v;
        }
        if let Some(v) = self.beds {
            listing.beds = v;
        }
        if let Some(v) = self.baths {
            listing.baths = v;
        }
        if let Some(v) = self.sqft {
            listing.sqft = v;
        }
        if let Some(v) = self.kind {
            listing.kind = v;
        }
        if let Some(v) = self.video_url {
            listing.video_url = Some(v);
        }
        if let Some(v) = self.thumbnail_url {
            listing.thumbnail_url = Some(v);
        }
        if let Some(v) = self.images {
            listing.images = v;
        }
        if let Some(v) = self.tags {
            listing.tags = v;
        }
        if let Some(v) = self.agent_name {
            listing.agent_name = v;
        }
        if let Some(v) = self.agent_avatar_url {
            listing.agent_avatar_url = v;
        }
        listing.updated_at = now;
    }
}

/// Outstanding password-reset credential. Token and expiry only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReset {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl PendingReset {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}

/// Result of presenting a reset token to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRedemption {
    /// The token was live; the password is replaced and the token is gone.
    Redeemed { user_id: String },
    /// The token matched but had expired. It has been cleared.
    Expired,
    Unknown,
}

/// User record as persisted. Never serialized to API clients; see `SafeUser`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub reset: Option<PendingReset>,
}

/// User without credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for SafeUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedListing {
    pub user_id: String,
    pub listing_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSecret {
    pub id: String,
    pub label: String,
    pub secret_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_kind_folds_legacy_spellings() {
        for raw in ["Sale", "Buy", "for-sale", "FOR_SALE", "ForSale", " sale "] {
            assert_eq!(raw.parse::<ListingKind>().unwrap(), ListingKind::Sale, "{raw}");
        }
        for raw in ["Rent", "for rent", "ForRent"] {
            assert_eq!(raw.parse::<ListingKind>().unwrap(), ListingKind::Rent, "{raw}");
        }
        assert!("Lease".parse::<ListingKind>().is_err());
    }

    #[test]
    fn listing_kind_serializes_canonically() {
        assert_eq!(serde_json::to_string(&ListingKind::Sale).unwrap(), "\"Sale\"");
        let legacy: ListingKind = serde_json::from_str("\"Buy\"").unwrap();
        assert_eq!(legacy, ListingKind::Sale);
    }

    #[test]
    fn safe_user_drops_credentials() {
        let user = User {
            id: "u1".into(),
            email: "bob@x.com".into(),
            password_hash: "$argon2id$...".into(),
            name: "Bob".into(),
            created_at: OffsetDateTime::now_utc(),
            reset: Some(PendingReset {
                token: "t".into(),
                expires_at: OffsetDateTime::now_utc(),
            }),
        };
        let json = serde_json::to_value(SafeUser::from(user)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password").is_none());
        assert!(json.get("reset").is_none());
        assert_eq!(json["email"], "bob@x.com");
    }
}
