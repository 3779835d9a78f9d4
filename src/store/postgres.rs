//! Postgres backend over parameterized sqlx queries.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;

use super::models::{
    AdminSecret, Listing, ListingPatch, NewListing, PendingReset, TokenRedemption, User,
};
use super::{new_id, CredentialStore, ListingStore, SavedListingIndex};
use crate::error::StoreError;

const LISTING_COLUMNS: &str = "id, title, location, description, price, beds, baths, sqft, kind, \
     video_url, thumbnail_url, images, tags, agent_name, agent_avatar_url, created_at, updated_at";

const USER_COLUMNS: &str =
    "id, email, password_hash, name, created_at, reset_token, reset_token_expiry";

#[derive(Debug, FromRow)]
struct ListingRow {
    id: String,
    title: String,
    location: String,
    description: String,
    price: f64,
    beds: i32,
    baths: i32,
    sqft: i32,
    kind: String,
    video_url: Option<String>,
    thumbnail_url: Option<String>,
    images: Vec<String>,
    tags: Vec<String>,
    agent_name: String,
    agent_avatar_url: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ListingRow> for Listing {
    type Error = StoreError;

    fn try_from(r: ListingRow) -> Result<Self, Self::Error> {
        let kind = r
            .kind
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("listing {}: {e}", r.id)))?;
        Ok(Self {
            id: r.id,
            title: r.title,
            location: r.location,
            description: r.description,
            price: r.price,
            beds: r.beds,
            baths: r.baths,
            sqft: r.sqft,
            kind,
            video_url: r.video_url,
            thumbnail_url: r.thumbnail_url,
            images: r.images,
            tags: r.tags,
            agent_name: r.agent_name,
            agent_avatar_url: r.agent_avatar_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    name: String,
    created_at: OffsetDateTime,
    reset_token: Option<String>,
    reset_token_expiry: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let reset = match (r.reset_token, r.reset_token_expiry) {
            (Some(token), Some(expires_at)) => Some(PendingReset { token, expires_at }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "user {}: reset token and expiry out of step",
                    r.id
                )))
            }
        };
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            name: r.name,
            created_at: r.created_at,
            reset,
        })
    }
}

#[derive(Debug, FromRow)]
struct AdminSecretRow {
    id: String,
    label: String,
    secret_hash: String,
    created_at: OffsetDateTime,
}

impl From<AdminSecretRow> for AdminSecret {
    fn from(r: AdminSecretRow) -> Self {
        Self {
            id: r.id,
            label: r.label,
            secret_hash: r.secret_hash,
            created_at: r.created_at,
        }
    }
}

fn listings_from_rows(rows: Vec<ListingRow>) -> Result<Vec<Listing>, StoreError> {
    rows.into_iter().map(Listing::try_from).collect()
}

fn user_from_row(row: Option<UserRow>) -> Result<Option<User>, StoreError> {
    row.map(User::try_from).transpose()
}

fn not_found_unless_touched(rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    /// Connects and applies the embedded migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl ListingStore for PgStore {
    async fn list_all(&self) -> Result<Vec<Listing>, StoreError> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .fetch_all(&self.db)
            .await?;
        listings_from_rows(rows)
    }

    async fn get_by_id(&self, id: &str) -> Result<Listing, StoreError> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1");
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn create(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO listings (id, title, location, description, price, beds, baths, sqft, kind,
                                  video_url, thumbnail_url, images, tags, agent_name, agent_avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {LISTING_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(new_id())
            .bind(&listing.title)
            .bind(&listing.location)
            .bind(&listing.description)
            .bind(listing.price)
            .bind(listing.beds)
            .bind(listing.baths)
            .bind(listing.sqft)
            .bind(listing.kind.as_str())
            .bind(&listing.video_url)
            .bind(&listing.thumbnail_url)
            .bind(&listing.images)
            .bind(&listing.tags)
            .bind(&listing.agent_name)
            .bind(&listing.agent_avatar_url)
            .fetch_one(&self.db)
            .await?
            .try_into()
    }

    async fn update(&self, id: &str, patch: ListingPatch) -> Result<Listing, StoreError> {
        // One statement, so concurrent writers to the same row cannot interleave mid-merge.
        let sql = format!(
            r#"
            UPDATE listings SET
                title         = COALESCE($2, title),
                location      = COALESCE($3, location),
                description   = COALESCE($4, description),
                price         = COALESCE($5, price),
                beds          = COALESCE($6, beds),
                baths         = COALESCE($7, baths),
                sqft          = COALESCE($8, sqft),
                kind          = COALESCE($9, kind),
                video_url     = COALESCE($10, video_url),
                thumbnail_url = COALESCE($11, thumbnail_url),
                images        = COALESCE($12, images),
                tags          = COALESCE($13, tags),
                agent_name    = COALESCE($14, agent_name),
                agent_avatar_url = COALESCE($15, agent_avatar_url),
                updated_at    = now()
            WHERE id = $1
            RETURNING {LISTING_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .bind(patch.title)
            .bind(patch.location)
            .bind(patch.description)
            .bind(patch.price)
            .bind(patch.beds)
            .bind(patch.baths)
            .bind(patch.sqft)
            .bind(patch.kind.map(|k| k.as_str()))
            .bind(patch.video_url)
            .bind(patch.thumbnail_url)
            .bind(patch.images)
            .bind(patch.tags)
            .bind(patch.agent_name)
            .bind(patch.agent_avatar_url)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?
            .try_into()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        not_found_unless_touched(res.rows_affected())
    }

    async fn import(&self, listing: Listing) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            INSERT INTO listings (id, title, location, description, price, beds, baths, sqft, kind,
                                  video_url, thumbnail_url, images, tags, agent_name, agent_avatar_url,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.title)
        .bind(&listing.location)
        .bind(&listing.description)
        .bind(listing.price)
        .bind(listing.beds)
        .bind(listing.baths)
        .bind(listing.sqft)
        .bind(listing.kind.as_str())
        .bind(&listing.video_url)
        .bind(&listing.thumbnail_url)
        .bind(&listing.images)
        .bind(&listing.tags)
        .bind(&listing.agent_name)
        .bind(&listing.agent_avatar_url)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl SavedListingIndex for PgStore {
    async fn toggle(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await?;

        // Serializes togglers of the same pair until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
            .bind(user_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM saved_listings WHERE user_id = $1 AND listing_id = $2")
            .bind(user_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed > 0 {
            tx.commit().await?;
            return Ok(false);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM listings WHERE id = $1)")
                .bind(listing_id)
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        }

        sqlx::query("INSERT INTO saved_listings (user_id, listing_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn is_saved(&self, user_id: &str, listing_id: &str) -> Result<bool, StoreError> {
        let saved: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM saved_listings s
                JOIN listings l ON l.id = s.listing_id
                WHERE s.user_id = $1 AND s.listing_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(listing_id)
        .fetch_one(&self.db)
        .await?;
        Ok(saved)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Listing>, StoreError> {
        // The inner join drops bookmarks whose listing is gone.
        let columns = LISTING_COLUMNS
            .split(", ")
            .map(|c| format!("l.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {columns}
            FROM saved_listings s
            JOIN listings l ON l.id = s.listing_id
            WHERE s.user_id = $1
            ORDER BY s.created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        listings_from_rows(rows)
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        user_from_row(row)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        user_from_row(row)
    }

    async fn create(&self, email: &str, password_hash: &str, name: &str) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, password_hash, name)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(new_id())
            .bind(email)
            .bind(password_hash)
            .bind(name)
            .fetch_one(&self.db)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(
                    "An account with this email already exists".into(),
                ),
                _ => StoreError::Database(e),
            })?;
        row.try_into()
    }

    async fn set_reset_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE users SET reset_token = $2, reset_token_expiry = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        not_found_unless_touched(res.rows_affected())
    }

    async fn clear_reset_token(&self, user_id: &str) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE users SET reset_token = NULL, reset_token_expiry = NULL WHERE id = $1",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        not_found_unless_touched(res.rows_affected())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        user_from_row(row)
    }

    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, reset_token = NULL, reset_token_expiry = NULL
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        not_found_unless_touched(res.rows_affected())
    }

    async fn redeem_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<TokenRedemption, StoreError> {
        // The row lock taken by the first UPDATE makes a racing redeemer re-check
        // the predicate and miss.
        let redeemed: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE users
               SET password_hash = $3, reset_token = NULL, reset_token_expiry = NULL
             WHERE reset_token = $1 AND reset_token_expiry >= $2
            RETURNING id
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?;
        if let Some(user_id) = redeemed {
            return Ok(TokenRedemption::Redeemed { user_id });
        }

        let expired: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE users
               SET reset_token = NULL, reset_token_expiry = NULL
             WHERE reset_token = $1
            RETURNING id
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(match expired {
            Some(_) => TokenRedemption::Expired,
            None => TokenRedemption::Unknown,
        })
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
        let rows = sqlx::query_as::<_, UserRow>(&sql).fetch_all(&self.db).await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn import_user(&self, user: User) -> Result<bool, StoreError> {
        let (token, expiry) = match user.reset {
            Some(PendingReset { token, expires_at }) => (Some(token), Some(expires_at)),
            None => (None, None),
        };
        // No conflict target: a taken id and a taken email both skip the row.
        let res = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, created_at, reset_token, reset_token_expiry)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.created_at)
        .bind(token)
        .bind(expiry)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn has_admin_secrets(&self) -> Result<bool, StoreError> {
        let any: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM admin_secrets)")
            .fetch_one(&self.db)
            .await?;
        Ok(any)
    }

    async fn list_admin_secrets(&self) -> Result<Vec<AdminSecret>, StoreError> {
        let rows = sqlx::query_as::<_, AdminSecretRow>(
            "SELECT id, label, secret_hash, created_at FROM admin_secrets ORDER BY created_at",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(AdminSecret::from).collect())
    }

    async fn create_admin_secret(&self, label: &str, secret_hash: &str) -> Result<AdminSecret, StoreError> {
        let row = sqlx::query_as::<_, AdminSecretRow>(
            r#"
            INSERT INTO admin_secrets (id, label, secret_hash)
            VALUES ($1, $2, $3)
            RETURNING id, label, secret_hash, created_at
            "#,
        )
        .bind(new_id())
        .bind(label)
        .bind(secret_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }
}

/// Opens a pool against `TEST_DATABASE_URL` for the ignored integration tests.
#[cfg(test)]
async fn test_store() -> anyhow::Result<PgStore> {
    use anyhow::Context;

    let url = std::env::var("TEST_DATABASE_URL").context("TEST_DATABASE_URL not set")?;
    Ok(PgStore::connect(&url, 2).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::ListingKind;

    fn listing_row(kind: &str) -> ListingRow {
        let now = OffsetDateTime::now_utc();
        ListingRow {
            id: "l1".into(),
            title: "Westlands Sky Apartment".into(),
            location: "Westlands".into(),
            description: String::new(),
            price: 150_000.0,
            beds: 2,
            baths: 2,
            sqft: 1200,
            kind: kind.into(),
            video_url: None,
            thumbnail_url: None,
            images: vec![],
            tags: vec!["City".into()],
            agent_name: "Admin User".into(),
            agent_avatar_url: "https://i.pravatar.cc/150?u=admin".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn listing_row_normalizes_legacy_kind() {
        let listing = Listing::try_from(listing_row("Buy")).unwrap();
        assert_eq!(listing.kind, ListingKind::Sale);
        assert!(matches!(
            Listing::try_from(listing_row("Auction")),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn user_row_rejects_half_set_reset_fields() {
        let row = UserRow {
            id: "u1".into(),
            email: "bob@x.com".into(),
            password_hash: "h".into(),
            name: "Bob".into(),
            created_at: OffsetDateTime::now_utc(),
            reset_token: Some("tok".into()),
            reset_token_expiry: None,
        };
        assert!(matches!(User::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn toggle_round_trip_against_postgres() {
        let store = test_store().await.expect("connect");
        let listing = ListingStore::create(
            &store,
            NewListing {
                title: "Toggle round trip".into(),
                location: String::new(),
                description: String::new(),
                price: 1.0,
                beds: 0,
                baths: 0,
                sqft: 0,
                kind: ListingKind::Rent,
                video_url: None,
                thumbnail_url: None,
                images: vec![],
                tags: vec![],
                agent_name: "Admin User".into(),
                agent_avatar_url: "https://i.pravatar.cc/150?u=admin".into(),
            },
        )
        .await
        .expect("create");

        let user = new_id();
        assert!(store.toggle(&user, &listing.id).await.unwrap());
        assert!(store.is_saved(&user, &listing.id).await.unwrap());
        assert_eq!(store.list_for_user(&user).await.unwrap().len(), 1);

        store.delete(&listing.id).await.unwrap();
        assert!(store.list_for_user(&user).await.unwrap().is_empty());
        assert!(!store.is_saved(&user, &listing.id).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn reset_token_redeems_once_against_postgres() {
        let store = test_store().await.expect("connect");
        let email = format!("{}@example.com", new_id());
        let user = CredentialStore::create(&store, &email, "old", "Redeemer")
            .await
            .expect("create");
        let now = OffsetDateTime::now_utc();
        let token = new_id();
        store
            .set_reset_token(&user.id, &token, now + time::Duration::minutes(5))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            store.redeem_reset_token(&token, now, "first"),
            store.redeem_reset_token(&token, now, "second"),
        );
        let redeemed = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|r| matches!(r, TokenRedemption::Redeemed { .. }))
            .count();
        assert_eq!(redeemed, 1);
        assert!(store.find_by_reset_token(&token).await.unwrap().is_none());
    }
}
