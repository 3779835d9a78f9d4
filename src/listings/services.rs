//! Listing validation and normalization.
//!
//! Everything a client submits passes through here before reaching a store:
//! numbers may arrive as strings, list fields are cleaned, legacy type
//! spellings are folded into [`ListingKind`], and missing media fall back to
//! the configured placeholders.

use tracing::{info, warn};

use crate::config::ListingDefaults;
use crate::error::AppError;
use crate::listings::dto::{ListingPayload, ListingQuery, NumericInput};
use crate::state::AppState;
use crate::store::models::{Listing, ListingKind, ListingPatch, NewListing};

const RESOURCE: &str = "Property";

fn coerce_number(field: &str, input: &NumericInput) -> Result<Option<f64>, AppError> {
    let value = match input {
        NumericInput::Number(n) => *n,
        NumericInput::Text(s) if s.trim().is_empty() => return Ok(None),
        NumericInput::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| AppError::validation(format!("{field} must be a number")))?,
    };
    if !value.is_finite() {
        return Err(AppError::validation(format!("{field} must be a finite number")));
    }
    if value < 0.0 {
        return Err(AppError::validation(format!("{field} cannot be negative")));
    }
    Ok(Some(value))
}

fn coerce_price(input: &NumericInput) -> Result<f64, AppError> {
    coerce_number("price", input)?.ok_or_else(|| AppError::validation("Missing title or price"))
}

/// Whole, non-negative count. Blank input counts as zero.
fn coerce_count(field: &str, input: &NumericInput) -> Result<i32, AppError> {
    let Some(value) = coerce_number(field, input)? else {
        return Ok(0);
    };
    if value.fract() != 0.0 {
        return Err(AppError::validation(format!("{field} must be a whole number")));
    }
    if value > i32::MAX as f64 {
        return Err(AppError::validation(format!("{field} is too large")));
    }
    Ok(value as i32)
}

fn optional_count(field: &str, input: Option<&NumericInput>) -> Result<Option<i32>, AppError> {
    input.map(|v| coerce_count(field, v)).transpose()
}

pub(crate) fn parse_kind(raw: &str) -> Result<ListingKind, AppError> {
    raw.parse::<ListingKind>().map_err(|_| {
        AppError::validation(format!("Unknown listing type {raw:?}; expected Sale or Rent"))
    })
}

/// Trimmed text, `None` when blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn clean_list(items: Vec<String>, dedupe: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() || (dedupe && out.iter().any(|seen| seen == item)) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}

fn media_url(value: Option<String>, placeholder: &str) -> String {
    non_blank(value).unwrap_or_else(|| placeholder.to_string())
}

/// Validates a create payload. `title` and `price` are required.
pub fn build_new(defaults: &ListingDefaults, payload: ListingPayload) -> Result<NewListing, AppError> {
    let title = non_blank(payload.title);
    let (Some(title), Some(price)) = (title, payload.price.as_ref()) else {
        return Err(AppError::validation("Missing title or price"));
    };
    let price = coerce_price(price)?;

    let kind = match non_blank(payload.kind) {
        Some(raw) => parse_kind(&raw)?,
        None => ListingKind::Sale,
    };
    let agent = payload.agent.unwrap_or_default();

    Ok(NewListing {
        title,
        location: trimmed(payload.location).unwrap_or_default(),
        description: trimmed(payload.description).unwrap_or_default(),
        price,
        beds: optional_count("beds", payload.beds.as_ref())?.unwrap_or(0),
        baths: optional_count("baths", payload.baths.as_ref())?.unwrap_or(0),
        sqft: optional_count("sqft", payload.sqft.as_ref())?.unwrap_or(0),
        kind,
        video_url: Some(media_url(payload.video_url, &defaults.video_url)),
        thumbnail_url: Some(media_url(payload.thumbnail_url, &defaults.thumbnail_url)),
        images: clean_list(payload.images.unwrap_or_default(), false),
        tags: clean_list(payload.tags.unwrap_or_default(), true),
        agent_name: non_blank(agent.name).unwrap_or_else(|| defaults.agent_name.clone()),
        agent_avatar_url: non_blank(agent.avatar)
            .unwrap_or_else(|| defaults.agent_avatar_url.clone()),
    })
}

/// Validates an update payload. Only the fields present are checked and merged.
pub fn build_patch(defaults: &ListingDefaults, payload: ListingPayload) -> Result<ListingPatch, AppError> {
    let title = match payload.title {
        Some(t) if t.trim().is_empty() => return Err(AppError::validation("Title cannot be empty")),
        other => trimmed(other),
    };
    let agent = payload.agent.unwrap_or_default();

    Ok(ListingPatch {
        title,
        location: trimmed(payload.location),
        description: trimmed(payload.description),
        price: payload.price.as_ref().map(coerce_price).transpose()?,
        beds: optional_count("beds", payload.beds.as_ref())?,
        baths: optional_count("baths", payload.baths.as_ref())?,
        sqft: optional_count("sqft", payload.sqft.as_ref())?,
        kind: non_blank(payload.kind).map(|raw| parse_kind(&raw)).transpose()?,
        video_url: payload
            .video_url
            .map(|v| media_url(Some(v), &defaults.video_url)),
        thumbnail_url: payload
            .thumbnail_url
            .map(|v| media_url(Some(v), &defaults.thumbnail_url)),
        images: payload.images.map(|v| clean_list(v, false)),
        tags: payload.tags.map(|v| clean_list(v, true)),
        agent_name: non_blank(agent.name),
        agent_avatar_url: non_blank(agent.avatar),
    })
}

/// Keeps listings whose title or location contains `q` (case-insensitive) and
/// whose type matches `kind`. `All` or a blank value matches every type.
pub fn filter(listings: Vec<Listing>, q: Option<&str>, kind: Option<&str>) -> Result<Vec<Listing>, AppError> {
    let kind = match kind.map(str::trim) {
        None | Some("") => None,
        Some(k) if k.eq_ignore_ascii_case("all") => None,
        Some(k) => Some(parse_kind(k)?),
    };
    let needle = q.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());

    Ok(listings
        .into_iter()
        .filter(|l| kind.map_or(true, |k| l.kind == k))
        .filter(|l| {
            needle.as_ref().map_or(true, |n| {
                l.title.to_lowercase().contains(n) || l.location.to_lowercase().contains(n)
            })
        })
        .collect())
}

pub async fn list(st: &AppState, query: ListingQuery) -> Result<Vec<Listing>, AppError> {
    let all = st.store.listings.list_all().await?;
    filter(all, query.q.as_deref(), query.kind.as_deref())
}

pub async fn get(st: &AppState, id: &str) -> Result<Listing, AppError> {
    st.store
        .listings
        .get_by_id(id)
        .await
        .map_err(|e| AppError::from_store(RESOURCE, e))
}

pub async fn create(st: &AppState, payload: ListingPayload) -> Result<Listing, AppError> {
    let new = build_new(&st.config.listings, payload).inspect_err(|e| {
        warn!(error = %e, "listing rejected");
    })?;
    let listing = st.store.listings.create(new).await?;
    info!(listing_id = %listing.id, title = %listing.title, "listing created");
    Ok(listing)
}

pub async fn update(st: &AppState, id: &str, payload: ListingPayload) -> Result<Listing, AppError> {
    let patch = build_patch(&st.config.listings, payload)?;
    let listing = st
        .store
        .listings
        .update(id, patch)
        .await
        .map_err(|e| AppError::from_store(RESOURCE, e))?;
    info!(listing_id = %listing.id, "listing updated");
    Ok(listing)
}

pub async fn delete(st: &AppState, id: &str) -> Result<(), AppError> {
    st.store
        .listings
        .delete(id)
        .await
        .map_err(|e| AppError::from_store(RESOURCE, e))?;
    info!(listing_id = %id, "listing deleted");
    Ok(())
}
