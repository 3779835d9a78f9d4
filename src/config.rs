use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

/// Which storage backend the process wires in at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "postgres" | "postgresql" | "sql" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?} (expected file, postgres or memory)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

/// Signing material and policy for admin capability tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub initial_secret: Option<String>,
    pub token_secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub require_token_for_writes: bool,
}

/// Values substituted into listings when the submission leaves them out.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingDefaults {
    pub video_url: String,
    pub thumbnail_url: String,
    pub agent_name: String,
    pub agent_avatar_url: String,
}

impl Default for ListingDefaults {
    fn default() -> Self {
        Self {
            video_url: "https://coverr.co/files/coverr-interior-design-of-a-living-room-with-a-yellow-sofa-2594/1080p.mp4".into(),
            thumbnail_url: "https://images.unsplash.com/photo-1600585154340-be6161a56a0c?q=80&w=1080".into(),
            agent_name: "Admin User".into(),
            agent_avatar_url: "https://i.pravatar.cc/150?u=admin".into(),
        }
    }
}

/// Argon2id cost parameters. Defaults follow the OWASP baseline.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PasswordParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub admin: AdminConfig,
    pub listings: ListingDefaults,
    pub password: PasswordParams,
    pub app_url: String,
    pub reset_token_ttl_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = StoreConfig {
            backend: env_parse("STORE_BACKEND", StoreBackend::File)?,
            data_dir: env_or("DATA_DIR", "./data"),
            database_url: env_opt("DATABASE_URL"),
            max_connections: env_parse("DB_MAX_CONNECTIONS", 10)?,
        };
        if store.backend == StoreBackend::Postgres && store.database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required when STORE_BACKEND=postgres");
        }

        let token_secret = match env_opt("ADMIN_TOKEN_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "ADMIN_TOKEN_SECRET not set; admin tokens will not survive a restart"
                );
                crate::auth::services::random_token()
            }
        };

        let initial_secret = env_opt("ADMIN_INITIAL_SECRET");
        if initial_secret.is_none() {
            tracing::info!("ADMIN_INITIAL_SECRET not set; admin bootstrap is disabled");
        }

        let admin = AdminConfig {
            initial_secret,
            token_secret,
            issuer: env_or("ADMIN_TOKEN_ISSUER", "propfeed"),
            audience: env_or("ADMIN_TOKEN_AUDIENCE", "propfeed-admin"),
            ttl_minutes: env_parse("ADMIN_TOKEN_TTL_MINUTES", 60 * 12)?,
            require_token_for_writes: env_parse("ADMIN_REQUIRE_TOKEN", false)?,
        };

        let fallback = ListingDefaults::default();
        let listings = ListingDefaults {
            video_url: env_or("DEFAULT_VIDEO_URL", &fallback.video_url),
            thumbnail_url: env_or("DEFAULT_THUMBNAIL_URL", &fallback.thumbnail_url),
            agent_name: env_or("DEFAULT_AGENT_NAME", &fallback.agent_name),
            agent_avatar_url: env_or("DEFAULT_AGENT_AVATAR_URL", &fallback.agent_avatar_url),
        };

        let baseline = PasswordParams::default();
        let password = PasswordParams {
            memory_kib: env_parse("ARGON2_MEMORY_KIB", baseline.memory_kib)?,
            iterations: env_parse("ARGON2_ITERATIONS", baseline.iterations)?,
            parallelism: env_parse("ARGON2_PARALLELISM", baseline.parallelism)?,
        };

        Ok(Self {
            store,
            admin,
            listings,
            password,
            app_url: env_or("APP_URL", "http://localhost:3000"),
            reset_token_ttl_minutes: env_parse("RESET_TOKEN_TTL_MINUTES", 60)?,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
