//! Durable, TTL-bounded session/credential cache.
//!
//! Extractors that authenticate store the derived session token here so that
//! repeated runs within the token lifetime skip the login round-trip. Entries
//! are keyed by `(category, identifier)`, typically the site category and the
//! username, and persisted in a SQLite file under a stable SHA-256 digest of
//! that pair, so the same key maps to the same row across process restarts.
//!
//! The cache is constructed explicitly and passed to extractors through
//! [`crate::extractor::ExtractorContext`]; there is no global instance.
//!
//! Default location: `$XDG_CONFIG_HOME/gallery-extract/cache.sqlite3`
//! (or `~/.config/gallery-extract/cache.sqlite3`).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use extractor_core::cache::{CacheKey, SessionCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = SessionCache::open(&SessionCache::default_path()?).await?;
//! let key = CacheKey::new("koharu", "alice");
//! let token = cache
//!     .get_or_create(&key, Duration::from_secs(3600), || async {
//!         Ok::<_, std::io::Error>("fresh-token".to_string())
//!     })
//!     .await?;
//! println!("{token}");
//! # Ok(())
//! # }
//! ```

mod db;

pub use db::{Database, DbError};

use std::env;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const APP_DIR_NAME: &str = "gallery-extract";
const CACHE_FILE_NAME: &str = "cache.sqlite3";

/// Errors for cache storage operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No suitable user config directory is available.
    #[error("unable to determine config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigDirUnavailable,
    /// Opening or migrating the backing database failed.
    #[error(transparent)]
    Database(#[from] DbError),
    /// A query against the backing database failed.
    #[error("session cache query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Identity a cached token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Extractor category (site), e.g. `koharu`.
    pub category: String,
    /// Credential identity, e.g. the username.
    pub identifier: String,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub fn new(category: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            identifier: identifier.into(),
        }
    }

    /// Stable storage digest: hex SHA-256 of `category \0 identifier`.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.category.as_bytes());
        hasher.update([0_u8]);
        hasher.update(self.identifier.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

/// SQLite-backed token cache. Cheap to clone; clones share one pool.
#[derive(Debug, Clone)]
pub struct SessionCache {
    db: Database,
}

impl SessionCache {
    /// Opens (creating if needed) the cache file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] when the file cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        let db = Database::new(path).await?;
        Ok(Self { db })
    }

    /// Creates a process-local cache that is discarded on drop.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] when the in-memory database cannot be created.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let db = Database::new_in_memory().await?;
        Ok(Self { db })
    }

    /// Returns the default cache file path.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConfigDirUnavailable`] if no usable config dir is found.
    pub fn default_path() -> Result<PathBuf, CacheError> {
        Ok(default_config_dir()?.join(CACHE_FILE_NAME))
    }

    /// Returns the token for `key` if present and not expired.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Query`] when the lookup fails.
    #[instrument(skip(self), fields(category = %key.category))]
    pub async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, expires FROM session_cache WHERE key = ?")
                .bind(key.digest())
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.and_then(|(value, expires)| {
            if now_secs() < expires {
                Some(value)
            } else {
                debug!("cached session expired");
                None
            }
        }))
    }

    /// Stores `value` for `key`, expiring `max_age` from now.
    ///
    /// Concurrent writers to the same key resolve last-writer-wins.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Query`] when the write fails.
    pub async fn insert(
        &self,
        key: &CacheKey,
        value: &str,
        max_age: Duration,
    ) -> Result<(), CacheError> {
        let max_age_secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let expires = now_secs().saturating_add(max_age_secs);
        self.insert_with_expiry(key, value, expires).await
    }

    async fn insert_with_expiry(
        &self,
        key: &CacheKey,
        value: &str,
        expires: i64,
    ) -> Result<(), CacheError> {
        sqlx::query("INSERT OR REPLACE INTO session_cache (key, value, expires) VALUES (?, ?, ?)")
            .bind(key.digest())
            .bind(value)
            .bind(expires)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Removes the entry for `key`. Returns true when a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Query`] when the delete fails.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM session_cache WHERE key = ?")
            .bind(key.digest())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every expired entry and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Query`] when the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM session_cache WHERE expires <= ?")
            .bind(now_secs())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Returns the cached token, or derives, stores and returns a new one.
    ///
    /// `factory` runs at most once per call and only on a miss or an expired
    /// entry. Concurrent callers missing the same key may each run their own
    /// factory. A failing factory leaves the cache untouched and its error is
    /// returned as-is. Storage failures are logged and treated as misses so a
    /// broken cache file never blocks authentication.
    ///
    /// # Errors
    ///
    /// Returns the factory's error.
    #[instrument(skip(self, factory), fields(category = %key.category, max_age_secs = max_age.as_secs()))]
    pub async fn get_or_create<F, Fut, E>(
        &self,
        key: &CacheKey,
        max_age: Duration,
        factory: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        match self.get(key).await {
            Ok(Some(token)) => {
                debug!("session cache hit");
                return Ok(token);
            }
            Ok(None) => debug!("session cache miss"),
            Err(error) => warn!(error = %error, "session cache lookup failed; treating as miss"),
        }

        let token = factory().await?;

        if let Err(error) = self.insert(key, &token, max_age).await {
            warn!(error = %error, "failed to persist session token");
        } else {
            info!("session token cached");
        }
        Ok(token)
    }

    /// Closes the backing pool, flushing pending writes.
    pub async fn close(self) {
        self.db.close().await;
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

fn default_config_dir() -> Result<PathBuf, CacheError> {
    resolve_config_dir(
        sanitize_env_path(env::var_os("XDG_CONFIG_HOME")),
        sanitize_env_path(env::var_os("HOME")),
        sanitize_env_path(env::var_os("APPDATA")),
    )
}

fn sanitize_env_path(value: Option<OsString>) -> Option<PathBuf> {
    let value = value?;
    if value.to_string_lossy().trim().is_empty() {
        return None;
    }

    Some(PathBuf::from(value))
}

fn resolve_config_dir(
    xdg_config_home: Option<PathBuf>,
    home: Option<PathBuf>,
    app_data: Option<PathBuf>,
) -> Result<PathBuf, CacheError> {
    if let Some(xdg) = xdg_config_home {
        return Ok(xdg.join(APP_DIR_NAME));
    }
    if let Some(home) = home {
        return Ok(home.join(".config").join(APP_DIR_NAME));
    }
    if let Some(app_data) = app_data {
        return Ok(app_data.join(APP_DIR_NAME));
    }

    Err(CacheError::ConfigDirUnavailable)
}
