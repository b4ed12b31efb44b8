use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the todoctl services.
///
/// Every section has defaults, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoConfig {
    pub database: DatabaseConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Connection string with the password masked, for display.
    pub fn redacted_url(&self) -> Option<String> {
        let url = self.url.as_deref()?;
        let Some((scheme, rest)) = url.split_once("://") else {
            return Some(url.to_owned());
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return Some(url.to_owned());
        };
        let user = credentials.split(':').next().unwrap_or_default();
        Some(format!("{scheme}://{user}:***@{host}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Concurrent workers executing writes
    pub workers: usize,
    /// Bound on queued work items
    pub queue_capacity: usize,
    /// Largest worker count accepted from config, flags or a resize request
    pub max_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: crate::pool::DEFAULT_QUEUE_CAPACITY,
            max_workers: crate::pool::DEFAULT_MAX_WORKERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub user_ttl_secs: u64,
    pub task_ttl_secs: u64,
    /// How often the in-process cache drops expired entries
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            user_ttl_secs: 600,
            task_ttl_secs: 600,
            purge_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn user_ttl(&self) -> Duration {
        Duration::from_secs(self.user_ttl_secs)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Allow any origin instead of localhost only
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: false,
        }
    }
}

impl TodoConfig {
    /// Load `~/.todoctl/config.toml` if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, then apply environment overrides.
    ///
    /// Unlike [`load`](Self::load), a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file (invalid TOML): {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get config file path: ~/.todoctl/config.toml
    pub fn config_path() -> PathBuf {
        config_dir()
            .unwrap_or_else(|| PathBuf::from(".todoctl"))
            .join("config.toml")
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`.
    ///
    /// `DATABASE_URL` wins over the `DB_*` parts. `DB_*` needs at least
    /// `DB_USER` and `DB_NAME`; host and port default to localhost:5432.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        } else if let (Some(user), Some(name)) = (lookup("DB_USER"), lookup("DB_NAME")) {
            let password = lookup("DB_PASSWORD").unwrap_or_default();
            let host = lookup("DB_HOST").unwrap_or_else(|| "localhost".into());
            let port = lookup("DB_PORT").unwrap_or_else(|| "5432".into());
            self.database.url = Some(format!("postgres://{user}:{password}@{host}:{port}/{name}"));
        }

        if let Some(workers) = lookup("TODOCTL_WORKERS").and_then(|v| v.parse().ok()) {
            self.pool.workers = workers;
        }

        if let Some(bind) = lookup("TODOCTL_BIND").and_then(|v| v.parse().ok()) {
            self.server.bind = bind;
        }
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            anyhow::bail!("pool.workers must be at least 1");
        }
        if self.pool.workers > self.pool.max_workers {
            anyhow::bail!(
                "pool.workers ({}) exceeds pool.max_workers ({})",
                self.pool.workers,
                self.pool.max_workers
            );
        }
        if self.pool.queue_capacity == 0 {
            anyhow::bail!("pool.queue_capacity must be at least 1");
        }
        if self.cache.user_ttl_secs == 0 || self.cache.task_ttl_secs == 0 {
            anyhow::bail!("cache TTLs must be greater than zero");
        }
        if self.cache.purge_interval_secs == 0 {
            anyhow::bail!("cache.purge_interval_secs must be greater than zero");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }

    /// Database URL, or an actionable error when none is configured.
    pub fn database_url(&self) -> Result<&str> {
        self.database.url.as_deref().context(
            "No database configured\n\nSet DATABASE_URL (or DB_USER/DB_NAME/...) or [database] url in the config file",
        )
    }
}

/// Get the todoctl config directory path (~/.todoctl)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".todoctl"))
}

/// Load `.env` from the current directory, then `~/.todoctl/.env`.
///
/// Variables already set are never overwritten.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from {}", path.display());
    }

    if let Some(env_file) = config_dir().map(|dir| dir.join(".env")) {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => debug!("Loaded .env from {}", env_file.display()),
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }
}
