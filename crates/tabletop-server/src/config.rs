use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use tabletop_types::MAX_CHAT_HISTORY;

/// Server settings, read from `TABLETOP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub chat_history: u32,
    pub max_upload_bytes: usize,
    pub cleanup_interval: Duration,
    pub idle_hours: i64,
    pub idle_after: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let idle_hours: i64 = number(&lookup, "TABLETOP_IDLE_HOURS", 24)?;
        let idle_after = chrono::Duration::try_hours(idle_hours)
            .filter(|d| *d > chrono::Duration::zero())
            .with_context(|| format!("TABLETOP_IDLE_HOURS out of range: {}", idle_hours))?;

        Ok(Self {
            host: text("TABLETOP_HOST", "0.0.0.0"),
            port: number(&lookup, "TABLETOP_PORT", 3001)?,
            db_path: text("TABLETOP_DB_PATH", "data/tabletop.db").into(),
            uploads_dir: text("TABLETOP_UPLOADS_DIR", "data/uploads").into(),
            chat_history: number(&lookup, "TABLETOP_CHAT_HISTORY", MAX_CHAT_HISTORY)?,
            max_upload_bytes: number(&lookup, "TABLETOP_MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
            cleanup_interval: Duration::from_secs(number(
                &lookup,
                "TABLETOP_CLEANUP_INTERVAL_SECS",
                3600,
            )?),
            idle_hours,
            idle_after,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, raw)),
        None => Ok(default),
    }
}
