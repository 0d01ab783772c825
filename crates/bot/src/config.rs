use std::{fmt, fs, io, time::Duration};

use anyhow::{bail, Context};
use bot_api::BroadcastSettings;
use serde::Deserialize;
use shared::domain::AccountId;
use telegram::{TelegramConfig, DEFAULT_API_URL};

const DEFAULT_CONFIG_FILE: &str = "bot.toml";

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bot_token: String,
    pub database_url: String,
    pub http_bind: String,
    pub telegram_api_url: String,
    pub poll_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub delivery_timeout_secs: u64,
    pub broadcast_concurrency: usize,
    pub broadcast_allowlist: Vec<i64>,
    pub webhook_enabled: bool,
    pub webhook_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            database_url: "sqlite://./data/bot.db".into(),
            http_bind: "127.0.0.1:8080".into(),
            telegram_api_url: DEFAULT_API_URL.into(),
            poll_timeout_secs: 30,
            store_timeout_secs: 5,
            delivery_timeout_secs: 10,
            broadcast_concurrency: 8,
            broadcast_allowlist: Vec::new(),
            webhook_enabled: false,
            webhook_secret: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("database_url", &self.database_url)
            .field("http_bind", &self.http_bind)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("store_timeout_secs", &self.store_timeout_secs)
            .field("delivery_timeout_secs", &self.delivery_timeout_secs)
            .field("broadcast_concurrency", &self.broadcast_concurrency)
            .field("broadcast_allowlist", &self.broadcast_allowlist)
            .field("webhook_enabled", &self.webhook_enabled)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Settings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs.max(1))
    }

    pub fn telegram_config(&self) -> TelegramConfig {
        TelegramConfig {
            api_url: self.telegram_api_url.clone(),
            token: self.bot_token.clone(),
            request_timeout: Duration::from_secs(self.delivery_timeout_secs.max(1)),
        }
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            concurrency: self.broadcast_concurrency.max(1),
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs.max(1)),
            allowlist: self
                .broadcast_allowlist
                .iter()
                .copied()
                .map(AccountId)
                .collect(),
        }
    }
}

/// Defaults, then `bot.toml` (or the file named by `BOT_CONFIG`), then the environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let path = std::env::var("BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => return Err(err).with_context(|| format!("failed to read config file '{path}'")),
    };
    load_settings_from(raw.as_deref(), |key| std::env::var(key).ok())
        .with_context(|| format!("invalid settings (config file '{path}')"))
}

pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match file {
        Some(raw) => toml::from_str::<Settings>(raw).context("failed to parse config file")?,
        None => Settings::default(),
    };

    if let Some(v) = lookup(&env, &["BOT_TOKEN", "APP__BOT_TOKEN"]) {
        settings.bot_token = v;
    }
    if let Some(v) = lookup(&env, &["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = lookup(&env, &["HTTP_BIND", "APP__HTTP_BIND"]) {
        settings.http_bind = v;
    }
    if let Some(v) = lookup(&env, &["TELEGRAM_API_URL", "APP__TELEGRAM_API_URL"]) {
        settings.telegram_api_url = v;
    }
    if let Some(v) = lookup(&env, &["APP__POLL_TIMEOUT_SECS"]) {
        settings.poll_timeout_secs = parse_env("APP__POLL_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup(&env, &["APP__STORE_TIMEOUT_SECS"]) {
        settings.store_timeout_secs = parse_env("APP__STORE_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup(&env, &["APP__DELIVERY_TIMEOUT_SECS"]) {
        settings.delivery_timeout_secs = parse_env("APP__DELIVERY_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup(&env, &["APP__BROADCAST_CONCURRENCY"]) {
        settings.broadcast_concurrency = parse_env("APP__BROADCAST_CONCURRENCY", &v)?;
    }
    if let Some(v) = lookup(&env, &["APP__BROADCAST_ALLOWLIST"]) {
        settings.broadcast_allowlist = v
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| parse_env("APP__BROADCAST_ALLOWLIST", id))
            .collect::<anyhow::Result<_>>()?;
    }
    if let Some(v) = lookup(&env, &["APP__WEBHOOK_ENABLED"]) {
        settings.webhook_enabled = parse_env("APP__WEBHOOK_ENABLED", &v)?;
    }
    if let Some(v) = lookup(&env, &["WEBHOOK_SECRET", "APP__WEBHOOK_SECRET"]) {
        settings.webhook_secret = Some(v);
    }

    settings.bot_token = settings.bot_token.trim().to_string();
    if settings.bot_token.is_empty() {
        bail!("bot token is not configured; set BOT_TOKEN or bot_token in bot.toml");
    }
    settings.webhook_secret = settings
        .webhook_secret
        .take()
        .filter(|secret| !secret.trim().is_empty());

    Ok(settings)
}

/// Later names win, so `APP__*` aliases override the plain variables.
fn lookup(env: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().rev().find_map(|key| env(key))
}

fn parse_env<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value for {key}: '{raw}'"))
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
