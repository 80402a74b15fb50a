//! Configuration loading and validation.
//!
//! Settings come from `~/.config/calmirror/config.toml` (or `--config`),
//! overridden by `CALMIRROR__*` environment variables. The comma-separated
//! `GOOGLE_CALENDAR_IDS` / `SUBSCRIPTION_URIS` pair is still understood when
//! the file lists no destinations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calmirror_core::Destination;
use calmirror_provider_google::DEFAULT_API_BASE;
use config::{Environment, File, FileFormat};
use serde::Deserialize;
use url::Url;

use crate::transforms::TransformStep;

const FEED_SCHEMES: &[&str] = &["http", "https", "webcal"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub google: GoogleSettings,

    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSettings {
    /// OAuth bearer token with the calendar scope
    pub access_token: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            api_base_url: default_api_base_url(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

/// One `[[destinations]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DestinationConfig {
    pub calendar_id: String,
    pub feed_url: String,

    #[serde(default)]
    pub transforms: Vec<TransformStep>,
}

impl DestinationConfig {
    pub fn to_destination(&self) -> Destination {
        Destination::new(&self.calendar_id, &self.feed_url)
    }
}

/// Plain environment variables read outside the `CALMIRROR__` namespace.
#[derive(Debug, Clone, Default)]
pub struct LegacyEnv {
    pub calendar_ids: Option<String>,
    pub subscription_uris: Option<String>,
    pub access_token: Option<String>,
}

impl LegacyEnv {
    pub fn from_process() -> Self {
        Self {
            calendar_ids: std::env::var("GOOGLE_CALENDAR_IDS").ok(),
            subscription_uris: std::env::var("SUBSCRIPTION_URIS").ok(),
            access_token: std::env::var("GOOGLE_ACCESS_TOKEN").ok(),
        }
    }

    /// Pair calendar ids with feed URLs by position.
    pub fn destinations(&self) -> Result<Vec<DestinationConfig>> {
        let (ids, uris) = match (&self.calendar_ids, &self.subscription_uris) {
            (None, None) => return Ok(Vec::new()),
            (Some(ids), Some(uris)) => (split_list(ids), split_list(uris)),
            _ => anyhow::bail!(
                "GOOGLE_CALENDAR_IDS and SUBSCRIPTION_URIS must be set together"
            ),
        };

        if ids.len() != uris.len() {
            anyhow::bail!(
                "GOOGLE_CALENDAR_IDS has {} entries but SUBSCRIPTION_URIS has {}",
                ids.len(),
                uris.len()
            );
        }

        Ok(ids
            .into_iter()
            .zip(uris)
            .map(|(calendar_id, feed_url)| DestinationConfig {
                calendar_id,
                feed_url,
                transforms: Vec::new(),
            })
            .collect())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Get the default config file path (~/.config/calmirror/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("calmirror");
    Ok(config_dir.join("config.toml"))
}

impl Settings {
    /// Load settings from `path` (required) or the default location (optional).
    pub fn load(path: Option<&Path>, legacy: &LegacyEnv) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_config_path()?, false),
        };

        let source = config::Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(required))
            .add_source(Environment::with_prefix("CALMIRROR").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut settings: Settings = source
            .try_deserialize()
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        if settings.destinations.is_empty() {
            settings.destinations = legacy.destinations()?;
        }
        if settings.google.access_token.is_none() {
            settings.google.access_token = legacy.access_token.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.destinations.is_empty() {
            anyhow::bail!(
                "No destinations configured.\n\
                Add [[destinations]] entries with calendar_id and feed_url to config.toml"
            );
        }

        let mut seen = HashSet::new();
        for destination in &self.destinations {
            if destination.calendar_id.trim().is_empty() {
                anyhow::bail!(
                    "Destination with feed {} has an empty calendar_id",
                    destination.feed_url
                );
            }
            if !seen.insert(destination.calendar_id.as_str()) {
                anyhow::bail!(
                    "Calendar '{}' is configured more than once",
                    destination.calendar_id
                );
            }

            let url = Url::parse(&destination.feed_url).with_context(|| {
                format!(
                    "Invalid feed_url '{}' for calendar '{}'",
                    destination.feed_url, destination.calendar_id
                )
            })?;
            if !FEED_SCHEMES.contains(&url.scheme()) {
                anyhow::bail!(
                    "Unsupported feed_url scheme '{}' for calendar '{}'",
                    url.scheme(),
                    destination.calendar_id
                );
            }
        }

        Ok(())
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.destinations
            .iter()
            .map(DestinationConfig::to_destination)
            .collect()
    }
}
