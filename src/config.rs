//! Configuration loading for the synchronization layer.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 3600;
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
   /// Period of the background synchronization timer, in seconds.
   pub sync_period_secs: u64,
   /// `tracing` filter directive applied on top of `RUST_LOG`.
   pub log_filter:       String,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         sync_period_secs: DEFAULT_SYNC_PERIOD_SECS,
         log_filter:       DEFAULT_LOG_FILTER.to_string(),
      }
   }
}

impl Config {
   /// Loads `~/.bindsync/config.toml` (creating it with defaults when missing)
   /// merged with `BINDSYNC_*` environment variables.
   pub fn load() -> Self {
      match ensure_global_config() {
         Ok(path) => Self::load_from(&path),
         Err(e) => {
            tracing::warn!("failed to prepare config file: {e}");
            Self::extract(Self::figment()).unwrap_or_default()
         },
      }
   }

   /// Loads a specific config file merged with the environment. Invalid
   /// content falls back to defaults.
   pub fn load_from(path: &Path) -> Self {
      Self::try_load_from(path)
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   pub fn try_load_from(path: &Path) -> Result<Self> {
      Self::extract(Self::figment().merge(Toml::file(path)))
   }

   fn figment() -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
   }

   fn extract(figment: Figment) -> Result<Self> {
      figment
         .merge(Env::prefixed("BINDSYNC_").lowercase(true))
         .extract()
         .map_err(|e| ConfigError::Extract(Box::new(e)).into())
   }

   /// Interval between scheduled synchronization passes. Never zero.
   pub fn sync_period(&self) -> Duration {
      Duration::from_secs(self.sync_period_secs.max(1))
   }

   pub fn write_default(path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }
      let toml = toml::to_string_pretty(&Self::default()).map_err(ConfigError::Serialize)?;
      fs::write(path, toml)?;
      Ok(())
   }
}

/// Returns the base directory for bindsync configuration
pub fn base_dir() -> Result<&'static PathBuf> {
   static ONCE: OnceLock<Option<PathBuf>> = OnceLock::new();
   ONCE
      .get_or_init(|| BaseDirs::new().map(|d| d.home_dir().join(".bindsync")))
      .as_ref()
      .ok_or_else(|| ConfigError::GetUserDirectories.into())
}

pub fn config_file_path() -> Result<PathBuf> {
   Ok(base_dir()?.join("config.toml"))
}

fn ensure_global_config() -> Result<PathBuf> {
   let path = config_file_path()?;
   if !path.exists() {
      Config::write_default(&path)?;
   }
   Ok(path)
}
