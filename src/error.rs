use std::io;

use thiserror::Error;

/// Main error type for bindsync.
///
/// Only [`Error::Canceled`] and failures escaping a progress scope unwind a
/// whole synchronization pass. Connection and target failures are absorbed by
/// the orchestrator and surface in the [`crate::sync::SyncOutcome`] instead.
#[derive(Debug, Error)]
pub enum Error {
   /// Cooperative cancellation of the current operation.
   #[error("Canceled")]
   Canceled,

   /// The endpoint or engine handle of a connection could not be resolved.
   #[error("connection '{connection_id}' unavailable: {reason}")]
   ConnectionUnavailable { connection_id: String, reason: String },

   /// Refreshing or syncing one project/branch failed.
   #[error("{op} failed for {target}: {reason}")]
   TargetSync { op: &'static str, target: String, reason: String },

   /// Failure reported by the remote analysis engine during an operation.
   #[error("engine error during {op}: {reason}")]
   Engine { op: &'static str, reason: String },

   /// Failure reported by the UI client during an operation.
   #[error("client error during {op}: {reason}")]
   Client { op: &'static str, reason: String },

   /// A sub-scope was requested with a fraction outside of (0, 1].
   #[error("invalid progress fraction: {0}")]
   InvalidFraction(f64),

   /// Any other failure escaping a progress scope body.
   #[error("{0}")]
   Unexpected(String),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// I/O error occurred.
   #[error("io error: {0}")]
   Io(#[from] io::Error),
}

impl Error {
   pub const fn is_canceled(&self) -> bool {
      matches!(self, Self::Canceled)
   }

   /// Wraps any non-cancellation failure of an engine call into a
   /// [`Error::TargetSync`] for logging. Cancellation is passed through.
   pub fn into_target_failure(self, op: &'static str, target: impl Into<String>) -> Self {
      match self {
         Self::Canceled => Self::Canceled,
         Self::TargetSync { .. } => self,
         other => Self::TargetSync { op, target: target.into(), reason: other.to_string() },
      }
   }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Failed to retrieve user directories (e.g., home directory).
   #[error("failed to get user directories")]
   GetUserDirectories,

   /// The merged configuration could not be extracted.
   #[error("failed to extract config: {0}")]
   Extract(#[from] Box<figment::Error>),

   /// Failed to serialize the default configuration.
   #[error("failed to serialize config: {0}")]
   Serialize(#[from] toml::ser::Error),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
