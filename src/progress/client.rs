//! Contract of the UI client that receives progress notifications.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Opaque identifier correlating notifications with one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressToken(String);

impl ProgressToken {
   pub fn new(token: impl Into<String>) -> Self {
      Self(token.into())
   }

   /// Generates a fresh token for server-initiated progress.
   pub fn generate() -> Self {
      Self(Uuid::new_v4().to_string())
   }

   pub fn as_str(&self) -> &str {
      &self.0
   }
}

impl fmt::Display for ProgressToken {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.0)
   }
}

impl From<&str> for ProgressToken {
   fn from(value: &str) -> Self {
      Self::new(value)
   }
}

/// Payload of a progress update. `None` fields are left unchanged by the
/// client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
   #[serde(skip_serializing_if = "Option::is_none")]
   pub percentage:  Option<u32>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub message:     Option<String>,
   #[serde(skip_serializing_if = "Option::is_none")]
   pub cancellable: Option<bool>,
}

impl ProgressReport {
   pub fn at(percentage: u32, message: impl Into<String>) -> Self {
      Self { percentage: Some(percentage), message: Some(message.into()), cancellable: None }
   }

   pub const fn cancellable(cancellable: bool) -> Self {
      Self { percentage: None, message: None, cancellable: Some(cancellable) }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
   Error,
   Warning,
   Info,
   Log,
}

/// UI client collaborator (typically an editor connected over a language
/// protocol).
///
/// Notification methods are fire-and-forget: implementations must not block.
#[async_trait::async_trait]
pub trait ProgressClient: Send + Sync {
   /// Whether the client accepts work-done progress notifications at all.
   fn supports_work_done_progress(&self) -> bool;

   /// Asks the client to accept a server-created progress `token`.
   async fn create_progress_token(&self, token: &ProgressToken) -> Result<()>;

   fn begin_progress(&self, token: &ProgressToken, title: &str);

   fn report_progress(&self, token: &ProgressToken, report: ProgressReport);

   fn end_progress(&self, token: &ProgressToken, message: Option<&str>);

   fn show_message(&self, severity: MessageSeverity, text: &str);
}

/// Client that supports nothing and drops every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentClient;

#[async_trait::async_trait]
impl ProgressClient for SilentClient {
   fn supports_work_done_progress(&self) -> bool {
      false
   }

   async fn create_progress_token(&self, _token: &ProgressToken) -> Result<()> {
      Ok(())
   }

   fn begin_progress(&self, _token: &ProgressToken, _title: &str) {}

   fn report_progress(&self, _token: &ProgressToken, _report: ProgressReport) {}

   fn end_progress(&self, _token: &ProgressToken, _message: Option<&str>) {}

   fn show_message(&self, _severity: MessageSeverity, _text: &str) {}
}
