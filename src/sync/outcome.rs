use std::{collections::BTreeSet, fmt};

use serde::Serialize;

/// Result of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
   pub failed_connections: BTreeSet<String>,
   pub synced_connections: BTreeSet<String>,
}

impl SyncOutcome {
   pub fn is_success(&self) -> bool {
      self.failed_connections.is_empty()
   }

   pub fn record_failure(&mut self, connection_id: &str) {
      self.synced_connections.remove(connection_id);
      self.failed_connections.insert(connection_id.to_string());
   }

   pub fn record_success(&mut self, connection_id: &str) {
      if !self.failed_connections.contains(connection_id) {
         self.synced_connections.insert(connection_id.to_string());
      }
   }

   /// Single user-facing summary of the pass.
   pub fn summary(&self) -> String {
      if self.is_success() {
         "All bindings successfully updated".to_string()
      } else {
         let failed: Vec<&str> = self.failed_connections.iter().map(String::as_str).collect();
         format!("Binding update failed for the following connection(s): {}", failed.join(", "))
      }
   }
}

/// Phases of one pass, logged as the orchestrator moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
   Idle,
   ResolvingTargets,
   Resolving,
   UpdatingStorage,
   SyncingIssues,
   Aggregating,
}

impl SyncPhase {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Idle => "idle",
         Self::ResolvingTargets => "resolving-targets",
         Self::Resolving => "resolving",
         Self::UpdatingStorage => "updating-storage",
         Self::SyncingIssues => "syncing-issues",
         Self::Aggregating => "aggregating",
      }
   }
}

impl fmt::Display for SyncPhase {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}
