//! Bound targets and the registry that supplies them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::Result;

/// One remote project bound to a connection, with the branches to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
   pub connection_id: String,
   pub project_key:   String,
   pub branch_names:  BTreeSet<String>,
}

impl SyncTarget {
   pub fn new<I, S>(connection_id: &str, project_key: &str, branches: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      Self {
         connection_id: connection_id.to_string(),
         project_key:   project_key.to_string(),
         branch_names:  branches.into_iter().map(Into::into).collect(),
      }
   }
}

/// Branch names per project key.
pub type ProjectBranches = BTreeMap<String, BTreeSet<String>>;

/// Projects per connection id, in a stable order.
pub type ConnectionTargets = BTreeMap<String, ProjectBranches>;

/// Groups targets by connection. Repeated projects merge their branch sets.
pub fn group_by_connection(targets: impl IntoIterator<Item = SyncTarget>) -> ConnectionTargets {
   let mut grouped = ConnectionTargets::new();
   for target in targets {
      grouped
         .entry(target.connection_id)
         .or_default()
         .entry(target.project_key)
         .or_default()
         .extend(target.branch_names);
   }
   grouped
}

/// Transport handle of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
   pub connection_id: String,
   pub url:           String,
   pub organization:  Option<String>,
}

/// A local workspace folder bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceFolder {
   pub uri:           String,
   pub connection_id: String,
}

/// Source of the bindings that need synchronization.
pub trait SyncTargetRegistry: Send + Sync {
   /// Targets currently bound, produced fresh on each call.
   fn active_targets(&self) -> Vec<SyncTarget>;

   /// Drops cached binding resolution so the next analysis re-resolves it.
   fn invalidate_binding_cache(&self);

   fn endpoint(&self, connection_id: &str) -> Result<Endpoint>;

   /// Local folders bound to `connection_id`.
   fn bound_folders(&self, connection_id: &str) -> Vec<WorkspaceFolder>;
}
