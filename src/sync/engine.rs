//! Contracts of the remote analysis engine and the analysis scheduler.

use std::sync::Arc;

use super::{Endpoint, WorkspaceFolder};
use crate::{Result, progress::ProgressMonitor};

/// Per-connection handle to the remote analysis engine.
///
/// Every call receives the monitor of the scope it runs in; implementations
/// should poll it and return [`crate::Error::Canceled`] once cancelled.
#[async_trait::async_trait]
pub trait EngineHandle: Send + Sync {
   async fn refresh_project_storage(
      &self,
      project_key: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()>;

   async fn bulk_sync(&self, project_keys: &[String], monitor: &ProgressMonitor) -> Result<()>;

   async fn sync_issues(
      &self,
      project_key: &str,
      branch: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()>;

   async fn sync_taint_issues(
      &self,
      project_key: &str,
      branch: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()>;

   async fn sync_hotspots(
      &self,
      project_key: &str,
      branch: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()>;
}

/// Resolves the engine serving a connection.
pub trait EngineProvider: Send + Sync {
   fn engine(&self, endpoint: &Endpoint) -> Result<Arc<dyn EngineHandle>>;
}

/// Downstream analysis scheduling.
pub trait AnalysisScheduler: Send + Sync {
   /// Queues re-analysis of the open files that belong to `folder`.
   fn reanalyze_open_files(&self, folder: &WorkspaceFolder);
}
