//! Synchronization passes over every bound connection.
//!
//! A pass gives each connection an equal share of the root progress scope,
//! splits that share between refreshing project storage and syncing
//! issues/taint issues/hotspots, and keeps going when a single connection or
//! target fails. Only cancellation aborts a pass.

use std::{
   sync::{Arc, Weak},
   time::Duration,
};

use parking_lot::Mutex;
use tokio::{
   task::JoinHandle,
   time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{
   AnalysisScheduler, ConnectionTargets, EngineHandle, EngineProvider, ProjectBranches,
   SyncOutcome, SyncPhase, SyncTarget, SyncTargetRegistry, group_by_connection,
};
use crate::{
   Error, Result,
   config::Config,
   progress::{
      MessageSeverity, ProgressClient, ProgressRegistry, ProgressToken, ProgressTracker, ScopeId,
   },
};

const UPDATE_BINDINGS: &str = "Update bindings";
const UPDATE_STORAGE: &str = "Update projects storage";
const SYNC_STORAGE: &str = "Sync projects storage";
const BULK_SYNC: &str = "Bulk sync";
const CONNECTION_FAILED: &str = "Failed";

fn enter(connection_id: Option<&str>, phase: SyncPhase) {
   match connection_id {
      Some(id) => tracing::debug!(connection = id, "sync phase: {phase}"),
      None => tracing::debug!("sync phase: {phase}"),
   }
}

/// Absorbs a failed engine call as a target-level failure. Cancellation is
/// the only error passed on.
fn absorb(result: Result<()>, op: &'static str, target: &str) -> Result<()> {
   match result {
      Ok(()) => Ok(()),
      Err(e) => match e.into_target_failure(op, target) {
         Error::Canceled => Err(Error::Canceled),
         failure => {
            tracing::warn!("{failure}");
            Ok(())
         },
      },
   }
}

/// Drives synchronization passes on demand and on a fixed timer.
pub struct SyncOrchestrator {
   targets:  Arc<dyn SyncTargetRegistry>,
   engines:  Arc<dyn EngineProvider>,
   client:   Arc<dyn ProgressClient>,
   analysis: Arc<dyn AnalysisScheduler>,
   progress: Arc<ProgressRegistry>,
   period:   Duration,
   shutdown: CancellationToken,
   timer:    Mutex<Option<JoinHandle<()>>>,
}

impl SyncOrchestrator {
   /// Creates an orchestrator. The scheduled-sync period is read from
   /// `config` once, here.
   pub fn new(
      targets: Arc<dyn SyncTargetRegistry>,
      engines: Arc<dyn EngineProvider>,
      client: Arc<dyn ProgressClient>,
      analysis: Arc<dyn AnalysisScheduler>,
      config: &Config,
   ) -> Self {
      Self {
         targets,
         engines,
         client,
         analysis,
         progress: Arc::new(ProgressRegistry::new()),
         period: config.sync_period(),
         shutdown: CancellationToken::new(),
         timer: Mutex::new(None),
      }
   }

   pub const fn period(&self) -> Duration {
      self.period
   }

   pub const fn progress_registry(&self) -> &Arc<ProgressRegistry> {
      &self.progress
   }

   /// Routes a client cancel request to the pass owning `token`.
   pub fn cancel_progress(&self, token: &ProgressToken) -> bool {
      self.progress.cancel(token)
   }

   /// User-requested pass: refreshes binding resolution, synchronizes every
   /// target with visible progress and shows one aggregate message.
   pub async fn run_on_demand(
      &self,
      cancel: &CancellationToken,
      token: Option<ProgressToken>,
   ) -> Result<SyncOutcome> {
      // Must complete before the targets are read.
      self.targets.invalidate_binding_cache();
      let targets = Self::resolve_targets(self.targets.active_targets());

      let tracker = ProgressTracker::begin(
         Arc::clone(&self.client),
         Arc::clone(&self.progress),
         UPDATE_BINDINGS,
         token,
         cancel,
      )
      .await;
      let result = tracker.finish(self.sync_all(&targets, &tracker).await);
      enter(None, SyncPhase::Idle);

      if let Ok(outcome) = &result {
         let severity = if outcome.is_success() {
            MessageSeverity::Info
         } else {
            MessageSeverity::Error
         };
         self.client.show_message(severity, &outcome.summary());
      }
      result
   }

   /// Timer-driven pass without visible progress. Failures are logged.
   pub async fn run_scheduled(&self) {
      let active = self.targets.active_targets();
      if active.is_empty() {
         tracing::debug!("no bound targets, skipping scheduled sync");
         return;
      }
      let targets = Self::resolve_targets(active);

      let tracker = ProgressTracker::hidden(UPDATE_BINDINGS, &CancellationToken::new());
      let result = tracker.finish(self.sync_all(&targets, &tracker).await);
      enter(None, SyncPhase::Idle);

      match result {
         Ok(outcome) if outcome.is_success() => tracing::info!("scheduled sync finished"),
         Ok(outcome) => tracing::warn!("scheduled sync: {}", outcome.summary()),
         Err(e) => tracing::warn!("scheduled sync failed: {e}"),
      }
   }

   fn resolve_targets(active: Vec<SyncTarget>) -> ConnectionTargets {
      enter(None, SyncPhase::ResolvingTargets);
      let targets = group_by_connection(active);
      tracing::info!(connections = targets.len(), "starting binding sync");
      targets
   }

   /// Synchronizes every connection in `targets` under `tracker`'s root, then
   /// triggers re-analysis for the connections that did not fail.
   pub async fn sync_all(
      &self,
      targets: &ConnectionTargets,
      tracker: &ProgressTracker,
   ) -> Result<SyncOutcome> {
      let mut outcome = SyncOutcome::default();

      if !targets.is_empty() {
         let share = 1.0 / targets.len() as f64;
         for (connection_id, projects) in targets {
            tracker.check_canceled()?;
            let synced = tracker
               .with_sub_scope_async(tracker.root(), connection_id, share, |scope| {
                  self.sync_connection(tracker, scope, connection_id, projects)
               })
               .await?;
            if synced {
               outcome.record_success(connection_id);
            } else {
               outcome.record_failure(connection_id);
            }
         }
      }

      enter(None, SyncPhase::Aggregating);
      self.reanalyze(&outcome);
      Ok(outcome)
   }

   /// Returns `Ok(false)` when the connection could not be resolved.
   async fn sync_connection(
      &self,
      tracker: &ProgressTracker,
      scope: ScopeId,
      connection_id: &str,
      projects: &ProjectBranches,
   ) -> Result<bool> {
      enter(Some(connection_id), SyncPhase::Resolving);
      let engine = match self.resolve(connection_id) {
         Ok(engine) => engine,
         Err(e) => {
            tracing::warn!("{e}");
            tracker.end(scope, Some(CONNECTION_FAILED));
            return Ok(false);
         },
      };

      enter(Some(connection_id), SyncPhase::UpdatingStorage);
      tracker
         .with_sub_scope_async(scope, UPDATE_STORAGE, 0.5, |scope| {
            Self::update_storage(tracker, scope, engine.as_ref(), projects)
         })
         .await?;

      enter(Some(connection_id), SyncPhase::SyncingIssues);
      tracker
         .with_sub_scope_async(scope, SYNC_STORAGE, 0.5, |scope| {
            Self::sync_storage(tracker, scope, engine.as_ref(), projects)
         })
         .await?;

      Ok(true)
   }

   fn resolve(&self, connection_id: &str) -> Result<Arc<dyn EngineHandle>> {
      let unavailable = |e: Error| Error::ConnectionUnavailable {
         connection_id: connection_id.to_string(),
         reason:        e.to_string(),
      };
      let endpoint = self.targets.endpoint(connection_id).map_err(unavailable)?;
      self.engines.engine(&endpoint).map_err(unavailable)
   }

   async fn update_storage(
      tracker: &ProgressTracker,
      scope: ScopeId,
      engine: &dyn EngineHandle,
      projects: &ProjectBranches,
   ) -> Result<()> {
      if projects.is_empty() {
         return Ok(());
      }

      let share = 1.0 / projects.len() as f64;
      for project_key in projects.keys() {
         tracker.check_canceled()?;
         tracker
            .with_sub_scope_async(scope, project_key, share, |scope| async move {
               let monitor = tracker.monitor(scope);
               let result = engine.refresh_project_storage(project_key, &monitor).await;
               absorb(result, "refresh project storage", project_key)
            })
            .await?;
      }
      Ok(())
   }

   async fn sync_storage(
      tracker: &ProgressTracker,
      scope: ScopeId,
      engine: &dyn EngineHandle,
      projects: &ProjectBranches,
   ) -> Result<()> {
      let keys: Vec<String> = projects.keys().cloned().collect();
      let keys = &keys;

      let pairs: Vec<(&str, &str)> = projects
         .iter()
         .flat_map(|(project, branches)| {
            branches
               .iter()
               .map(move |branch| (project.as_str(), branch.as_str()))
         })
         .collect();
      let share = 1.0 / (pairs.len() + 1) as f64;

      tracker.check_canceled()?;
      tracker
         .with_sub_scope_async(scope, BULK_SYNC, share, |scope| async move {
            let monitor = tracker.monitor(scope);
            absorb(engine.bulk_sync(keys, &monitor).await, "bulk sync", &keys.join(", "))
         })
         .await?;

      for (project, branch) in pairs {
         let target = format!("{project}@{branch}");
         let target = target.as_str();

         tracker.check_canceled()?;
         tracker
            .with_sub_scope_async(scope, target, share, |scope| async move {
               let monitor = tracker.monitor(scope);

               let result = engine.sync_issues(project, branch, &monitor).await;
               absorb(result, "sync issues", target)?;

               tracker.check_canceled()?;
               let result = engine.sync_taint_issues(project, branch, &monitor).await;
               absorb(result, "sync taint issues", target)?;

               tracker.check_canceled()?;
               let result = engine.sync_hotspots(project, branch, &monitor).await;
               absorb(result, "sync hotspots", target)
            })
            .await?;
      }
      Ok(())
   }

   fn reanalyze(&self, outcome: &SyncOutcome) {
      for connection_id in &outcome.synced_connections {
         for folder in self.targets.bound_folders(connection_id) {
            tracing::debug!(connection = %connection_id, folder = %folder.uri, "re-analyzing open files");
            self.analysis.reanalyze_open_files(&folder);
         }
      }
   }

   /// Starts the background timer. The first pass fires one period from now.
   /// Calling it again while the timer runs is a no-op.
   pub fn start_scheduler(self: &Arc<Self>) {
      let mut timer = self.timer.lock();
      if timer.is_some() || self.shutdown.is_cancelled() {
         return;
      }

      let this: Weak<Self> = Arc::downgrade(self);
      let shutdown = self.shutdown.clone();
      let period = self.period;
      *timer = Some(tokio::spawn(async move {
         let mut ticks = time::interval_at(Instant::now() + period, period);
         ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
         loop {
            tokio::select! {
               () = shutdown.cancelled() => break,
               _ = ticks.tick() => {
                  let Some(orchestrator) = this.upgrade() else {
                     break;
                  };
                  orchestrator.run_scheduled().await;
               }
            }
         }
         tracing::debug!("sync scheduler stopped");
      }));
   }

   pub fn is_scheduler_running(&self) -> bool {
      self
         .timer
         .lock()
         .as_ref()
         .is_some_and(|handle| !handle.is_finished())
   }

   /// Stops the timer without waiting for an in-flight scheduled pass, which
   /// completes on its own. On-demand passes still registered for client
   /// cancellation are cancelled and the registry is emptied.
   pub fn shutdown(&self) {
      self.shutdown.cancel();
      self.timer.lock().take();
      let cancelled = self.progress.cancel_all();
      if cancelled > 0 {
         tracing::debug!(cancelled, "cancelled on-demand syncs at shutdown");
      }
   }
}

impl Drop for SyncOrchestrator {
   fn drop(&mut self) {
      self.shutdown.cancel();
   }
}
