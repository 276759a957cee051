#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
   collections::{BTreeMap, BTreeSet},
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
};

use bindsync::{
   Error, Result,
   progress::{MessageSeverity, ProgressClient, ProgressMonitor, ProgressReport, ProgressToken},
   sync::{
      AnalysisScheduler, EngineHandle, EngineProvider, Endpoint, SyncTarget, SyncTargetRegistry,
      WorkspaceFolder,
   },
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
   Begin { token: ProgressToken, title: String },
   Report { token: ProgressToken, report: ProgressReport },
   End { token: ProgressToken, message: Option<String> },
   Message { severity: MessageSeverity, text: String },
}

/// UI client that records every call.
pub struct RecordingClient {
   supports:     bool,
   refuse_token: bool,
   events:       Mutex<Vec<Event>>,
}

impl RecordingClient {
   pub fn new() -> Self {
      Self { supports: true, refuse_token: false, events: Mutex::new(Vec::new()) }
   }

   pub fn without_progress_support() -> Self {
      Self { supports: false, ..Self::new() }
   }

   pub fn refusing_tokens() -> Self {
      Self { refuse_token: true, ..Self::new() }
   }

   pub fn events(&self) -> Vec<Event> {
      self.events.lock().clone()
   }

   pub fn events_for(&self, token: &ProgressToken) -> Vec<Event> {
      self
         .events()
         .into_iter()
         .filter(|event| match event {
            Event::Begin { token: t, .. }
            | Event::Report { token: t, .. }
            | Event::End { token: t, .. } => t == token,
            Event::Message { .. } => false,
         })
         .collect()
   }

   pub fn reports(&self) -> Vec<ProgressReport> {
      self
         .events()
         .into_iter()
         .filter_map(|event| match event {
            Event::Report { report, .. } => Some(report),
            _ => None,
         })
         .collect()
   }

   pub fn percentages(&self) -> Vec<u32> {
      self.reports().iter().filter_map(|r| r.percentage).collect()
   }

   pub fn messages(&self) -> Vec<String> {
      self.reports().into_iter().filter_map(|r| r.message).collect()
   }

   pub fn shown_messages(&self) -> Vec<(MessageSeverity, String)> {
      self
         .events()
         .into_iter()
         .filter_map(|event| match event {
            Event::Message { severity, text } => Some((severity, text)),
            _ => None,
         })
         .collect()
   }

   pub fn end_messages(&self) -> Vec<Option<String>> {
      self
         .events()
         .into_iter()
         .filter_map(|event| match event {
            Event::End { message, .. } => Some(message),
            _ => None,
         })
         .collect()
   }
}

#[async_trait::async_trait]
impl ProgressClient for RecordingClient {
   fn supports_work_done_progress(&self) -> bool {
      self.supports
   }

   async fn create_progress_token(&self, _token: &ProgressToken) -> Result<()> {
      if self.refuse_token {
         return Err(Error::Client { op: "create token", reason: "refused".to_string() });
      }
      Ok(())
   }

   fn begin_progress(&self, token: &ProgressToken, title: &str) {
      self
         .events
         .lock()
         .push(Event::Begin { token: token.clone(), title: title.to_string() });
   }

   fn report_progress(&self, token: &ProgressToken, report: ProgressReport) {
      self
         .events
         .lock()
         .push(Event::Report { token: token.clone(), report });
   }

   fn end_progress(&self, token: &ProgressToken, message: Option<&str>) {
      self.events.lock().push(Event::End {
         token:   token.clone(),
         message: message.map(str::to_string),
      });
   }

   fn show_message(&self, severity: MessageSeverity, text: &str) {
      self
         .events
         .lock()
         .push(Event::Message { severity, text: text.to_string() });
   }
}

/// Registry serving a fixed set of targets.
#[derive(Default)]
pub struct FakeTargets {
   targets:       Vec<SyncTarget>,
   unresolvable:  BTreeSet<String>,
   folders:       BTreeMap<String, Vec<WorkspaceFolder>>,
   invalidations: AtomicUsize,
   log:           Option<Arc<CallLog>>,
}

impl FakeTargets {
   pub fn new(targets: Vec<SyncTarget>) -> Self {
      let mut folders: BTreeMap<String, Vec<WorkspaceFolder>> = BTreeMap::new();
      for target in &targets {
         folders
            .entry(target.connection_id.clone())
            .or_insert_with(|| {
               vec![WorkspaceFolder {
                  uri:           format!("file:///work/{}", target.connection_id),
                  connection_id: target.connection_id.clone(),
               }]
            });
      }
      Self { targets, folders, ..Self::default() }
   }

   pub fn unresolvable(mut self, connection_id: &str) -> Self {
      self.unresolvable.insert(connection_id.to_string());
      self
   }

   pub fn logging_to(mut self, log: Arc<CallLog>) -> Self {
      self.log = Some(log);
      self
   }

   pub fn invalidations(&self) -> usize {
      self.invalidations.load(Ordering::SeqCst)
   }
}

impl SyncTargetRegistry for FakeTargets {
   fn active_targets(&self) -> Vec<SyncTarget> {
      if let Some(log) = &self.log {
         log.push("targets");
      }
      self.targets.clone()
   }

   fn invalidate_binding_cache(&self) {
      if let Some(log) = &self.log {
         log.push("invalidate");
      }
      self.invalidations.fetch_add(1, Ordering::SeqCst);
   }

   fn endpoint(&self, connection_id: &str) -> Result<Endpoint> {
      if self.unresolvable.contains(connection_id) {
         return Err(Error::Unexpected(format!("no endpoint for {connection_id}")));
      }
      Ok(Endpoint {
         connection_id: connection_id.to_string(),
         url:           format!("https://{connection_id}.example.com"),
         organization:  None,
      })
   }

   fn bound_folders(&self, connection_id: &str) -> Vec<WorkspaceFolder> {
      self.folders.get(connection_id).cloned().unwrap_or_default()
   }
}

/// Shared, ordered log of collaborator calls.
#[derive(Default)]
pub struct CallLog {
   calls: Mutex<Vec<String>>,
}

impl CallLog {
   pub fn push(&self, call: impl Into<String>) {
      self.calls.lock().push(call.into());
   }

   pub fn calls(&self) -> Vec<String> {
      self.calls.lock().clone()
   }

   pub fn calls_for(&self, connection_id: &str) -> Vec<String> {
      let prefix = format!("{connection_id}:");
      self
         .calls()
         .into_iter()
         .filter(|call| call.starts_with(&prefix))
         .collect()
   }
}

/// Engine that logs each call as `<connection>:<op>:<target>`.
pub struct FakeEngine {
   connection_id: String,
   log:           Arc<CallLog>,
   fail_on:       BTreeSet<String>,
   cancel_on:     Option<(String, CancellationToken)>,
   park_on:       BTreeSet<String>,
   reports:       bool,
}

impl FakeEngine {
   async fn call(&self, op: &str, target: &str, monitor: &ProgressMonitor) -> Result<()> {
      tokio::task::yield_now().await;
      let call = format!("{}:{op}:{target}", self.connection_id);
      self.log.push(call.clone());
      if self.reports {
         monitor.set_fraction(0.5);
         monitor.set_fraction(1.0);
      }
      if self.park_on.contains(&call) {
         monitor.cancelled().await;
         return monitor.check_canceled();
      }
      if let Some((trigger, cancel)) = &self.cancel_on
         && *trigger == call
      {
         cancel.cancel();
         return monitor.check_canceled();
      }
      if self.fail_on.contains(&call) {
         return Err(Error::Engine { op: "fake", reason: format!("forced failure on {call}") });
      }
      Ok(())
   }
}

#[async_trait::async_trait]
impl EngineHandle for FakeEngine {
   async fn refresh_project_storage(
      &self,
      project_key: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()> {
      self.call("refresh", project_key, monitor).await
   }

   async fn bulk_sync(&self, project_keys: &[String], monitor: &ProgressMonitor) -> Result<()> {
      self.call("bulk", &project_keys.join(","), monitor).await
   }

   async fn sync_issues(
      &self,
      project_key: &str,
      branch: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()> {
      self.call("issues", &format!("{project_key}@{branch}"), monitor).await
   }

   async fn sync_taint_issues(
      &self,
      project_key: &str,
      branch: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()> {
      self.call("taint", &format!("{project_key}@{branch}"), monitor).await
   }

   async fn sync_hotspots(
      &self,
      project_key: &str,
      branch: &str,
      monitor: &ProgressMonitor,
   ) -> Result<()> {
      self.call("hotspots", &format!("{project_key}@{branch}"), monitor).await
   }
}

/// Provider creating a [`FakeEngine`] per connection.
#[derive(Default)]
pub struct FakeEngines {
   pub log:   Arc<CallLog>,
   fail_on:   BTreeSet<String>,
   cancel_on: Option<(String, CancellationToken)>,
   park_on:   BTreeSet<String>,
   missing:   BTreeSet<String>,
   reports:   bool,
}

impl FakeEngines {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_log(log: Arc<CallLog>) -> Self {
      Self { log, ..Self::default() }
   }

   /// Makes the call logged as `call` fail with an engine error.
   pub fn failing_on(mut self, call: &str) -> Self {
      self.fail_on.insert(call.to_string());
      self
   }

   /// Cancels `cancel` when the call logged as `call` runs.
   pub fn cancelling_on(mut self, call: &str, cancel: CancellationToken) -> Self {
      self.cancel_on = Some((call.to_string(), cancel));
      self
   }

   /// Makes the call logged as `call` wait until its operation is cancelled.
   pub fn parking_on(mut self, call: &str) -> Self {
      self.park_on.insert(call.to_string());
      self
   }

   /// Makes every call report its own progress through its monitor.
   pub fn reporting_progress(mut self) -> Self {
      self.reports = true;
      self
   }

   pub fn without_engine_for(mut self, connection_id: &str) -> Self {
      self.missing.insert(connection_id.to_string());
      self
   }
}

impl EngineProvider for FakeEngines {
   fn engine(&self, endpoint: &Endpoint) -> Result<Arc<dyn EngineHandle>> {
      if self.missing.contains(&endpoint.connection_id) {
         return Err(Error::Engine { op: "start", reason: "engine not started".to_string() });
      }
      Ok(Arc::new(FakeEngine {
         connection_id: endpoint.connection_id.clone(),
         log:           Arc::clone(&self.log),
         fail_on:       self.fail_on.clone(),
         cancel_on:     self.cancel_on.clone(),
         park_on:       self.park_on.clone(),
         reports:       self.reports,
      }))
   }
}

/// Scheduler recording the folders it was asked to re-analyze.
#[derive(Default)]
pub struct RecordingScheduler {
   folders: Mutex<Vec<WorkspaceFolder>>,
}

impl RecordingScheduler {
   pub fn folders(&self) -> Vec<String> {
      self.folders.lock().iter().map(|f| f.uri.clone()).collect()
   }
}

impl AnalysisScheduler for RecordingScheduler {
   fn reanalyze_open_files(&self, folder: &WorkspaceFolder) {
      self.folders.lock().push(folder.clone());
   }
}

/// Asserts that `values` never decrease.
pub fn assert_monotonic(values: &[u32]) {
   for pair in values.windows(2) {
      assert!(pair[0] <= pair[1], "percentages went backwards: {values:?}");
   }
}
