//! Hierarchical progress composition over an arena of scopes.
//!
//! A [`ProgressTracker`] owns the scopes of one top-level operation. Each
//! sub-scope occupies a fixed slice of its parent's range, starting at the
//! parent's cursor, so percentages reported to the client never go backwards
//! as long as the fractions requested at each level sum to at most one.

use std::{future::Future, sync::Arc};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{
   ProgressClient, ProgressMonitor, ProgressRegistry, ProgressReport, ProgressToken, SilentClient,
};
use crate::{Error, Result};

const BREADCRUMB_SEPARATOR: &str = " - ";
const COMPLETED: &str = "Completed";
const CANCELED: &str = "Canceled";

/// Absorbs binary float error so that exact boundaries like 70.0 computed as
/// 69.999_999_999_999_99 still floor to 70.
const FLOOR_TOLERANCE: f64 = 1e-9;

/// Handle of a scope inside a [`ProgressTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
   pub const ROOT: Self = Self(0);

   pub const fn is_root(self) -> bool {
      self.0 == 0
   }
}

/// Floors a computed position to the integer percentage shown to the user.
pub fn floor_percentage(value: f64) -> u32 {
   (value + FLOOR_TOLERANCE).floor().clamp(0.0, 100.0) as u32
}

#[derive(Debug)]
struct ScopeNode {
   title:   String,
   parent:  Option<ScopeId>,
   start:   f64,
   end:     f64,
   cursor:  f64,
   message: String,
   ended:   bool,
}

#[derive(Debug)]
struct TrackerState {
   scopes:               Vec<ScopeNode>,
   cancellable:          Option<bool>,
   non_cancelable_depth: usize,
   detached:             bool,
}

impl TrackerState {
   fn node(&self, scope: ScopeId) -> &ScopeNode {
      &self.scopes[scope.0]
   }

   fn node_mut(&mut self, scope: ScopeId) -> &mut ScopeNode {
      &mut self.scopes[scope.0]
   }

   fn breadcrumb(&self, parent: ScopeId, title: &str) -> String {
      let mut titles = vec![title];
      let mut current = Some(parent);
      while let Some(id) = current {
         if id.is_root() {
            break;
         }
         let node = self.node(id);
         titles.push(&node.title);
         current = node.parent;
      }
      titles.reverse();
      titles.join(BREADCRUMB_SEPARATOR)
   }

   fn is_descendant(&self, candidate: ScopeId, ancestor: ScopeId) -> bool {
      let mut current = self.node(candidate).parent;
      while let Some(id) = current {
         if id == ancestor {
            return true;
         }
         current = self.node(id).parent;
      }
      false
   }

   fn end_descendants(&mut self, ancestor: ScopeId) {
      for index in ancestor.0 + 1..self.scopes.len() {
         if self.is_descendant(ScopeId(index), ancestor) {
            self.scopes[index].ended = true;
         }
      }
   }
}

struct Shared {
   client:   Arc<dyn ProgressClient>,
   registry: Option<Arc<ProgressRegistry>>,
   token:    Option<ProgressToken>,
   notify:   bool,
   cancel:   CancellationToken,
   state:    Mutex<TrackerState>,
}

impl Shared {
   fn report(&self, state: &TrackerState, report: ProgressReport) {
      if state.detached || !self.notify {
         return;
      }
      if let Some(token) = &self.token {
         self.client.report_progress(token, report);
      }
   }

   fn end_progress(&self, message: Option<&str>) {
      if self.notify
         && let Some(token) = &self.token
      {
         self.client.end_progress(token, message);
      }
   }

   fn unregister(&self) {
      if let (Some(registry), Some(token)) = (&self.registry, &self.token) {
         registry.unregister(token);
      }
   }
}

/// A tracker dropped before its root ended (the operation's future was
/// dropped, or a body panicked) still closes the client's progress and
/// releases its token.
impl Drop for Shared {
   fn drop(&mut self) {
      if self.state.get_mut().detached {
         return;
      }
      self.state.get_mut().detached = true;
      tracing::debug!("progress tracker dropped before its root ended");
      self.end_progress(Some(CANCELED));
      self.unregister();
   }
}

/// Progress tree of one top-level operation.
///
/// Cloning is cheap and yields another handle on the same tree. Notifications
/// are emitted while the arena is locked, so their order on the client always
/// matches the order of state changes.
#[derive(Clone)]
pub struct ProgressTracker {
   shared: Arc<Shared>,
}

impl ProgressTracker {
   /// Starts a root scope covering `[0, 100]`.
   ///
   /// Without work-done-progress support on the client nothing is ever sent,
   /// but every scope still runs. Without a caller token the tracker asks the
   /// client to create one and degrades to silent mode if that fails.
   pub async fn begin(
      client: Arc<dyn ProgressClient>,
      registry: Arc<ProgressRegistry>,
      title: &str,
      token: Option<ProgressToken>,
      cancel: &CancellationToken,
   ) -> Self {
      let supported = client.supports_work_done_progress();
      let token = match token {
         Some(token) => Some(token),
         None if supported => {
            let token = ProgressToken::generate();
            match client.create_progress_token(&token).await {
               Ok(()) => Some(token),
               Err(e) => {
                  tracing::debug!("progress token creation refused, reporting silently: {e}");
                  None
               },
            }
         },
         None => None,
      };

      let cancel = cancel.child_token();
      let registered = match &token {
         Some(token) => {
            let registered = registry.register(token.clone(), cancel.clone());
            if !registered {
               tracing::warn!("progress token {token} is already in use, reporting silently");
            }
            registered
         },
         None => false,
      };

      // A refused token belongs to another run.
      let notify = supported && registered;
      if notify && let Some(token) = &token {
         client.begin_progress(token, title);
      }

      Self::with_parts(client, registered.then_some(registry), token, notify, cancel, title)
   }

   /// Root scope that never notifies anyone, for background work.
   pub fn hidden(title: &str, cancel: &CancellationToken) -> Self {
      Self::with_parts(Arc::new(SilentClient), None, None, false, cancel.child_token(), title)
   }

   fn with_parts(
      client: Arc<dyn ProgressClient>,
      registry: Option<Arc<ProgressRegistry>>,
      token: Option<ProgressToken>,
      notify: bool,
      cancel: CancellationToken,
      title: &str,
   ) -> Self {
      let root = ScopeNode {
         title:   title.to_string(),
         parent:  None,
         start:   0.0,
         end:     100.0,
         cursor:  0.0,
         message: String::new(),
         ended:   false,
      };
      let state = TrackerState {
         scopes:               vec![root],
         cancellable:          None,
         non_cancelable_depth: 0,
         detached:             false,
      };
      Self {
         shared: Arc::new(Shared {
            client,
            registry,
            token,
            notify,
            cancel,
            state: Mutex::new(state),
         }),
      }
   }

   pub const fn root(&self) -> ScopeId {
      ScopeId::ROOT
   }

   pub fn token(&self) -> Option<&ProgressToken> {
      self.shared.token.as_ref()
   }

   /// Whether notifications reach the client at all.
   pub fn is_visible(&self) -> bool {
      self.shared.notify
   }

   pub fn is_detached(&self) -> bool {
      self.shared.state.lock().detached
   }

   pub fn is_ended(&self, scope: ScopeId) -> bool {
      self.shared.state.lock().node(scope).ended
   }

   /// Range of `scope` within the root, as `(start, end)` percentages.
   pub fn range(&self, scope: ScopeId) -> (f64, f64) {
      let state = self.shared.state.lock();
      let node = state.node(scope);
      (node.start, node.end)
   }

   pub fn cancellation(&self) -> &CancellationToken {
      &self.shared.cancel
   }

   pub fn is_canceled(&self) -> bool {
      self.shared.cancel.is_cancelled()
   }

   pub fn monitor(&self, scope: ScopeId) -> ProgressMonitor {
      ProgressMonitor::new(self.clone(), scope)
   }

   /// Opens a sub-scope taking `fraction` of `parent`'s width, starting at the
   /// parent's cursor. Reports the scope's start with its breadcrumb.
   pub fn begin_sub_scope(&self, parent: ScopeId, title: &str, fraction: f64) -> Result<ScopeId> {
      if fraction.is_nan() || fraction <= 0.0 || fraction > 1.0 {
         return Err(Error::InvalidFraction(fraction));
      }

      let mut state = self.shared.state.lock();
      let parent_node = state.node(parent);
      let start = parent_node.cursor;
      let end = fraction
         .mul_add(parent_node.end - parent_node.start, start)
         .min(parent_node.end);
      let parent_ended = parent_node.ended;
      let message = state.breadcrumb(parent, title);

      let id = ScopeId(state.scopes.len());
      state.scopes.push(ScopeNode {
         title: title.to_string(),
         parent: Some(parent),
         start,
         end,
         cursor: start,
         message: message.clone(),
         ended: parent_ended,
      });

      if !parent_ended {
         self
            .shared
            .report(&state, ProgressReport::at(floor_percentage(start), message));
      }
      Ok(id)
   }

   /// Closes `scope` after its body returned: reports `<breadcrumb> -
   /// Completed` unless the body ended it, then moves the parent's cursor past
   /// it.
   pub fn complete(&self, scope: ScopeId) {
      let mut state = self.shared.state.lock();
      self.end_locked(&mut state, scope, Some(COMPLETED));
      if let Some(parent) = state.node(scope).parent {
         let end = state.node(scope).end;
         let parent_node = state.node_mut(parent);
         parent_node.cursor = parent_node.cursor.max(end);
      }
   }

   /// Ends `scope`. The first call wins; later calls are no-ops.
   ///
   /// A sub-scope reports its end position with `message` appended to its
   /// breadcrumb. Ending the root sends the final notification and detaches
   /// the tracker.
   pub fn end(&self, scope: ScopeId, message: Option<&str>) {
      let mut state = self.shared.state.lock();
      self.end_locked(&mut state, scope, message);
   }

   fn end_locked(&self, state: &mut TrackerState, scope: ScopeId, message: Option<&str>) {
      if state.node(scope).ended {
         return;
      }

      if scope.is_root() {
         for node in &mut state.scopes {
            node.ended = true;
         }
         if !state.detached {
            self.shared.end_progress(message);
            state.detached = true;
            self.shared.unregister();
         }
         return;
      }

      let node = state.node(scope);
      let text = match message {
         Some(message) => format!("{}{BREADCRUMB_SEPARATOR}{message}", node.message),
         None => node.message.clone(),
      };
      let report = ProgressReport::at(floor_percentage(node.end), text);
      let end = node.end;

      state.node_mut(scope).ended = true;
      state.end_descendants(scope);
      self.shared.report(state, report);

      if let Some(parent) = state.node(scope).parent {
         let parent_node = state.node_mut(parent);
         parent_node.cursor = parent_node.cursor.max(end);
      }
   }

   /// Ends every scope because of `error`; the root's final notification
   /// carries the error message.
   pub fn fail(&self, error: &Error) {
      let message = if error.is_canceled() { CANCELED.to_string() } else { error.to_string() };
      self.end(ScopeId::ROOT, Some(&message));
   }

   /// Ends the root according to the outcome of the whole operation and
   /// hands the outcome back.
   pub fn finish<T>(&self, result: Result<T>) -> Result<T> {
      match &result {
         Ok(_) => self.end(ScopeId::ROOT, None),
         Err(e) => self.fail(e),
      }
      result
   }

   /// Reports progress at `fraction` of `scope`'s own range.
   ///
   /// The position never moves back behind what the scope already reported
   /// or what its finished children covered, and later children start after
   /// it.
   pub fn set_fraction(&self, scope: ScopeId, fraction: f64) {
      let mut state = self.shared.state.lock();
      let node = state.node_mut(scope);
      if node.ended {
         return;
      }
      let position = fraction
         .clamp(0.0, 1.0)
         .mul_add(node.end - node.start, node.start)
         .max(node.cursor);
      node.cursor = position;
      let report = ProgressReport::at(floor_percentage(position), node.message.clone());
      self.shared.report(&state, report);
   }

   /// Fails with [`Error::Canceled`] once the caller or the client requested
   /// cancellation. The root then ends with "Canceled".
   pub fn check_canceled(&self) -> Result<()> {
      if self.is_canceled() {
         self.end(ScopeId::ROOT, Some(CANCELED));
         return Err(Error::Canceled);
      }
      Ok(())
   }

   /// Runs a synchronous `body` inside a sub-scope.
   pub fn with_sub_scope<T>(
      &self,
      parent: ScopeId,
      title: &str,
      fraction: f64,
      body: impl FnOnce(ScopeId) -> Result<T>,
   ) -> Result<T> {
      let scope = self
         .begin_sub_scope(parent, title, fraction)
         .inspect_err(|e| self.fail(e))?;
      let result = body(scope);
      self.close(scope, result)
   }

   /// Runs an asynchronous `body` inside a sub-scope.
   pub async fn with_sub_scope_async<T, F, Fut>(
      &self,
      parent: ScopeId,
      title: &str,
      fraction: f64,
      body: F,
   ) -> Result<T>
   where
      F: FnOnce(ScopeId) -> Fut,
      Fut: Future<Output = Result<T>>,
   {
      let scope = self
         .begin_sub_scope(parent, title, fraction)
         .inspect_err(|e| self.fail(e))?;
      let result = body(scope).await;
      self.close(scope, result)
   }

   fn close<T>(&self, scope: ScopeId, result: Result<T>) -> Result<T> {
      match &result {
         Ok(_) => self.complete(scope),
         Err(e) => self.fail(e),
      }
      result
   }

   /// Runs `body` with cancellation reported as unavailable to the client.
   pub fn non_cancelable<T>(&self, body: impl FnOnce() -> T) -> T {
      let _guard = self.enter_non_cancelable();
      body()
   }

   pub async fn non_cancelable_async<T>(&self, body: impl Future<Output = T>) -> T {
      let _guard = self.enter_non_cancelable();
      body.await
   }

   fn enter_non_cancelable(&self) -> NonCancelableGuard<'_> {
      let mut state = self.shared.state.lock();
      state.non_cancelable_depth += 1;
      if state.non_cancelable_depth == 1 {
         self.set_cancellable(&mut state, false);
      }
      NonCancelableGuard { tracker: self }
   }

   fn exit_non_cancelable(&self) {
      let mut state = self.shared.state.lock();
      state.non_cancelable_depth = state.non_cancelable_depth.saturating_sub(1);
      if state.non_cancelable_depth == 0 {
         self.set_cancellable(&mut state, true);
      }
   }

   fn set_cancellable(&self, state: &mut TrackerState, cancellable: bool) {
      if state.cancellable == Some(cancellable) {
         return;
      }
      state.cancellable = Some(cancellable);
      self
         .shared
         .report(state, ProgressReport::cancellable(cancellable));
   }
}

struct NonCancelableGuard<'a> {
   tracker: &'a ProgressTracker,
}

impl Drop for NonCancelableGuard<'_> {
   fn drop(&mut self) {
      self.tracker.exit_non_cancelable();
   }
}
