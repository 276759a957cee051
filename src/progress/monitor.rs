use tokio_util::sync::CancellationToken;

use super::{ProgressTracker, ScopeId};
use crate::Result;

/// Cancellation and progress context handed to long-running engine calls.
///
/// Engines poll [`ProgressMonitor::is_canceled`] or await
/// [`ProgressMonitor::cancelled`], and may report progress inside the scope
/// they were given.
#[derive(Clone)]
pub struct ProgressMonitor {
   tracker: ProgressTracker,
   scope:   ScopeId,
}

impl ProgressMonitor {
   pub(crate) const fn new(tracker: ProgressTracker, scope: ScopeId) -> Self {
      Self { tracker, scope }
   }

   /// Monitor that reports nowhere and is cancelled through `cancel` only.
   pub fn detached(cancel: &CancellationToken) -> Self {
      Self::new(ProgressTracker::hidden("detached", cancel), ScopeId::ROOT)
   }

   pub const fn scope(&self) -> ScopeId {
      self.scope
   }

   pub fn is_canceled(&self) -> bool {
      self.tracker.is_canceled()
   }

   pub fn check_canceled(&self) -> Result<()> {
      self.tracker.check_canceled()
   }

   pub fn cancellation(&self) -> &CancellationToken {
      self.tracker.cancellation()
   }

   /// Resolves once the operation owning this monitor is cancelled.
   pub async fn cancelled(&self) {
      self.tracker.cancellation().cancelled().await;
   }

   pub fn set_fraction(&self, fraction: f64) {
      self.tracker.set_fraction(self.scope, fraction);
   }
}
