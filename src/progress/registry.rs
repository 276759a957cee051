//! Registry of in-flight progress operations, keyed by token.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::ProgressToken;

/// Maps active progress tokens to the cancellation of their operation so a
/// client cancel request can be routed to the right tracker.
#[derive(Default)]
pub struct ProgressRegistry {
   inner: Mutex<HashMap<ProgressToken, CancellationToken>>,
}

impl ProgressRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Registers `token`. Returns `false` if an operation with the same token
   /// is already in flight; the existing entry is kept.
   pub fn register(&self, token: ProgressToken, cancel: CancellationToken) -> bool {
      let mut active = self.inner.lock();
      if active.contains_key(&token) {
         return false;
      }
      active.insert(token, cancel);
      true
   }

   pub fn unregister(&self, token: &ProgressToken) {
      self.inner.lock().remove(token);
   }

   /// Requests cancellation of the operation owning `token`. Returns whether a
   /// matching operation was found.
   pub fn cancel(&self, token: &ProgressToken) -> bool {
      let active = self.inner.lock();
      match active.get(token) {
         Some(cancel) => {
            cancel.cancel();
            true
         },
         None => {
            tracing::debug!("cancel request for unknown progress token {token}");
            false
         },
      }
   }

   pub fn is_active(&self, token: &ProgressToken) -> bool {
      self.inner.lock().contains_key(token)
   }

   pub fn len(&self) -> usize {
      self.inner.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.inner.lock().is_empty()
   }

   /// Cancels every registered operation and forgets them. Returns how many
   /// were cancelled.
   pub fn cancel_all(&self) -> usize {
      let drained: Vec<_> = self.inner.lock().drain().collect();
      for (token, cancel) in &drained {
         tracing::debug!("cancelling progress {token}");
         cancel.cancel();
      }
      drained.len()
   }
}
