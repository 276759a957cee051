//! Composable progress reporting with cooperative cancellation.

pub mod client;
pub mod monitor;
pub mod registry;
pub mod tracker;

pub use client::{MessageSeverity, ProgressClient, ProgressReport, ProgressToken, SilentClient};
pub use monitor::ProgressMonitor;
pub use registry::ProgressRegistry;
pub use tracker::{ProgressTracker, ScopeId, floor_percentage};
