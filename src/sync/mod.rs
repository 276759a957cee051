//! Synchronization of bound remote projects.

pub mod engine;
pub mod orchestrator;
pub mod outcome;
pub mod targets;

pub use engine::{AnalysisScheduler, EngineHandle, EngineProvider};
pub use orchestrator::SyncOrchestrator;
pub use outcome::{SyncOutcome, SyncPhase};
pub use targets::{
   ConnectionTargets, Endpoint, ProjectBranches, SyncTarget, SyncTargetRegistry, WorkspaceFolder,
   group_by_connection,
};
