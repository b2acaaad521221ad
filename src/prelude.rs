//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use unpackr::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, UnpackrError};

// Classification
pub use crate::classify::{FolderClass, FolderInventory, scan_and_classify};

// Pipeline
pub use crate::pipeline::{FolderDisposition, FolderReport, PipelineEnv, process_folder};
pub use crate::pipeline::state::PipelinePhase;

// Safety
pub use crate::safety::{
    EnforceMode, FileOperation, InvariantId, OpOutcome, OperationKind, ReasonCode, SafetyEnforcer,
};

// Orchestration
pub use crate::orchestrator::{RunOptions, RunSummary, run};
pub use crate::orchestrator::stats::{RunStats, StatsSnapshot};
pub use crate::runner::cancel::CancelToken;

// Tools
pub use crate::tools::{ArchiveTool, MediaTool, ParityTool, ToolKit};
