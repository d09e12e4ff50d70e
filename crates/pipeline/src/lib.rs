#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`PipelineError`)
//! - [`job`]: Job runner boundary (`JobService` trait, `SubmittedJob`)
//! - [`launcher`]: Job launching (`LaunchConfig`, `TemplateMetadata`, `PipelineLauncher`, `LaunchInfo`)
//! - [`operator`]: Condition polling (`PollConfig`, `PipelineOperator`, `PollResult`, `PollOutcome`)
//!
//! # Architecture
//!
//! ```text
//! test ──launch(config)──> PipelineLauncher ──submit──> JobService
//!                                                          ^
//! test ──wait_for_condition_and_finish──> PipelineOperator ─┘ status / cancel
//!            |
//!            └── predicate (pulls from resources, accumulates state)
//! ```

pub mod error;
pub mod job;
pub mod launcher;
pub mod operator;

// --- Public API Re-exports ---

// Error
pub use error::PipelineError;

// Job service
pub use job::{JobService, SubmittedJob};

// Launcher
pub use launcher::{
    LaunchConfig, LaunchConfigBuilder, LaunchInfo, PipelineLauncher, TemplateMetadata,
    TemplateParameter,
};

// Operator
pub use operator::{PipelineOperator, PollConfig, PollConfigBuilder, PollOutcome, PollResult};
