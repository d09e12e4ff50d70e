#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, FlowbedError, LaunchError, PollError, ProvisionError};

// 설정
pub use config::FlowbedConfig;

// 도메인 타입
pub use types::{BackingState, Endpoint, JobState, Phase};
