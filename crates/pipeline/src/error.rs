//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 잡 실행과 폴링 중 발생하는 에러를 표현합니다.
//! 폴링 중 상태 조회 실패는 일시적인 에러로 취급되어 오퍼레이터 내부에서 흡수되며,
//! 호출자에게 전달되는 것은 설정 오류, 실행 거부, 조건 평가 실패입니다.

use std::fmt;

use flowbed_core::error::{ConfigError, FlowbedError, LaunchError, PollError};

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 실행/폴링 설정 오류
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 템플릿이 요구하는 파라미터 누락
    #[error("job '{job}' is missing required parameter '{parameter}'")]
    MissingParameter {
        /// 잡 이름
        job: String,
        /// 누락된 파라미터명
        parameter: String,
    },

    /// 잡 서비스가 실행 요청을 거부함
    #[error("launch of job '{job}' was rejected: {reason}")]
    Rejected {
        /// 잡 이름
        job: String,
        /// 거부 사유
        reason: String,
    },

    /// 잡 상태 조회 실패
    #[error("status lookup for job '{job}' failed: {reason}")]
    Status {
        /// 잡 ID
        job: String,
        /// 실패 사유
        reason: String,
    },

    /// 조건 평가 실패
    #[error("condition check for job '{job}' failed: {reason}")]
    Predicate {
        /// 잡 ID
        job: String,
        /// 실패 사유
        reason: String,
    },

    /// 잡 취소 실패
    #[error("failed to cancel job '{job}': {reason}")]
    Cancel {
        /// 잡 ID
        job: String,
        /// 실패 사유
        reason: String,
    },
}

impl PipelineError {
    /// 설정 에러를 생성합니다.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 실행 거부 에러를 생성합니다.
    pub fn rejected(job: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Rejected {
            job: job.into(),
            reason: reason.to_string(),
        }
    }

    /// 상태 조회 에러를 생성합니다.
    pub fn status(job: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Status {
            job: job.into(),
            reason: reason.to_string(),
        }
    }

    /// 취소 에러를 생성합니다.
    pub fn cancel(job: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Cancel {
            job: job.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<PipelineError> for FlowbedError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Config { field, reason } => {
                FlowbedError::Config(ConfigError::InvalidValue { field, reason })
            }
            PipelineError::MissingParameter { job, parameter } => {
                FlowbedError::Launch(LaunchError::MissingParameter { job, parameter })
            }
            PipelineError::Rejected { job, reason } => {
                FlowbedError::Launch(LaunchError::Rejected { job, reason })
            }
            PipelineError::Status { job, reason } => {
                FlowbedError::Poll(PollError::Status { job, reason })
            }
            PipelineError::Predicate { job, reason } => {
                FlowbedError::Poll(PollError::Predicate { job, reason })
            }
            PipelineError::Cancel { job, reason } => {
                FlowbedError::Poll(PollError::Cancel { job, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowbed_core::types::Phase;

    #[test]
    fn missing_parameter_display() {
        let err = PipelineError::MissingParameter {
            job: "pubsub-to-pubsub".to_owned(),
            parameter: "inputSubscription".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pubsub-to-pubsub"));
        assert!(msg.contains("inputSubscription"));
    }

    #[test]
    fn launch_errors_map_to_launch_phase() {
        let err: FlowbedError = PipelineError::rejected("wordcount", "quota exceeded").into();
        assert_eq!(err.phase(), Phase::Launch);
        assert!(err.to_string().contains("quota exceeded"));

        let err: FlowbedError = PipelineError::MissingParameter {
            job: "wordcount".to_owned(),
            parameter: "output".to_owned(),
        }
        .into();
        assert_eq!(err.phase(), Phase::Launch);
    }

    #[test]
    fn poll_errors_map_to_poll_phase() {
        for err in [
            PipelineError::status("job-1", "unavailable"),
            PipelineError::Predicate {
                job: "job-1".to_owned(),
                reason: "pull failed".to_owned(),
            },
            PipelineError::cancel("job-1", "already done"),
        ] {
            let err: FlowbedError = err.into();
            assert_eq!(err.phase(), Phase::Poll);
            assert!(err.to_string().contains("job-1"));
        }
    }

    #[test]
    fn config_error_maps_to_config() {
        let err: FlowbedError = PipelineError::config("poll_interval", "must be > 0").into();
        assert!(matches!(err, FlowbedError::Config(_)));
    }
}
