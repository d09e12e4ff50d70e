//! 에러 타입 — 단계(phase)별 에러 정의
//!
//! 각 크레이트는 자체 도메인 에러(`ResourceError`, `PipelineError`)를 가지며,
//! `From` 변환을 통해 [`FlowbedError`]로 전파됩니다.
//! 모든 에러 메시지는 대상 리소스 또는 잡과 실패한 단계를 포함합니다.

use crate::types::Phase;

/// flowbed 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FlowbedError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 리소스 프로비저닝 에러
    #[error("provision error: {0}")]
    Provision(#[from] ProvisionError),

    /// 잡 실행 에러
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    /// 폴링 에러
    #[error("poll error: {0}")]
    Poll(#[from] PollError),

    /// 정리(cleanup) 에러
    #[error("cleanup error: {0}")]
    Cleanup(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowbedError {
    /// 에러가 발생한 단계를 반환합니다.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Config(_) | Self::Io(_) => Phase::Configure,
            Self::Provision(_) => Phase::Provision,
            Self::Launch(_) => Phase::Launch,
            Self::Poll(_) => Phase::Poll,
            Self::Cleanup(_) => Phase::Cleanup,
        }
    }

    /// 재시도 없이 테스트를 중단해야 하는 에러인지 여부
    ///
    /// 정리 에러와 이미 존재하는 리소스 에러만 복구 가능합니다.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Cleanup(_) | Self::Provision(ProvisionError::AlreadyExists { .. })
        )
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 리소스 프로비저닝 에러
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// 백엔드가 아직 실행 중이 아님
    #[error("resource '{resource}' is not ready (state: {state})")]
    NotReady { resource: String, state: String },

    /// 같은 이름의 리소스가 이미 존재함
    #[error("resource '{name}' already exists in '{resource}'")]
    AlreadyExists { resource: String, name: String },

    /// 리소스를 찾을 수 없음
    #[error("resource '{name}' not found in '{resource}'")]
    NotFound { resource: String, name: String },

    /// 백엔드 기동 또는 호출 실패
    #[error("provisioning '{resource}' failed: {reason}")]
    Failed { resource: String, reason: String },
}

/// 잡 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// 필수 파라미터 누락
    #[error("job '{job}' is missing required parameter '{parameter}'")]
    MissingParameter { job: String, parameter: String },

    /// 백엔드가 잡을 거부함
    #[error("job '{job}' was rejected: {reason}")]
    Rejected { job: String, reason: String },
}

/// 폴링 에러
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// 조건 함수 실행 실패
    #[error("condition check for job '{job}' failed: {reason}")]
    Predicate { job: String, reason: String },

    /// 잡 상태 조회 실패
    #[error("status lookup for job '{job}' failed: {reason}")]
    Status { job: String, reason: String },

    /// 잡 취소 실패
    #[error("failed to cancel job '{job}': {reason}")]
    Cancel { job: String, reason: String },
}
