//! 리소스 매니저 에러 타입
//!
//! [`ResourceError`]는 리소스 프로비저닝/조회/정리 중 발생하는 모든 에러를 표현합니다.
//! `From<ResourceError> for FlowbedError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::fmt;

use flowbed_core::error::{ConfigError, FlowbedError, ProvisionError};
use flowbed_core::types::BackingState;

/// 정리 실패 1건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// 정리에 실패한 리소스 레이블
    pub resource: String,
    /// 실패 사유
    pub reason: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.reason)
    }
}

/// 리소스 매니저 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// 빌더 입력 오류, 필수 필드 누락
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 백엔드가 Running 상태가 아닐 때 엔드포인트에 접근함
    #[error("resource '{namespace}' is not ready (state: {state})")]
    NotReady {
        /// 대상 네임스페이스
        namespace: String,
        /// 현재 백엔드 상태
        state: BackingState,
    },

    /// 같은 이름의 하위 리소스가 이미 존재함
    #[error("resource '{name}' already exists in '{namespace}'")]
    AlreadyExists {
        /// 대상 네임스페이스
        namespace: String,
        /// 중복된 리소스 이름
        name: String,
    },

    /// 하위 리소스를 찾을 수 없음
    #[error("resource '{name}' not found in '{namespace}'")]
    NotFound {
        /// 대상 네임스페이스
        namespace: String,
        /// 리소스 이름
        name: String,
    },

    /// 백엔드 특화가 지원하지 않는 작업
    #[error("operation '{operation}' is not supported by the {backend} backend")]
    Unsupported {
        /// 백엔드 이름
        backend: String,
        /// 요청된 작업
        operation: String,
    },

    /// 백엔드 기동 실패
    #[error("provisioning '{namespace}' failed: {reason}")]
    Startup {
        /// 대상 네임스페이스
        namespace: String,
        /// 실패 사유
        reason: String,
    },

    /// 컨테이너 런타임 API 호출 실패
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// 컨테이너 런타임 연결 실패
    #[error("container runtime connection error: {0}")]
    RuntimeConnection(String),

    /// 백엔드 RPC 실패
    #[error("backend {operation} failed: {reason}")]
    Backend {
        /// 실패한 작업 (query, create_topic 등)
        operation: String,
        /// 실패 사유
        reason: String,
    },

    /// 단일 매니저의 정리 실패
    #[error("cleanup of '{namespace}' failed: {reason}")]
    Cleanup {
        /// 대상 네임스페이스
        namespace: String,
        /// 실패 사유
        reason: String,
    },

    /// 여러 매니저의 정리 실패 집계
    #[error("cleanup failed for {} resource(s): {}", .failures.len(), join_failures(.failures))]
    CleanupFailed {
        /// 실패 목록 (정리 시도 순서)
        failures: Vec<CleanupFailure>,
    },
}

fn join_failures(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ResourceError {
    /// 백엔드 RPC 에러를 생성합니다.
    pub fn backend(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// 설정 에러를 생성합니다.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ResourceError> for FlowbedError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Config { field, reason } => {
                FlowbedError::Config(ConfigError::InvalidValue { field, reason })
            }
            ResourceError::NotReady { namespace, state } => {
                FlowbedError::Provision(ProvisionError::NotReady {
                    resource: namespace,
                    state: state.to_string(),
                })
            }
            ResourceError::AlreadyExists { namespace, name } => {
                FlowbedError::Provision(ProvisionError::AlreadyExists {
                    resource: namespace,
                    name,
                })
            }
            ResourceError::NotFound { namespace, name } => {
                FlowbedError::Provision(ProvisionError::NotFound {
                    resource: namespace,
                    name,
                })
            }
            ResourceError::Startup { namespace, reason } => {
                FlowbedError::Provision(ProvisionError::Failed {
                    resource: namespace,
                    reason,
                })
            }
            err @ (ResourceError::Unsupported { .. }
            | ResourceError::Runtime(_)
            | ResourceError::RuntimeConnection(_)
            | ResourceError::Backend { .. }) => FlowbedError::Provision(ProvisionError::Failed {
                resource: "backend".to_owned(),
                reason: err.to_string(),
            }),
            err @ (ResourceError::Cleanup { .. } | ResourceError::CleanupFailed { .. }) => {
                FlowbedError::Cleanup(err.to_string())
            }
        }
    }
}
