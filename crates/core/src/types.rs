//! 도메인 타입 — 리소스 매니저와 파이프라인 오퍼레이터가 공유하는 타입
//!
//! 모든 크레이트가 공유하는 상태 열거형과 엔드포인트 구조를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 백엔드 프로세스의 네트워크 엔드포인트
///
/// 컨테이너가 기동된 뒤 동적으로 할당된 호스트 포트를 담습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// 호스트명 또는 IP
    pub host: String,
    /// 매핑된 포트
    pub port: u16,
}

impl Endpoint {
    /// 새 엔드포인트를 생성합니다.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 백엔드 프로세스 생명주기 상태
///
/// 상태 전환:
/// - `Uninitialized` → 첫 접근 → `Starting` → `Running`
/// - `Starting` → 기동 실패 → `Failed`
/// - `Running` / `Failed` → `cleanup()` → `Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingState {
    /// 아직 기동하지 않음
    Uninitialized,
    /// 기동 중
    Starting,
    /// 실행 중 (엔드포인트 조회 가능)
    Running,
    /// 정리 완료
    Stopped,
    /// 기동 또는 정리 실패
    Failed,
}

impl fmt::Display for BackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 파이프라인 잡 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// 제출됨, 아직 실행 전
    Pending,
    /// 실행 중
    Running,
    /// 정상 종료
    Succeeded,
    /// 실패
    Failed,
    /// 취소됨
    Cancelled,
    /// 백엔드가 알 수 없는 상태를 보고함
    Unknown,
}

impl JobState {
    /// 더 이상 상태가 바뀌지 않는 종료 상태인지 여부
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// 테스트 단계 — 에러가 어느 단계에서 발생했는지 식별합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// 설정 로딩/검증
    Configure,
    /// 리소스 프로비저닝
    Provision,
    /// 잡 실행
    Launch,
    /// 조건 폴링
    Poll,
    /// 리소스 정리
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure => write!(f, "configure"),
            Self::Provision => write!(f, "provision"),
            Self::Launch => write!(f, "launch"),
            Self::Poll => write!(f, "poll"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        let ep = Endpoint::new("localhost", 49153);
        assert_eq!(ep.to_string(), "localhost:49153");
    }

    #[test]
    fn backing_state_display() {
        assert_eq!(BackingState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(BackingState::Starting.to_string(), "starting");
        assert_eq!(BackingState::Running.to_string(), "running");
        assert_eq!(BackingState::Stopped.to_string(), "stopped");
        assert_eq!(BackingState::Failed.to_string(), "failed");
    }

    #[test]
    fn job_state_terminal() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }

    #[test]
    fn job_state_serialize_deserialize() {
        let json = serde_json::to_string(&JobState::Cancelled).unwrap();
        let parsed: JobState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobState::Cancelled);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Provision.to_string(), "provision");
        assert_eq!(Phase::Cleanup.to_string(), "cleanup");
    }
}
