//! 리소스 핸들 — 테스트 실행 하나의 리소스 그룹 상태
//!
//! 백엔드 상태, 엔드포인트, 컨테이너 ID 는 하나의 락 아래 함께 갱신되므로
//! 절반만 초기화된 상태는 관측되지 않습니다. 락은 `.await` 를 넘겨 보유하지 않습니다.

use std::sync::{Mutex, MutexGuard, PoisonError};

use flowbed_core::types::{BackingState, Endpoint};
use serde::{Deserialize, Serialize};

use crate::error::ResourceError;
use crate::specialization::ResourceKind;

/// 생성된 하위 리소스 참조
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// 호출자가 지정한 이름
    pub name: String,
    /// 백엔드가 인식하는 전체 이름
    pub qualified_name: String,
    /// 리소스 종류
    pub kind: ResourceKind,
}

#[derive(Debug)]
struct HandleState {
    backing: BackingState,
    endpoint: Option<Endpoint>,
    container_id: Option<String>,
}

/// 리소스 핸들
#[derive(Debug)]
pub struct ResourceHandle {
    test_id: String,
    namespace: String,
    state: Mutex<HandleState>,
}

impl ResourceHandle {
    /// `Uninitialized` 상태의 핸들을 생성합니다.
    pub fn new(test_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            namespace: namespace.into(),
            state: Mutex::new(HandleState {
                backing: BackingState::Uninitialized,
                endpoint: None,
                container_id: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 테스트 식별자
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// 네임스페이스
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 현재 백엔드 상태
    pub fn backing_state(&self) -> BackingState {
        self.lock().backing
    }

    /// 엔드포인트를 반환합니다.
    ///
    /// `Running` 이 아니면 `NotReady` 를 반환합니다.
    pub fn endpoint(&self) -> Result<Endpoint, ResourceError> {
        let state = self.lock();
        match (&state.backing, &state.endpoint) {
            (BackingState::Running, Some(endpoint)) => Ok(endpoint.clone()),
            (backing, _) => Err(ResourceError::NotReady {
                namespace: self.namespace.clone(),
                state: *backing,
            }),
        }
    }

    /// 컨테이너 ID (엔드포인트 재정의로 기동한 경우 없음)
    pub fn container_id(&self) -> Option<String> {
        self.lock().container_id.clone()
    }

    pub(crate) fn mark_starting(&self) {
        self.lock().backing = BackingState::Starting;
    }

    pub(crate) fn set_container(&self, container_id: String) {
        self.lock().container_id = Some(container_id);
    }

    pub(crate) fn mark_running(&self, endpoint: Endpoint) {
        let mut state = self.lock();
        state.endpoint = Some(endpoint);
        state.backing = BackingState::Running;
    }

    pub(crate) fn mark_failed(&self) {
        let mut state = self.lock();
        state.endpoint = None;
        state.backing = BackingState::Failed;
    }

    pub(crate) fn mark_stopped(&self) {
        let mut state = self.lock();
        state.endpoint = None;
        state.container_id = None;
        state.backing = BackingState::Stopped;
    }
}
