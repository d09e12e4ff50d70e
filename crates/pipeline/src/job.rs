//! 잡 서비스 경계
//!
//! [`JobService`]는 템플릿 기반 잡 러너(관리형 데이터 처리 서비스, 로컬 러너 등)에 대한
//! 최소한의 인터페이스입니다. 실행기는 `submit`만, 오퍼레이터는 `status`와 `cancel`만 사용합니다.

use std::future::Future;

use serde::{Deserialize, Serialize};

use flowbed_core::types::JobState;

use crate::error::PipelineError;
use crate::launcher::LaunchConfig;

/// 잡 서비스가 제출을 수락한 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    /// 서비스가 부여한 잡 ID
    pub job_id: String,
    /// 제출 직후 상태
    pub state: JobState,
}

/// 잡 러너 추상화 트레이트
///
/// 실제 서비스 클라이언트와 테스트용 mock 이 이 트레이트를 구현합니다.
pub trait JobService: Send + Sync + 'static {
    /// 잡을 제출합니다. 거부되면 [`PipelineError::Rejected`]를 반환합니다.
    fn submit(
        &self,
        config: &LaunchConfig,
    ) -> impl Future<Output = Result<SubmittedJob, PipelineError>> + Send;

    /// 잡의 현재 상태를 조회합니다.
    fn status(&self, job_id: &str)
    -> impl Future<Output = Result<JobState, PipelineError>> + Send;

    /// 잡을 취소합니다.
    fn cancel(&self, job_id: &str) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// 테스트용 Mock 잡 서비스
///
/// `status`는 스크립트된 응답을 순서대로 돌려주며, 마지막 응답은 계속 반복됩니다.
/// 스크립트가 비어 있으면 `Running`을 돌려줍니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockJobService {
    /// status 응답 스크립트 (`Err`은 조회 실패 사유)
    pub script: std::sync::Mutex<std::collections::VecDeque<Result<JobState, String>>>,
    /// submit 거부 사유
    pub reject: Option<String>,
    /// cancel 실패 여부
    pub fail_cancel: bool,
    /// 제출된 잡 이름
    pub submitted: std::sync::Mutex<Vec<String>>,
    /// 취소 요청된 잡 ID
    pub cancelled: std::sync::Mutex<Vec<String>>,
    /// status 호출 횟수
    pub status_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockJobService {
    /// 기본 설정으로 mock 서비스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// status 응답 스크립트를 설정합니다.
    pub fn with_states(self, states: impl IntoIterator<Item = JobState>) -> Self {
        *self.script.lock().unwrap() = states.into_iter().map(Ok).collect();
        self
    }

    /// status 조회 실패를 스크립트 끝에 추가합니다.
    pub fn then_status_error(self, reason: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(reason.to_owned()));
        self
    }

    /// status 응답을 스크립트 끝에 추가합니다.
    pub fn then_state(self, state: JobState) -> Self {
        self.script.lock().unwrap().push_back(Ok(state));
        self
    }

    /// submit 이 거부되도록 설정합니다.
    pub fn with_rejection(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_owned());
        self
    }

    /// cancel 이 실패하도록 설정합니다.
    pub fn with_failing_cancel(mut self) -> Self {
        self.fail_cancel = true;
        self
    }

    /// 취소 요청된 잡 ID 목록
    pub fn cancelled_jobs(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    /// status 호출 횟수
    pub fn status_count(&self) -> usize {
        self.status_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl JobService for MockJobService {
    async fn submit(&self, config: &LaunchConfig) -> Result<SubmittedJob, PipelineError> {
        if let Some(reason) = &self.reject {
            return Err(PipelineError::rejected(config.job_name(), reason));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(config.job_name().to_owned());
        Ok(SubmittedJob {
            job_id: format!("{}-{:04}", config.job_name(), submitted.len()),
            state: JobState::Pending,
        })
    }

    async fn status(&self, job_id: &str) -> Result<JobState, PipelineError> {
        self.status_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            None => Ok(JobState::Running),
            Some(Ok(state)) => Ok(state),
            Some(Err(reason)) => Err(PipelineError::status(job_id, reason)),
        }
    }

    async fn cancel(&self, job_id: &str) -> Result<(), PipelineError> {
        if self.fail_cancel {
            return Err(PipelineError::cancel(job_id, "mock cancel failure"));
        }
        self.cancelled.lock().unwrap().push(job_id.to_owned());
        Ok(())
    }
}
