//! 조건 폴링 오퍼레이터
//!
//! [`PipelineOperator`]는 실행 중인 잡을 주기적으로 확인하면서 호출자의 조건을 평가합니다.
//! 루프는 호출한 태스크에서 실행되며 다음 중 하나가 먼저 일어나면 끝납니다.
//!
//! - 잡이 `Failed` 상태 → [`PollResult::LaunchFailed`]
//! - 잡이 `Cancelled` 상태 → [`PollResult::Cancelled`]
//! - 조건이 `true` → [`PollResult::ConditionMet`]
//! - `max_wait` 경과 → [`PollResult::Timeout`]
//!
//! 잡 상태는 매 틱마다 조건보다 먼저 확인됩니다. 상태 조회 실패는 일시적인 에러로 보고
//! 로그와 메트릭만 남긴 채 루프를 계속합니다. 조건 평가 실패는 대기를 중단하고
//! [`PipelineError::Predicate`]를 반환합니다.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use flowbed_core::config::OperatorConfig;
use flowbed_core::metrics as m;
use flowbed_core::types::JobState;

use crate::error::PipelineError;
use crate::job::JobService;

/// 폴링 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    job_id: String,
    max_wait: Duration,
    poll_interval: Duration,
}

impl PollConfig {
    /// 기본 대기 시간과 주기로 빌더를 생성합니다.
    pub fn for_job(job_id: impl Into<String>) -> PollConfigBuilder {
        Self::from_core(job_id, &OperatorConfig::default())
    }

    /// `[operator]` 설정 섹션의 값으로 빌더를 생성합니다.
    pub fn from_core(job_id: impl Into<String>, core: &OperatorConfig) -> PollConfigBuilder {
        PollConfigBuilder {
            job_id: job_id.into(),
            max_wait: core.max_wait(),
            poll_interval: core.poll_interval(),
        }
    }

    /// 대상 잡 ID
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// 최대 대기 시간
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// 폴링 주기
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// [`PollConfig`] 빌더
#[derive(Debug, Clone)]
pub struct PollConfigBuilder {
    job_id: String,
    max_wait: Duration,
    poll_interval: Duration,
}

impl PollConfigBuilder {
    /// 최대 대기 시간을 설정합니다.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// 폴링 주기를 설정합니다.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// 설정을 검증하고 [`PollConfig`]를 생성합니다.
    pub fn build(self) -> Result<PollConfig, PipelineError> {
        if self.job_id.trim().is_empty() {
            return Err(PipelineError::config("job_id", "must not be empty"));
        }
        if self.max_wait.is_zero() {
            return Err(PipelineError::config("max_wait", "must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(PipelineError::config(
                "poll_interval",
                "must be greater than 0",
            ));
        }

        Ok(PollConfig {
            job_id: self.job_id,
            max_wait: self.max_wait,
            poll_interval: self.poll_interval,
        })
    }
}

/// 폴링 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollResult {
    /// 조건이 충족됨
    ConditionMet,
    /// 잡이 실패함
    LaunchFailed,
    /// 최대 대기 시간 초과
    Timeout,
    /// 잡이 취소됨
    Cancelled,
    /// 잡이 정상 종료됨 (`wait_until_done` 전용)
    LaunchFinished,
}

impl PollResult {
    /// 메트릭 레이블 값
    pub fn as_label(self) -> &'static str {
        match self {
            Self::ConditionMet => "condition_met",
            Self::LaunchFailed => "launch_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::LaunchFinished => "launch_finished",
        }
    }
}

impl fmt::Display for PollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// 폴링 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    /// 종료 사유
    pub result: PollResult,
    /// 마지막으로 관찰한 잡 상태 (한 번도 조회에 성공하지 못했으면 `None`)
    pub last_status: Option<JobState>,
    /// 실행된 틱 수
    pub ticks: u32,
    /// 루프 시작부터 종료까지 경과 시간
    pub elapsed: Duration,
}

/// 조건 폴링 오퍼레이터
pub struct PipelineOperator<J: JobService> {
    service: Arc<J>,
    cancel_on_finish: bool,
}

impl<J: JobService> PipelineOperator<J> {
    /// 오퍼레이터를 생성합니다. 대기 종료 후 실행 중인 잡은 취소됩니다.
    pub fn new(service: Arc<J>) -> Self {
        Self {
            service,
            cancel_on_finish: true,
        }
    }

    /// `[operator]` 설정 섹션으로 오퍼레이터를 생성합니다.
    pub fn from_core(service: Arc<J>, core: &OperatorConfig) -> Self {
        Self {
            service,
            cancel_on_finish: core.cancel_on_finish,
        }
    }

    /// `wait_for_condition_and_finish` 이후 취소 여부를 설정합니다.
    pub fn with_cancel_on_finish(mut self, cancel: bool) -> Self {
        self.cancel_on_finish = cancel;
        self
    }

    /// 조건이 충족되거나 잡이 끝나거나 시간이 초과될 때까지 대기합니다.
    ///
    /// 조건 클로저는 틱마다 최대 한 번 호출되며, 호출자가 소유한 누적 상태를
    /// 수정할 수 있습니다. 누적 상태는 어떤 결과로 끝나든 호출자에게 남습니다.
    ///
    /// # Errors
    /// 조건 평가가 실패하면 [`PipelineError::Predicate`]를 반환합니다.
    pub async fn wait_for_condition<F, E>(
        &self,
        config: &PollConfig,
        mut predicate: F,
    ) -> Result<PollOutcome, PipelineError>
    where
        F: AsyncFnMut() -> Result<bool, E>,
        E: fmt::Display,
    {
        let job_id = config.job_id();
        let started = Instant::now();
        let mut ticks = 0u32;
        let mut last_status = None;

        info!(
            job_id,
            max_wait_secs = config.max_wait.as_secs(),
            poll_interval_secs = config.poll_interval.as_secs(),
            "waiting for condition"
        );

        loop {
            ticks += 1;
            counter!(m::PIPELINE_POLL_TICKS_TOTAL).increment(1);

            if let Some(state) = self.observe(job_id, ticks).await {
                last_status = Some(state);
                let result = match state {
                    JobState::Failed => Some(PollResult::LaunchFailed),
                    JobState::Cancelled => Some(PollResult::Cancelled),
                    _ => None,
                };
                if let Some(result) = result {
                    return Ok(finish(job_id, result, last_status, ticks, started));
                }
            }

            match predicate().await {
                Ok(true) => {
                    let result = PollResult::ConditionMet;
                    return Ok(finish(job_id, result, last_status, ticks, started));
                }
                Ok(false) => debug!(job_id, tick = ticks, "condition not met yet"),
                Err(e) => {
                    warn!(job_id, tick = ticks, error = %e, "condition check failed, aborting wait");
                    return Err(PipelineError::Predicate {
                        job: job_id.to_owned(),
                        reason: e.to_string(),
                    });
                }
            }

            if !sleep_until_next_tick(config, started).await {
                return Ok(finish(job_id, PollResult::Timeout, last_status, ticks, started));
            }
        }
    }

    /// [`wait_for_condition`](Self::wait_for_condition) 후 잡이 아직 실행 중이면 취소합니다.
    ///
    /// 취소 실패는 경고 로그만 남기며 결과를 바꾸지 않습니다.
    /// 조건 평가가 실패한 경우에도 취소를 시도한 뒤 에러를 반환합니다.
    pub async fn wait_for_condition_and_finish<F, E>(
        &self,
        config: &PollConfig,
        predicate: F,
    ) -> Result<PollOutcome, PipelineError>
    where
        F: AsyncFnMut() -> Result<bool, E>,
        E: fmt::Display,
    {
        let result = self.wait_for_condition(config, predicate).await;

        let last_status = result.as_ref().ok().and_then(|o| o.last_status);
        let still_running = !last_status.is_some_and(JobState::is_terminal);
        if self.cancel_on_finish && still_running {
            if let Err(e) = self.cancel_job(config.job_id()).await {
                warn!(job_id = config.job_id(), error = %e, "failed to cancel job after wait");
            }
        }

        result
    }

    /// 잡 상태만 확인하며 종료 상태가 될 때까지 대기합니다.
    ///
    /// `Succeeded`는 [`PollResult::LaunchFinished`], `Failed`는 [`PollResult::LaunchFailed`],
    /// `Cancelled`는 [`PollResult::Cancelled`]로 끝나며, 그 전에 `max_wait`가 지나면
    /// [`PollResult::Timeout`]입니다.
    pub async fn wait_until_done(&self, config: &PollConfig) -> PollOutcome {
        let job_id = config.job_id();
        let started = Instant::now();
        let mut ticks = 0u32;
        let mut last_status = None;

        info!(job_id, max_wait_secs = config.max_wait.as_secs(), "waiting for job to finish");

        loop {
            ticks += 1;
            counter!(m::PIPELINE_POLL_TICKS_TOTAL).increment(1);

            if let Some(state) = self.observe(job_id, ticks).await {
                last_status = Some(state);
                let result = match state {
                    JobState::Succeeded => Some(PollResult::LaunchFinished),
                    JobState::Failed => Some(PollResult::LaunchFailed),
                    JobState::Cancelled => Some(PollResult::Cancelled),
                    JobState::Pending | JobState::Running | JobState::Unknown => None,
                };
                if let Some(result) = result {
                    return finish(job_id, result, last_status, ticks, started);
                }
            }

            if !sleep_until_next_tick(config, started).await {
                return finish(job_id, PollResult::Timeout, last_status, ticks, started);
            }
        }
    }

    /// 잡을 취소합니다.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), PipelineError> {
        self.service.cancel(job_id).await?;
        info!(job_id, "job cancelled");
        Ok(())
    }

    /// 잡 상태를 한 번 조회합니다. 실패는 일시적인 것으로 보고 `None`을 반환합니다.
    async fn observe(&self, job_id: &str, tick: u32) -> Option<JobState> {
        match self.service.status(job_id).await {
            Ok(state) => {
                debug!(job_id, tick, %state, "job status");
                Some(state)
            }
            Err(e) => {
                counter!(m::PIPELINE_TRANSIENT_POLL_ERRORS_TOTAL).increment(1);
                warn!(job_id, tick, error = %e, "job status lookup failed, will retry");
                None
            }
        }
    }
}

/// 다음 틱까지 대기합니다. `max_wait`가 이미 지났으면 대기하지 않고 `false`를 반환합니다.
///
/// 마지막 대기는 남은 시간만큼으로 줄어들어, 마지막 틱이 정확히 `max_wait` 시점에 실행됩니다.
async fn sleep_until_next_tick(config: &PollConfig, started: Instant) -> bool {
    let elapsed = started.elapsed();
    if elapsed >= config.max_wait {
        return false;
    }
    let remaining = config.max_wait - elapsed;
    tokio::time::sleep(config.poll_interval.min(remaining)).await;
    true
}

fn finish(
    job_id: &str,
    result: PollResult,
    last_status: Option<JobState>,
    ticks: u32,
    started: Instant,
) -> PollOutcome {
    let elapsed = started.elapsed();
    counter!(m::PIPELINE_POLL_RESULTS_TOTAL, m::LABEL_RESULT => result.as_label()).increment(1);
    info!(
        job_id,
        %result,
        ticks,
        elapsed_secs = elapsed.as_secs_f64(),
        last_status = ?last_status,
        "wait finished"
    );
    PollOutcome {
        result,
        last_status,
        ticks,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MockJobService;
    use std::cell::Cell;

    fn poll_config(max_wait_secs: u64, interval_secs: u64) -> PollConfig {
        PollConfig::for_job("job-1")
            .max_wait(Duration::from_secs(max_wait_secs))
            .poll_interval(Duration::from_secs(interval_secs))
            .build()
            .unwrap()
    }

    #[test]
    fn for_job_uses_operator_defaults() {
        let config = PollConfig::for_job("job-1").build().unwrap();
        assert_eq!(config.job_id(), "job-1");
        assert_eq!(config.max_wait(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn from_core_reads_operator_section() {
        let core = OperatorConfig {
            max_wait_secs: 120,
            poll_interval_secs: 2,
            cancel_on_finish: false,
        };
        let config = PollConfig::from_core("job-1", &core).build().unwrap();
        assert_eq!(config.max_wait(), Duration::from_secs(120));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn zero_durations_and_empty_job_rejected() {
        assert!(
            PollConfig::for_job("job-1")
                .poll_interval(Duration::ZERO)
                .build()
                .is_err()
        );
        assert!(
            PollConfig::for_job("job-1")
                .max_wait(Duration::ZERO)
                .build()
                .is_err()
        );
        let err = PollConfig::for_job("").build().unwrap_err();
        assert!(matches!(err, PipelineError::Config { ref field, .. } if field == "job_id"));
    }

    #[test]
    fn result_labels() {
        assert_eq!(PollResult::ConditionMet.as_label(), "condition_met");
        assert_eq!(PollResult::LaunchFinished.to_string(), "launch_finished");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_checked_before_predicate() {
        let service = Arc::new(MockJobService::new().with_states([JobState::Failed]));
        let operator = PipelineOperator::new(Arc::clone(&service));
        let calls = Cell::new(0);

        let outcome = operator
            .wait_for_condition(&poll_config(60, 5), async || {
                calls.set(calls.get() + 1);
                Ok::<_, anyhow::Error>(true)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::LaunchFailed);
        assert_eq!(outcome.last_status, Some(JobState::Failed));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_job_ends_wait() {
        let service = Arc::new(
            MockJobService::new().with_states([JobState::Running, JobState::Cancelled]),
        );
        let operator = PipelineOperator::new(Arc::clone(&service));

        let outcome = operator
            .wait_for_condition(&poll_config(60, 5), async || Ok::<_, anyhow::Error>(false))
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::Cancelled);
        assert_eq!(outcome.ticks, 2);
        assert_eq!(outcome.elapsed, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_runs_once_per_tick_until_met() {
        let service = Arc::new(MockJobService::new());
        let operator = PipelineOperator::new(Arc::clone(&service));
        let mut calls = 0;

        let outcome = operator
            .wait_for_condition(&poll_config(60, 5), async || {
                calls += 1;
                Ok::<_, anyhow::Error>(calls == 4)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::ConditionMet);
        assert_eq!(outcome.ticks, 4);
        assert_eq!(calls, 4);
        assert_eq!(service.status_count(), 4);
        assert_eq!(outcome.elapsed, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_accumulated_state() {
        let service = Arc::new(MockJobService::new());
        let operator = PipelineOperator::new(Arc::clone(&service));
        let mut seen = Vec::new();

        let outcome = operator
            .wait_for_condition(&poll_config(20, 5), async || {
                seen.push(seen.len());
                Ok::<_, anyhow::Error>(false)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::Timeout);
        assert_eq!(outcome.elapsed, Duration::from_secs(20));
        // ticks at 0, 5, 10, 15, 20
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.last_status, Some(JobState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn last_sleep_is_clamped_to_max_wait() {
        let service = Arc::new(MockJobService::new());
        let operator = PipelineOperator::new(service);

        let outcome = operator
            .wait_for_condition(&poll_config(7, 5), async || Ok::<_, anyhow::Error>(false))
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::Timeout);
        assert_eq!(outcome.ticks, 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn status_errors_are_transient() {
        let service = Arc::new(
            MockJobService::new()
                .then_status_error("deadline exceeded")
                .then_status_error("deadline exceeded")
                .then_state(JobState::Running),
        );
        let operator = PipelineOperator::new(Arc::clone(&service));
        let mut calls = 0;

        let outcome = operator
            .wait_for_condition(&poll_config(60, 5), async || {
                calls += 1;
                Ok::<_, anyhow::Error>(calls == 3)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::ConditionMet);
        assert_eq!(outcome.last_status, Some(JobState::Running));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_error_aborts_wait() {
        let service = Arc::new(MockJobService::new());
        let operator = PipelineOperator::new(Arc::clone(&service));

        let err = operator
            .wait_for_condition(&poll_config(60, 5), async || {
                Err::<bool, _>(anyhow::anyhow!("subscription deleted"))
            })
            .await
            .unwrap_err();

        match err {
            PipelineError::Predicate { job, reason } => {
                assert_eq!(job, "job-1");
                assert!(reason.contains("subscription deleted"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.status_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_cancels_running_job() {
        let service = Arc::new(MockJobService::new());
        let operator = PipelineOperator::new(Arc::clone(&service));

        let outcome = operator
            .wait_for_condition_and_finish(&poll_config(60, 5), async || {
                Ok::<_, anyhow::Error>(true)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::ConditionMet);
        assert_eq!(service.cancelled_jobs(), vec!["job-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_skips_terminal_job() {
        let service = Arc::new(MockJobService::new().with_states([JobState::Failed]));
        let operator = PipelineOperator::new(Arc::clone(&service));

        let outcome = operator
            .wait_for_condition_and_finish(&poll_config(60, 5), async || {
                Ok::<_, anyhow::Error>(false)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::LaunchFailed);
        assert!(service.cancelled_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_failure_does_not_change_outcome() {
        let service = Arc::new(MockJobService::new().with_failing_cancel());
        let operator = PipelineOperator::new(Arc::clone(&service));

        let outcome = operator
            .wait_for_condition_and_finish(&poll_config(10, 5), async || {
                Ok::<_, anyhow::Error>(false)
            })
            .await
            .unwrap();

        assert_eq!(outcome.result, PollResult::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_can_be_disabled() {
        let service = Arc::new(MockJobService::new());
        let core = OperatorConfig {
            cancel_on_finish: false,
            ..OperatorConfig::default()
        };
        let operator = PipelineOperator::from_core(Arc::clone(&service), &core);

        operator
            .wait_for_condition_and_finish(&poll_config(60, 5), async || {
                Ok::<_, anyhow::Error>(true)
            })
            .await
            .unwrap();

        assert!(service.cancelled_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_done_reports_terminal_states() {
        let cases = [
            (JobState::Succeeded, PollResult::LaunchFinished),
            (JobState::Failed, PollResult::LaunchFailed),
            (JobState::Cancelled, PollResult::Cancelled),
        ];
        for (terminal, expected) in cases {
            let service = Arc::new(
                MockJobService::new().with_states([JobState::Pending, JobState::Running, terminal]),
            );
            let operator = PipelineOperator::new(service);
            let outcome = operator.wait_until_done(&poll_config(60, 5)).await;
            assert_eq!(outcome.result, expected);
            assert_eq!(outcome.ticks, 3);
            assert_eq!(outcome.last_status, Some(terminal));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_done_times_out() {
        let service = Arc::new(MockJobService::new().with_states([JobState::Running]));
        let operator = PipelineOperator::new(service);
        let outcome = operator.wait_until_done(&poll_config(30, 10)).await;
        assert_eq!(outcome.result, PollResult::Timeout);
        assert_eq!(outcome.elapsed, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn cancel_job_passthrough() {
        let service = Arc::new(MockJobService::new());
        let operator = PipelineOperator::new(Arc::clone(&service));
        operator.cancel_job("job-9").await.unwrap();
        assert_eq!(service.cancelled_jobs(), vec!["job-9"]);

        let failing = PipelineOperator::new(Arc::new(MockJobService::new().with_failing_cancel()));
        let err = failing.cancel_job("job-9").await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancel { .. }));
    }
}
