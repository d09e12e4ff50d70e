//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `flowbed_`
//! - 모듈명: `resources_`, `pipeline_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 백엔드 레이블 키 (oracle, postgres, mysql, sqlserver, pubsub)
pub const LABEL_BACKEND: &str = "backend";

/// 폴링 결과 레이블 키 (condition_met, launch_failed, timeout, cancelled, launch_finished)
pub const LABEL_RESULT: &str = "result";

// ─── Resource Manager 메트릭 ────────────────────────────────────────

/// Resources: 백엔드 기동 횟수 (counter, label: backend)
pub const RESOURCES_BACKEND_STARTS_TOTAL: &str = "flowbed_resources_backend_starts_total";

/// Resources: 백엔드 기동 소요 시간 (histogram, 초)
pub const RESOURCES_STARTUP_DURATION_SECONDS: &str = "flowbed_resources_startup_duration_seconds";

/// Resources: 생성된 하위 리소스 수 (counter, label: backend)
pub const RESOURCES_CREATED_TOTAL: &str = "flowbed_resources_created_total";

/// Resources: 정리 실패 수 (counter, label: backend)
pub const RESOURCES_CLEANUP_FAILURES_TOTAL: &str = "flowbed_resources_cleanup_failures_total";

// ─── Pipeline 메트릭 ───────────────────────────────────────────────

/// Pipeline: 실행된 잡 수 (counter)
pub const PIPELINE_JOBS_LAUNCHED_TOTAL: &str = "flowbed_pipeline_jobs_launched_total";

/// Pipeline: 실행 거부/실패 수 (counter)
pub const PIPELINE_LAUNCH_FAILURES_TOTAL: &str = "flowbed_pipeline_launch_failures_total";

/// Pipeline: 폴링 틱 수 (counter)
pub const PIPELINE_POLL_TICKS_TOTAL: &str = "flowbed_pipeline_poll_ticks_total";

/// Pipeline: 일시적 상태 조회 실패 수 (counter)
pub const PIPELINE_TRANSIENT_POLL_ERRORS_TOTAL: &str =
    "flowbed_pipeline_transient_poll_errors_total";

/// Pipeline: 폴링 결과 수 (counter, label: result)
pub const PIPELINE_POLL_RESULTS_TOTAL: &str = "flowbed_pipeline_poll_results_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        RESOURCES_BACKEND_STARTS_TOTAL,
        "Total backend processes started by resource managers"
    );
    describe_histogram!(
        RESOURCES_STARTUP_DURATION_SECONDS,
        "Time from first access until the backend reported running"
    );
    describe_counter!(
        RESOURCES_CREATED_TOTAL,
        "Total sub-resources (tables, topics, subscriptions) created"
    );
    describe_counter!(
        RESOURCES_CLEANUP_FAILURES_TOTAL,
        "Total teardown failures logged during cleanup"
    );
    describe_counter!(PIPELINE_JOBS_LAUNCHED_TOTAL, "Total pipeline jobs launched");
    describe_counter!(
        PIPELINE_LAUNCH_FAILURES_TOTAL,
        "Total pipeline launches rejected or malformed"
    );
    describe_counter!(PIPELINE_POLL_TICKS_TOTAL, "Total operator poll ticks");
    describe_counter!(
        PIPELINE_TRANSIENT_POLL_ERRORS_TOTAL,
        "Total job status lookups that failed and were absorbed"
    );
    describe_counter!(
        PIPELINE_POLL_RESULTS_TOTAL,
        "Total operator waits by final result"
    );
}
