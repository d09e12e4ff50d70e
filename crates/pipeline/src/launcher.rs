//! 잡 실행기
//!
//! [`PipelineLauncher`]는 템플릿 기반 잡을 한 번 제출하고 [`LaunchInfo`]를 돌려줍니다.
//! 폴링은 하지 않으며, 설정 오류와 서비스 거부는 재시도 없이 즉시 반환합니다.
//!
//! 템플릿 메타데이터([`TemplateMetadata`])에 선언된 필수 파라미터는
//! 제출 전에 검사됩니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use flowbed_core::metrics as m;
use flowbed_core::types::JobState;

use crate::error::PipelineError;
use crate::job::JobService;

/// 잡 실행 설정
///
/// 빌더로 한 번 만들어지며 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    job_name: String,
    template: String,
    parameters: BTreeMap<String, String>,
}

impl LaunchConfig {
    /// 빌더를 생성합니다.
    pub fn builder(
        job_name: impl Into<String>,
        template: impl Into<String>,
    ) -> LaunchConfigBuilder {
        LaunchConfigBuilder {
            job_name: job_name.into(),
            template: template.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// 잡 이름
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// 템플릿 경로
    pub fn template(&self) -> &str {
        &self.template
    }

    /// 전체 파라미터
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// 파라미터 값을 조회합니다.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// [`LaunchConfig`] 빌더
#[derive(Debug, Clone)]
pub struct LaunchConfigBuilder {
    job_name: String,
    template: String,
    parameters: BTreeMap<String, String>,
}

impl LaunchConfigBuilder {
    /// 파라미터를 추가합니다. 같은 이름이 있으면 덮어씁니다.
    pub fn add_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// 여러 파라미터를 한 번에 추가합니다.
    pub fn add_parameters<K, V>(mut self, parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// 설정을 검증하고 [`LaunchConfig`]를 생성합니다.
    pub fn build(self) -> Result<LaunchConfig, PipelineError> {
        if self.job_name.trim().is_empty() {
            return Err(PipelineError::config("job_name", "must not be empty"));
        }
        if self.job_name.chars().any(char::is_whitespace) {
            return Err(PipelineError::config(
                "job_name",
                format!("'{}' must not contain whitespace", self.job_name),
            ));
        }
        if self.template.trim().is_empty() {
            return Err(PipelineError::config("template", "must not be empty"));
        }
        if self.parameters.keys().any(|k| k.trim().is_empty()) {
            return Err(PipelineError::config(
                "parameters",
                "parameter names must not be empty",
            ));
        }

        Ok(LaunchConfig {
            job_name: self.job_name,
            template: self.template,
            parameters: self.parameters,
        })
    }
}

/// 템플릿 파라미터 선언
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    /// 파라미터명
    pub name: String,
    /// 사람이 읽는 레이블
    #[serde(default)]
    pub label: Option<String>,
    /// 생략 가능 여부
    #[serde(default)]
    pub is_optional: bool,
}

/// 템플릿 메타데이터
///
/// 템플릿과 함께 배포되는 JSON 메타데이터 파일 형식입니다.
///
/// ```json
/// {
///   "name": "PubSub to PubSub",
///   "parameters": [
///     { "name": "inputSubscription", "label": "Input subscription" },
///     { "name": "filterKey", "isOptional": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// 템플릿 이름
    pub name: String,
    /// 선언된 파라미터
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

impl TemplateMetadata {
    /// JSON 메타데이터를 파싱합니다.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::config("template_metadata", e.to_string()))
    }

    /// 필수 파라미터 이름 (선언 순서)
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| !p.is_optional)
            .map(|p| p.name.as_str())
    }
}

/// 실행된 잡 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchInfo {
    /// 서비스가 부여한 잡 ID
    pub job_id: String,
    /// 잡 이름
    pub job_name: String,
    /// 실행 시각
    pub launched_at: SystemTime,
    /// 제출 직후 상태
    pub state: JobState,
    /// 실행에 사용된 파라미터
    pub parameters: BTreeMap<String, String>,
}

/// 템플릿 잡 실행기
pub struct PipelineLauncher<J: JobService> {
    service: Arc<J>,
    required: Vec<String>,
}

impl<J: JobService> PipelineLauncher<J> {
    /// 필수 파라미터 없이 실행기를 생성합니다.
    pub fn new(service: Arc<J>) -> Self {
        Self {
            service,
            required: Vec::new(),
        }
    }

    /// 템플릿 메타데이터의 필수 파라미터를 검사하는 실행기를 생성합니다.
    pub fn for_template(service: Arc<J>, metadata: &TemplateMetadata) -> Self {
        Self {
            service,
            required: metadata.required_parameters().map(str::to_owned).collect(),
        }
    }

    /// 필수 파라미터 목록
    pub fn required_parameters(&self) -> &[String] {
        &self.required
    }

    /// 잡을 제출합니다.
    ///
    /// # Errors
    /// - [`PipelineError::MissingParameter`]: 필수 파라미터 누락
    /// - [`PipelineError::Rejected`]: 잡 서비스가 제출을 거부함
    pub async fn launch(&self, config: LaunchConfig) -> Result<LaunchInfo, PipelineError> {
        if let Some(missing) = self
            .required
            .iter()
            .find(|name| !config.parameters.contains_key(name.as_str()))
        {
            counter!(m::PIPELINE_LAUNCH_FAILURES_TOTAL).increment(1);
            error!(
                job = %config.job_name,
                parameter = %missing,
                "launch aborted: required parameter missing"
            );
            return Err(PipelineError::MissingParameter {
                job: config.job_name,
                parameter: missing.clone(),
            });
        }

        let submitted = match self.service.submit(&config).await {
            Ok(submitted) => submitted,
            Err(e) => {
                counter!(m::PIPELINE_LAUNCH_FAILURES_TOTAL).increment(1);
                error!(job = %config.job_name, error = %e, "launch failed");
                return Err(e);
            }
        };

        counter!(m::PIPELINE_JOBS_LAUNCHED_TOTAL).increment(1);
        info!(
            job = %config.job_name,
            job_id = %submitted.job_id,
            template = %config.template,
            state = %submitted.state,
            "job launched"
        );

        Ok(LaunchInfo {
            job_id: submitted.job_id,
            job_name: config.job_name,
            launched_at: SystemTime::now(),
            state: submitted.state,
            parameters: config.parameters,
        })
    }
}
