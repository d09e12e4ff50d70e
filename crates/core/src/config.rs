//! 설정 관리 — flowbed.toml 파싱 및 런타임 설정
//!
//! [`FlowbedConfig`]는 모든 크레이트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`FLOWBED_OPERATOR_MAX_WAIT_SECS=120` 형식)
//! 2. 설정 파일 (`flowbed.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), flowbed_core::error::FlowbedError> {
//! use flowbed_core::config::FlowbedConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FlowbedConfig::load("flowbed.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FlowbedConfig::parse("[operator]\npoll_interval_secs = 2")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FlowbedError};

/// 설정 상한값 상수
const MAX_STARTUP_TIMEOUT_SECS: u64 = 1800;
const MAX_WAIT_SECS: u64 = 6 * 3600;

/// flowbed 통합 설정
///
/// `flowbed.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowbedConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 리소스 매니저 설정
    #[serde(default)]
    pub resources: ResourcesConfig,
    /// 파이프라인 오퍼레이터 설정
    #[serde(default)]
    pub operator: OperatorConfig,
}

impl FlowbedConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FlowbedError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowbedError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlowbedError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FlowbedError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FlowbedError> {
        toml::from_str(toml_str).map_err(|e| {
            FlowbedError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `FLOWBED_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FLOWBED_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FLOWBED_GENERAL_LOG_FORMAT");

        // Resources
        override_string(
            &mut self.resources.docker_socket,
            "FLOWBED_RESOURCES_DOCKER_SOCKET",
        );
        override_string(&mut self.resources.host, "FLOWBED_RESOURCES_HOST");
        override_u64(
            &mut self.resources.startup_timeout_secs,
            "FLOWBED_RESOURCES_STARTUP_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.resources.pull_images,
            "FLOWBED_RESOURCES_PULL_IMAGES",
        );

        // Operator
        override_u64(
            &mut self.operator.max_wait_secs,
            "FLOWBED_OPERATOR_MAX_WAIT_SECS",
        );
        override_u64(
            &mut self.operator.poll_interval_secs,
            "FLOWBED_OPERATOR_POLL_INTERVAL_SECS",
        );
        override_bool(
            &mut self.operator.cancel_on_finish,
            "FLOWBED_OPERATOR_CANCEL_ON_FINISH",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FlowbedError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.resources.host.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resources.host".to_owned(),
                reason: "host must not be empty".to_owned(),
            }
            .into());
        }

        if self.resources.startup_timeout_secs == 0
            || self.resources.startup_timeout_secs > MAX_STARTUP_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "resources.startup_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_STARTUP_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.operator.max_wait_secs == 0 || self.operator.max_wait_secs > MAX_WAIT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "operator.max_wait_secs".to_owned(),
                reason: format!("must be 1-{MAX_WAIT_SECS}"),
            }
            .into());
        }

        if self.operator.poll_interval_secs == 0
            || self.operator.poll_interval_secs > self.operator.max_wait_secs
        {
            return Err(ConfigError::InvalidValue {
                field: "operator.poll_interval_secs".to_owned(),
                reason: "must be at least 1 and not exceed max_wait_secs".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 리소스 매니저 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 매핑된 포트에 접근할 호스트
    pub host: String,
    /// 백엔드 기동 타임아웃 (초)
    pub startup_timeout_secs: u64,
    /// 기동 전에 이미지를 pull할지 여부
    pub pull_images: bool,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_owned(),
            host: "localhost".to_owned(),
            startup_timeout_secs: 300,
            pull_images: true,
        }
    }
}

impl ResourcesConfig {
    /// 기동 타임아웃을 `Duration`으로 반환합니다.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// 파이프라인 오퍼레이터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// 조건 대기 최대 시간 (초)
    pub max_wait_secs: u64,
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 대기 종료 후 실행 중인 잡을 취소할지 여부
    pub cancel_on_finish: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: 600,
            poll_interval_secs: 5,
            cancel_on_finish: true,
        }
    }
}

impl OperatorConfig {
    /// 최대 대기 시간을 `Duration`으로 반환합니다.
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    /// 폴링 주기를 `Duration`으로 반환합니다.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
