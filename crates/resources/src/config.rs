//! 리소스 매니저 설정
//!
//! [`ResourceManagerConfig`]는 빌더로 한 번 만들어진 뒤 변경되지 않습니다.
//! 지정하지 않은 필드(이미지, 태그, 자격 증명, 네임스페이스)는
//! 백엔드 특화([`Specialization`])의 기본값으로 채워집니다.
//!
//! # 사용 예시
//! ```ignore
//! use flowbed_resources::config::ResourceManagerConfig;
//! use flowbed_resources::specialization::Oracle;
//!
//! let config = ResourceManagerConfig::builder("orders-it")
//!     .tag("21-slim-faststart")
//!     .build(&Oracle)?;
//! ```

use std::fmt;
use std::time::Duration;

use flowbed_core::config::ResourcesConfig;
use flowbed_core::types::Endpoint;

use crate::error::ResourceError;
use crate::specialization::Specialization;

/// 기동 타임아웃 상한 (초)
const MAX_STARTUP_TIMEOUT_SECS: u64 = 1800;

/// 백엔드 접속 자격 증명
///
/// `Debug` 출력에서 비밀번호는 가려집니다.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// 사용자명
    pub username: String,
    /// 비밀번호
    pub password: String,
}

impl Credentials {
    /// 새 자격 증명을 생성합니다.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// 검증이 끝난 리소스 매니저 설정
#[derive(Debug, Clone)]
pub struct ResourceManagerConfig {
    /// 테스트 식별자 (네임스페이스 접두어)
    pub test_id: String,
    /// 컨테이너 이미지
    pub image: String,
    /// 이미지 태그
    pub tag: String,
    /// 백엔드 자격 증명
    pub credentials: Credentials,
    /// 데이터베이스/프로젝트 네임스페이스
    pub namespace: String,
    /// 이미 실행 중인 백엔드 주소 (설정 시 컨테이너를 띄우지 않음)
    pub endpoint_override: Option<Endpoint>,
    /// 매핑된 포트에 접근할 호스트
    pub host: String,
    /// 기동 후 준비 완료까지 기다리는 최대 시간
    pub startup_timeout: Duration,
    /// 기동 전에 이미지를 pull 할지 여부
    pub pull_image: bool,
}

impl ResourceManagerConfig {
    /// 빌더를 생성합니다.
    pub fn builder(test_id: impl Into<String>) -> ResourceManagerConfigBuilder {
        ResourceManagerConfigBuilder::new(test_id)
    }

    /// core의 `ResourcesConfig`를 기본값으로 사용하는 빌더를 생성합니다.
    pub fn from_core(
        test_id: impl Into<String>,
        core: &ResourcesConfig,
    ) -> ResourceManagerConfigBuilder {
        ResourceManagerConfigBuilder::new(test_id)
            .host(core.host.clone())
            .startup_timeout(core.startup_timeout())
            .pull_image(core.pull_images)
    }

    /// 이미지 참조(`image:tag`)를 반환합니다.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// [`ResourceManagerConfig`] 빌더
#[derive(Debug, Clone)]
pub struct ResourceManagerConfigBuilder {
    test_id: String,
    image: Option<String>,
    tag: Option<String>,
    credentials: Option<Credentials>,
    namespace: Option<String>,
    endpoint_override: Option<Endpoint>,
    host: String,
    startup_timeout: Duration,
    pull_image: bool,
}

impl ResourceManagerConfigBuilder {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new(test_id: impl Into<String>) -> Self {
        let defaults = ResourcesConfig::default();
        Self {
            test_id: test_id.into(),
            image: None,
            tag: None,
            credentials: None,
            namespace: None,
            endpoint_override: None,
            host: defaults.host.clone(),
            startup_timeout: defaults.startup_timeout(),
            pull_image: defaults.pull_images,
        }
    }

    /// 컨테이너 이미지를 설정합니다.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// 이미지 태그를 설정합니다.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// 자격 증명을 설정합니다.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// 네임스페이스를 직접 지정합니다. 지정하지 않으면 자동 생성됩니다.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// 이미 실행 중인 백엔드를 사용합니다.
    pub fn endpoint_override(mut self, endpoint: Endpoint) -> Self {
        self.endpoint_override = Some(endpoint);
        self
    }

    /// 접속 호스트를 설정합니다.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// 기동 타임아웃을 설정합니다.
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// 이미지 pull 여부를 설정합니다.
    pub fn pull_image(mut self, pull: bool) -> Self {
        self.pull_image = pull;
        self
    }

    /// 특화 기본값을 채우고 검증하여 설정을 생성합니다.
    pub fn build<S: Specialization + ?Sized>(
        self,
        spec: &S,
    ) -> Result<ResourceManagerConfig, ResourceError> {
        let test_id = self.test_id.trim().to_owned();
        if test_id.is_empty() {
            return Err(ResourceError::config("test_id", "must not be empty"));
        }

        let image = self.image.unwrap_or_else(|| spec.default_image().to_owned());
        if image.trim().is_empty() {
            return Err(ResourceError::config("image", "must not be empty"));
        }
        let tag = self.tag.unwrap_or_else(|| spec.default_tag().to_owned());
        if tag.trim().is_empty() {
            return Err(ResourceError::config("tag", "must not be empty"));
        }

        let naming = spec.naming();
        let namespace = match self.namespace {
            Some(namespace) => {
                naming
                    .validate(&namespace)
                    .map_err(|reason| ResourceError::config("namespace", reason))?;
                namespace
            }
            None => naming.generate(&test_id),
        };

        if let Some(endpoint) = &self.endpoint_override {
            if endpoint.host.is_empty() {
                return Err(ResourceError::config("endpoint_override", "host must not be empty"));
            }
            if endpoint.port == 0 {
                return Err(ResourceError::config("endpoint_override", "port must not be 0"));
            }
        }

        if self.host.trim().is_empty() {
            return Err(ResourceError::config("host", "must not be empty"));
        }

        let timeout_secs = self.startup_timeout.as_secs();
        if self.startup_timeout.is_zero() || timeout_secs > MAX_STARTUP_TIMEOUT_SECS {
            return Err(ResourceError::config(
                "startup_timeout",
                format!("must be greater than 0 and at most {MAX_STARTUP_TIMEOUT_SECS}s"),
            ));
        }

        Ok(ResourceManagerConfig {
            test_id,
            image,
            tag,
            credentials: self
                .credentials
                .unwrap_or_else(|| spec.default_credentials()),
            namespace,
            endpoint_override: self.endpoint_override,
            host: self.host,
            startup_timeout: self.startup_timeout,
            pull_image: self.pull_image,
        })
    }
}
