//! 컨테이너 런타임 추상화
//!
//! [`ContainerRuntime`] 트레이트는 리소스 매니저가 백엔드를 띄우고 내리는 데 필요한
//! Docker 호출만 다룹니다. 프로덕션에서는 [`BollardContainerRuntime`]을,
//! 단위 테스트에서는 `MockContainerRuntime`을 사용합니다.
//!
//! # 아키텍처
//!
//! ```text
//! ┌──────────────────┐
//! │ ResourceManager  │
//! └────────┬─────────┘
//!          │
//!          ▼
//!  ┌──────────────────┐
//!  │ ContainerRuntime │ (trait)
//!  └──────────────────┘
//!        │      │
//!        ▼      ▼
//!   ┌───────┐ ┌──────┐
//!   │Bollard│ │ Mock │
//!   └───┬───┘ └──────┘
//!       │
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # 생성과 시작
//!
//! 컨테이너 생성(`create`)과 시작(`start`)은 별도 호출입니다. 매니저는 생성 직후
//! 컨테이너 ID를 핸들에 기록하므로, 시작이 실패해도 다음 `cleanup()`이 컨테이너를 제거합니다.
//!
//! # 포트 할당
//!
//! 노출된 포트는 모두 임의의 호스트 포트로 publish 됩니다.
//! 할당된 포트는 시작 후에만 알 수 있으며 [`ContainerRuntime::host_port`]로 조회합니다.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use flowbed_core::config::ResourcesConfig;
use futures::TryStreamExt;

use crate::error::ResourceError;

/// 테스트 실행마다 컨테이너에 붙는 레이블
pub const TEST_ID_LABEL: &str = "flowbed.test_id";

/// 백엔드 컨테이너 하나를 띄우는 데 필요한 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// 컨테이너 이름
    pub name: String,
    /// 이미지 저장소
    pub image: String,
    /// 이미지 태그
    pub tag: String,
    /// `KEY=value` 환경변수
    pub env: Vec<String>,
    /// 명령 재정의 (`None`이면 이미지 기본값)
    pub cmd: Option<Vec<String>>,
    /// 컨테이너 내부에서 백엔드가 listen 하는 포트
    pub internal_port: u16,
    /// 컨테이너 레이블
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// `image:tag`를 반환합니다.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// 컨테이너 런타임 추상화 트레이트
///
/// 하나의 런타임을 테스트 바이너리의 모든 리소스 매니저가 `Arc`로 공유할 수 있도록
/// `Send + Sync + 'static`을 요구합니다.
///
/// # 에러 처리
///
/// - **연결 에러**: `ResourceError::RuntimeConnection`
/// - **그 외**: `ResourceError::Runtime`
pub trait ContainerRuntime: Send + Sync + 'static {
    /// `image:tag`를 pull 하고 완료될 때까지 기다립니다.
    fn pull_image(
        &self,
        image: &str,
        tag: &str,
    ) -> impl Future<Output = Result<(), ResourceError>> + Send;

    /// 컨테이너를 생성하고 ID를 반환합니다. 아직 시작하지 않습니다.
    fn create(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<String, ResourceError>> + Send;

    /// 생성된 컨테이너를 시작합니다.
    fn start(&self, container_id: &str)
    -> impl Future<Output = Result<(), ResourceError>> + Send;

    /// 실행 중인 컨테이너의 `internal_port`에 매핑된 호스트 포트를 반환합니다.
    fn host_port(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> impl Future<Output = Result<u16, ResourceError>> + Send;

    /// 컨테이너를 중지하고 제거합니다.
    ///
    /// 이미 없는 컨테이너는 제거된 것으로 봅니다.
    fn stop_and_remove(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<(), ResourceError>> + Send;

    /// 데몬 연결 상태를 확인합니다.
    fn ping(&self) -> impl Future<Output = Result<(), ResourceError>> + Send;
}

/// `bollard` 기반 프로덕션 런타임
///
/// 내부적으로 `Arc<bollard::Docker>`를 사용하여 비동기 태스크 간에 안전하게 공유합니다.
///
/// # 사용 예시
///
/// ```ignore
/// use flowbed_resources::BollardContainerRuntime;
///
/// let runtime = BollardContainerRuntime::from_core(&config.resources)?;
/// runtime.ping().await?;
/// # Ok::<(), flowbed_resources::ResourceError>(())
/// ```
pub struct BollardContainerRuntime {
    docker: Arc<bollard::Docker>,
    endpoint: String,
}

impl BollardContainerRuntime {
    /// 플랫폼 기본 로컬 소켓으로 Docker에 연결합니다.
    ///
    /// # Errors
    ///
    /// 연결에 실패하면 `ResourceError::RuntimeConnection`을 반환합니다.
    pub fn connect_local() -> Result<Self, ResourceError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ResourceError::RuntimeConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
            endpoint: "local defaults".to_owned(),
        })
    }

    /// 지정한 소켓 경로로 Docker에 연결합니다.
    ///
    /// # Errors
    ///
    /// 연결에 실패하면 `ResourceError::RuntimeConnection`을 반환합니다.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ResourceError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ResourceError::RuntimeConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
            endpoint: socket_path.to_owned(),
        })
    }

    /// `[resources]` 설정 섹션의 `docker_socket`으로 연결합니다.
    ///
    /// 소켓 경로가 비어 있으면 플랫폼 기본값을 사용합니다.
    pub fn from_core(config: &ResourcesConfig) -> Result<Self, ResourceError> {
        let socket = config.docker_socket.trim();
        if socket.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket)
        }
    }

    /// 연결 대상 (소켓 경로 또는 `local defaults`)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// teardown 중 404(없음)와 304(이미 중지됨)는 실패가 아닙니다.
fn is_gone(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404 | 304,
            ..
        }
    )
}

fn port_key(internal_port: u16) -> String {
    format!("{internal_port}/tcp")
}

impl ContainerRuntime for BollardContainerRuntime {
    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), ResourceError> {
        use bollard::image::CreateImageOptions;

        let options = CreateImageOptions {
            from_image: image,
            tag,
            ..Default::default()
        };

        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| ResourceError::Runtime(format!("pull {image}:{tag} failed: {e}")))?;
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, ResourceError> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::HostConfig;

        let exposed_ports = HashMap::from([(port_key(spec.internal_port), HashMap::new())]);
        let labels = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<HashMap<_, _>>();

        let config = Config {
            image: Some(spec.image_ref()),
            env: Some(spec.env.clone()),
            cmd: spec.cmd.clone(),
            exposed_ports: Some(exposed_ports),
            labels: Some(labels),
            host_config: Some(HostConfig {
                publish_all_ports: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                ResourceError::Runtime(format!("create container '{}' failed: {e}", spec.name))
            })?;
        Ok(created.id)
    }

    async fn start(&self, container_id: &str) -> Result<(), ResourceError> {
        use bollard::container::StartContainerOptions;

        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                ResourceError::Runtime(format!("start container {container_id} failed: {e}"))
            })
    }

    async fn host_port(
        &self,
        container_id: &str,
        internal_port: u16,
    ) -> Result<u16, ResourceError> {
        let details = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| ResourceError::Runtime(format!("inspect container failed: {e}")))?;

        let key = port_key(internal_port);
        details
            .network_settings
            .and_then(|settings| settings.ports)
            .and_then(|mut ports| ports.remove(&key))
            .flatten()
            .into_iter()
            .flatten()
            .find_map(|binding| binding.host_port.and_then(|p| p.parse::<u16>().ok()))
            .ok_or_else(|| {
                ResourceError::Runtime(format!(
                    "container {container_id} has no host binding for {key}"
                ))
            })
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), ResourceError> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        match self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => {}
            Err(e) if is_gone(&e) => {}
            Err(e) => {
                return Err(ResourceError::Runtime(format!(
                    "stop container {container_id} failed: {e}"
                )));
            }
        }

        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(ResourceError::Runtime(format!(
                "remove container {container_id} failed: {e}"
            ))),
        }
    }

    async fn ping(&self) -> Result<(), ResourceError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ResourceError::RuntimeConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock 컨테이너 런타임
///
/// 호출 횟수를 기록하고, 설정에 따라 실패를 시뮬레이션합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockContainerRuntime {
    /// host_port 가 돌려줄 포트 (0이면 49152)
    pub mapped_port: u16,
    /// start 호출 시 실패 여부 (create 는 성공)
    pub fail_start: bool,
    /// stop_and_remove 호출 시 실패 여부 (테스트 중 변경 가능)
    pub fail_remove: std::sync::atomic::AtomicBool,
    /// start 전에 대기할 시간
    pub start_delay: std::time::Duration,
    /// pull_image 호출 횟수
    pub pulls: std::sync::atomic::AtomicUsize,
    /// create 호출 횟수
    pub creates: std::sync::atomic::AtomicUsize,
    /// start 호출 횟수
    pub starts: std::sync::atomic::AtomicUsize,
    /// stop_and_remove 호출 횟수
    pub removals: std::sync::atomic::AtomicUsize,
    /// stop_and_remove 에 넘겨진 컨테이너 ID
    pub removed: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockContainerRuntime {
    /// 기본 설정으로 mock 런타임을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 매핑 포트를 설정합니다.
    pub fn with_mapped_port(mut self, port: u16) -> Self {
        self.mapped_port = port;
        self
    }

    /// create 는 성공하고 start 가 실패하도록 설정합니다.
    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// stop_and_remove 호출이 실패하도록 설정합니다.
    pub fn with_failing_remove(self) -> Self {
        self.set_fail_remove(true);
        self
    }

    /// start 지연을 설정합니다.
    pub fn with_start_delay(mut self, delay: std::time::Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// stop_and_remove 실패 여부를 변경합니다.
    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// create 호출 횟수
    pub fn create_count(&self) -> usize {
        self.creates.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// start 호출 횟수
    pub fn start_count(&self) -> usize {
        self.starts.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// stop_and_remove 호출 횟수
    pub fn removal_count(&self) -> usize {
        self.removals.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// 제거 요청된 컨테이너 ID 목록
    pub fn removed_ids(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ContainerRuntime for MockContainerRuntime {
    async fn pull_image(&self, _image: &str, _tag: &str) -> Result<(), ResourceError> {
        self.pulls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn create(&self, _spec: &ContainerSpec) -> Result<String, ResourceError> {
        let n = self
            .creates
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(format!("{:012x}", n + 1))
    }

    async fn start(&self, container_id: &str) -> Result<(), ResourceError> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        self.starts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_start {
            return Err(ResourceError::Runtime(format!(
                "mock failure starting {container_id}"
            )));
        }
        Ok(())
    }

    async fn host_port(
        &self,
        _container_id: &str,
        _internal_port: u16,
    ) -> Result<u16, ResourceError> {
        Ok(if self.mapped_port == 0 {
            49152
        } else {
            self.mapped_port
        })
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<(), ResourceError> {
        self.removals
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.removed.lock().unwrap().push(container_id.to_owned());
        if self.fail_remove.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ResourceError::Runtime(format!(
                "mock failure removing {container_id}"
            )));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), ResourceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> ContainerSpec {
        ContainerSpec {
            name: "flowbed-orders_it_1a2b3c4d".to_owned(),
            image: "gvenzl/oracle-xe".to_owned(),
            tag: "21-slim-faststart".to_owned(),
            env: vec!["ORACLE_PASSWORD=testPassword".to_owned()],
            cmd: None,
            internal_port: 1521,
            labels: BTreeMap::from([(TEST_ID_LABEL.to_owned(), "orders-it".to_owned())]),
        }
    }

    #[test]
    fn image_ref_joins_image_and_tag() {
        assert_eq!(sample_spec().image_ref(), "gvenzl/oracle-xe:21-slim-faststart");
    }

    #[test]
    fn port_key_is_tcp() {
        assert_eq!(port_key(8085), "8085/tcp");
    }

    #[test]
    fn not_found_and_not_modified_count_as_gone() {
        let gone = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_owned(),
        };
        let stopped = bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            message: String::new(),
        };
        let conflict = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "removal in progress".to_owned(),
        };
        assert!(is_gone(&gone));
        assert!(is_gone(&stopped));
        assert!(!is_gone(&conflict));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn from_core_uses_configured_socket() {
        let config = ResourcesConfig {
            docker_socket: "/tmp/flowbed-test-docker.sock".to_owned(),
            ..ResourcesConfig::default()
        };
        let runtime = BollardContainerRuntime::from_core(&config).unwrap();
        assert_eq!(runtime.endpoint(), "/tmp/flowbed-test-docker.sock");
    }

    #[tokio::test]
    async fn mock_runtime_create_returns_distinct_ids() {
        let runtime = MockContainerRuntime::new();
        let a = runtime.create(&sample_spec()).await.unwrap();
        let b = runtime.create(&sample_spec()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(runtime.create_count(), 2);
        assert_eq!(runtime.start_count(), 0);
    }

    #[tokio::test]
    async fn mock_runtime_failing_start_after_create() {
        let runtime = MockContainerRuntime::new().with_failing_start();
        let id = runtime.create(&sample_spec()).await.unwrap();
        let err = runtime.start(&id).await.unwrap_err();
        assert!(matches!(err, ResourceError::Runtime(_)));
        assert!(err.to_string().contains(&id));
    }

    #[tokio::test]
    async fn mock_runtime_remove_failure_can_be_cleared() {
        let runtime = MockContainerRuntime::new().with_failing_remove();
        assert!(runtime.stop_and_remove("abc").await.is_err());
        runtime.set_fail_remove(false);
        runtime.stop_and_remove("abc").await.unwrap();
        assert_eq!(runtime.removal_count(), 2);
        assert_eq!(runtime.removed_ids(), vec!["abc", "abc"]);
    }

    #[tokio::test]
    async fn mock_runtime_default_port() {
        let runtime = MockContainerRuntime::new();
        assert_eq!(runtime.host_port("abc", 1521).await.unwrap(), 49152);
        let runtime = MockContainerRuntime::new().with_mapped_port(32768);
        assert_eq!(runtime.host_port("abc", 1521).await.unwrap(), 32768);
    }

    #[test]
    fn runtime_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockContainerRuntime>();
        assert_send_sync::<BollardContainerRuntime>();
    }
}
