//! 제네릭 리소스 매니저
//!
//! [`ResourceManager`]는 [`ResourceHandle`] 하나와 [`Specialization`] 하나를 소유합니다.
//! 백엔드는 연결이 필요한 첫 작업에서 지연 기동됩니다.
//! 동시에 들어온 첫 접근은 비동기 startup 게이트 뒤에서 직렬화되어 백엔드는 한 번만 기동됩니다.
//!
//! # 생명주기
//!
//! ```text
//! Uninitialized ──first access──▶ Starting ──ready──▶ Running
//!                                    │                   │
//!                                    ▼                   ▼ cleanup()
//!                                 Failed ──cleanup()──▶ Stopped
//! ```
//!
//! `Uninitialized` 또는 `Stopped` 상태의 `cleanup()`은 아무것도 하지 않습니다.
//! 컨테이너 ID는 생성 직후 기록되므로 시작이나 teardown이 실패해도 `Failed` 상태에
//! ID가 남고, 다음 `cleanup()`이 제거를 다시 시도합니다.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use flowbed_core::metrics as m;
use flowbed_core::types::{BackingState, Endpoint};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendClient, BackendRequest, Connection, ReceivedMessage, Row};
use crate::config::ResourceManagerConfig;
use crate::docker::{ContainerRuntime, ContainerSpec, TEST_ID_LABEL};
use crate::error::ResourceError;
use crate::handle::{ResourceHandle, ResourceRef};
use crate::specialization::{
    BackendFamily, ResourceDefinition, ResourceKind, Specialization, TableSchema,
};

/// 백엔드 기동 중 준비 상태 확인 간격
const READINESS_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// 기동한 컨테이너에 백엔드 이름을 담는 레이블
const BACKEND_LABEL: &str = "flowbed.backend";

/// 테스트 하나를 위한 백엔드 하나를 프로비저닝하고 정리합니다.
pub struct ResourceManager<S, R, C> {
    spec: S,
    config: ResourceManagerConfig,
    runtime: Arc<R>,
    client: Arc<C>,
    handle: ResourceHandle,
    startup: tokio::sync::Mutex<()>,
    resources: Mutex<Vec<ResourceRef>>,
}

impl<S, R, C> ResourceManager<S, R, C>
where
    S: Specialization,
    R: ContainerRuntime,
    C: BackendClient,
{
    /// 매니저를 생성합니다. 첫 사용 전까지는 아무것도 기동하지 않습니다.
    pub fn new(spec: S, config: ResourceManagerConfig, runtime: Arc<R>, client: Arc<C>) -> Self {
        let handle = ResourceHandle::new(config.test_id.clone(), config.namespace.clone());
        Self {
            spec,
            config,
            runtime,
            client,
            handle,
            startup: tokio::sync::Mutex::new(()),
            resources: Mutex::new(Vec::new()),
        }
    }

    /// 백엔드 특화
    pub fn specialization(&self) -> &S {
        &self.spec
    }

    /// 검증된 설정
    pub fn config(&self) -> &ResourceManagerConfig {
        &self.config
    }

    /// 데이터베이스 또는 프로젝트 이름
    pub fn namespace(&self) -> &str {
        self.handle.namespace()
    }

    /// 현재 백엔드 상태
    pub fn backing_state(&self) -> BackingState {
        self.handle.backing_state()
    }

    /// 실행 중인 백엔드의 엔드포인트. 실행 중이 아니면 `NotReady`
    pub fn endpoint(&self) -> Result<Endpoint, ResourceError> {
        self.handle.endpoint()
    }

    /// 실행 중인 백엔드의 연결 URI. 실행 중이 아니면 `NotReady`
    pub fn connection_info(&self) -> Result<String, ResourceError> {
        let endpoint = self.handle.endpoint()?;
        Ok(self.spec.connection_uri(&endpoint, self.namespace()))
    }

    /// 지금까지 생성한 하위 리소스 (생성 순서)
    pub fn resources(&self) -> Vec<ResourceRef> {
        self.lock_resources().clone()
    }

    fn lock_resources(&self) -> MutexGuard<'_, Vec<ResourceRef>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 필요하면 백엔드를 기동하고 엔드포인트를 반환합니다.
    pub async fn ensure_running(&self) -> Result<Endpoint, ResourceError> {
        if let Ok(endpoint) = self.handle.endpoint() {
            return Ok(endpoint);
        }

        let _gate = self.startup.lock().await;
        match self.handle.backing_state() {
            BackingState::Running => self.handle.endpoint(),
            BackingState::Uninitialized => self.start_backend().await,
            state => Err(ResourceError::NotReady {
                namespace: self.namespace().to_owned(),
                state,
            }),
        }
    }

    /// 실행 중인 백엔드의 연결 정보. 필요하면 기동합니다.
    pub async fn connection(&self) -> Result<Connection, ResourceError> {
        let endpoint = self.ensure_running().await?;
        Ok(self.connection_for(endpoint))
    }

    fn connection_for(&self, endpoint: Endpoint) -> Connection {
        Connection {
            uri: self.spec.connection_uri(&endpoint, self.namespace()),
            endpoint,
            namespace: self.namespace().to_owned(),
            credentials: self.config.credentials.clone(),
        }
    }

    fn container_spec(&self) -> ContainerSpec {
        let namespace = self.namespace();
        ContainerSpec {
            name: format!("flowbed-{namespace}"),
            image: self.config.image.clone(),
            tag: self.config.tag.clone(),
            env: self.spec.container_env(&self.config.credentials, namespace),
            cmd: self.spec.container_cmd(namespace),
            internal_port: self.spec.internal_port(),
            labels: [
                (TEST_ID_LABEL.to_owned(), self.config.test_id.clone()),
                (BACKEND_LABEL.to_owned(), self.spec.name().to_owned()),
            ]
            .into_iter()
            .collect(),
        }
    }

    async fn start_backend(&self) -> Result<Endpoint, ResourceError> {
        let started = Instant::now();
        let backend = self.spec.name();
        let namespace = self.namespace();

        self.handle.mark_starting();
        info!(backend, namespace, "starting backend");

        match self.provision().await {
            Ok(endpoint) => {
                self.handle.mark_running(endpoint.clone());
                metrics::counter!(m::RESOURCES_BACKEND_STARTS_TOTAL, m::LABEL_BACKEND => backend)
                    .increment(1);
                metrics::histogram!(m::RESOURCES_STARTUP_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                info!(backend, namespace, endpoint = %endpoint, "backend running");
                Ok(endpoint)
            }
            Err(e) => {
                self.handle.mark_failed();
                error!(backend, namespace, error = %e, "backend failed to start");
                Err(match e {
                    e @ ResourceError::Startup { .. } => e,
                    other => ResourceError::Startup {
                        namespace: namespace.to_owned(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn provision(&self) -> Result<Endpoint, ResourceError> {
        let endpoint = match &self.config.endpoint_override {
            Some(endpoint) => {
                debug!(namespace = self.namespace(), endpoint = %endpoint, "using existing backend");
                endpoint.clone()
            }
            None => {
                if self.config.pull_image {
                    self.runtime
                        .pull_image(&self.config.image, &self.config.tag)
                        .await?;
                }
                let container_id = self.runtime.create(&self.container_spec()).await?;
                self.handle.set_container(container_id.clone());
                self.runtime.start(&container_id).await?;
                let port = self
                    .runtime
                    .host_port(&container_id, self.spec.internal_port())
                    .await?;
                debug!(namespace = self.namespace(), container_id, port, "container started");
                Endpoint::new(self.config.host.clone(), port)
            }
        };

        let connection = self.connection_for(endpoint.clone());
        self.wait_ready(&connection).await?;
        for request in self.spec.init_requests(self.namespace()) {
            self.client.call(&connection, request).await?;
        }
        Ok(endpoint)
    }

    async fn wait_ready(&self, connection: &Connection) -> Result<(), ResourceError> {
        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if self.client.is_ready(connection).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ResourceError::Startup {
                    namespace: self.namespace().to_owned(),
                    reason: format!(
                        "{} not ready after {}s",
                        connection.endpoint,
                        self.config.startup_timeout.as_secs()
                    ),
                });
            }
            tokio::time::sleep(READINESS_PROBE_INTERVAL).await;
        }
    }

    fn require_family(&self, family: BackendFamily, operation: &str) -> Result<(), ResourceError> {
        if self.spec.family() == family {
            Ok(())
        } else {
            Err(ResourceError::Unsupported {
                backend: self.spec.name().to_owned(),
                operation: operation.to_owned(),
            })
        }
    }

    fn reserve(&self, resource: &ResourceRef) -> Result<(), ResourceError> {
        let mut resources = self.lock_resources();
        if resources.iter().any(|r| r.name == resource.name) {
            return Err(ResourceError::AlreadyExists {
                namespace: self.namespace().to_owned(),
                name: resource.name.clone(),
            });
        }
        resources.push(resource.clone());
        Ok(())
    }

    fn release(&self, resource: &ResourceRef) {
        self.lock_resources().retain(|r| r.name != resource.name);
    }

    /// 이름 있는 하위 리소스를 생성합니다. 필요하면 백엔드를 기동합니다.
    ///
    /// # Errors
    ///
    /// - `Config`: 비어 있거나 허용되지 않는 이름, 또는 백엔드 계열이 지원하지 않는 정의
    /// - `AlreadyExists`: 이 매니저가 이미 같은 이름을 생성함
    /// - `Startup` / `Backend`: 백엔드에 연결할 수 없거나 요청이 거부됨
    pub async fn create(
        &self,
        name: &str,
        definition: ResourceDefinition,
    ) -> Result<ResourceRef, ResourceError> {
        if name.trim().is_empty() {
            return Err(ResourceError::config("name", "must not be empty"));
        }
        self.spec
            .naming()
            .validate(name)
            .map_err(|reason| ResourceError::config("name", reason))?;

        let namespace = self.namespace();
        let kind = definition.kind();
        let request = self.spec.create_request(namespace, name, &definition)?;
        let connection = self.connection().await?;

        let resource = ResourceRef {
            name: name.to_owned(),
            qualified_name: self.spec.qualified_name(namespace, kind, name),
            kind,
        };
        self.reserve(&resource)?;

        if let Err(e) = self.client.call(&connection, request).await {
            self.release(&resource);
            return Err(e);
        }

        metrics::counter!(m::RESOURCES_CREATED_TOTAL, m::LABEL_BACKEND => self.spec.name())
            .increment(1);
        info!(
            namespace,
            resource = %resource.qualified_name,
            kind = %kind,
            "created resource"
        );
        Ok(resource)
    }

    /// 테이블을 생성합니다.
    pub async fn create_table(
        &self,
        name: &str,
        schema: TableSchema,
    ) -> Result<ResourceRef, ResourceError> {
        self.create(name, ResourceDefinition::Table(schema)).await
    }

    /// 토픽을 생성합니다.
    pub async fn create_topic(&self, name: &str) -> Result<ResourceRef, ResourceError> {
        self.create(name, ResourceDefinition::Topic).await
    }

    /// `topic`에 구독을 생성합니다.
    pub async fn create_subscription(
        &self,
        topic: &ResourceRef,
        name: &str,
    ) -> Result<ResourceRef, ResourceError> {
        if topic.kind != ResourceKind::Topic {
            return Err(ResourceError::config(
                "topic",
                format!("'{}' is a {}, not a topic", topic.name, topic.kind),
            ));
        }
        self.create(
            name,
            ResourceDefinition::Subscription {
                topic: topic.clone(),
            },
        )
        .await
    }

    /// 행을 반환하는 문장을 실행합니다.
    pub async fn query(&self, statement: &str) -> Result<Vec<Row>, ResourceError> {
        self.require_family(BackendFamily::Sql, "query")?;
        let connection = self.connection().await?;
        self.client
            .call(
                &connection,
                BackendRequest::Query {
                    statement: statement.to_owned(),
                },
            )
            .await?
            .into_rows("query")
    }

    /// 문장을 실행하고 영향받은 행 수를 반환합니다.
    pub async fn execute(&self, statement: &str) -> Result<u64, ResourceError> {
        self.require_family(BackendFamily::Sql, "execute")?;
        let connection = self.connection().await?;
        self.client
            .call(
                &connection,
                BackendRequest::Execute {
                    statement: statement.to_owned(),
                },
            )
            .await?
            .into_affected("execute")
    }

    /// 방언별 행 제한 쿼리로 `table`의 첫 행을 읽습니다.
    pub async fn first_row(&self, table: &str) -> Result<Option<Row>, ResourceError> {
        let statement = self.spec.first_row_query(table)?;
        Ok(self.query(&statement).await?.into_iter().next())
    }

    /// `rows`를 `table`에 삽입하고 기록된 행 수를 반환합니다.
    pub async fn write(&self, table: &str, rows: &[Row]) -> Result<u64, ResourceError> {
        let statements = rows
            .iter()
            .map(|row| self.spec.insert_statement(table, row))
            .collect::<Result<Vec<_>, _>>()?;

        let mut written = 0;
        for statement in &statements {
            written += self.execute(statement).await?;
        }
        debug!(namespace = self.namespace(), table, written, "rows written");
        Ok(written)
    }

    /// `table`의 모든 행을 읽습니다.
    pub async fn read_table(&self, table: &str) -> Result<Vec<Row>, ResourceError> {
        let statement = self.spec.select_all_query(table)?;
        self.query(&statement).await
    }

    /// `table`의 행 수를 셉니다.
    pub async fn row_count(&self, table: &str) -> Result<u64, ResourceError> {
        let statement = self.spec.count_query(table)?;
        let rows = self.query(&statement).await?;
        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().next())
            .ok_or_else(|| ResourceError::backend("row_count", "empty result"))?;
        match &value {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| ResourceError::backend("row_count", format!("not a count: {value}")))
    }

    /// `topic`에 메시지 하나를 발행하고 메시지 ID를 반환합니다.
    pub async fn publish(
        &self,
        topic: &str,
        attributes: std::collections::BTreeMap<String, String>,
        data: Bytes,
    ) -> Result<String, ResourceError> {
        self.require_family(BackendFamily::Messaging, "publish")?;
        let connection = self.connection().await?;
        let topic = self
            .spec
            .qualified_name(self.namespace(), ResourceKind::Topic, topic);
        self.client
            .call(
                &connection,
                BackendRequest::Publish {
                    topic,
                    attributes,
                    data,
                },
            )
            .await?
            .into_message_id("publish")
    }

    /// `subscription`에서 최대 `max_messages`개를 pull 하고 ack 합니다.
    pub async fn pull(
        &self,
        subscription: &str,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, ResourceError> {
        self.require_family(BackendFamily::Messaging, "pull")?;
        if max_messages == 0 {
            return Err(ResourceError::config("max_messages", "must be greater than 0"));
        }
        let connection = self.connection().await?;
        let subscription =
            self.spec
                .qualified_name(self.namespace(), ResourceKind::Subscription, subscription);
        self.client
            .call(
                &connection,
                BackendRequest::Pull {
                    subscription,
                    max_messages,
                },
            )
            .await?
            .into_messages("pull")
    }

    /// 생성한 하위 리소스를 drop 한 뒤 백엔드를 중지하고 제거합니다.
    ///
    /// 하위 리소스 drop 실패는 로그와 메트릭으로만 남기고 반환하지 않습니다.
    /// 기동한 적 없거나 이미 정지된 매니저에서는 아무것도 하지 않습니다.
    pub async fn cleanup(&self) -> Result<(), ResourceError> {
        let _gate = self.startup.lock().await;
        let namespace = self.namespace();
        let backend = self.spec.name();

        let state = self.handle.backing_state();
        if matches!(state, BackingState::Uninitialized | BackingState::Stopped) {
            debug!(namespace, %state, "nothing to clean up");
            return Ok(());
        }
        info!(backend, namespace, %state, "cleaning up");

        if let Ok(endpoint) = self.handle.endpoint() {
            self.drop_resources(&self.connection_for(endpoint)).await;
        }

        if let Some(container_id) = self.handle.container_id() {
            if let Err(e) = self.runtime.stop_and_remove(&container_id).await {
                self.handle.mark_failed();
                metrics::counter!(m::RESOURCES_CLEANUP_FAILURES_TOTAL, m::LABEL_BACKEND => backend)
                    .increment(1);
                error!(namespace, container_id, error = %e, "failed to remove container");
                return Err(ResourceError::Cleanup {
                    namespace: namespace.to_owned(),
                    reason: e.to_string(),
                });
            }
        }

        self.handle.mark_stopped();
        info!(backend, namespace, "cleanup complete");
        Ok(())
    }

    async fn drop_resources(&self, connection: &Connection) {
        let resources = std::mem::take(&mut *self.lock_resources());
        for resource in resources.iter().rev() {
            let request = self.spec.drop_request(resource);
            match self.client.call(connection, request).await {
                Ok(_) => debug!(
                    namespace = self.namespace(),
                    resource = %resource.qualified_name,
                    "dropped resource"
                ),
                Err(e) => {
                    metrics::counter!(
                        m::RESOURCES_CLEANUP_FAILURES_TOTAL,
                        m::LABEL_BACKEND => self.spec.name()
                    )
                    .increment(1);
                    warn!(
                        namespace = self.namespace(),
                        resource = %resource.qualified_name,
                        error = %e,
                        "failed to drop resource, continuing"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackendClient;
    use crate::docker::MockContainerRuntime;
    use crate::specialization::{Oracle, PubSubEmulator};
    use serde_json::json;

    type OracleManager = ResourceManager<Oracle, MockContainerRuntime, MockBackendClient>;

    fn oracle_manager(
        runtime: MockContainerRuntime,
        client: MockBackendClient,
    ) -> (OracleManager, Arc<MockContainerRuntime>, Arc<MockBackendClient>) {
        let runtime = Arc::new(runtime);
        let client = Arc::new(client);
        let config = ResourceManagerConfig::builder("orders-it")
            .build(&Oracle)
            .unwrap();
        let manager = ResourceManager::new(Oracle, config, Arc::clone(&runtime), Arc::clone(&client));
        (manager, runtime, client)
    }

    fn schema() -> TableSchema {
        TableSchema::builder()
            .column("id", "NUMBER")
            .column("name", "VARCHAR2(100)")
            .primary_key("id")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn connection_info_before_access_is_not_ready() {
        let (manager, runtime, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        let err = manager.connection_info().unwrap_err();
        assert!(matches!(
            err,
            ResourceError::NotReady {
                state: BackingState::Uninitialized,
                ..
            }
        ));
        assert_eq!(runtime.start_count(), 0);
    }

    #[tokio::test]
    async fn create_starts_backend_and_exposes_uri() {
        let (manager, runtime, client) = oracle_manager(
            MockContainerRuntime::new().with_mapped_port(32771),
            MockBackendClient::new(),
        );
        let table = manager.create_table("orders", schema()).await.unwrap();
        assert_eq!(table.kind, ResourceKind::Table);
        assert_eq!(manager.backing_state(), BackingState::Running);
        assert_eq!(runtime.start_count(), 1);

        let uri = manager.connection_info().unwrap();
        assert_eq!(
            uri,
            format!("jdbc:oracle:thin:@localhost:32771/{}", manager.namespace())
        );
        assert!(matches!(
            client.recorded().last(),
            Some(BackendRequest::Execute { statement }) if statement.starts_with("CREATE TABLE orders")
        ));
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let (manager, _, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        manager.create_table("orders", schema()).await.unwrap();
        let err = manager.create_table("orders", schema()).await.unwrap_err();
        assert!(matches!(err, ResourceError::AlreadyExists { ref name, .. } if name == "orders"));
        assert_eq!(manager.resources().len(), 1);
    }

    #[tokio::test]
    async fn failed_create_releases_name() {
        let (manager, _, _) = oracle_manager(
            MockContainerRuntime::new(),
            MockBackendClient::new().with_failing("execute"),
        );
        assert!(manager.create_table("orders", schema()).await.is_err());
        assert!(manager.resources().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_empty_name_and_wrong_family() {
        let (manager, runtime, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        assert!(matches!(
            manager.create_table("", schema()).await.unwrap_err(),
            ResourceError::Config { .. }
        ));
        assert!(matches!(
            manager.create_topic("events").await.unwrap_err(),
            ResourceError::Config { .. }
        ));
        // 백엔드 기동 전에 거부됨
        assert_eq!(runtime.start_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_starts_once() {
        let (manager, runtime, _) = oracle_manager(
            MockContainerRuntime::new().with_start_delay(Duration::from_millis(50)),
            MockBackendClient::new(),
        );
        let manager = Arc::new(manager);

        let tasks = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.ensure_running().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(runtime.start_count(), 1);
    }

    #[tokio::test]
    async fn start_failure_marks_failed() {
        let (manager, _, _) = oracle_manager(
            MockContainerRuntime::new().with_failing_start(),
            MockBackendClient::new(),
        );
        let err = manager.ensure_running().await.unwrap_err();
        assert!(matches!(err, ResourceError::Startup { .. }));
        assert_eq!(manager.backing_state(), BackingState::Failed);

        // 재기동 시도 없음
        let err = manager.ensure_running().await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::NotReady {
                state: BackingState::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn container_that_failed_to_start_is_removed_by_cleanup() {
        let (manager, runtime, _) = oracle_manager(
            MockContainerRuntime::new().with_failing_start(),
            MockBackendClient::new(),
        );
        assert!(manager.ensure_running().await.is_err());
        assert_eq!(runtime.create_count(), 1);
        assert_eq!(manager.backing_state(), BackingState::Failed);

        manager.cleanup().await.unwrap();
        assert_eq!(runtime.removal_count(), 1);
        assert_eq!(runtime.removed_ids(), vec![format!("{:012x}", 1)]);
        assert_eq!(manager.backing_state(), BackingState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connection_info_during_cleanup_is_uri_or_not_ready() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (manager, runtime, _) = oracle_manager(
            MockContainerRuntime::new().with_mapped_port(32771),
            MockBackendClient::new(),
        );
        manager.create_table("orders", schema()).await.unwrap();
        let expected = manager.connection_info().unwrap();
        let manager = Arc::new(manager);
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let manager = Arc::clone(&manager);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut reads = 0usize;
                while !done.load(Ordering::SeqCst) || reads == 0 {
                    match manager.connection_info() {
                        Ok(uri) => assert_eq!(uri, expected),
                        Err(ResourceError::NotReady { .. }) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                    reads += 1;
                }
                reads
            })
        };

        manager.cleanup().await.unwrap();
        manager.cleanup().await.unwrap();
        done.store(true, Ordering::SeqCst);

        assert!(reader.join().unwrap() > 0);
        assert_eq!(runtime.removal_count(), 1);
        assert_eq!(manager.backing_state(), BackingState::Stopped);
        assert!(matches!(
            manager.connection_info(),
            Err(ResourceError::NotReady {
                state: BackingState::Stopped,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_timeout_fails_startup() {
        let runtime = Arc::new(MockContainerRuntime::new());
        let client = Arc::new(MockBackendClient::new().with_not_ready_probes(usize::MAX));
        let config = ResourceManagerConfig::builder("it")
            .startup_timeout(Duration::from_secs(5))
            .build(&Oracle)
            .unwrap();
        let manager = ResourceManager::new(Oracle, config, runtime, client);
        let err = manager.ensure_running().await.unwrap_err();
        assert!(err.to_string().contains("not ready after 5s"));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_waits_for_backend() {
        let (manager, _, _) = oracle_manager(
            MockContainerRuntime::new(),
            MockBackendClient::new().with_not_ready_probes(3),
        );
        manager.ensure_running().await.unwrap();
        assert_eq!(manager.backing_state(), BackingState::Running);
    }

    #[tokio::test]
    async fn endpoint_override_skips_container() {
        let runtime = Arc::new(MockContainerRuntime::new());
        let client = Arc::new(MockBackendClient::new());
        let config = ResourceManagerConfig::builder("it")
            .endpoint_override(Endpoint::new("db.internal", 1521))
            .build(&Oracle)
            .unwrap();
        let manager = ResourceManager::new(Oracle, config, Arc::clone(&runtime), client);
        assert_eq!(
            manager.ensure_running().await.unwrap(),
            Endpoint::new("db.internal", 1521)
        );
        assert_eq!(runtime.start_count(), 0);

        manager.cleanup().await.unwrap();
        assert_eq!(runtime.removal_count(), 0);
        assert_eq!(manager.backing_state(), BackingState::Stopped);
    }

    #[tokio::test]
    async fn cleanup_twice_is_cleanup_once() {
        let (manager, runtime, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        manager.create_table("orders", schema()).await.unwrap();

        manager.cleanup().await.unwrap();
        manager.cleanup().await.unwrap();
        assert_eq!(runtime.removal_count(), 1);
        assert_eq!(manager.backing_state(), BackingState::Stopped);
        assert!(manager.connection_info().is_err());
    }

    #[tokio::test]
    async fn cleanup_of_unstarted_manager_is_noop() {
        let (manager, runtime, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        manager.cleanup().await.unwrap();
        assert_eq!(runtime.removal_count(), 0);
        assert_eq!(manager.backing_state(), BackingState::Uninitialized);
    }

    #[tokio::test]
    async fn cleanup_drops_resources_in_reverse_and_ignores_drop_failures() {
        let (manager, runtime, client) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        manager.create_table("first", schema()).await.unwrap();
        manager.create_table("second", schema()).await.unwrap();
        manager.cleanup().await.unwrap();

        let drops = client
            .recorded()
            .into_iter()
            .filter_map(|r| match r {
                BackendRequest::Execute { statement } if statement.starts_with("DROP") => {
                    Some(statement)
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(drops, vec!["DROP TABLE second", "DROP TABLE first"]);
        assert_eq!(runtime.removal_count(), 1);
    }

    #[tokio::test]
    async fn failed_teardown_is_retried_by_next_cleanup() {
        let (manager, runtime, _) = oracle_manager(
            MockContainerRuntime::new().with_failing_remove(),
            MockBackendClient::new(),
        );
        manager.ensure_running().await.unwrap();

        let err = manager.cleanup().await.unwrap_err();
        assert!(matches!(err, ResourceError::Cleanup { .. }));
        assert_eq!(manager.backing_state(), BackingState::Failed);

        runtime.set_fail_remove(false);
        manager.cleanup().await.unwrap();
        assert_eq!(manager.backing_state(), BackingState::Stopped);
        assert_eq!(runtime.removal_count(), 2);
    }

    #[tokio::test]
    async fn first_row_uses_dialect_query() {
        let row: Row = [("id".to_owned(), json!(1))].into_iter().collect();
        let (manager, _, client) = oracle_manager(
            MockContainerRuntime::new(),
            MockBackendClient::new().with_rows(vec![row.clone()]),
        );
        assert_eq!(manager.first_row("orders").await.unwrap(), Some(row));
        assert!(client.recorded().contains(&BackendRequest::Query {
            statement: "SELECT * FROM orders WHERE ROWNUM <= 1".to_owned()
        }));
    }

    #[tokio::test]
    async fn write_and_count_rows() {
        let count: Row = [("COUNT(*)".to_owned(), json!(2))].into_iter().collect();
        let (manager, _, client) = oracle_manager(
            MockContainerRuntime::new(),
            MockBackendClient::new().with_rows(vec![count]),
        );
        let rows = vec![
            [("id".to_owned(), json!(1))].into_iter().collect::<Row>(),
            [("id".to_owned(), json!(2))].into_iter().collect::<Row>(),
        ];
        assert_eq!(manager.write("orders", &rows).await.unwrap(), 2);
        assert_eq!(manager.row_count("orders").await.unwrap(), 2);
        assert!(client.recorded().contains(&BackendRequest::Query {
            statement: "SELECT COUNT(*) FROM orders".to_owned()
        }));
    }

    #[tokio::test]
    async fn messaging_operations_on_sql_backend_are_unsupported() {
        let (manager, _, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        let err = manager
            .publish("events", Default::default(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn pubsub_publish_and_pull_use_qualified_names() {
        let runtime = Arc::new(MockContainerRuntime::new());
        let client = Arc::new(MockBackendClient::new());
        let config = ResourceManagerConfig::builder("pubsub-it")
            .namespace("pubsub-it-project")
            .build(&PubSubEmulator)
            .unwrap();
        let manager = ResourceManager::new(PubSubEmulator, config, runtime, Arc::clone(&client));

        let topic = manager.create_topic("input").await.unwrap();
        assert_eq!(topic.qualified_name, "projects/pubsub-it-project/topics/input");
        let sub = manager.create_subscription(&topic, "input-sub").await.unwrap();
        assert_eq!(
            sub.qualified_name,
            "projects/pubsub-it-project/subscriptions/input-sub"
        );

        let id = manager
            .publish("input", Default::default(), Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(id, "1");
        assert!(manager.pull("input-sub", 10).await.unwrap().is_empty());
        assert!(manager.pull("input-sub", 0).await.is_err());

        assert!(client.recorded().contains(&BackendRequest::Pull {
            subscription: "projects/pubsub-it-project/subscriptions/input-sub".to_owned(),
            max_messages: 10,
        }));
    }

    #[tokio::test]
    async fn subscription_requires_topic_ref() {
        let (manager, _, _) = oracle_manager(MockContainerRuntime::new(), MockBackendClient::new());
        let table = ResourceRef {
            name: "orders".to_owned(),
            qualified_name: "orders".to_owned(),
            kind: ResourceKind::Table,
        };
        assert!(manager.create_subscription(&table, "sub").await.is_err());
    }
}
