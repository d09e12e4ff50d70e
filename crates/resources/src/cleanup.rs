//! 정리 디스패처
//!
//! 테스트가 어떻게 끝나든 모든 리소스 매니저를 정리합니다.
//! 개별 정리 실패가 나머지 리소스의 정리를 막지 않으며,
//! 실패는 하나의 [`ResourceError::CleanupFailed`]로 모아 반환합니다.
//!
//! # 사용 예시
//! ```ignore
//! let mut registry = ResourceRegistry::new();
//! registry.register(Arc::clone(&oracle));
//! registry.register(Arc::clone(&pubsub));
//!
//! // ... 테스트 본문 ...
//!
//! registry.clean_all().await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::docker::ContainerRuntime;
use crate::error::{CleanupFailure, ResourceError};
use crate::manager::ResourceManager;
use crate::specialization::Specialization;

/// `Send` boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 정리 대상 리소스
pub trait ManagedResource: Send + Sync {
    /// 로그와 에러에 쓰이는 레이블
    fn label(&self) -> String;

    /// 리소스를 정리합니다. 두 번 호출해도 안전해야 합니다.
    fn cleanup(&self) -> impl Future<Output = Result<(), ResourceError>> + Send;
}

/// dyn-compatible [`ManagedResource`]
///
/// `BoxFuture`를 반환하여 서로 다른 매니저 타입을
/// `Vec<Arc<dyn DynManagedResource>>`로 함께 관리할 수 있게 합니다.
pub trait DynManagedResource: Send + Sync {
    /// 로그와 에러에 쓰이는 레이블
    fn label(&self) -> String;

    /// 리소스를 정리합니다.
    fn cleanup(&self) -> BoxFuture<'_, Result<(), ResourceError>>;
}

/// ManagedResource를 구현한 타입은 자동으로 DynManagedResource도 구현됩니다.
impl<T: ManagedResource> DynManagedResource for T {
    fn label(&self) -> String {
        ManagedResource::label(self)
    }

    fn cleanup(&self) -> BoxFuture<'_, Result<(), ResourceError>> {
        Box::pin(ManagedResource::cleanup(self))
    }
}

impl<S, R, C> ManagedResource for ResourceManager<S, R, C>
where
    S: Specialization,
    R: ContainerRuntime,
    C: BackendClient,
{
    fn label(&self) -> String {
        self.namespace().to_owned()
    }

    fn cleanup(&self) -> impl Future<Output = Result<(), ResourceError>> + Send {
        ResourceManager::cleanup(self)
    }
}

/// 모든 리소스를 순서대로 정리합니다.
///
/// 각 리소스는 정확히 한 번 시도되며, 실패해도 다음 리소스로 계속 진행합니다.
/// 실패가 있으면 시도 순서대로 모은 `CleanupFailed`를 반환합니다.
pub async fn clean_resources(resources: &[&dyn DynManagedResource]) -> Result<(), ResourceError> {
    let mut failures = Vec::new();
    for resource in resources {
        if let Err(e) = resource.cleanup().await {
            let label = resource.label();
            warn!(resource = %label, error = %e, "cleanup failed, continuing with remaining resources");
            failures.push(CleanupFailure {
                resource: label,
                reason: e.to_string(),
            });
        }
    }

    if failures.is_empty() {
        info!(count = resources.len(), "all resources cleaned up");
        Ok(())
    } else {
        Err(ResourceError::CleanupFailed { failures })
    }
}

/// 테스트 중 생성된 리소스 매니저 레지스트리
///
/// 등록 순서가 보존되며, `clean_all`은 등록 순서대로 정리한 뒤 레지스트리를 비웁니다.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<Arc<dyn DynManagedResource>>,
}

impl ResourceRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 리소스를 등록합니다.
    pub fn register<T: DynManagedResource + 'static>(&mut self, resource: Arc<T>) {
        self.resources.push(resource);
    }

    /// 등록된 리소스 수
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// 등록 순서대로의 레이블
    pub fn labels(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.label()).collect()
    }

    /// 등록된 모든 리소스를 정리하고 레지스트리를 비웁니다.
    pub async fn clean_all(&mut self) -> Result<(), ResourceError> {
        let resources = std::mem::take(&mut self.resources);
        let refs = resources.iter().map(|r| r.as_ref()).collect::<Vec<_>>();
        clean_resources(&refs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeResource {
        label: &'static str,
        fail: bool,
        attempts: AtomicUsize,
    }

    impl FakeResource {
        fn new(label: &'static str, fail: bool) -> Self {
            Self {
                label,
                fail,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl ManagedResource for FakeResource {
        fn label(&self) -> String {
            self.label.to_owned()
        }

        async fn cleanup(&self) -> Result<(), ResourceError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResourceError::Cleanup {
                    namespace: self.label.to_owned(),
                    reason: "container stuck".to_owned(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_list_is_ok() {
        clean_resources(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn every_resource_gets_exactly_one_attempt() {
        let a = FakeResource::new("a", true);
        let b = FakeResource::new("b", false);
        let c = FakeResource::new("c", true);

        let resources: [&dyn DynManagedResource; 3] = [&a, &b, &c];
        let err = clean_resources(&resources).await.unwrap_err();
        for r in [&a, &b, &c] {
            assert_eq!(r.attempts.load(Ordering::SeqCst), 1, "{}", r.label);
        }
        match err {
            ResourceError::CleanupFailed { failures } => {
                let labels = failures.iter().map(|f| f.resource.as_str()).collect::<Vec<_>>();
                assert_eq!(labels, vec!["a", "c"]);
                assert!(failures[0].reason.contains("container stuck"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn all_succeeding_is_ok() {
        let a = FakeResource::new("a", false);
        let b = FakeResource::new("b", false);
        let resources: [&dyn DynManagedResource; 2] = [&a, &b];
        clean_resources(&resources).await.unwrap();
    }

    #[tokio::test]
    async fn registry_cleans_in_order_and_empties() {
        let a = Arc::new(FakeResource::new("a", false));
        let b = Arc::new(FakeResource::new("b", true));

        let mut registry = ResourceRegistry::new();
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.labels(), vec!["a", "b"]);

        let err = registry.clean_all().await.unwrap_err();
        assert!(err.to_string().contains("1 resource(s)"));
        assert!(registry.is_empty());
        assert_eq!(a.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(b.attempts.load(Ordering::SeqCst), 1);

        // a second pass has nothing left to do
        registry.clean_all().await.unwrap();
        assert_eq!(b.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn manager_failure_does_not_block_the_next_manager() {
        use crate::backend::MockBackendClient;
        use crate::config::ResourceManagerConfig;
        use crate::docker::MockContainerRuntime;
        use crate::specialization::{Oracle, PubSubEmulator};
        use flowbed_core::types::BackingState;

        let failing_runtime = Arc::new(MockContainerRuntime::new().with_failing_remove());
        let runtime = Arc::new(MockContainerRuntime::new());
        let client = Arc::new(MockBackendClient::new());

        let oracle = Arc::new(ResourceManager::new(
            Oracle,
            ResourceManagerConfig::builder("it").build(&Oracle).unwrap(),
            Arc::clone(&failing_runtime),
            Arc::clone(&client),
        ));
        let pubsub = Arc::new(ResourceManager::new(
            PubSubEmulator,
            ResourceManagerConfig::builder("it")
                .build(&PubSubEmulator)
                .unwrap(),
            Arc::clone(&runtime),
            Arc::clone(&client),
        ));
        oracle.ensure_running().await.unwrap();
        pubsub.ensure_running().await.unwrap();

        let mut registry = ResourceRegistry::new();
        registry.register(Arc::clone(&oracle));
        registry.register(Arc::clone(&pubsub));

        let err = registry.clean_all().await.unwrap_err();
        match err {
            ResourceError::CleanupFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].resource, oracle.namespace());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(oracle.backing_state(), BackingState::Failed);
        assert_eq!(pubsub.backing_state(), BackingState::Stopped);
    }
}
