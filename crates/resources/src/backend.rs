//! Backend client boundary.
//!
//! Everything a resource manager says to a running backend goes through a
//! single [`BackendClient::call`] RPC. The request set is small on purpose:
//! SQL backends only see `Execute`/`Query`, messaging backends only see the
//! topic, subscription, publish and pull requests. Which request a manager
//! builds for a given operation is decided by its specialization.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use flowbed_core::types::Endpoint;

use crate::config::Credentials;
use crate::error::ResourceError;

/// One result row, keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

/// A message pulled from a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    /// Backend-assigned message id.
    pub message_id: String,
    /// Message attributes.
    pub attributes: BTreeMap<String, String>,
    /// Payload.
    pub data: Bytes,
    /// Time the backend accepted the message.
    pub publish_time: SystemTime,
}

/// Request sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    /// Runs a statement that returns no rows.
    Execute { statement: String },
    /// Runs a statement that returns rows.
    Query { statement: String },
    /// Creates a topic (fully qualified name).
    CreateTopic { topic: String },
    /// Deletes a topic.
    DeleteTopic { topic: String },
    /// Creates a subscription attached to `topic`.
    CreateSubscription { topic: String, subscription: String },
    /// Deletes a subscription.
    DeleteSubscription { subscription: String },
    /// Publishes one message.
    Publish {
        topic: String,
        attributes: BTreeMap<String, String>,
        data: Bytes,
    },
    /// Pulls up to `max_messages` messages and acknowledges them.
    Pull {
        subscription: String,
        max_messages: usize,
    },
}

impl BackendRequest {
    /// Operation name used in errors and logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Execute { .. } => "execute",
            Self::Query { .. } => "query",
            Self::CreateTopic { .. } => "create_topic",
            Self::DeleteTopic { .. } => "delete_topic",
            Self::CreateSubscription { .. } => "create_subscription",
            Self::DeleteSubscription { .. } => "delete_subscription",
            Self::Publish { .. } => "publish",
            Self::Pull { .. } => "pull",
        }
    }
}

/// Response returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// Number of affected rows.
    Affected(u64),
    /// Query result.
    Rows(Vec<Row>),
    /// Id of a published message.
    Published { message_id: String },
    /// Pulled messages.
    Messages(Vec<ReceivedMessage>),
    /// Request succeeded with nothing to report.
    Done,
}

impl BackendResponse {
    fn kind(&self) -> &'static str {
        match self {
            Self::Affected(_) => "affected",
            Self::Rows(_) => "rows",
            Self::Published { .. } => "published",
            Self::Messages(_) => "messages",
            Self::Done => "done",
        }
    }

    /// Extracts rows, failing on any other response.
    pub fn into_rows(self, operation: &str) -> Result<Vec<Row>, ResourceError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            other => Err(unexpected(operation, &other)),
        }
    }

    /// Extracts the affected-row count. `Done` counts as zero.
    pub fn into_affected(self, operation: &str) -> Result<u64, ResourceError> {
        match self {
            Self::Affected(n) => Ok(n),
            Self::Done => Ok(0),
            other => Err(unexpected(operation, &other)),
        }
    }

    /// Extracts the published message id.
    pub fn into_message_id(self, operation: &str) -> Result<String, ResourceError> {
        match self {
            Self::Published { message_id } => Ok(message_id),
            other => Err(unexpected(operation, &other)),
        }
    }

    /// Extracts pulled messages.
    pub fn into_messages(self, operation: &str) -> Result<Vec<ReceivedMessage>, ResourceError> {
        match self {
            Self::Messages(messages) => Ok(messages),
            other => Err(unexpected(operation, &other)),
        }
    }
}

fn unexpected(operation: &str, response: &BackendResponse) -> ResourceError {
    ResourceError::backend(
        operation,
        format!("unexpected '{}' response", response.kind()),
    )
}

/// How to reach a running backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Connection URI built by the specialization.
    pub uri: String,
    /// Resolved host and port.
    pub endpoint: Endpoint,
    /// Database or project.
    pub namespace: String,
    /// Credentials.
    pub credentials: Credentials,
}

/// Trait abstracting the backend protocol.
///
/// Implementations translate [`BackendRequest`]s into whatever the backend
/// speaks (JDBC, HTTP, gRPC). The trait is `Send + Sync + 'static`, allowing
/// one client to serve every manager of a test binary.
pub trait BackendClient: Send + Sync + 'static {
    /// Executes one request against the backend at `connection`.
    fn call(
        &self,
        connection: &Connection,
        request: BackendRequest,
    ) -> impl Future<Output = Result<BackendResponse, ResourceError>> + Send;

    /// Returns true once the backend accepts connections.
    ///
    /// The default probes a TCP connection to the endpoint.
    fn is_ready(&self, connection: &Connection) -> impl Future<Output = bool> + Send {
        let endpoint = connection.endpoint.clone();
        async move {
            let address = (endpoint.host.as_str(), endpoint.port);
            matches!(
                tokio::time::timeout(
                    Duration::from_secs(2),
                    tokio::net::TcpStream::connect(address)
                )
                .await,
                Ok(Ok(_))
            )
        }
    }
}

/// 테스트용 Mock 백엔드 클라이언트
///
/// 요청을 기록하고, 쿼리/풀 응답은 미리 설정한 값을 돌려줍니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockBackendClient {
    /// 기록된 요청
    pub requests: std::sync::Mutex<Vec<BackendRequest>>,
    /// Query 요청에 돌려줄 행
    pub rows: Vec<Row>,
    /// Pull 요청에 돌려줄 메시지
    pub messages: Vec<ReceivedMessage>,
    /// 이 연산 이름의 요청은 실패
    pub failing_operation: Option<&'static str>,
    /// is_ready 가 true 를 돌려주기 전 false 횟수
    pub not_ready_probes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockBackendClient {
    /// 빈 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// Query 응답 행을 설정합니다.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Pull 응답 메시지를 설정합니다.
    pub fn with_messages(mut self, messages: Vec<ReceivedMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// 특정 연산이 실패하도록 설정합니다.
    pub fn with_failing(mut self, operation: &'static str) -> Self {
        self.failing_operation = Some(operation);
        self
    }

    /// 처음 `probes`번의 is_ready 호출은 false 를 돌려줍니다.
    pub fn with_not_ready_probes(self, probes: usize) -> Self {
        self.not_ready_probes
            .store(probes, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// 기록된 요청의 복사본
    pub fn recorded(&self) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
impl BackendClient for MockBackendClient {
    async fn call(
        &self,
        _connection: &Connection,
        request: BackendRequest,
    ) -> Result<BackendResponse, ResourceError> {
        let operation = request.operation();
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.clone());
        if self.failing_operation == Some(operation) {
            return Err(ResourceError::backend(operation, "mock failure"));
        }
        Ok(match request {
            BackendRequest::Query { .. } => BackendResponse::Rows(self.rows.clone()),
            BackendRequest::Execute { .. } => BackendResponse::Affected(1),
            BackendRequest::Publish { .. } => BackendResponse::Published {
                message_id: "1".to_owned(),
            },
            BackendRequest::Pull { max_messages, .. } => BackendResponse::Messages(
                self.messages.iter().take(max_messages).cloned().collect(),
            ),
            _ => BackendResponse::Done,
        })
    }

    async fn is_ready(&self, _connection: &Connection) -> bool {
        use std::sync::atomic::Ordering;
        self.not_ready_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}
