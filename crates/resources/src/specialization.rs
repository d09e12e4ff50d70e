//! 백엔드 특화 (strategy bundle)
//!
//! [`Specialization`]은 백엔드 기술 하나에 대한 선언적 묶음입니다.
//! 기본 이미지/태그/자격 증명, 내부 포트, URI 형식, 네이밍 규칙,
//! 컨테이너 환경변수, 그리고 SQL 방언별 쿼리 템플릿을 제공합니다.
//! 제네릭 [`ResourceManager`](crate::manager::ResourceManager)는 백엔드별 로직을
//! 직접 갖지 않고 모두 이 트레이트에 위임합니다.
//!
//! # 제공되는 특화
//!
//! | 특화 | 계열 | 포트 | URI |
//! |------|------|------|-----|
//! | [`Oracle`] | Sql | 1521 | `jdbc:oracle:thin:@host:port/ns` |
//! | [`Postgres`] | Sql | 5432 | `jdbc:postgresql://host:port/ns` |
//! | [`MySql`] | Sql | 3306 | `jdbc:mysql://host:port/ns` |
//! | [`SqlServer`] | Sql | 1433 | `jdbc:sqlserver://host:port;DatabaseName=ns` |
//! | [`PubSubEmulator`] | Messaging | 8085 | `http://host:port/projects/ns` |

use std::collections::BTreeSet;
use std::fmt;

use flowbed_core::types::Endpoint;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendRequest, Row};
use crate::config::Credentials;
use crate::error::ResourceError;
use crate::handle::ResourceRef;
use crate::naming::{NamingConvention, dns_label_char, sql_identifier_char};

/// 백엔드 계열
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendFamily {
    /// 관계형 데이터베이스
    Sql,
    /// 토픽/구독 기반 메시징
    Messaging,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql => write!(f, "sql"),
            Self::Messaging => write!(f, "messaging"),
        }
    }
}

/// 하위 리소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// 테이블
    Table,
    /// 토픽
    Topic,
    /// 구독
    Subscription,
}

impl ResourceKind {
    /// 이 종류를 지원하는 백엔드 계열
    pub fn family(self) -> BackendFamily {
        match self {
            Self::Table => BackendFamily::Sql,
            Self::Topic | Self::Subscription => BackendFamily::Messaging,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Topic => write!(f, "topic"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// 테이블 컬럼
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// 컬럼명
    pub name: String,
    /// 방언별 SQL 타입 (예: `NUMBER`, `VARCHAR2(100)`)
    pub sql_type: String,
}

/// 테이블 스키마
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// 선언 순서대로의 컬럼
    pub columns: Vec<Column>,
    /// 기본 키 컬럼
    pub primary_key: Option<String>,
}

impl TableSchema {
    /// 스키마 빌더를 생성합니다.
    pub fn builder() -> TableSchemaBuilder {
        TableSchemaBuilder::default()
    }
}

/// [`TableSchema`] 빌더
#[derive(Debug, Clone, Default)]
pub struct TableSchemaBuilder {
    columns: Vec<Column>,
    primary_key: Option<String>,
}

impl TableSchemaBuilder {
    /// 컬럼을 추가합니다.
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.columns.push(Column {
            name: name.into(),
            sql_type: sql_type.into(),
        });
        self
    }

    /// 기본 키를 설정합니다.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// 스키마를 검증하고 생성합니다.
    pub fn build(self) -> Result<TableSchema, ResourceError> {
        if self.columns.is_empty() {
            return Err(ResourceError::config("schema", "at least one column is required"));
        }
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if column.name.is_empty() || column.sql_type.is_empty() {
                return Err(ResourceError::config(
                    "schema",
                    "column name and type must not be empty",
                ));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ResourceError::config(
                    "schema",
                    format!("duplicate column '{}'", column.name),
                ));
            }
        }
        if let Some(pk) = &self.primary_key {
            if !seen.contains(pk.as_str()) {
                return Err(ResourceError::config(
                    "schema",
                    format!("primary key '{pk}' is not a column"),
                ));
            }
        }
        Ok(TableSchema {
            columns: self.columns,
            primary_key: self.primary_key,
        })
    }
}

/// 하위 리소스 정의
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDefinition {
    /// 스키마를 가진 테이블
    Table(TableSchema),
    /// 토픽
    Topic,
    /// 기존 토픽에 붙는 구독
    Subscription {
        /// 구독 대상 토픽
        topic: ResourceRef,
    },
}

impl ResourceDefinition {
    /// 정의가 만드는 리소스 종류
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Table(_) => ResourceKind::Table,
            Self::Topic => ResourceKind::Topic,
            Self::Subscription { .. } => ResourceKind::Subscription,
        }
    }
}

fn unsupported(backend: &str, operation: &str) -> ResourceError {
    ResourceError::Unsupported {
        backend: backend.to_owned(),
        operation: operation.to_owned(),
    }
}

/// 백엔드 특화 트레이트
///
/// 기본 구현은 계열(Sql / Messaging)별 공통 동작을 제공하며,
/// 각 특화는 방언 차이만 재정의합니다.
pub trait Specialization: Send + Sync + 'static {
    /// 백엔드 이름 (메트릭 레이블로도 사용)
    fn name(&self) -> &'static str;

    /// 백엔드 계열
    fn family(&self) -> BackendFamily;

    /// 기본 컨테이너 이미지
    fn default_image(&self) -> &'static str;

    /// 기본 이미지 태그
    fn default_tag(&self) -> &'static str;

    /// 기본 자격 증명
    fn default_credentials(&self) -> Credentials;

    /// 컨테이너 내부 포트
    fn internal_port(&self) -> u16;

    /// 접속 URI 접두어
    fn scheme(&self) -> &'static str;

    /// 식별자 규칙
    fn naming(&self) -> NamingConvention;

    /// 엔드포인트와 네임스페이스로 접속 URI 를 만듭니다.
    fn connection_uri(&self, endpoint: &Endpoint, namespace: &str) -> String;

    /// 컨테이너 환경변수 (`KEY=value`)
    fn container_env(&self, credentials: &Credentials, namespace: &str) -> Vec<String>;

    /// 컨테이너 명령 재정의
    fn container_cmd(&self, _namespace: &str) -> Option<Vec<String>> {
        None
    }

    /// 백엔드 준비 직후 한 번 실행할 요청
    fn init_requests(&self, _namespace: &str) -> Vec<BackendRequest> {
        Vec::new()
    }

    /// 백엔드가 인식하는 하위 리소스 이름
    fn qualified_name(&self, _namespace: &str, _kind: ResourceKind, name: &str) -> String {
        name.to_owned()
    }

    /// 첫 행 하나만 읽는 쿼리
    fn first_row_query(&self, _table: &str) -> Result<String, ResourceError> {
        Err(unsupported(self.name(), "first_row"))
    }

    /// 불리언 리터럴
    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    /// 하위 리소스 생성 요청
    fn create_request(
        &self,
        namespace: &str,
        name: &str,
        definition: &ResourceDefinition,
    ) -> Result<BackendRequest, ResourceError> {
        let kind = definition.kind();
        if kind.family() != self.family() {
            return Err(ResourceError::config(
                "definition",
                format!("{kind} resources are not supported by the {} backend", self.name()),
            ));
        }
        let qualified = self.qualified_name(namespace, kind, name);
        Ok(match definition {
            ResourceDefinition::Table(schema) => BackendRequest::Execute {
                statement: create_table_statement(&qualified, schema),
            },
            ResourceDefinition::Topic => BackendRequest::CreateTopic { topic: qualified },
            ResourceDefinition::Subscription { topic } => BackendRequest::CreateSubscription {
                topic: topic.qualified_name.clone(),
                subscription: qualified,
            },
        })
    }

    /// 하위 리소스 삭제 요청
    fn drop_request(&self, resource: &ResourceRef) -> BackendRequest {
        match resource.kind {
            ResourceKind::Table => BackendRequest::Execute {
                statement: format!("DROP TABLE {}", resource.qualified_name),
            },
            ResourceKind::Topic => BackendRequest::DeleteTopic {
                topic: resource.qualified_name.clone(),
            },
            ResourceKind::Subscription => BackendRequest::DeleteSubscription {
                subscription: resource.qualified_name.clone(),
            },
        }
    }

    /// 전체 행을 읽는 쿼리
    fn select_all_query(&self, table: &str) -> Result<String, ResourceError> {
        match self.family() {
            BackendFamily::Sql => Ok(format!("SELECT * FROM {table}")),
            BackendFamily::Messaging => Err(unsupported(self.name(), "read_table")),
        }
    }

    /// 행 수를 세는 쿼리
    fn count_query(&self, table: &str) -> Result<String, ResourceError> {
        match self.family() {
            BackendFamily::Sql => Ok(format!("SELECT COUNT(*) FROM {table}")),
            BackendFamily::Messaging => Err(unsupported(self.name(), "row_count")),
        }
    }

    /// 한 행을 삽입하는 문장
    fn insert_statement(&self, table: &str, row: &Row) -> Result<String, ResourceError> {
        if self.family() != BackendFamily::Sql {
            return Err(unsupported(self.name(), "write"));
        }
        if row.is_empty() {
            return Err(ResourceError::config("row", "must contain at least one column"));
        }
        let columns = row.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
        let values = row
            .values()
            .map(|value| sql_literal(value, |b| self.bool_literal(b)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("INSERT INTO {table} ({columns}) VALUES ({values})"))
    }
}

/// `CREATE TABLE` 문장을 생성합니다.
pub fn create_table_statement(table: &str, schema: &TableSchema) -> String {
    let mut parts = schema
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type))
        .collect::<Vec<_>>();
    if let Some(pk) = &schema.primary_key {
        parts.push(format!("PRIMARY KEY ({pk})"));
    }
    format!("CREATE TABLE {table} ({})", parts.join(", "))
}

/// JSON 값을 SQL 리터럴로 변환합니다.
pub fn sql_literal(value: &serde_json::Value, bool_literal: impl Fn(bool) -> &'static str) -> String {
    use serde_json::Value;

    match value {
        Value::Null => "NULL".to_owned(),
        Value::Bool(b) => bool_literal(*b).to_owned(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        nested @ (Value::Array(_) | Value::Object(_)) => quote(&nested.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

const fn sql_naming(max_len: usize) -> NamingConvention {
    NamingConvention {
        allowed: sql_identifier_char,
        replacement: '_',
        max_len,
        lowercase: true,
    }
}

// ─── Oracle ─────────────────────────────────────────────────────────

/// Oracle XE (`gvenzl/oracle-xe`)
#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle;

impl Specialization for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Sql
    }

    fn default_image(&self) -> &'static str {
        "gvenzl/oracle-xe"
    }

    fn default_tag(&self) -> &'static str {
        "21-slim-faststart"
    }

    // the image refuses to start without an application user
    fn default_credentials(&self) -> Credentials {
        Credentials::new("testUser", "testPassword")
    }

    fn internal_port(&self) -> u16 {
        1521
    }

    fn scheme(&self) -> &'static str {
        "jdbc:oracle:thin"
    }

    fn naming(&self) -> NamingConvention {
        sql_naming(30)
    }

    fn connection_uri(&self, endpoint: &Endpoint, namespace: &str) -> String {
        format!(
            "{}:@{}:{}/{namespace}",
            self.scheme(),
            endpoint.host,
            endpoint.port
        )
    }

    fn container_env(&self, credentials: &Credentials, namespace: &str) -> Vec<String> {
        vec![
            format!("ORACLE_PASSWORD={}", credentials.password),
            format!("APP_USER={}", credentials.username),
            format!("APP_USER_PASSWORD={}", credentials.password),
            format!("ORACLE_DATABASE={namespace}"),
        ]
    }

    fn first_row_query(&self, table: &str) -> Result<String, ResourceError> {
        Ok(format!("SELECT * FROM {table} WHERE ROWNUM <= 1"))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }
}

// ─── PostgreSQL ─────────────────────────────────────────────────────

/// PostgreSQL
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Specialization for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Sql
    }

    fn default_image(&self) -> &'static str {
        "postgres"
    }

    fn default_tag(&self) -> &'static str {
        "16-alpine"
    }

    fn default_credentials(&self) -> Credentials {
        Credentials::new("test", "test")
    }

    fn internal_port(&self) -> u16 {
        5432
    }

    fn scheme(&self) -> &'static str {
        "jdbc:postgresql"
    }

    fn naming(&self) -> NamingConvention {
        sql_naming(63)
    }

    fn connection_uri(&self, endpoint: &Endpoint, namespace: &str) -> String {
        format!("{}://{endpoint}/{namespace}", self.scheme())
    }

    fn container_env(&self, credentials: &Credentials, namespace: &str) -> Vec<String> {
        vec![
            format!("POSTGRES_USER={}", credentials.username),
            format!("POSTGRES_PASSWORD={}", credentials.password),
            format!("POSTGRES_DB={namespace}"),
        ]
    }

    fn first_row_query(&self, table: &str) -> Result<String, ResourceError> {
        Ok(format!("SELECT * FROM {table} LIMIT 1"))
    }
}

// ─── MySQL ──────────────────────────────────────────────────────────

/// MySQL
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Specialization for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Sql
    }

    fn default_image(&self) -> &'static str {
        "mysql"
    }

    fn default_tag(&self) -> &'static str {
        "8.0"
    }

    fn default_credentials(&self) -> Credentials {
        Credentials::new("test", "test")
    }

    fn internal_port(&self) -> u16 {
        3306
    }

    fn scheme(&self) -> &'static str {
        "jdbc:mysql"
    }

    fn naming(&self) -> NamingConvention {
        sql_naming(64)
    }

    fn connection_uri(&self, endpoint: &Endpoint, namespace: &str) -> String {
        format!("{}://{endpoint}/{namespace}", self.scheme())
    }

    fn container_env(&self, credentials: &Credentials, namespace: &str) -> Vec<String> {
        vec![
            format!("MYSQL_USER={}", credentials.username),
            format!("MYSQL_PASSWORD={}", credentials.password),
            format!("MYSQL_ROOT_PASSWORD={}", credentials.password),
            format!("MYSQL_DATABASE={namespace}"),
        ]
    }

    fn first_row_query(&self, table: &str) -> Result<String, ResourceError> {
        Ok(format!("SELECT * FROM {table} LIMIT 1"))
    }
}

// ─── SQL Server ─────────────────────────────────────────────────────

/// Microsoft SQL Server
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Specialization for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Sql
    }

    fn default_image(&self) -> &'static str {
        "mcr.microsoft.com/mssql/server"
    }

    fn default_tag(&self) -> &'static str {
        "2022-latest"
    }

    // the server enforces a password complexity policy for sa
    fn default_credentials(&self) -> Credentials {
        Credentials::new("sa", "A_Str0ng_Required_Password")
    }

    fn internal_port(&self) -> u16 {
        1433
    }

    fn scheme(&self) -> &'static str {
        "jdbc:sqlserver"
    }

    fn naming(&self) -> NamingConvention {
        sql_naming(128)
    }

    fn connection_uri(&self, endpoint: &Endpoint, namespace: &str) -> String {
        format!("{}://{endpoint};DatabaseName={namespace}", self.scheme())
    }

    fn container_env(&self, credentials: &Credentials, _namespace: &str) -> Vec<String> {
        vec![
            "ACCEPT_EULA=Y".to_owned(),
            format!("MSSQL_SA_PASSWORD={}", credentials.password),
        ]
    }

    // the image has no env var for an initial database
    fn init_requests(&self, namespace: &str) -> Vec<BackendRequest> {
        vec![BackendRequest::Execute {
            statement: format!("CREATE DATABASE {namespace}"),
        }]
    }

    fn first_row_query(&self, table: &str) -> Result<String, ResourceError> {
        Ok(format!("SELECT TOP 1 * FROM {table}"))
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }
}

// ─── Pub/Sub emulator ───────────────────────────────────────────────

/// Google Cloud Pub/Sub emulator
#[derive(Debug, Clone, Copy, Default)]
pub struct PubSubEmulator;

impl Specialization for PubSubEmulator {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Messaging
    }

    fn default_image(&self) -> &'static str {
        "gcr.io/google.com/cloudsdktool/google-cloud-cli"
    }

    fn default_tag(&self) -> &'static str {
        "emulators"
    }

    fn default_credentials(&self) -> Credentials {
        Credentials::new("", "")
    }

    fn internal_port(&self) -> u16 {
        8085
    }

    fn scheme(&self) -> &'static str {
        "http"
    }

    // project ids: lowercase letters, digits, hyphens, at most 30 chars
    fn naming(&self) -> NamingConvention {
        NamingConvention {
            allowed: dns_label_char,
            replacement: '-',
            max_len: 30,
            lowercase: true,
        }
    }

    fn connection_uri(&self, endpoint: &Endpoint, namespace: &str) -> String {
        format!("{}://{endpoint}/projects/{namespace}", self.scheme())
    }

    fn container_env(&self, _credentials: &Credentials, _namespace: &str) -> Vec<String> {
        Vec::new()
    }

    fn container_cmd(&self, namespace: &str) -> Option<Vec<String>> {
        Some(vec![
            "gcloud".to_owned(),
            "beta".to_owned(),
            "emulators".to_owned(),
            "pubsub".to_owned(),
            "start".to_owned(),
            format!("--host-port=0.0.0.0:{}", self.internal_port()),
            format!("--project={namespace}"),
        ])
    }

    fn qualified_name(&self, namespace: &str, kind: ResourceKind, name: &str) -> String {
        match kind {
            ResourceKind::Topic => format!("projects/{namespace}/topics/{name}"),
            ResourceKind::Subscription => format!("projects/{namespace}/subscriptions/{name}"),
            ResourceKind::Table => name.to_owned(),
        }
    }
}
