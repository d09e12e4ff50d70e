#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ResourceError`, `CleanupFailure`)
//! - [`config`]: Manager configuration (`ResourceManagerConfig`, builder, `Credentials`)
//! - [`naming`]: Collision-resistant names (`NamingConvention`)
//! - [`docker`]: Container runtime abstraction (`ContainerRuntime` trait, `BollardContainerRuntime`)
//! - [`backend`]: Backend protocol boundary (`BackendClient` trait, requests, rows, messages)
//! - [`specialization`]: Per-backend bundles (`Oracle`, `Postgres`, `MySql`, `SqlServer`, `PubSubEmulator`)
//! - [`handle`]: Resource handle state (`ResourceHandle`, `ResourceRef`)
//! - [`manager`]: Generic lifecycle manager (`ResourceManager`)
//! - [`cleanup`]: Cleanup dispatcher (`clean_resources`, `ResourceRegistry`)
//!
//! # Architecture
//!
//! ```text
//! test ──create()/query()/publish()──> ResourceManager<S, R, C>
//!                                          |        |        |
//!                               Specialization  ContainerRuntime  BackendClient
//!                                 (what to say)  (start/stop)     (call)
//!
//! test teardown ──> ResourceRegistry.clean_all() ──> cleanup() on every manager
//! ```

pub mod backend;
pub mod cleanup;
pub mod config;
pub mod docker;
pub mod error;
pub mod handle;
pub mod manager;
pub mod naming;
pub mod specialization;

// --- Public API Re-exports ---

// Manager
pub use manager::ResourceManager;

// Configuration
pub use config::{Credentials, ResourceManagerConfig, ResourceManagerConfigBuilder};

// Error
pub use error::{CleanupFailure, ResourceError};

// Handle
pub use handle::{ResourceHandle, ResourceRef};

// Container runtime
pub use docker::{BollardContainerRuntime, ContainerRuntime, ContainerSpec};

// Backend protocol
pub use backend::{
    BackendClient, BackendRequest, BackendResponse, Connection, ReceivedMessage, Row,
};

// Specializations
pub use specialization::{
    BackendFamily, MySql, Oracle, Postgres, PubSubEmulator, ResourceDefinition, ResourceKind,
    Specialization, SqlServer, TableSchema,
};

// Naming
pub use naming::NamingConvention;

// Cleanup
pub use cleanup::{DynManagedResource, ManagedResource, ResourceRegistry, clean_resources};
