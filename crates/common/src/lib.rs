//! Common types and utilities for apigw-forge
//!
//! This crate contains the data model shared by the control-plane backends, the
//! builder and the CLI, together with the error type, the layered settings and
//! the YAML blueprint format.

pub mod blueprint;
pub mod model;
pub mod settings;

pub use blueprint::{
    ApiBlueprint, ApiSection, IntegrationBlueprint, MethodBlueprint, ResourceBlueprint,
    StageBlueprint,
};
pub use model::{
    AuthorizationType, ConnectionType, ContentHandling, Deployment, EndpointType, HttpVerb,
    IntegrationConfig, IntegrationType, ManagedPolicy, MethodConfig, PassthroughBehavior,
    PublishOutcome, ResourceRecord, RestApi, Role, Stage, TlsConfig,
};
pub use settings::{DataStoreSettings, ForgeSettings, RoleSettings};

use thiserror::Error;

/// Errors that can occur while building or publishing an API
#[derive(Error, Debug)]
pub enum ForgeError {
    /// An operation needed state that has not been established yet
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Method {method} not found on resource {path}")]
    MethodNotFound { method: String, path: String },

    #[error("{operation} failed: {target} not found")]
    NotFound { operation: String, target: String },

    #[error("{operation} failed: {target} already exists ({message})")]
    AlreadyExists {
        operation: String,
        target: String,
        message: String,
    },

    #[error("{operation} failed for {target}: {message}")]
    Remote {
        operation: String,
        target: String,
        message: String,
    },

    /// The deployment was created but no stage points at it
    #[error("Deployment {deployment_id} was created but stage '{stage}' could not be updated: {source}")]
    OrphanedDeployment {
        deployment_id: String,
        stage: String,
        #[source]
        source: Box<ForgeError>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ForgeError {
    /// Build a remote-call failure naming the operation and its target
    pub fn remote(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ForgeError::Remote {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, target: impl Into<String>) -> Self {
        ForgeError::NotFound {
            operation: operation.into(),
            target: target.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ForgeError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ForgeError::AlreadyExists { .. })
    }
}

/// Result type for apigw-forge operations
pub type Result<T> = std::result::Result<T, ForgeError>;
