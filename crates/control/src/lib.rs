//! Control-plane access for API Gateway and IAM
//!
//! The builder never talks to a provider SDK directly. It goes through the two
//! traits defined here, which mirror the control-plane operations one to one:
//!
//! - [`GatewayControl`]: REST APIs, resources, methods, integrations,
//!   deployments and stages
//! - [`IdentityControl`]: roles, inline role policies and managed policies
//!
//! Two backends implement both traits:
//! - [`AwsControlPlane`] drives the AWS SDK for Rust, blocking on each call
//! - [`InMemoryControlPlane`] keeps everything in process; it enforces the same
//!   uniqueness rules as the service and journals every call (dry runs, tests)

mod aws;
mod errors;
mod memory;

pub use aws::AwsControlPlane;
pub use errors::{categorize_error_code, ErrorCategory};
pub use memory::{InMemoryControlPlane, RecordedCall, MEMORY_ACCOUNT_ID};

use apigw_forge_common::{
    AuthorizationType, Deployment, EndpointType, HttpVerb, IntegrationConfig, ManagedPolicy,
    ResourceRecord, RestApi, Result, Role, Stage,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// One page of a resource listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePage {
    pub items: Vec<ResourceRecord>,
    /// Opaque cursor for the next page, `None` on the last page
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutMethodRequest {
    pub rest_api_id: String,
    pub resource_id: String,
    pub http_method: HttpVerb,
    pub authorization_type: AuthorizationType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub request_parameters: BTreeMap<String, bool>,
}

/// Wire shape of a put-integration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutIntegrationRequest {
    pub rest_api_id: String,
    pub resource_id: String,
    pub http_method: HttpVerb,
    #[serde(flatten)]
    pub integration: IntegrationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutIntegrationResponseRequest {
    pub rest_api_id: String,
    pub resource_id: String,
    pub http_method: HttpVerb,
    pub status_code: String,
    pub response_templates: BTreeMap<String, String>,
}

/// API Gateway (REST) control-plane operations
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait GatewayControl {
    fn create_rest_api(
        &self,
        name: &str,
        description: &str,
        endpoint_type: EndpointType,
    ) -> Result<RestApi>;

    fn get_rest_api(&self, api_id: &str) -> Result<RestApi>;

    /// List one page of resources, including their configured methods
    fn get_resources(&self, api_id: &str, position: Option<String>) -> Result<ResourcePage>;

    /// Create `path_part` under `parent_id`; fails if that pair already exists
    fn create_resource(&self, api_id: &str, parent_id: &str, path_part: &str)
        -> Result<ResourceRecord>;

    fn put_method(&self, request: &PutMethodRequest) -> Result<()>;

    fn put_method_response(
        &self,
        api_id: &str,
        resource_id: &str,
        verb: HttpVerb,
        status_code: &str,
    ) -> Result<()>;

    fn put_integration(&self, request: &PutIntegrationRequest) -> Result<()>;

    fn put_integration_response(&self, request: &PutIntegrationResponseRequest) -> Result<()>;

    fn create_deployment(&self, api_id: &str, description: &str) -> Result<Deployment>;

    /// Direct lookup; `Ok(None)` when the stage does not exist
    fn get_stage(&self, api_id: &str, stage_name: &str) -> Result<Option<Stage>>;

    fn create_stage(
        &self,
        api_id: &str,
        stage_name: &str,
        description: &str,
        deployment_id: &str,
    ) -> Result<Stage>;

    /// Repoint an existing stage, leaving every other attribute untouched
    fn update_stage_deployment(
        &self,
        api_id: &str,
        stage_name: &str,
        deployment_id: &str,
    ) -> Result<Stage>;
}

/// IAM control-plane operations
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait IdentityControl {
    /// `Ok(None)` when no role has that name
    fn get_role(&self, role_name: &str) -> Result<Option<Role>>;

    fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<Role>;

    /// Create or replace an inline policy on a role
    fn put_role_policy(&self, role_name: &str, policy_name: &str, policy_document: &str)
        -> Result<()>;

    fn get_policy(&self, policy_arn: &str) -> Result<Option<ManagedPolicy>>;

    fn create_policy(&self, policy_name: &str, policy_document: &str) -> Result<ManagedPolicy>;

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;
}
