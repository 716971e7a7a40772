//! Resource-tree builder, method configurator and stage deployer
//!
//! [`ApiGateway`] holds the current REST API and walks its resource tree.
//! Each node it hands out is an [`ApiResource`] on which methods and
//! integrations are configured. Publishing snapshots the API into a
//! deployment and points a stage at it.
//!
//! ```no_run
//! use apigw_forge_builder::{ApiGateway, IntegrationOptions, IntegrationTarget, MethodOptions, PublishRequest};
//! use apigw_forge_common::HttpVerb;
//! use apigw_forge_control::InMemoryControlPlane;
//! use std::rc::Rc;
//!
//! # fn main() -> apigw_forge_common::Result<()> {
//! let control = Rc::new(InMemoryControlPlane::new("us-east-1"));
//! let mut gateway = ApiGateway::new(control, "us-east-1");
//! gateway.create_api("jobs-api", "Job tracking")?;
//!
//! let root = gateway.root_resource()?;
//! let mut jobs = gateway.ensure_child(&root, "jobs")?;
//! jobs.add_method(HttpVerb::Get, MethodOptions::default())?;
//! jobs.add_integration(HttpVerb::Get, IntegrationTarget::mock(), &IntegrationOptions::new())?;
//!
//! let outcome = gateway.publish(&PublishRequest::new("dev"))?;
//! println!("{}", outcome.url);
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod deployer;
pub mod gateway;
pub mod iam;
pub mod integrations;
pub mod options;
pub mod resource;
pub mod templates;

pub use apply::{apply_blueprint, AppliedResource, ApplyReport};
pub use deployer::{endpoint_url, publish, PublishRequest, DEFAULT_DEPLOYMENT_DESCRIPTION};
pub use gateway::{join_path, path_segments, validate_path_part, ApiGateway};
pub use iam::{
    data_store_policy, logging_policy, policy_arn, trust_policy, ProvisionedPolicy,
    ProvisionedRole, RoleProvisioner, API_GATEWAY_PRINCIPAL,
};
pub use integrations::{
    data_store_action_uri, data_store_integration, key_expression, key_parameter,
    lambda_proxy_target, lambda_proxy_uri, CrudAction,
};
pub use options::{wire_name, IntegrationOptions, TranslatedOptions, OPTION_NAMES};
pub use resource::{
    ApiResource, IntegrationTarget, MethodOptions, DEFAULT_CONTENT_TYPE, DEFAULT_STATUS_CODE,
};
pub use templates::{load_templates, render_request_template, MappingContext};
