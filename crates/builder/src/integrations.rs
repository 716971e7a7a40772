//! Integration presets for common backends

use crate::options::IntegrationOptions;
use crate::resource::IntegrationTarget;
use crate::templates::{render_request_template, MappingContext};
use apigw_forge_common::{
    DataStoreSettings, ForgeError, HttpVerb, IntegrationType, PassthroughBehavior, Result,
};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

/// Lambda invocation API version used in proxy URIs
const LAMBDA_API_VERSION: &str = "2015-03-31";

/// Item operation against the backing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudAction {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl CrudAction {
    pub const ALL: &'static [CrudAction] = &[
        CrudAction::Create,
        CrudAction::Read,
        CrudAction::Update,
        CrudAction::Delete,
        CrudAction::List,
    ];

    /// Data-store action invoked by the integration
    pub fn data_store_action(&self) -> &'static str {
        match self {
            CrudAction::Create => "PutItem",
            CrudAction::Read => "GetItem",
            CrudAction::Update => "UpdateItem",
            CrudAction::Delete => "DeleteItem",
            CrudAction::List => "Scan",
        }
    }

    /// Verb conventionally exposed for this action
    pub fn default_verb(&self) -> HttpVerb {
        match self {
            CrudAction::Create => HttpVerb::Post,
            CrudAction::Read | CrudAction::List => HttpVerb::Get,
            CrudAction::Update => HttpVerb::Put,
            CrudAction::Delete => HttpVerb::Delete,
        }
    }
}

impl fmt::Display for CrudAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrudAction::Create => "create",
            CrudAction::Read => "read",
            CrudAction::Update => "update",
            CrudAction::Delete => "delete",
            CrudAction::List => "list",
        };
        f.write_str(name)
    }
}

impl FromStr for CrudAction {
    type Err = ForgeError;

    /// Accepts action names as well as the data-store action they map to
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "put" | "putitem" => Ok(CrudAction::Create),
            "read" | "get" | "getitem" => Ok(CrudAction::Read),
            "update" | "updateitem" => Ok(CrudAction::Update),
            "delete" | "deleteitem" => Ok(CrudAction::Delete),
            "list" | "scan" => Ok(CrudAction::List),
            _ => Err(ForgeError::InvalidInput(format!(
                "unknown action '{}' (expected create, read, update, delete or list)",
                s
            ))),
        }
    }
}

/// Integration URI invoking a Lambda function through the proxy integration
///
/// # Examples
/// ```
/// use apigw_forge_builder::lambda_proxy_uri;
///
/// let uri = lambda_proxy_uri(
///     "us-east-1",
///     "arn:aws:lambda:us-east-1:123456789012:function:hello",
/// );
/// assert_eq!(
///     uri,
///     "arn:aws:apigateway:us-east-1:lambda:path/2015-03-31/functions/\
///      arn:aws:lambda:us-east-1:123456789012:function:hello/invocations"
/// );
/// ```
pub fn lambda_proxy_uri(region: &str, function_arn: &str) -> String {
    format!(
        "arn:aws:apigateway:{}:lambda:path/{}/functions/{}/invocations",
        region, LAMBDA_API_VERSION, function_arn
    )
}

/// Target for a Lambda proxy integration
pub fn lambda_proxy_target(region: &str, function_arn: &str) -> IntegrationTarget {
    IntegrationTarget::new(IntegrationType::AwsProxy)
        .with_backend_verb(HttpVerb::Post)
        .with_uri(lambda_proxy_uri(region, function_arn))
}

/// Integration URI of a data-store action
pub fn data_store_action_uri(region: &str, action: CrudAction) -> String {
    format!(
        "arn:aws:apigateway:{}:dynamodb:action/{}",
        region,
        action.data_store_action()
    )
}

/// Name of the last `{param}` segment of `path`, if any
pub fn key_parameter(path: &str) -> Option<&str> {
    path.rsplit('/')
        .find_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| name.trim_end_matches('+'))
}

/// VTL expression reading the item key at request time
///
/// Taken from the path parameter when there is one, from the body otherwise.
pub fn key_expression(key_param: Option<&str>, key_attribute: &str) -> String {
    match key_param {
        Some(param) => format!("$input.params('{}')", param),
        None => format!("$input.path('$.{}')", key_attribute),
    }
}

/// Target and options of a data-store integration for `action` on `resource_path`
///
/// The control plane always calls the data store with `POST`, assuming
/// `role_arn`, and the request body is the rendered mapping template.
pub fn data_store_integration(
    region: &str,
    data_store: &DataStoreSettings,
    role_arn: &str,
    action: CrudAction,
    resource_path: &str,
) -> Result<(IntegrationTarget, IntegrationOptions)> {
    let context = MappingContext {
        table_name: data_store.table_name()?.to_string(),
        key_attribute: data_store.key_attribute.clone(),
        key_expression: key_expression(key_parameter(resource_path), &data_store.key_attribute),
        limit: None,
    };
    let template = render_request_template(action, &context)?;

    let target = IntegrationTarget::new(IntegrationType::Aws)
        .with_backend_verb(HttpVerb::Post)
        .with_uri(data_store_action_uri(region, action))
        .with_credentials(role_arn);

    let options = IntegrationOptions::new()
        .set("request_templates", json!({ "application/json": template }))
        .set(
            "passthrough_behavior",
            PassthroughBehavior::WhenNoTemplates.as_str(),
        );

    Ok((target, options))
}
