//! Data model for REST APIs, resources, methods, integrations and stages
//!
//! Every entity here is a local snapshot of state owned by the remote control
//! plane. Ids are assigned remotely and never invented locally.

use crate::{ForgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Declares an enum whose variants map 1:1 to the provider's wire strings.
///
/// Parsing is case-insensitive and accepts `-` in place of `_`.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $wire:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String")]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire representation used by the control plane
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ForgeError;

            fn from_str(s: &str) -> Result<Self> {
                let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
                match normalized.as_str() {
                    $($wire $(| $alias)* => Ok($name::$variant),)+
                    _ => Err(ForgeError::InvalidInput(format!(
                        "unknown {} '{}' (expected one of: {})",
                        stringify!($name),
                        s,
                        [$($wire),+].join(", ")
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ForgeError;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }
    };
}

wire_enum! {
    /// HTTP verb of a method, `ANY` being the provider's catch-all
    HttpVerb {
        Get => "GET",
        Post => "POST",
        Put => "PUT",
        Delete => "DELETE",
        Patch => "PATCH",
        Head => "HEAD",
        Options => "OPTIONS",
        Any => "ANY",
    }
}

wire_enum! {
    AuthorizationType {
        None => "NONE",
        AwsIam => "AWS_IAM",
        Custom => "CUSTOM",
        CognitoUserPools => "COGNITO_USER_POOLS" | "COGNITO",
    }
}

wire_enum! {
    /// Backend integration kind
    IntegrationType {
        Mock => "MOCK",
        Aws => "AWS",
        AwsProxy => "AWS_PROXY",
        Http => "HTTP",
        HttpProxy => "HTTP_PROXY",
    }
}

wire_enum! {
    PassthroughBehavior {
        WhenNoMatch => "WHEN_NO_MATCH",
        WhenNoTemplates => "WHEN_NO_TEMPLATES",
        Never => "NEVER",
    }
}

wire_enum! {
    ContentHandling {
        ConvertToBinary => "CONVERT_TO_BINARY",
        ConvertToText => "CONVERT_TO_TEXT",
    }
}

wire_enum! {
    ConnectionType {
        Internet => "INTERNET",
        VpcLink => "VPC_LINK",
    }
}

wire_enum! {
    EndpointType {
        Regional => "REGIONAL",
        Edge => "EDGE",
        Private => "PRIVATE",
    }
}

impl Default for AuthorizationType {
    fn default() -> Self {
        AuthorizationType::None
    }
}

impl Default for EndpointType {
    fn default() -> Self {
        EndpointType::Regional
    }
}

/// A REST API as known to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApi {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub region: String,
}

/// Snapshot of a remote resource record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    /// `None` only for the root resource
    pub parent_id: Option<String>,
    pub path_part: Option<String>,
    pub path: String,
    /// Methods the control plane reported for this resource
    #[serde(default)]
    pub methods: BTreeMap<HttpVerb, MethodConfig>,
}

impl ResourceRecord {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.path == "/"
    }

    /// Whether this record is the `path_part` child of `parent_id`
    pub fn is_child_of(&self, parent_id: &str, path_part: &str) -> bool {
        self.parent_id.as_deref() == Some(parent_id) && self.path_part.as_deref() == Some(path_part)
    }
}

/// A verb configured on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodConfig {
    pub verb: HttpVerb,
    #[serde(default)]
    pub authorization_type: AuthorizationType,
    /// Parameter location key (e.g. `method.request.path.jobId`) to required flag
    #[serde(default)]
    pub request_parameters: BTreeMap<String, bool>,
    #[serde(default)]
    pub integration: Option<IntegrationConfig>,
}

impl MethodConfig {
    pub fn new(verb: HttpVerb) -> Self {
        Self {
            verb,
            authorization_type: AuthorizationType::None,
            request_parameters: BTreeMap::new(),
            integration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(alias = "insecure_skip_verification")]
    pub insecure_skip_verification: bool,
}

/// Backend integration bound to one verb of one resource
///
/// Serializes with the provider's camelCase field names, omitting unset fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    #[serde(rename = "integrationHttpMethod", skip_serializing_if = "Option::is_none")]
    pub backend_verb: Option<HttpVerb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Role ARN the control plane assumes when calling the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_templates: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passthrough_behavior: Option<PassthroughBehavior>,
    #[serde(rename = "timeoutInMillis", skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_key_parameters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_handling: Option<ContentHandling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,
    /// Templates of the default integration response, keyed by content type
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_templates: BTreeMap<String, String>,
}

impl IntegrationConfig {
    pub fn new(integration_type: IntegrationType) -> Self {
        Self {
            integration_type,
            backend_verb: None,
            uri: None,
            credentials: None,
            request_templates: BTreeMap::new(),
            request_parameters: BTreeMap::new(),
            passthrough_behavior: None,
            timeout_millis: None,
            connection_type: None,
            connection_id: None,
            cache_namespace: None,
            cache_key_parameters: Vec::new(),
            content_handling: None,
            tls_config: None,
            response_templates: BTreeMap::new(),
        }
    }
}

/// An immutable configuration snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A named pointer to a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub description: Option<String>,
    pub deployment_id: String,
}

/// Result of publishing an API to a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub deployment_id: String,
    pub stage_name: String,
    pub url: String,
    /// `false` when an existing stage was repointed
    pub stage_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedPolicy {
    pub name: String,
    pub arn: String,
}
