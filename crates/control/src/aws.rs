//! AWS SDK backed control plane
//!
//! The SDK is async; this backend owns a current-thread runtime and blocks on
//! every call so the builder stays a plain sequential program.

use crate::errors::sdk_error;
use crate::{
    GatewayControl, IdentityControl, PutIntegrationRequest, PutIntegrationResponseRequest,
    PutMethodRequest, ResourcePage,
};
use apigw_forge_common::{
    AuthorizationType, Deployment, EndpointType, ForgeError, HttpVerb, ManagedPolicy,
    MethodConfig, ResourceRecord, RestApi, Result, Role, Stage,
};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_apigateway::primitives::DateTime;
use aws_sdk_apigateway::types as gw;
use std::collections::{BTreeMap, HashMap};
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Largest page the resource listing accepts
const RESOURCE_PAGE_LIMIT: i32 = 500;

/// Control plane backed by the AWS SDK for Rust
pub struct AwsControlPlane {
    runtime: Runtime,
    gateway: aws_sdk_apigateway::Client,
    iam: aws_sdk_iam::Client,
    region: String,
}

impl AwsControlPlane {
    /// Load credentials from the default provider chain (optionally a named
    /// profile) and build clients for `region`
    pub fn connect(region: &str, profile: Option<&str>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = runtime.block_on(loader.load());

        info!(region, profile = ?profile, "connected to AWS control plane");

        Ok(Self {
            gateway: aws_sdk_apigateway::Client::new(&config),
            iam: aws_sdk_iam::Client::new(&config),
            runtime,
            region: region.to_string(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn rest_api(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<RestApi> {
        let id = required(id, "rest api id")?;
        Ok(RestApi {
            id: id.to_string(),
            name: name.unwrap_or_default().to_string(),
            description: description.map(str::to_string),
            region: self.region.clone(),
        })
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        ForgeError::remote("decode_response", what, "field missing from service response")
    })
}

fn to_hash_map<V: Clone>(map: &BTreeMap<String, V>) -> Option<HashMap<String, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn resource_record(resource: &gw::Resource) -> Result<ResourceRecord> {
    let id = required(resource.id(), "resource id")?;

    let mut methods = BTreeMap::new();
    if let Some(remote_methods) = resource.resource_methods() {
        for (name, method) in remote_methods {
            let Ok(verb) = name.parse::<HttpVerb>() else {
                debug!(resource = id, method = %name, "skipping unrecognised method");
                continue;
            };
            let authorization_type = method
                .authorization_type()
                .and_then(|a| a.parse::<AuthorizationType>().ok())
                .unwrap_or_default();
            let request_parameters = method
                .request_parameters()
                .map(|params| params.iter().map(|(k, v)| (k.clone(), *v)).collect())
                .unwrap_or_default();

            methods.insert(
                verb,
                MethodConfig {
                    verb,
                    authorization_type,
                    request_parameters,
                    integration: None,
                },
            );
        }
    }

    // Only the root may default to "/"; the builder fills in child paths
    let path = match (resource.path(), resource.parent_id()) {
        (Some(path), _) => path,
        (None, None) => "/",
        (None, Some(_)) => "",
    };

    Ok(ResourceRecord {
        id: id.to_string(),
        parent_id: resource.parent_id().map(str::to_string),
        path_part: resource.path_part().map(str::to_string),
        path: path.to_string(),
        methods,
    })
}

fn deployment(
    id: Option<&str>,
    description: Option<&str>,
    created: Option<&DateTime>,
) -> Result<Deployment> {
    Ok(Deployment {
        id: required(id, "deployment id")?.to_string(),
        description: description.map(str::to_string),
        created_at: created
            .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), d.subsec_nanos())),
    })
}

fn stage(
    name: Option<&str>,
    fallback: &str,
    description: Option<&str>,
    deployment_id: Option<&str>,
) -> Stage {
    Stage {
        name: name.unwrap_or(fallback).to_string(),
        description: description.map(str::to_string),
        deployment_id: deployment_id.unwrap_or_default().to_string(),
    }
}

impl GatewayControl for AwsControlPlane {
    fn create_rest_api(
        &self,
        name: &str,
        description: &str,
        endpoint_type: EndpointType,
    ) -> Result<RestApi> {
        let endpoint = gw::EndpointConfiguration::builder()
            .types(gw::EndpointType::from(endpoint_type.as_str()))
            .build();

        let output = self
            .runtime
            .block_on(
                self.gateway
                    .create_rest_api()
                    .name(name)
                    .description(description)
                    .endpoint_configuration(endpoint)
                    .send(),
            )
            .map_err(|e| sdk_error("create_rest_api", name, e))?;

        self.rest_api(output.id(), output.name(), output.description())
    }

    fn get_rest_api(&self, api_id: &str) -> Result<RestApi> {
        let output = self
            .runtime
            .block_on(self.gateway.get_rest_api().rest_api_id(api_id).send())
            .map_err(|e| sdk_error("get_rest_api", api_id, e))?;

        self.rest_api(output.id(), output.name(), output.description())
    }

    fn get_resources(&self, api_id: &str, position: Option<String>) -> Result<ResourcePage> {
        let output = self
            .runtime
            .block_on(
                self.gateway
                    .get_resources()
                    .rest_api_id(api_id)
                    .limit(RESOURCE_PAGE_LIMIT)
                    .embed("methods")
                    .set_position(position)
                    .send(),
            )
            .map_err(|e| sdk_error("get_resources", api_id, e))?;

        let items = output
            .items()
            .iter()
            .map(resource_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(ResourcePage {
            items,
            position: output.position().map(str::to_string),
        })
    }

    fn create_resource(
        &self,
        api_id: &str,
        parent_id: &str,
        path_part: &str,
    ) -> Result<ResourceRecord> {
        let output = self
            .runtime
            .block_on(
                self.gateway
                    .create_resource()
                    .rest_api_id(api_id)
                    .parent_id(parent_id)
                    .path_part(path_part)
                    .send(),
            )
            .map_err(|e| sdk_error("create_resource", path_part, e))?;

        Ok(ResourceRecord {
            id: required(output.id(), "resource id")?.to_string(),
            parent_id: Some(output.parent_id().unwrap_or(parent_id).to_string()),
            path_part: Some(output.path_part().unwrap_or(path_part).to_string()),
            path: output.path().unwrap_or_default().to_string(),
            methods: BTreeMap::new(),
        })
    }

    fn put_method(&self, request: &PutMethodRequest) -> Result<()> {
        let target = format!("{} {}", request.http_method, request.resource_id);
        self.runtime
            .block_on(
                self.gateway
                    .put_method()
                    .rest_api_id(&request.rest_api_id)
                    .resource_id(&request.resource_id)
                    .http_method(request.http_method.as_str())
                    .authorization_type(request.authorization_type.as_str())
                    .set_request_parameters(to_hash_map(&request.request_parameters))
                    .send(),
            )
            .map_err(|e| sdk_error("put_method", &target, e))?;
        Ok(())
    }

    fn put_method_response(
        &self,
        api_id: &str,
        resource_id: &str,
        verb: HttpVerb,
        status_code: &str,
    ) -> Result<()> {
        let target = format!("{} {}", verb, resource_id);
        self.runtime
            .block_on(
                self.gateway
                    .put_method_response()
                    .rest_api_id(api_id)
                    .resource_id(resource_id)
                    .http_method(verb.as_str())
                    .status_code(status_code)
                    .send(),
            )
            .map_err(|e| sdk_error("put_method_response", &target, e))?;
        Ok(())
    }

    fn put_integration(&self, request: &PutIntegrationRequest) -> Result<()> {
        let target = format!("{} {}", request.http_method, request.resource_id);
        let integration = &request.integration;

        let timeout = integration
            .timeout_millis
            .map(i32::try_from)
            .transpose()
            .map_err(|_| ForgeError::InvalidInput("timeoutInMillis is out of range".to_string()))?;

        let mut call = self
            .gateway
            .put_integration()
            .rest_api_id(&request.rest_api_id)
            .resource_id(&request.resource_id)
            .http_method(request.http_method.as_str())
            .r#type(gw::IntegrationType::from(integration.integration_type.as_str()))
            .set_integration_http_method(integration.backend_verb.map(|v| v.as_str().to_string()))
            .set_uri(integration.uri.clone())
            .set_credentials(integration.credentials.clone())
            .set_request_templates(to_hash_map(&integration.request_templates))
            .set_request_parameters(to_hash_map(&integration.request_parameters))
            .set_passthrough_behavior(
                integration.passthrough_behavior.map(|p| p.as_str().to_string()),
            )
            .set_timeout_in_millis(timeout)
            .set_connection_type(
                integration
                    .connection_type
                    .map(|c| gw::ConnectionType::from(c.as_str())),
            )
            .set_connection_id(integration.connection_id.clone())
            .set_cache_namespace(integration.cache_namespace.clone())
            .set_content_handling(
                integration
                    .content_handling
                    .map(|c| gw::ContentHandlingStrategy::from(c.as_str())),
            );

        if !integration.cache_key_parameters.is_empty() {
            call = call.set_cache_key_parameters(Some(integration.cache_key_parameters.clone()));
        }
        if let Some(tls) = integration.tls_config {
            call = call.tls_config(
                gw::TlsConfig::builder()
                    .insecure_skip_verification(tls.insecure_skip_verification)
                    .build(),
            );
        }

        self.runtime
            .block_on(call.send())
            .map_err(|e| sdk_error("put_integration", &target, e))?;
        Ok(())
    }

    fn put_integration_response(&self, request: &PutIntegrationResponseRequest) -> Result<()> {
        let target = format!("{} {}", request.http_method, request.resource_id);
        self.runtime
            .block_on(
                self.gateway
                    .put_integration_response()
                    .rest_api_id(&request.rest_api_id)
                    .resource_id(&request.resource_id)
                    .http_method(request.http_method.as_str())
                    .status_code(&request.status_code)
                    .set_response_templates(to_hash_map(&request.response_templates))
                    .send(),
            )
            .map_err(|e| sdk_error("put_integration_response", &target, e))?;
        Ok(())
    }

    fn create_deployment(&self, api_id: &str, description: &str) -> Result<Deployment> {
        let output = self
            .runtime
            .block_on(
                self.gateway
                    .create_deployment()
                    .rest_api_id(api_id)
                    .description(description)
                    .send(),
            )
            .map_err(|e| sdk_error("create_deployment", api_id, e))?;

        deployment(output.id(), output.description(), output.created_date())
    }

    fn get_stage(&self, api_id: &str, stage_name: &str) -> Result<Option<Stage>> {
        let result = self.runtime.block_on(
            self.gateway
                .get_stage()
                .rest_api_id(api_id)
                .stage_name(stage_name)
                .send(),
        );

        match result {
            Ok(output) => Ok(Some(stage(
                output.stage_name(),
                stage_name,
                output.description(),
                output.deployment_id(),
            ))),
            Err(e) => match sdk_error("get_stage", stage_name, e) {
                err if err.is_not_found() => Ok(None),
                err => Err(err),
            },
        }
    }

    fn create_stage(
        &self,
        api_id: &str,
        stage_name: &str,
        description: &str,
        deployment_id: &str,
    ) -> Result<Stage> {
        let output = self
            .runtime
            .block_on(
                self.gateway
                    .create_stage()
                    .rest_api_id(api_id)
                    .stage_name(stage_name)
                    .description(description)
                    .deployment_id(deployment_id)
                    .send(),
            )
            .map_err(|e| sdk_error("create_stage", stage_name, e))?;

        Ok(stage(
            output.stage_name(),
            stage_name,
            output.description(),
            output.deployment_id(),
        ))
    }

    fn update_stage_deployment(
        &self,
        api_id: &str,
        stage_name: &str,
        deployment_id: &str,
    ) -> Result<Stage> {
        let patch = gw::PatchOperation::builder()
            .op(gw::Op::Replace)
            .path("/deploymentId")
            .value(deployment_id)
            .build();

        let output = self
            .runtime
            .block_on(
                self.gateway
                    .update_stage()
                    .rest_api_id(api_id)
                    .stage_name(stage_name)
                    .patch_operations(patch)
                    .send(),
            )
            .map_err(|e| sdk_error("update_stage", stage_name, e))?;

        Ok(stage(
            output.stage_name(),
            stage_name,
            output.description(),
            output.deployment_id(),
        ))
    }
}

impl IdentityControl for AwsControlPlane {
    fn get_role(&self, role_name: &str) -> Result<Option<Role>> {
        let result = self
            .runtime
            .block_on(self.iam.get_role().role_name(role_name).send());

        match result {
            Ok(output) => Ok(output.role().map(|role| Role {
                name: role.role_name().to_string(),
                arn: role.arn().to_string(),
            })),
            Err(e) => match sdk_error("get_role", role_name, e) {
                err if err.is_not_found() => Ok(None),
                err => Err(err),
            },
        }
    }

    fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<Role> {
        let output = self
            .runtime
            .block_on(
                self.iam
                    .create_role()
                    .role_name(role_name)
                    .assume_role_policy_document(trust_policy)
                    .send(),
            )
            .map_err(|e| sdk_error("create_role", role_name, e))?;

        let role = output.role().ok_or_else(|| {
            ForgeError::remote("create_role", role_name, "role missing from service response")
        })?;

        Ok(Role {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<()> {
        self.runtime
            .block_on(
                self.iam
                    .put_role_policy()
                    .role_name(role_name)
                    .policy_name(policy_name)
                    .policy_document(policy_document)
                    .send(),
            )
            .map_err(|e| {
                sdk_error("put_role_policy", &format!("{}/{}", role_name, policy_name), e)
            })?;
        Ok(())
    }

    fn get_policy(&self, policy_arn: &str) -> Result<Option<ManagedPolicy>> {
        let result = self
            .runtime
            .block_on(self.iam.get_policy().policy_arn(policy_arn).send());

        match result {
            Ok(output) => Ok(output.policy().map(|policy| ManagedPolicy {
                name: policy.policy_name().unwrap_or_default().to_string(),
                arn: policy.arn().unwrap_or(policy_arn).to_string(),
            })),
            Err(e) => match sdk_error("get_policy", policy_arn, e) {
                err if err.is_not_found() => Ok(None),
                err => Err(err),
            },
        }
    }

    fn create_policy(&self, policy_name: &str, policy_document: &str) -> Result<ManagedPolicy> {
        let output = self
            .runtime
            .block_on(
                self.iam
                    .create_policy()
                    .policy_name(policy_name)
                    .policy_document(policy_document)
                    .send(),
            )
            .map_err(|e| sdk_error("create_policy", policy_name, e))?;

        let policy = output.policy().ok_or_else(|| {
            ForgeError::remote("create_policy", policy_name, "policy missing from service response")
        })?;

        Ok(ManagedPolicy {
            name: policy.policy_name().unwrap_or(policy_name).to_string(),
            arn: required(policy.arn(), "policy arn")?.to_string(),
        })
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.runtime
            .block_on(
                self.iam
                    .attach_role_policy()
                    .role_name(role_name)
                    .policy_arn(policy_arn)
                    .send(),
            )
            .map_err(|e| sdk_error("attach_role_policy", role_name, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_without_path_is_not_root() {
        let resource = gw::Resource::builder()
            .id("res-jobs")
            .parent_id("root")
            .path_part("jobs")
            .build();

        let record = resource_record(&resource).unwrap();
        assert_eq!(record.path, "");
        assert!(!record.is_root());
        assert!(record.is_child_of("root", "jobs"));
    }

    #[test]
    fn test_root_without_path_defaults_to_slash() {
        let resource = gw::Resource::builder().id("root").build();

        let record = resource_record(&resource).unwrap();
        assert!(record.is_root());
    }

    #[test]
    fn test_embedded_methods_are_mapped() {
        let method = gw::Method::builder()
            .http_method("GET")
            .authorization_type("AWS_IAM")
            .build();
        let resource = gw::Resource::builder()
            .id("res-jobs")
            .parent_id("root")
            .path_part("jobs")
            .path("/jobs")
            .resource_methods("GET", method)
            .build();

        let record = resource_record(&resource).unwrap();
        assert_eq!(record.path, "/jobs");
        assert_eq!(
            record.methods[&HttpVerb::Get].authorization_type,
            AuthorizationType::AwsIam
        );
    }
}
