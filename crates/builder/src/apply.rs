//! Applying a blueprint end to end

use crate::deployer::PublishRequest;
use crate::gateway::ApiGateway;
use crate::iam::RoleProvisioner;
use crate::integrations::{data_store_integration, lambda_proxy_target, CrudAction};
use crate::options::IntegrationOptions;
use crate::resource::{IntegrationTarget, MethodOptions};
use apigw_forge_common::{
    ApiBlueprint, HttpVerb, IntegrationBlueprint, PublishOutcome, RestApi, Result, Role,
};
use serde::Serialize;
use tracing::info;

/// What applying a blueprint produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub api: RestApi,
    pub resources: Vec<AppliedResource>,
    /// Role provisioned for data-store integrations, if any needed one
    pub role: Option<Role>,
    pub publish: Option<PublishOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedResource {
    pub path: String,
    pub resource_id: String,
    pub methods: Vec<HttpVerb>,
}

/// Create or reuse the blueprint's API, ensure its resources and methods,
/// then publish to its stage
///
/// Resources are ensured, never duplicated. Methods and integrations are put
/// again, replacing what was there. Every publication is a new deployment.
pub fn apply_blueprint(
    gateway: &mut ApiGateway,
    provisioner: &RoleProvisioner,
    blueprint: &ApiBlueprint,
) -> Result<ApplyReport> {
    blueprint.validate()?;

    let api = match &blueprint.api.id {
        Some(api_id) => gateway.use_api(api_id)?.clone(),
        None => {
            let description = blueprint.api.description.as_deref().unwrap_or_default();
            gateway.create_api(&blueprint.api.name, description)?.clone()
        }
    };

    let mut role: Option<Role> = None;
    let mut resources = Vec::with_capacity(blueprint.resources.len());

    for resource in &blueprint.resources {
        let mut node = gateway.ensure_path(&resource.path)?;

        for method in &resource.methods {
            let options = MethodOptions {
                authorization: method.authorization,
                request_parameters: method.request_parameters.clone(),
            };
            node.add_method(method.verb, options)?;

            if let Some(integration) = &method.integration {
                let (target, options) = integration_for(
                    gateway.region(),
                    provisioner,
                    &mut role,
                    integration,
                    node.full_path(),
                )?;
                node.add_integration(method.verb, target, &options)?;
            }
        }

        resources.push(AppliedResource {
            path: node.full_path().to_string(),
            resource_id: node.resource_id().to_string(),
            methods: node.methods().keys().copied().collect(),
        });
    }

    let publish = match &blueprint.stage {
        Some(stage) => {
            let mut request = PublishRequest::new(&stage.name);
            if let Some(description) = &stage.description {
                request = request.with_stage_description(description);
            }
            if let Some(description) = &stage.deployment_description {
                request = request.with_deployment_description(description);
            }
            Some(gateway.publish(&request)?)
        }
        None => None,
    };

    info!(
        api_id = %api.id,
        resources = resources.len(),
        published = publish.is_some(),
        "Blueprint applied"
    );

    Ok(ApplyReport {
        api,
        resources,
        role,
        publish,
    })
}

/// Resolve an integration blueprint to a target and its options
///
/// Data-store integrations without explicit credentials provision the
/// configured role on first use and reuse it afterwards.
fn integration_for(
    region: &str,
    provisioner: &RoleProvisioner,
    role: &mut Option<Role>,
    integration: &IntegrationBlueprint,
    path: &str,
) -> Result<(IntegrationTarget, IntegrationOptions)> {
    let extra = IntegrationOptions::from(integration.options.clone());

    if let Some(action) = &integration.data_store_action {
        let action: CrudAction = action.parse()?;
        let role_arn = match &integration.credentials {
            Some(arn) => arn.clone(),
            None => provisioned_role_arn(provisioner, role)?,
        };

        let settings = provisioner.settings();
        let (target, mut options) =
            data_store_integration(region, &settings.data_store, &role_arn, action, path)?;
        options.merge(&extra);
        return Ok((target, options));
    }

    let mut target = match &integration.lambda_function_arn {
        Some(function_arn) => lambda_proxy_target(region, function_arn),
        None => {
            let mut target = IntegrationTarget::new(integration.integration_type);
            target.uri = integration.uri.clone();
            target
        }
    };
    if let Some(verb) = integration.backend_verb {
        target.backend_verb = Some(verb);
    }
    if let Some(credentials) = &integration.credentials {
        target.credentials = Some(credentials.clone());
    }

    Ok((target, extra))
}

fn provisioned_role_arn(provisioner: &RoleProvisioner, role: &mut Option<Role>) -> Result<String> {
    if let Some(existing) = role.as_ref() {
        return Ok(existing.arn.clone());
    }
    let provisioned = provisioner.provision_default_role()?;
    Ok(role.insert(provisioned.role).arn.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigw_forge_common::{ForgeSettings, IntegrationType};
    use apigw_forge_control::{InMemoryControlPlane, MockIdentityControl};
    use std::rc::Rc;

    const BLUEPRINT: &str = r#"
api:
  name: jobs-api
  description: Job tracking
resources:
  - path: /jobs
    methods:
      - verb: get
        integration:
          type: mock
          options:
            request_templates:
              application/json: '{"statusCode": 200}'
  - path: /jobs/{jobId}
    methods:
      - verb: get
        request_parameters:
          method.request.path.jobId: true
        integration:
          type: http
          uri: https://backend.example.com/jobs/{jobId}
stage:
  name: dev
"#;

    #[test]
    fn test_apply_builds_tree_and_publishes() {
        let control = Rc::new(InMemoryControlPlane::new("us-east-1"));
        let mut identity = MockIdentityControl::new();
        identity.expect_get_role().never();

        let provisioner = RoleProvisioner::new(Rc::new(identity), ForgeSettings::default());
        let mut gateway = ApiGateway::new(control.clone(), "us-east-1");
        let blueprint: ApiBlueprint = serde_yaml::from_str(BLUEPRINT).unwrap();

        let report = apply_blueprint(&mut gateway, &provisioner, &blueprint).unwrap();

        assert_eq!(report.api.name, "jobs-api");
        assert_eq!(report.resources.len(), 2);
        assert_eq!(report.resources[1].path, "/jobs/{jobId}");
        assert!(report.role.is_none());

        let publish = report.publish.unwrap();
        assert!(publish.url.ends_with("/dev"));
        assert!(publish.stage_created);

        // "/jobs" is ensured once even though "/jobs/{jobId}" walks through it
        assert_eq!(control.call_count("create_resource"), 2);

        let integration = control
            .integration(&report.api.id, &report.resources[0].resource_id, HttpVerb::Get)
            .unwrap();
        assert_eq!(integration.integration.integration_type, IntegrationType::Mock);
        assert_eq!(
            integration.integration.request_templates["application/json"],
            r#"{"statusCode": 200}"#
        );
    }

    #[test]
    fn test_explicit_integration_fields_are_kept() {
        let provisioner = RoleProvisioner::new(
            Rc::new(MockIdentityControl::new()),
            ForgeSettings::default(),
        );
        let integration = IntegrationBlueprint {
            integration_type: IntegrationType::AwsProxy,
            backend_verb: None,
            uri: None,
            credentials: None,
            lambda_function_arn: Some("arn:aws:lambda:us-east-1:1:function:f".to_string()),
            data_store_action: None,
            options: Default::default(),
        };

        let mut role = None;
        let (target, options) =
            integration_for("us-east-1", &provisioner, &mut role, &integration, "/code").unwrap();

        assert_eq!(target.integration_type, IntegrationType::AwsProxy);
        assert_eq!(target.backend_verb, Some(HttpVerb::Post));
        assert!(target.uri.unwrap().ends_with("function:f/invocations"));
        assert!(options.is_empty());
        assert!(role.is_none());
    }
}
