//! Declarative API blueprints
//!
//! A blueprint describes an API, its resource paths, their methods and
//! integrations, and the stage to publish to. Applying one is idempotent on
//! the resource tree and always produces a fresh deployment.

use crate::{AuthorizationType, ForgeError, HttpVerb, IntegrationType, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiBlueprint {
    pub api: ApiSection,
    #[serde(default)]
    pub resources: Vec<ResourceBlueprint>,
    #[serde(default)]
    pub stage: Option<StageBlueprint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiSection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Reuse an existing API instead of creating one
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceBlueprint {
    /// Full path, e.g. `/jobs/{jobId}`
    pub path: String,
    #[serde(default)]
    pub methods: Vec<MethodBlueprint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MethodBlueprint {
    pub verb: HttpVerb,
    #[serde(default)]
    pub authorization: AuthorizationType,
    #[serde(default)]
    pub request_parameters: BTreeMap<String, bool>,
    #[serde(default)]
    pub integration: Option<IntegrationBlueprint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IntegrationBlueprint {
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    #[serde(default)]
    pub backend_verb: Option<HttpVerb>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub credentials: Option<String>,
    /// Builds a Lambda proxy URI from a function ARN when `uri` is not set
    #[serde(default)]
    pub lambda_function_arn: Option<String>,
    /// CRUD action (`create`, `read`, `update`, `delete`, `list`) for data-store integrations
    #[serde(default)]
    pub data_store_action: Option<String>,
    /// Caller-facing integration options, translated before they are sent
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageBlueprint {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deployment_description: Option<String>,
}

impl ApiBlueprint {
    /// Load a blueprint from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ForgeError::Config(format!("Failed to read blueprint {:?}: {}", path, e))
        })?;

        let blueprint: Self = serde_yaml::from_str(&content).map_err(|e| {
            ForgeError::Config(format!("Failed to parse blueprint YAML from {:?}: {}", path, e))
        })?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// Reject blueprints the control plane would only half apply
    pub fn validate(&self) -> Result<()> {
        if self.api.name.trim().is_empty() {
            return Err(ForgeError::InvalidInput("api.name must not be empty".to_string()));
        }

        for resource in &self.resources {
            if !resource.path.starts_with('/') {
                return Err(ForgeError::InvalidInput(format!(
                    "resource path '{}' must start with '/'",
                    resource.path
                )));
            }

            let mut seen = HashSet::new();
            for method in &resource.methods {
                if !seen.insert(method.verb) {
                    return Err(ForgeError::InvalidInput(format!(
                        "method {} declared twice on {}",
                        method.verb, resource.path
                    )));
                }
                if let Some(integration) = &method.integration {
                    if integration.uri.is_some() && integration.lambda_function_arn.is_some() {
                        return Err(ForgeError::InvalidInput(format!(
                            "{} {}: set either uri or lambda_function_arn, not both",
                            method.verb, resource.path
                        )));
                    }
                }
            }
        }

        if let Some(stage) = &self.stage {
            if stage.name.trim().is_empty() {
                return Err(ForgeError::InvalidInput("stage.name must not be empty".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOBS: &str = r#"
api:
  name: jobs-api
  description: Job portal
resources:
  - path: /jobs
    methods:
      - verb: get
        integration:
          type: MOCK
          options:
            request_templates:
              application/json: '{"statusCode": 200}'
  - path: /jobs/{jobId}
    methods:
      - verb: GET
        request_parameters:
          method.request.path.jobId: true
        integration:
          type: AWS
          data_store_action: read
stage:
  name: dev
"#;

    #[test]
    fn test_parse_blueprint() {
        let blueprint: ApiBlueprint = serde_yaml::from_str(JOBS).unwrap();
        blueprint.validate().unwrap();

        assert_eq!(blueprint.api.name, "jobs-api");
        assert_eq!(blueprint.resources.len(), 2);

        let get_jobs = &blueprint.resources[0].methods[0];
        assert_eq!(get_jobs.verb, HttpVerb::Get);
        assert_eq!(get_jobs.authorization, AuthorizationType::None);
        let integration = get_jobs.integration.as_ref().unwrap();
        assert_eq!(integration.integration_type, IntegrationType::Mock);
        assert_eq!(
            integration.options["request_templates"]["application/json"],
            "{\"statusCode\": 200}"
        );

        let get_job = &blueprint.resources[1].methods[0];
        assert_eq!(get_job.request_parameters["method.request.path.jobId"], true);
        assert_eq!(blueprint.stage.as_ref().unwrap().name, "dev");
    }

    #[test]
    fn test_duplicate_verb_rejected() {
        let blueprint: ApiBlueprint = serde_yaml::from_str(
            "api:\n  name: a\nresources:\n  - path: /x\n    methods:\n      - verb: GET\n      - verb: get\n",
        )
        .unwrap();
        assert!(matches!(blueprint.validate(), Err(ForgeError::InvalidInput(_))));
    }

    #[test]
    fn test_relative_path_rejected() {
        let blueprint: ApiBlueprint =
            serde_yaml::from_str("api:\n  name: a\nresources:\n  - path: jobs\n").unwrap();
        assert!(blueprint.validate().is_err());
    }
}
