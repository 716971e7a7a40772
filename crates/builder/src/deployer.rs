//! Deployment and stage publication

use apigw_forge_common::{ForgeError, PublishOutcome, RestApi, Result};
use apigw_forge_control::GatewayControl;
use tracing::{debug, error, info};

/// Description given to deployments when the caller supplies none
pub const DEFAULT_DEPLOYMENT_DESCRIPTION: &str = "Deployment";

/// What to publish, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub stage_name: String,
    /// Only used when the stage has to be created
    pub stage_description: String,
    pub deployment_description: String,
}

impl PublishRequest {
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            stage_description: String::new(),
            deployment_description: DEFAULT_DEPLOYMENT_DESCRIPTION.to_string(),
        }
    }

    pub fn with_stage_description(mut self, description: impl Into<String>) -> Self {
        self.stage_description = description.into();
        self
    }

    pub fn with_deployment_description(mut self, description: impl Into<String>) -> Self {
        self.deployment_description = description.into();
        self
    }
}

/// Invoke URL of a stage
///
/// # Examples
/// ```
/// use apigw_forge_builder::endpoint_url;
///
/// assert_eq!(
///     endpoint_url("a1b2c3", "eu-west-1", "dev"),
///     "https://a1b2c3.execute-api.eu-west-1.amazonaws.com/dev"
/// );
/// ```
pub fn endpoint_url(api_id: &str, region: &str, stage_name: &str) -> String {
    format!(
        "https://{}.execute-api.{}.amazonaws.com/{}",
        api_id, region, stage_name
    )
}

/// Snapshot the API into a new deployment and point the stage at it
///
/// The stage is created on first publication and repointed afterwards. If
/// the deployment succeeds but the stage cannot be created or updated, the
/// deployment id is reported in [`ForgeError::OrphanedDeployment`].
pub fn publish(
    control: &dyn GatewayControl,
    api: &RestApi,
    request: &PublishRequest,
) -> Result<PublishOutcome> {
    if request.stage_name.trim().is_empty() {
        return Err(ForgeError::InvalidInput(
            "stage name must not be empty".to_string(),
        ));
    }

    let deployment = control.create_deployment(&api.id, &request.deployment_description)?;
    info!(api_id = %api.id, deployment_id = %deployment.id, "Created deployment");

    let stage_created = point_stage(control, api, request, &deployment.id).map_err(|source| {
        error!(
            deployment_id = %deployment.id,
            stage = %request.stage_name,
            "Stage update failed after deployment"
        );
        ForgeError::OrphanedDeployment {
            deployment_id: deployment.id.clone(),
            stage: request.stage_name.clone(),
            source: Box::new(source),
        }
    })?;

    let url = endpoint_url(&api.id, &api.region, &request.stage_name);
    info!(stage = %request.stage_name, url = %url, "API published");

    Ok(PublishOutcome {
        deployment_id: deployment.id,
        stage_name: request.stage_name.clone(),
        url,
        stage_created,
    })
}

/// Returns whether the stage had to be created
fn point_stage(
    control: &dyn GatewayControl,
    api: &RestApi,
    request: &PublishRequest,
    deployment_id: &str,
) -> Result<bool> {
    match control.get_stage(&api.id, &request.stage_name)? {
        Some(stage) => {
            debug!(
                stage = %stage.name,
                from = %stage.deployment_id,
                to = deployment_id,
                "Repointing stage"
            );
            control.update_stage_deployment(&api.id, &request.stage_name, deployment_id)?;
            Ok(false)
        }
        None => {
            control.create_stage(
                &api.id,
                &request.stage_name,
                &request.stage_description,
                deployment_id,
            )?;
            info!(stage = %request.stage_name, "Created stage");
            Ok(true)
        }
    }
}
