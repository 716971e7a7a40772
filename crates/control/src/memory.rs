//! In-process control plane
//!
//! Holds APIs, resources, stages and IAM entities in memory with the same
//! uniqueness rules the service applies: one child per (parent, path part),
//! one stage per name, one role or policy per name. Every call is journaled.

use crate::{
    GatewayControl, IdentityControl, PutIntegrationRequest, PutIntegrationResponseRequest,
    PutMethodRequest, ResourcePage,
};
use apigw_forge_common::{
    Deployment, EndpointType, ForgeError, HttpVerb, ManagedPolicy, MethodConfig, ResourceRecord,
    RestApi, Result, Role, Stage,
};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Account id used in ARNs minted by the in-memory backend
pub const MEMORY_ACCOUNT_ID: &str = "000000000000";

const DEFAULT_PAGE_SIZE: usize = 25;

/// One journaled control-plane call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub target: String,
}

#[derive(Debug, Default)]
struct ApiState {
    api: Option<RestApi>,
    resources: Vec<ResourceRecord>,
    integrations: BTreeMap<(String, HttpVerb), PutIntegrationRequest>,
    deployments: Vec<Deployment>,
    stages: BTreeMap<String, Stage>,
}

#[derive(Debug)]
struct RoleState {
    role: Role,
    inline_policies: BTreeMap<String, String>,
    attached: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    apis: BTreeMap<String, ApiState>,
    roles: BTreeMap<String, RoleState>,
    policies: BTreeMap<String, (ManagedPolicy, String)>,
    journal: Vec<RecordedCall>,
}

impl MemoryState {
    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:06}", prefix, self.next_id)
    }

    fn record(&mut self, operation: &'static str, target: impl Into<String>) {
        self.journal.push(RecordedCall {
            operation,
            target: target.into(),
        });
    }

    fn api_mut(&mut self, operation: &str, api_id: &str) -> Result<&mut ApiState> {
        self.apis
            .get_mut(api_id)
            .ok_or_else(|| ForgeError::not_found(operation, format!("rest api {}", api_id)))
    }

    fn resource_mut(
        &mut self,
        operation: &str,
        api_id: &str,
        resource_id: &str,
    ) -> Result<&mut ResourceRecord> {
        self.api_mut(operation, api_id)?
            .resources
            .iter_mut()
            .find(|r| r.id == resource_id)
            .ok_or_else(|| ForgeError::not_found(operation, format!("resource {}", resource_id)))
    }
}

/// Control plane that lives entirely in process
#[derive(Debug)]
pub struct InMemoryControlPlane {
    region: String,
    page_size: usize,
    state: RefCell<MemoryState>,
}

impl InMemoryControlPlane {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            state: RefCell::new(MemoryState::default()),
        }
    }

    /// Limit resource listings to `page_size` records per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// All calls made so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().journal.clone()
    }

    /// Number of calls made to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .borrow()
            .journal
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn resources(&self, api_id: &str) -> Vec<ResourceRecord> {
        self.state
            .borrow()
            .apis
            .get(api_id)
            .map(|api| api.resources.clone())
            .unwrap_or_default()
    }

    /// Last integration put on (resource, verb)
    pub fn integration(
        &self,
        api_id: &str,
        resource_id: &str,
        verb: HttpVerb,
    ) -> Option<PutIntegrationRequest> {
        self.state
            .borrow()
            .apis
            .get(api_id)
            .and_then(|api| api.integrations.get(&(resource_id.to_string(), verb)).cloned())
    }

    pub fn deployments(&self, api_id: &str) -> Vec<Deployment> {
        self.state
            .borrow()
            .apis
            .get(api_id)
            .map(|api| api.deployments.clone())
            .unwrap_or_default()
    }

    pub fn stage(&self, api_id: &str, stage_name: &str) -> Option<Stage> {
        self.state
            .borrow()
            .apis
            .get(api_id)
            .and_then(|api| api.stages.get(stage_name).cloned())
    }

    pub fn inline_policy(&self, role_name: &str, policy_name: &str) -> Option<String> {
        self.state
            .borrow()
            .roles
            .get(role_name)
            .and_then(|role| role.inline_policies.get(policy_name).cloned())
    }

    pub fn attached_policies(&self, role_name: &str) -> Vec<String> {
        self.state
            .borrow()
            .roles
            .get(role_name)
            .map(|role| role.attached.clone())
            .unwrap_or_default()
    }
}

impl GatewayControl for InMemoryControlPlane {
    fn create_rest_api(
        &self,
        name: &str,
        description: &str,
        _endpoint_type: EndpointType,
    ) -> Result<RestApi> {
        let mut state = self.state.borrow_mut();
        state.record("create_rest_api", name);

        let api_id = state.mint("api");
        let root_id = state.mint("res");
        let api = RestApi {
            id: api_id.clone(),
            name: name.to_string(),
            description: Some(description.to_string()).filter(|d| !d.is_empty()),
            region: self.region.clone(),
        };

        state.apis.insert(
            api_id,
            ApiState {
                api: Some(api.clone()),
                resources: vec![ResourceRecord {
                    id: root_id,
                    parent_id: None,
                    path_part: None,
                    path: "/".to_string(),
                    methods: BTreeMap::new(),
                }],
                ..ApiState::default()
            },
        );

        Ok(api)
    }

    fn get_rest_api(&self, api_id: &str) -> Result<RestApi> {
        let mut state = self.state.borrow_mut();
        state.record("get_rest_api", api_id);

        state
            .api_mut("get_rest_api", api_id)?
            .api
            .clone()
            .ok_or_else(|| ForgeError::not_found("get_rest_api", api_id))
    }

    fn get_resources(&self, api_id: &str, position: Option<String>) -> Result<ResourcePage> {
        let mut state = self.state.borrow_mut();
        state.record("get_resources", api_id);

        let start = match position {
            Some(position) => position.parse::<usize>().map_err(|_| {
                ForgeError::remote("get_resources", api_id, format!("invalid position '{}'", position))
            })?,
            None => 0,
        };

        let api = state.api_mut("get_resources", api_id)?;
        let end = start.saturating_add(self.page_size).min(api.resources.len());
        let items = api.resources.get(start..end).unwrap_or_default().to_vec();
        let position = (end < api.resources.len()).then(|| end.to_string());

        Ok(ResourcePage { items, position })
    }

    fn create_resource(
        &self,
        api_id: &str,
        parent_id: &str,
        path_part: &str,
    ) -> Result<ResourceRecord> {
        let mut state = self.state.borrow_mut();
        state.record("create_resource", format!("{}/{}", parent_id, path_part));
        let resource_id = state.mint("res");

        let api = state.api_mut("create_resource", api_id)?;
        let parent_path = api
            .resources
            .iter()
            .find(|r| r.id == parent_id)
            .map(|r| r.path.clone())
            .ok_or_else(|| ForgeError::not_found("create_resource", format!("parent {}", parent_id)))?;

        if api.resources.iter().any(|r| r.is_child_of(parent_id, path_part)) {
            return Err(ForgeError::AlreadyExists {
                operation: "create_resource".to_string(),
                target: path_part.to_string(),
                message: "Another resource with the same parent already has this name".to_string(),
            });
        }

        let path = if parent_path == "/" {
            format!("/{}", path_part)
        } else {
            format!("{}/{}", parent_path.trim_end_matches('/'), path_part)
        };
        let record = ResourceRecord {
            id: resource_id,
            parent_id: Some(parent_id.to_string()),
            path_part: Some(path_part.to_string()),
            path,
            methods: BTreeMap::new(),
        };
        api.resources.push(record.clone());

        Ok(record)
    }

    fn put_method(&self, request: &PutMethodRequest) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(
            "put_method",
            format!("{} {}", request.http_method, request.resource_id),
        );

        let resource = state.resource_mut("put_method", &request.rest_api_id, &request.resource_id)?;
        resource.methods.insert(
            request.http_method,
            MethodConfig {
                verb: request.http_method,
                authorization_type: request.authorization_type,
                request_parameters: request.request_parameters.clone(),
                integration: None,
            },
        );
        Ok(())
    }

    fn put_method_response(
        &self,
        api_id: &str,
        resource_id: &str,
        verb: HttpVerb,
        status_code: &str,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(
            "put_method_response",
            format!("{} {} {}", verb, resource_id, status_code),
        );

        let resource = state.resource_mut("put_method_response", api_id, resource_id)?;
        if !resource.methods.contains_key(&verb) {
            return Err(ForgeError::not_found(
                "put_method_response",
                format!("method {} on {}", verb, resource_id),
            ));
        }
        Ok(())
    }

    fn put_integration(&self, request: &PutIntegrationRequest) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(
            "put_integration",
            format!("{} {}", request.http_method, request.resource_id),
        );

        let resource =
            state.resource_mut("put_integration", &request.rest_api_id, &request.resource_id)?;
        let method = resource.methods.get_mut(&request.http_method).ok_or_else(|| {
            ForgeError::not_found(
                "put_integration",
                format!("method {} on {}", request.http_method, request.resource_id),
            )
        })?;
        method.integration = Some(request.integration.clone());

        state
            .api_mut("put_integration", &request.rest_api_id)?
            .integrations
            .insert(
                (request.resource_id.clone(), request.http_method),
                request.clone(),
            );
        Ok(())
    }

    fn put_integration_response(&self, request: &PutIntegrationResponseRequest) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(
            "put_integration_response",
            format!(
                "{} {} {}",
                request.http_method, request.resource_id, request.status_code
            ),
        );

        let resource = state.resource_mut(
            "put_integration_response",
            &request.rest_api_id,
            &request.resource_id,
        )?;
        let integration = resource
            .methods
            .get_mut(&request.http_method)
            .and_then(|method| method.integration.as_mut())
            .ok_or_else(|| {
                ForgeError::not_found(
                    "put_integration_response",
                    format!("integration {} on {}", request.http_method, request.resource_id),
                )
            })?;
        integration.response_templates = request.response_templates.clone();
        Ok(())
    }

    fn create_deployment(&self, api_id: &str, description: &str) -> Result<Deployment> {
        let mut state = self.state.borrow_mut();
        state.record("create_deployment", api_id);
        let deployment = Deployment {
            id: state.mint("dep"),
            description: Some(description.to_string()),
            created_at: Some(chrono::Utc::now()),
        };

        state
            .api_mut("create_deployment", api_id)?
            .deployments
            .push(deployment.clone());
        Ok(deployment)
    }

    fn get_stage(&self, api_id: &str, stage_name: &str) -> Result<Option<Stage>> {
        let mut state = self.state.borrow_mut();
        state.record("get_stage", stage_name);

        Ok(state.api_mut("get_stage", api_id)?.stages.get(stage_name).cloned())
    }

    fn create_stage(
        &self,
        api_id: &str,
        stage_name: &str,
        description: &str,
        deployment_id: &str,
    ) -> Result<Stage> {
        let mut state = self.state.borrow_mut();
        state.record("create_stage", stage_name);

        let api = state.api_mut("create_stage", api_id)?;
        if api.stages.contains_key(stage_name) {
            return Err(ForgeError::AlreadyExists {
                operation: "create_stage".to_string(),
                target: stage_name.to_string(),
                message: "Stage already exists".to_string(),
            });
        }
        if !api.deployments.iter().any(|d| d.id == deployment_id) {
            return Err(ForgeError::not_found(
                "create_stage",
                format!("deployment {}", deployment_id),
            ));
        }

        let stage = Stage {
            name: stage_name.to_string(),
            description: Some(description.to_string()).filter(|d| !d.is_empty()),
            deployment_id: deployment_id.to_string(),
        };
        api.stages.insert(stage_name.to_string(), stage.clone());
        Ok(stage)
    }

    fn update_stage_deployment(
        &self,
        api_id: &str,
        stage_name: &str,
        deployment_id: &str,
    ) -> Result<Stage> {
        let mut state = self.state.borrow_mut();
        state.record("update_stage", stage_name);

        let api = state.api_mut("update_stage", api_id)?;
        if !api.deployments.iter().any(|d| d.id == deployment_id) {
            return Err(ForgeError::not_found(
                "update_stage",
                format!("deployment {}", deployment_id),
            ));
        }
        let stage = api
            .stages
            .get_mut(stage_name)
            .ok_or_else(|| ForgeError::not_found("update_stage", stage_name))?;
        stage.deployment_id = deployment_id.to_string();
        Ok(stage.clone())
    }
}

impl IdentityControl for InMemoryControlPlane {
    fn get_role(&self, role_name: &str) -> Result<Option<Role>> {
        let mut state = self.state.borrow_mut();
        state.record("get_role", role_name);

        Ok(state.roles.get(role_name).map(|r| r.role.clone()))
    }

    fn create_role(&self, role_name: &str, trust_policy: &str) -> Result<Role> {
        let mut state = self.state.borrow_mut();
        state.record("create_role", role_name);

        serde_json::from_str::<serde_json::Value>(trust_policy).map_err(|e| {
            ForgeError::remote("create_role", role_name, format!("MalformedPolicyDocument: {}", e))
        })?;
        if state.roles.contains_key(role_name) {
            return Err(ForgeError::AlreadyExists {
                operation: "create_role".to_string(),
                target: role_name.to_string(),
                message: format!("Role with name {} already exists", role_name),
            });
        }

        let role = Role {
            name: role_name.to_string(),
            arn: format!("arn:aws:iam::{}:role/{}", MEMORY_ACCOUNT_ID, role_name),
        };
        state.roles.insert(
            role_name.to_string(),
            RoleState {
                role: role.clone(),
                inline_policies: BTreeMap::new(),
                attached: Vec::new(),
            },
        );
        Ok(role)
    }

    fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        policy_document: &str,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record("put_role_policy", format!("{}/{}", role_name, policy_name));

        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ForgeError::not_found("put_role_policy", role_name))?;
        role.inline_policies
            .insert(policy_name.to_string(), policy_document.to_string());
        Ok(())
    }

    fn get_policy(&self, policy_arn: &str) -> Result<Option<ManagedPolicy>> {
        let mut state = self.state.borrow_mut();
        state.record("get_policy", policy_arn);

        Ok(state.policies.get(policy_arn).map(|(policy, _)| policy.clone()))
    }

    fn create_policy(&self, policy_name: &str, policy_document: &str) -> Result<ManagedPolicy> {
        let mut state = self.state.borrow_mut();
        state.record("create_policy", policy_name);

        let arn = format!("arn:aws:iam::{}:policy/{}", MEMORY_ACCOUNT_ID, policy_name);
        if state.policies.contains_key(&arn) {
            return Err(ForgeError::AlreadyExists {
                operation: "create_policy".to_string(),
                target: policy_name.to_string(),
                message: format!("A policy called {} already exists", policy_name),
            });
        }

        let policy = ManagedPolicy {
            name: policy_name.to_string(),
            arn: arn.clone(),
        };
        state
            .policies
            .insert(arn, (policy.clone(), policy_document.to_string()));
        Ok(policy)
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record("attach_role_policy", format!("{} {}", role_name, policy_arn));

        if !state.policies.contains_key(policy_arn) {
            return Err(ForgeError::not_found("attach_role_policy", policy_arn));
        }
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ForgeError::not_found("attach_role_policy", role_name))?;
        if !role.attached.iter().any(|arn| arn == policy_arn) {
            role.attached.push(policy_arn.to_string());
        }
        Ok(())
    }
}
