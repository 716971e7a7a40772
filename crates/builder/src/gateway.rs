//! REST API handle and resource-tree builder

use crate::deployer::{self, PublishRequest};
use crate::resource::ApiResource;
use apigw_forge_common::{
    EndpointType, ForgeError, PublishOutcome, ResourceRecord, RestApi, Result,
};
use apigw_forge_control::GatewayControl;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Literal segment, or `{name}` / `{name+}` path parameter
fn path_part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\{[A-Za-z0-9._-]+\+?\}|[A-Za-z0-9._~:@!$&'()*+,;=-]+)$")
            .expect("path part pattern is valid")
    })
}

/// Validate a single path segment
pub fn validate_path_part(path_part: &str) -> Result<()> {
    if path_part_pattern().is_match(path_part) {
        Ok(())
    } else {
        Err(ForgeError::InvalidInput(format!(
            "invalid path part '{}': expected a literal segment or {{name}}",
            path_part
        )))
    }
}

/// Join a parent path and a child segment
///
/// # Examples
/// ```
/// use apigw_forge_builder::join_path;
///
/// assert_eq!(join_path("/", "jobs"), "/jobs");
/// assert_eq!(join_path("/jobs", "{jobId}"), "/jobs/{jobId}");
/// assert_eq!(join_path("/jobs/", "{jobId}"), "/jobs/{jobId}");
/// ```
pub fn join_path(parent_path: &str, path_part: &str) -> String {
    let parent = parent_path.trim_end_matches('/');
    format!("{}/{}", parent, path_part)
}

/// Split a full path into its segments
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Handle on one REST API and its resource tree
///
/// The control plane stays the source of truth: every lookup re-lists the
/// API's resources and refreshes the local record cache.
pub struct ApiGateway {
    control: Rc<dyn GatewayControl>,
    region: String,
    endpoint_type: EndpointType,
    api: Option<RestApi>,
    resources: HashMap<String, ResourceRecord>,
}

impl fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiGateway")
            .field("region", &self.region)
            .field("api", &self.api)
            .field("cached_resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl ApiGateway {
    pub fn new(control: Rc<dyn GatewayControl>, region: impl Into<String>) -> Self {
        Self {
            control,
            region: region.into(),
            endpoint_type: EndpointType::Regional,
            api: None,
            resources: HashMap::new(),
        }
    }

    pub fn with_endpoint_type(mut self, endpoint_type: EndpointType) -> Self {
        self.endpoint_type = endpoint_type;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create a new REST API and make it the current one
    pub fn create_api(&mut self, name: &str, description: &str) -> Result<&RestApi> {
        let mut api = self
            .control
            .create_rest_api(name, description, self.endpoint_type)?;
        api.region = self.region.clone();
        info!(api_id = %api.id, name, "Created API Gateway");

        self.resources.clear();
        Ok(self.api.insert(api))
    }

    /// Look up an existing REST API by id and make it the current one
    pub fn use_api(&mut self, api_id: &str) -> Result<&RestApi> {
        let mut api = self.control.get_rest_api(api_id)?;
        api.region = self.region.clone();
        debug!(api_id, name = %api.name, "Using existing API");

        self.resources.clear();
        Ok(self.api.insert(api))
    }

    /// The current API
    pub fn api(&self) -> Result<&RestApi> {
        self.api.as_ref().ok_or_else(|| {
            ForgeError::Precondition("no API selected; create one or look one up by id".to_string())
        })
    }

    pub fn api_id(&self) -> Result<&str> {
        Ok(&self.api()?.id)
    }

    /// Record cached for `resource_id`, as of the last listing or creation
    pub fn cached_resource(&self, resource_id: &str) -> Option<&ResourceRecord> {
        self.resources.get(resource_id)
    }

    /// List every resource of the current API, following pagination
    pub fn list_resources(&mut self) -> Result<Vec<ResourceRecord>> {
        let api_id = self.api_id()?.to_string();

        let mut records = Vec::new();
        let mut position = None;
        loop {
            let page = self.control.get_resources(&api_id, position.clone())?;
            records.extend(page.items);

            match page.position {
                Some(next) if Some(&next) == position.as_ref() => {
                    return Err(ForgeError::remote(
                        "get_resources",
                        &api_id,
                        format!("pagination did not advance past position {}", next),
                    ));
                }
                Some(next) => position = Some(next),
                None => break,
            }
        }

        self.resources = records
            .iter()
            .map(|record| (record.id.clone(), record.clone()))
            .collect();
        debug!(api_id = %api_id, count = records.len(), "Listed resources");

        Ok(records)
    }

    /// The root (`/`) resource of the current API
    pub fn root_resource(&mut self) -> Result<ApiResource> {
        let api_id = self.api_id()?.to_string();
        let root = self
            .list_resources()?
            .into_iter()
            .find(ResourceRecord::is_root)
            .ok_or_else(|| {
                ForgeError::Precondition(format!("API {} has no root resource", api_id))
            })?;

        Ok(ApiResource::new(self.control.clone(), &api_id, root))
    }

    /// Return the `path_part` child of `parent`, creating it if absent
    ///
    /// Never creates a second resource for the same (parent, path part) pair.
    /// A conflict reported by the control plane (another process created the
    /// child in between) is returned as an error, not retried.
    pub fn ensure_child(&mut self, parent: &ApiResource, path_part: &str) -> Result<ApiResource> {
        let api_id = self.api_id()?.to_string();
        if parent.api_id() != api_id {
            return Err(ForgeError::Precondition(format!(
                "resource {} belongs to API {}, not {}",
                parent.resource_id(),
                parent.api_id(),
                api_id
            )));
        }
        validate_path_part(path_part)?;

        let full_path = join_path(parent.full_path(), path_part);

        let existing = self
            .list_resources()
            .map_err(|e| annotate(e, "ensure_child", path_part))?
            .into_iter()
            .find(|record| record.is_child_of(parent.resource_id(), path_part));

        if let Some(mut record) = existing {
            debug!(path = %full_path, resource_id = %record.id, "Resource already exists");
            if record.path.is_empty() {
                record.path = full_path;
            }
            return Ok(ApiResource::new(self.control.clone(), &api_id, record));
        }

        let mut record = self
            .control
            .create_resource(&api_id, parent.resource_id(), path_part)
            .map_err(|e| annotate(e, "create_resource", path_part))?;
        record.path = full_path;
        info!(
            path = %record.path,
            parent_id = parent.resource_id(),
            resource_id = %record.id,
            "Created resource"
        );

        self.resources.insert(record.id.clone(), record.clone());
        Ok(ApiResource::new(self.control.clone(), &api_id, record))
    }

    /// Ensure every segment of `path` exists, starting from the root
    pub fn ensure_path(&mut self, path: &str) -> Result<ApiResource> {
        let mut node = self.root_resource()?;
        for segment in path_segments(path) {
            node = self.ensure_child(&node, segment)?;
        }
        Ok(node)
    }

    /// Deploy the current API and point `request.stage_name` at the deployment
    pub fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome> {
        deployer::publish(self.control.as_ref(), self.api()?, request)
    }

    /// Invoke URL of `stage_name` on the current API
    pub fn endpoint_url(&self, stage_name: &str) -> Result<String> {
        let api = self.api()?;
        Ok(deployer::endpoint_url(&api.id, &api.region, stage_name))
    }
}

/// Name the path part in remote failures that only carry the API id
fn annotate(error: ForgeError, operation: &str, path_part: &str) -> ForgeError {
    match error {
        ForgeError::Remote { message, .. } => ForgeError::remote(operation, path_part, message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigw_forge_control::{MockGatewayControl, ResourcePage};

    fn root_record() -> ResourceRecord {
        ResourceRecord {
            id: "root".to_string(),
            parent_id: None,
            path_part: None,
            path: "/".to_string(),
            methods: Default::default(),
        }
    }

    fn gateway_with_api(control: MockGatewayControl) -> ApiGateway {
        let mut gateway = ApiGateway::new(Rc::new(control), "us-east-1");
        gateway.api = Some(RestApi {
            id: "api1".to_string(),
            name: "jobs-api".to_string(),
            description: None,
            region: "us-east-1".to_string(),
        });
        gateway
    }

    #[test]
    fn test_path_part_validation() {
        assert!(validate_path_part("jobs").is_ok());
        assert!(validate_path_part("{jobId}").is_ok());
        assert!(validate_path_part("{proxy+}").is_ok());
        assert!(validate_path_part("v1.2").is_ok());
        assert!(validate_path_part("").is_err());
        assert!(validate_path_part("a/b").is_err());
        assert!(validate_path_part("{jobId").is_err());
        assert!(validate_path_part("{}").is_err());
    }

    #[test]
    fn test_path_segments() {
        let segments: Vec<_> = path_segments("/jobs//{jobId}/").collect();
        assert_eq!(segments, vec!["jobs", "{jobId}"]);
    }

    #[test]
    fn test_ensure_child_without_api_fails_before_remote_call() {
        let mut control = MockGatewayControl::new();
        control.expect_get_resources().never();
        control.expect_create_resource().never();
        let control: Rc<dyn GatewayControl> = Rc::new(control);

        let root = ApiResource::new(control.clone(), "api1", root_record());
        let mut gateway = ApiGateway::new(control, "us-east-1");

        let err = gateway.ensure_child(&root, "jobs").unwrap_err();
        assert!(matches!(err, ForgeError::Precondition(_)));
    }

    #[test]
    fn test_ensure_child_creates_when_absent() {
        let mut control = MockGatewayControl::new();
        control.expect_get_resources().times(1).returning(|_, _| {
            Ok(ResourcePage {
                items: vec![root_record()],
                position: None,
            })
        });
        control
            .expect_create_resource()
            .withf(|api, parent, part| api == "api1" && parent == "root" && part == "jobs")
            .times(1)
            .returning(|_, parent, part| {
                Ok(ResourceRecord {
                    id: "res-jobs".to_string(),
                    parent_id: Some(parent.to_string()),
                    path_part: Some(part.to_string()),
                    path: String::new(),
                    methods: Default::default(),
                })
            });

        let mut gateway = gateway_with_api(control);
        let root = ApiResource::new(gateway.control.clone(), "api1", root_record());
        let jobs = gateway.ensure_child(&root, "jobs").unwrap();

        assert_eq!(jobs.resource_id(), "res-jobs");
        assert_eq!(jobs.full_path(), "/jobs");
        assert!(gateway.cached_resource("res-jobs").is_some());
    }

    #[test]
    fn test_ensure_child_reuses_existing_record() {
        let mut control = MockGatewayControl::new();
        control.expect_get_resources().times(1).returning(|_, _| {
            Ok(ResourcePage {
                items: vec![
                    root_record(),
                    ResourceRecord {
                        id: "res-jobs".to_string(),
                        parent_id: Some("root".to_string()),
                        path_part: Some("jobs".to_string()),
                        path: "/jobs".to_string(),
                        methods: Default::default(),
                    },
                ],
                position: None,
            })
        });
        control.expect_create_resource().never();

        let mut gateway = gateway_with_api(control);
        let root = ApiResource::new(gateway.control.clone(), "api1", root_record());
        let jobs = gateway.ensure_child(&root, "jobs").unwrap();

        assert_eq!(jobs.resource_id(), "res-jobs");
    }

    #[test]
    fn test_listing_follows_pagination() {
        let mut control = MockGatewayControl::new();
        control
            .expect_get_resources()
            .withf(|_, position| position.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(ResourcePage {
                    items: vec![root_record()],
                    position: Some("next".to_string()),
                })
            });
        control
            .expect_get_resources()
            .withf(|_, position| position.as_deref() == Some("next"))
            .times(1)
            .returning(|_, _| {
                Ok(ResourcePage {
                    items: vec![ResourceRecord {
                        id: "res-a".to_string(),
                        parent_id: Some("root".to_string()),
                        path_part: Some("a".to_string()),
                        path: "/a".to_string(),
                        methods: Default::default(),
                    }],
                    position: None,
                })
            });

        let mut gateway = gateway_with_api(control);
        let records = gateway.list_resources().unwrap();
        assert_eq!(records.len(), 2);
        assert!(gateway.cached_resource("res-a").is_some());
    }

    #[test]
    fn test_conflict_on_create_is_surfaced() {
        let mut control = MockGatewayControl::new();
        control.expect_get_resources().returning(|_, _| {
            Ok(ResourcePage {
                items: vec![root_record()],
                position: None,
            })
        });
        control.expect_create_resource().times(1).returning(|_, _, part| {
            Err(ForgeError::AlreadyExists {
                operation: "create_resource".to_string(),
                target: part.to_string(),
                message: "ConflictException".to_string(),
            })
        });

        let mut gateway = gateway_with_api(control);
        let root = ApiResource::new(gateway.control.clone(), "api1", root_record());
        let err = gateway.ensure_child(&root, "jobs").unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_listing_failure_names_path_part() {
        let mut control = MockGatewayControl::new();
        control
            .expect_get_resources()
            .times(1)
            .returning(|api, _| Err(ForgeError::remote("get_resources", api, "throttled")));
        control.expect_create_resource().never();

        let mut gateway = gateway_with_api(control);
        let root = ApiResource::new(gateway.control.clone(), "api1", root_record());
        let err = gateway.ensure_child(&root, "jobs").unwrap_err();

        match err {
            ForgeError::Remote {
                operation,
                target,
                message,
            } => {
                assert_eq!(operation, "ensure_child");
                assert_eq!(target, "jobs");
                assert_eq!(message, "throttled");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_create_failure_names_path_part() {
        let mut control = MockGatewayControl::new();
        control.expect_get_resources().returning(|_, _| {
            Ok(ResourcePage {
                items: vec![root_record()],
                position: None,
            })
        });
        control
            .expect_create_resource()
            .times(1)
            .returning(|api, _, _| Err(ForgeError::remote("create_resource", api, "AccessDenied")));

        let mut gateway = gateway_with_api(control);
        let root = ApiResource::new(gateway.control.clone(), "api1", root_record());
        let err = gateway.ensure_child(&root, "{jobId}").unwrap_err();

        assert!(matches!(
            err,
            ForgeError::Remote { ref operation, ref target, .. }
                if operation == "create_resource" && target == "{jobId}"
        ));
    }
}
