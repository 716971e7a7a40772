//! Resource nodes and their method/integration configuration

use crate::options::IntegrationOptions;
use apigw_forge_common::{
    AuthorizationType, ForgeError, HttpVerb, IntegrationConfig, IntegrationType, MethodConfig,
    ResourceRecord, Result,
};
use apigw_forge_control::{
    GatewayControl, PutIntegrationRequest, PutIntegrationResponseRequest, PutMethodRequest,
};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::info;

/// Status code of the default method and integration responses
pub const DEFAULT_STATUS_CODE: &str = "200";

/// Content type of the default integration response template
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Options of [`ApiResource::add_method`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodOptions {
    pub authorization: AuthorizationType,
    pub request_parameters: BTreeMap<String, bool>,
}

impl MethodOptions {
    pub fn with_authorization(mut self, authorization: AuthorizationType) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn with_request_parameter(mut self, location: impl Into<String>, required: bool) -> Self {
        self.request_parameters.insert(location.into(), required);
        self
    }
}

/// Backend target of an integration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrationTarget {
    pub integration_type: IntegrationType,
    /// Verb used against the backend; defaults to the method's verb
    pub backend_verb: Option<HttpVerb>,
    pub uri: Option<String>,
    /// Role ARN assumed to call the backend
    pub credentials: Option<String>,
}

impl IntegrationTarget {
    pub fn new(integration_type: IntegrationType) -> Self {
        Self {
            integration_type,
            backend_verb: None,
            uri: None,
            credentials: None,
        }
    }

    pub fn mock() -> Self {
        Self::new(IntegrationType::Mock)
    }

    pub fn with_backend_verb(mut self, verb: HttpVerb) -> Self {
        self.backend_verb = Some(verb);
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_credentials(mut self, role_arn: impl Into<String>) -> Self {
        self.credentials = Some(role_arn.into());
        self
    }
}

/// Handle on one resource of an API
///
/// Holds the resource id plus a snapshot of its methods, seeded from the
/// control plane when the node was obtained and updated by this handle's own
/// calls. Changes made elsewhere are not seen until the node is fetched again.
pub struct ApiResource {
    control: Rc<dyn GatewayControl>,
    api_id: String,
    record: ResourceRecord,
}

impl fmt::Debug for ApiResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResource")
            .field("api_id", &self.api_id)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl ApiResource {
    pub(crate) fn new(
        control: Rc<dyn GatewayControl>,
        api_id: &str,
        record: ResourceRecord,
    ) -> Self {
        Self {
            control,
            api_id: api_id.to_string(),
            record,
        }
    }

    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    pub fn resource_id(&self) -> &str {
        &self.record.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.record.parent_id.as_deref()
    }

    pub fn path_part(&self) -> Option<&str> {
        self.record.path_part.as_deref()
    }

    pub fn full_path(&self) -> &str {
        &self.record.path
    }

    pub fn is_root(&self) -> bool {
        self.record.is_root()
    }

    pub fn record(&self) -> &ResourceRecord {
        &self.record
    }

    pub fn methods(&self) -> &BTreeMap<HttpVerb, MethodConfig> {
        &self.record.methods
    }

    pub fn method(&self, verb: HttpVerb) -> Option<&MethodConfig> {
        self.record.methods.get(&verb)
    }

    /// Put `verb` on this resource and give it a default `200` method response
    ///
    /// Calling it again for the same verb replaces the previous configuration.
    pub fn add_method(&mut self, verb: HttpVerb, options: MethodOptions) -> Result<&MethodConfig> {
        let request = PutMethodRequest {
            rest_api_id: self.api_id.clone(),
            resource_id: self.record.id.clone(),
            http_method: verb,
            authorization_type: options.authorization,
            request_parameters: options.request_parameters.clone(),
        };

        self.control.put_method(&request)?;
        info!(method = %verb, path = %self.record.path, "Added method");

        let config = MethodConfig {
            verb,
            authorization_type: options.authorization,
            request_parameters: options.request_parameters,
            integration: None,
        };
        self.record.methods.insert(verb, config);

        self.control
            .put_method_response(&self.api_id, &self.record.id, verb, DEFAULT_STATUS_CODE)?;

        Ok(&self.record.methods[&verb])
    }

    /// Attach an integration to a verb added with [`ApiResource::add_method`]
    ///
    /// `options` are translated to wire names first; unrecognised ones are
    /// dropped. On success a default `200` integration response with an empty
    /// JSON passthrough template is configured as well.
    pub fn add_integration(
        &mut self,
        verb: HttpVerb,
        target: IntegrationTarget,
        options: &IntegrationOptions,
    ) -> Result<&IntegrationConfig> {
        if !self.record.methods.contains_key(&verb) {
            return Err(ForgeError::MethodNotFound {
                method: verb.to_string(),
                path: self.record.path.clone(),
            });
        }

        let mut integration = IntegrationConfig::new(target.integration_type);
        integration.backend_verb = Some(target.backend_verb.unwrap_or(verb));
        integration.uri = target.uri;
        integration.credentials = target.credentials;
        options.translate().apply_to(&mut integration)?;

        let request = PutIntegrationRequest {
            rest_api_id: self.api_id.clone(),
            resource_id: self.record.id.clone(),
            http_method: verb,
            integration,
        };
        self.control.put_integration(&request)?;
        info!(
            integration = %target.integration_type,
            method = %verb,
            path = %self.record.path,
            "Added integration"
        );

        let method = self
            .record
            .methods
            .get_mut(&verb)
            .ok_or_else(|| ForgeError::MethodNotFound {
                method: verb.to_string(),
                path: self.record.path.clone(),
            })?;
        let integration = method.integration.insert(request.integration);

        let response = PutIntegrationResponseRequest {
            rest_api_id: self.api_id.clone(),
            resource_id: self.record.id.clone(),
            http_method: verb,
            status_code: DEFAULT_STATUS_CODE.to_string(),
            response_templates: BTreeMap::from([(DEFAULT_CONTENT_TYPE.to_string(), String::new())]),
        };
        self.control.put_integration_response(&response)?;
        integration.response_templates = response.response_templates;

        Ok(integration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigw_forge_control::MockGatewayControl;

    fn node(control: MockGatewayControl) -> ApiResource {
        ApiResource::new(
            Rc::new(control),
            "api1",
            ResourceRecord {
                id: "res1".to_string(),
                parent_id: Some("root".to_string()),
                path_part: Some("jobs".to_string()),
                path: "/jobs".to_string(),
                methods: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn test_add_method_puts_method_and_default_response() {
        let mut control = MockGatewayControl::new();
        control
            .expect_put_method()
            .withf(|r| {
                r.http_method == HttpVerb::Get && r.authorization_type == AuthorizationType::None
            })
            .times(1)
            .returning(|_| Ok(()));
        control
            .expect_put_method_response()
            .withf(|api, resource, verb, status| {
                api == "api1" && resource == "res1" && *verb == HttpVerb::Get && status == "200"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut resource = node(control);
        let method = resource.add_method(HttpVerb::Get, MethodOptions::default()).unwrap();
        assert_eq!(method.verb, HttpVerb::Get);
        assert!(method.integration.is_none());
    }

    #[test]
    fn test_integration_without_method_makes_no_remote_call() {
        let mut control = MockGatewayControl::new();
        control.expect_put_integration().never();
        control.expect_put_integration_response().never();

        let mut resource = node(control);
        let err = resource
            .add_integration(HttpVerb::Post, IntegrationTarget::mock(), &IntegrationOptions::new())
            .unwrap_err();

        match err {
            ForgeError::MethodNotFound { method, path } => {
                assert_eq!(method, "POST");
                assert_eq!(path, "/jobs");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_backend_verb_defaults_to_method_verb() {
        let mut control = MockGatewayControl::new();
        control.expect_put_method().returning(|_| Ok(()));
        control
            .expect_put_method_response()
            .returning(|_, _, _, _| Ok(()));
        control
            .expect_put_integration()
            .withf(|r| r.integration.backend_verb == Some(HttpVerb::Post))
            .times(1)
            .returning(|_| Ok(()));
        control
            .expect_put_integration_response()
            .withf(|r| {
                r.status_code == "200"
                    && r.response_templates.get("application/json").map(String::as_str) == Some("")
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut resource = node(control);
        resource.add_method(HttpVerb::Post, MethodOptions::default()).unwrap();
        let integration = resource
            .add_integration(
                HttpVerb::Post,
                IntegrationTarget::new(IntegrationType::Http).with_uri("https://example.com"),
                &IntegrationOptions::new(),
            )
            .unwrap();

        assert_eq!(integration.uri.as_deref(), Some("https://example.com"));
        assert_eq!(integration.response_templates["application/json"], "");
    }

    #[test]
    fn test_failed_integration_leaves_method_in_place() {
        let mut control = MockGatewayControl::new();
        control.expect_put_method().returning(|_| Ok(()));
        control
            .expect_put_method_response()
            .returning(|_, _, _, _| Ok(()));
        control
            .expect_put_integration()
            .returning(|_| Err(ForgeError::remote("put_integration", "GET res1", "denied")));
        control.expect_put_integration_response().never();

        let mut resource = node(control);
        resource.add_method(HttpVerb::Get, MethodOptions::default()).unwrap();
        let result = resource.add_integration(
            HttpVerb::Get,
            IntegrationTarget::mock(),
            &IntegrationOptions::new(),
        );

        assert!(result.is_err());
        let method = resource.method(HttpVerb::Get).unwrap();
        assert!(method.integration.is_none());
    }
}
