//! Integration option translation
//!
//! Callers name integration options in snake_case; the control plane expects
//! camelCase field names. Only the options in [`OPTION_NAMES`] are forwarded.
//! Anything else is dropped with a warning so a typo never turns into a
//! malformed request.

use apigw_forge_common::{
    ConnectionType, ContentHandling, ForgeError, IntegrationConfig, PassthroughBehavior, Result,
    TlsConfig,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Caller-facing option name to wire field name
pub const OPTION_NAMES: &[(&str, &str)] = &[
    ("connection_type", "connectionType"),
    ("connection_id", "connectionId"),
    ("request_parameters", "requestParameters"),
    ("request_templates", "requestTemplates"),
    ("passthrough_behavior", "passthroughBehavior"),
    ("cache_namespace", "cacheNamespace"),
    ("cache_key_parameters", "cacheKeyParameters"),
    ("content_handling", "contentHandling"),
    ("timeout_in_millis", "timeoutInMillis"),
    ("tls_config", "tlsConfig"),
];

/// Look up the wire name of an option
///
/// # Examples
/// ```
/// use apigw_forge_builder::wire_name;
///
/// assert_eq!(wire_name("request_templates"), Some("requestTemplates"));
/// assert_eq!(wire_name("timeoutInMillis"), Some("timeoutInMillis"));
/// assert_eq!(wire_name("retries"), None);
/// ```
pub fn wire_name(option: &str) -> Option<&'static str> {
    OPTION_NAMES
        .iter()
        .find(|(snake, camel)| *snake == option || *camel == option)
        .map(|(_, camel)| *camel)
}

/// Extra integration options keyed by caller-facing name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationOptions {
    values: BTreeMap<String, Value>,
}

/// Options after name translation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslatedOptions {
    /// Recognised options under their wire names
    pub fields: Map<String, Value>,
    /// Option names that were not recognised
    pub dropped: Vec<String>,
}

impl IntegrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge `other` into `self`, `other` winning on conflicts
    pub fn merge(&mut self, other: &IntegrationOptions) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Translate option names to wire names, dropping unknown options
    ///
    /// When an option is given under both names, the snake_case one is kept.
    pub fn translate(&self) -> TranslatedOptions {
        let mut translated = TranslatedOptions::default();

        for (key, value) in &self.values {
            match wire_name(key) {
                Some(wire) if key == wire && self.has_snake_case(wire) => {
                    warn!(option = %key, "Option also given in snake_case, ignoring this value");
                    translated.dropped.push(key.clone());
                }
                Some(wire) => {
                    translated.fields.insert(wire.to_string(), value.clone());
                }
                None => {
                    warn!(option = %key, "Ignoring invalid parameter for put_integration");
                    translated.dropped.push(key.clone());
                }
            }
        }

        translated
    }

    fn has_snake_case(&self, wire: &str) -> bool {
        OPTION_NAMES
            .iter()
            .any(|(snake, camel)| *camel == wire && self.values.contains_key(*snake))
    }
}

impl From<BTreeMap<String, Value>> for IntegrationOptions {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Typed view of the translated fields
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntegrationOverrides {
    connection_type: Option<ConnectionType>,
    connection_id: Option<String>,
    request_parameters: Option<BTreeMap<String, String>>,
    request_templates: Option<BTreeMap<String, String>>,
    passthrough_behavior: Option<PassthroughBehavior>,
    cache_namespace: Option<String>,
    cache_key_parameters: Option<Vec<String>>,
    content_handling: Option<ContentHandling>,
    timeout_in_millis: Option<u32>,
    tls_config: Option<TlsConfig>,
}

impl TranslatedOptions {
    /// Write the translated options onto an integration
    pub fn apply_to(&self, config: &mut IntegrationConfig) -> Result<()> {
        let overrides: IntegrationOverrides =
            serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
                ForgeError::InvalidInput(format!("invalid integration option: {}", e))
            })?;

        if let Some(connection_type) = overrides.connection_type {
            config.connection_type = Some(connection_type);
        }
        if let Some(connection_id) = overrides.connection_id {
            config.connection_id = Some(connection_id);
        }
        if let Some(request_parameters) = overrides.request_parameters {
            config.request_parameters = request_parameters;
        }
        if let Some(request_templates) = overrides.request_templates {
            config.request_templates = request_templates;
        }
        if let Some(passthrough_behavior) = overrides.passthrough_behavior {
            config.passthrough_behavior = Some(passthrough_behavior);
        }
        if let Some(cache_namespace) = overrides.cache_namespace {
            config.cache_namespace = Some(cache_namespace);
        }
        if let Some(cache_key_parameters) = overrides.cache_key_parameters {
            config.cache_key_parameters = cache_key_parameters;
        }
        if let Some(content_handling) = overrides.content_handling {
            config.content_handling = Some(content_handling);
        }
        if let Some(timeout) = overrides.timeout_in_millis {
            config.timeout_millis = Some(timeout);
        }
        if let Some(tls_config) = overrides.tls_config {
            config.tls_config = Some(tls_config);
        }

        Ok(())
    }
}
