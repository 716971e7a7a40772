//! Layered settings loading from YAML files
//!
//! Values that depend on the deployment environment (region, account, table)
//! live here instead of being hardcoded. A YAML file supplies the base layer;
//! the CLI overlays environment variables and flags on top of it.

use crate::{EndpointType, ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_ROLE_NAME: &str = "api_gateway_role";
pub const DEFAULT_INLINE_POLICY_NAME: &str = "job_details_policy";

/// Root structure of a settings YAML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForgeSettings {
    /// Region of the API and of the data store
    pub region: String,
    /// Named credentials profile
    pub profile: Option<String>,
    /// Endpoint type for newly created APIs
    pub endpoint_type: EndpointType,
    pub role: RoleSettings,
    pub data_store: DataStoreSettings,
}

/// Role provisioned for data-store integrations
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleSettings {
    pub name: String,
    pub inline_policy_name: String,
}

/// Backing table referenced by the inline policy and data-store integrations
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataStoreSettings {
    pub table_name: Option<String>,
    pub account_id: Option<String>,
    /// Actions granted on the table
    pub actions: Vec<String>,
    /// Partition key attribute used by generated mapping templates
    pub key_attribute: String,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            profile: None,
            endpoint_type: EndpointType::Regional,
            role: RoleSettings::default(),
            data_store: DataStoreSettings::default(),
        }
    }
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_ROLE_NAME.to_string(),
            inline_policy_name: DEFAULT_INLINE_POLICY_NAME.to_string(),
        }
    }
}

impl Default for DataStoreSettings {
    fn default() -> Self {
        Self {
            table_name: None,
            account_id: None,
            actions: vec!["dynamodb:PutItem".to_string(), "dynamodb:GetItem".to_string()],
            key_attribute: "id".to_string(),
        }
    }
}

impl ForgeSettings {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ForgeError::Config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;

        Self::from_yaml(&content).map_err(|e| {
            ForgeError::Config(format!("Failed to parse settings YAML from {:?}: {}", path, e))
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

impl DataStoreSettings {
    pub fn table_name(&self) -> Result<&str> {
        self.table_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ForgeError::Config("data_store.table_name is not configured".to_string()))
    }

    pub fn account_id(&self) -> Result<&str> {
        self.account_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ForgeError::Config("data_store.account_id is not configured".to_string()))
    }

    /// ARN of the configured table in `region`
    pub fn table_arn(&self, region: &str) -> Result<String> {
        Ok(format!(
            "arn:aws:dynamodb:{}:{}:table/{}",
            region,
            self.account_id()?,
            self.table_name()?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = ForgeSettings::default();
        assert_eq!(settings.region, "us-east-1");
        assert_eq!(settings.role.name, "api_gateway_role");
        assert_eq!(settings.role.inline_policy_name, "job_details_policy");
        assert_eq!(settings.endpoint_type, EndpointType::Regional);
        assert_eq!(
            settings.data_store.actions,
            vec!["dynamodb:PutItem", "dynamodb:GetItem"]
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = ForgeSettings::from_yaml(
            "region: eu-west-1\ndata_store:\n  table_name: jobs\n  account_id: \"123456789012\"\n",
        )
        .unwrap();

        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.role.name, "api_gateway_role");
        assert_eq!(settings.data_store.key_attribute, "id");
        assert_eq!(
            settings.data_store.table_arn(&settings.region).unwrap(),
            "arn:aws:dynamodb:eu-west-1:123456789012:table/jobs"
        );
    }

    #[test]
    fn test_missing_table_is_config_error() {
        let settings = ForgeSettings::default();
        let err = settings.data_store.table_arn("us-east-1").unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "region: ap-south-1\nendpoint_type: edge").unwrap();

        let settings = ForgeSettings::load(file.path()).unwrap();
        assert_eq!(settings.region, "ap-south-1");
        assert_eq!(settings.endpoint_type, EndpointType::Edge);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ForgeSettings::load(Path::new("/nonexistent/settings.yaml"));
        assert!(matches!(result, Err(ForgeError::Config(_))));
    }
}
