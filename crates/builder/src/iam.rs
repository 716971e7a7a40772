//! Role and policy provisioning for data-store integrations
//!
//! The control plane assumes a role to call the data store on the caller's
//! behalf. Everything here is idempotent: an existing role or managed policy
//! is reused and inline policies are re-put.

use apigw_forge_common::{ForgeError, ForgeSettings, ManagedPolicy, Result, Role};
use apigw_forge_control::IdentityControl;
use serde_json::{json, Value};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};

/// Service principal allowed to assume provisioned roles
pub const API_GATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";

const POLICY_VERSION: &str = "2012-10-17";

/// Trust policy letting the API gateway service assume a role
pub fn trust_policy() -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": API_GATEWAY_PRINCIPAL },
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

/// Inline policy granting `actions` on one table, plus log delivery
pub fn data_store_policy(table_arn: &str, actions: &[String]) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Action": actions,
                "Resource": table_arn
            },
            {
                "Effect": "Allow",
                "Action": ["logs:*"],
                "Resource": "*"
            }
        ]
    })
}

/// Managed policy allowing all log actions
pub fn logging_policy() -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Action": ["logs:*"],
                "Resource": "*"
            }
        ]
    })
}

/// A role after provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedRole {
    pub role: Role,
    /// `false` when an existing role was reused
    pub created: bool,
}

/// A managed policy after provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedPolicy {
    pub policy: ManagedPolicy,
    pub created: bool,
}

pub struct RoleProvisioner {
    control: Rc<dyn IdentityControl>,
    settings: ForgeSettings,
}

impl fmt::Debug for RoleProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleProvisioner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RoleProvisioner {
    pub fn new(control: Rc<dyn IdentityControl>, settings: ForgeSettings) -> Self {
        Self { control, settings }
    }

    pub fn settings(&self) -> &ForgeSettings {
        &self.settings
    }

    /// Ensure `role_name` exists, is assumable by the gateway, and carries the
    /// configured data-store inline policy
    ///
    /// Fails with a configuration error before any remote call when the table
    /// or account is not configured.
    pub fn provision_role(&self, role_name: &str) -> Result<ProvisionedRole> {
        let table_arn = self.settings.data_store.table_arn(&self.settings.region)?;
        let inline_policy = serde_json::to_string(&data_store_policy(
            &table_arn,
            &self.settings.data_store.actions,
        ))?;

        let (role, created) = match self.control.get_role(role_name)? {
            Some(role) => {
                debug!(role = role_name, arn = %role.arn, "Reusing existing role");
                (role, false)
            }
            None => {
                let trust = serde_json::to_string(&trust_policy())?;
                let role = self.control.create_role(role_name, &trust)?;
                info!(role = role_name, arn = %role.arn, "Created role");
                (role, true)
            }
        };

        let policy_name = &self.settings.role.inline_policy_name;
        self.control
            .put_role_policy(role_name, policy_name, &inline_policy)?;
        info!(role = role_name, policy = %policy_name, table = %table_arn, "Put inline policy");

        Ok(ProvisionedRole { role, created })
    }

    /// Provision the role named in the settings
    pub fn provision_default_role(&self) -> Result<ProvisionedRole> {
        self.provision_role(&self.settings.role.name)
    }

    /// Ensure a managed logging policy named `policy_name` exists
    ///
    /// Lookup before creation needs the account id; without it an existing
    /// policy surfaces as an already-exists error.
    pub fn ensure_logging_policy(&self, policy_name: &str) -> Result<ProvisionedPolicy> {
        if let Ok(account_id) = self.settings.data_store.account_id() {
            let arn = policy_arn(account_id, policy_name);
            if let Some(policy) = self.control.get_policy(&arn)? {
                debug!(policy = policy_name, arn = %policy.arn, "Reusing existing policy");
                return Ok(ProvisionedPolicy {
                    policy,
                    created: false,
                });
            }
        }

        let document = serde_json::to_string(&logging_policy())?;
        let policy = self.control.create_policy(policy_name, &document)?;
        info!(policy = policy_name, arn = %policy.arn, "Created policy");

        Ok(ProvisionedPolicy {
            policy,
            created: true,
        })
    }

    /// Resolve a managed policy given either its ARN or its name
    pub fn resolve_policy(&self, name_or_arn: &str) -> Result<ManagedPolicy> {
        let arn = if name_or_arn.starts_with("arn:") {
            name_or_arn.to_string()
        } else {
            policy_arn(self.settings.data_store.account_id()?, name_or_arn)
        };

        self.control
            .get_policy(&arn)?
            .ok_or_else(|| ForgeError::not_found("get_policy", arn))
    }

    /// Attach a managed policy, named or by ARN, to `role_name`
    pub fn attach_policy(&self, role_name: &str, name_or_arn: &str) -> Result<ManagedPolicy> {
        let policy = self.resolve_policy(name_or_arn)?;
        self.control.attach_role_policy(role_name, &policy.arn)?;
        info!(role = role_name, policy = %policy.arn, "Attached policy");
        Ok(policy)
    }
}

/// ARN of a customer-managed policy
pub fn policy_arn(account_id: &str, policy_name: &str) -> String {
    format!("arn:aws:iam::{}:policy/{}", account_id, policy_name)
}
