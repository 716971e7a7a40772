//! Settings layering and control-plane selection

use anyhow::{Context, Result};
use apigw_forge_builder::{ApiGateway, RoleProvisioner};
use apigw_forge_common::ForgeSettings;
use apigw_forge_control::{
    AwsControlPlane, GatewayControl, IdentityControl, InMemoryControlPlane, MEMORY_ACCOUNT_ID,
};
use colored::*;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// Flag and environment values layered over the settings file
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub table: Option<String>,
    pub account_id: Option<String>,
}

/// Defaults, then the settings file, then environment and flags
pub fn resolve_settings(
    config: Option<&Path>,
    overrides: &SettingsOverrides,
    dry_run: bool,
) -> Result<ForgeSettings> {
    let mut settings = match config {
        Some(path) => ForgeSettings::load(path).context("Failed to load settings")?,
        None => ForgeSettings::default(),
    };

    if let Some(region) = &overrides.region {
        settings.region = region.clone();
    }
    if let Some(profile) = &overrides.profile {
        settings.profile = Some(profile.clone());
    }
    if let Some(table) = &overrides.table {
        settings.data_store.table_name = Some(table.clone());
    }
    if let Some(account_id) = &overrides.account_id {
        settings.data_store.account_id = Some(account_id.clone());
    }

    // ARNs minted by the in-memory backend use a fixed account
    if dry_run && settings.data_store.account_id.is_none() {
        settings.data_store.account_id = Some(MEMORY_ACCOUNT_ID.to_string());
    }

    Ok(settings)
}

/// Resolved settings plus the control plane every command talks to
#[derive(Clone)]
pub struct Session {
    pub settings: ForgeSettings,
    gateway: Rc<dyn GatewayControl>,
    identity: Rc<dyn IdentityControl>,
    memory: Option<Rc<InMemoryControlPlane>>,
}

impl Session {
    pub fn open(settings: ForgeSettings, dry_run: bool) -> Result<Self> {
        debug!(
            region = %settings.region,
            profile = settings.profile.as_deref().unwrap_or("default"),
            table = settings.data_store.table_name.as_deref().unwrap_or("-"),
            backend = if dry_run { "memory" } else { "aws" },
            "Opening session"
        );

        if dry_run {
            let memory = Rc::new(InMemoryControlPlane::new(&settings.region));
            return Ok(Self {
                settings,
                gateway: memory.clone(),
                identity: memory.clone(),
                memory: Some(memory),
            });
        }

        let aws = Rc::new(
            AwsControlPlane::connect(&settings.region, settings.profile.as_deref())
                .context("Failed to set up AWS clients")?,
        );
        Ok(Self {
            settings,
            gateway: aws.clone(),
            identity: aws,
            memory: None,
        })
    }

    /// The same session targeting `region`
    ///
    /// A dry run keeps its control plane so the journal stays complete.
    pub fn in_region(&self, region: &str) -> Result<Self> {
        if region == self.settings.region {
            return Ok(self.clone());
        }

        let mut settings = self.settings.clone();
        settings.region = region.to_string();
        if self.memory.is_some() {
            return Ok(Self {
                settings,
                ..self.clone()
            });
        }
        Self::open(settings, false)
    }

    /// Gateway handle with no API selected
    pub fn gateway(&self) -> ApiGateway {
        ApiGateway::new(self.gateway.clone(), &self.settings.region)
            .with_endpoint_type(self.settings.endpoint_type)
    }

    /// Gateway handle on an existing API
    ///
    /// A dry run starts from an empty control plane, so it works on a scratch
    /// API standing in for `api_id`.
    pub fn open_api(&self, api_id: &str) -> Result<ApiGateway> {
        let mut gateway = self.gateway();
        if self.memory.is_some() {
            println!(
                "{} Dry run: using a scratch API in place of {}",
                "→".cyan(),
                api_id.yellow()
            );
            gateway.create_api(api_id, "dry run stand-in")?;
            return Ok(gateway);
        }

        gateway
            .use_api(api_id)
            .with_context(|| format!("Failed to look up API {}", api_id))?;
        Ok(gateway)
    }

    pub fn provisioner(&self) -> RoleProvisioner {
        RoleProvisioner::new(self.identity.clone(), self.settings.clone())
    }

    /// Print the calls a dry run would have made
    pub fn print_journal(&self) {
        let Some(memory) = &self.memory else {
            return;
        };

        let calls = memory.calls();
        println!("\n{} ({} calls)", "Control-plane calls:".bold(), calls.len());
        for call in calls {
            println!("  • {} {}", call.operation.cyan(), call.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_flags_override_settings_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "region: eu-west-1\ndata_store:\n  table_name: from_file\n  account_id: '111111111111'"
        )
        .unwrap();

        let overrides = SettingsOverrides {
            table: Some("from_flag".to_string()),
            ..SettingsOverrides::default()
        };
        let settings = resolve_settings(Some(file.path()), &overrides, false).unwrap();

        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.data_store.table_name.as_deref(), Some("from_flag"));
        assert_eq!(settings.data_store.account_id.as_deref(), Some("111111111111"));
    }

    #[test]
    fn test_dry_run_fills_account() {
        let settings = resolve_settings(None, &SettingsOverrides::default(), true).unwrap();
        assert_eq!(settings.data_store.account_id.as_deref(), Some(MEMORY_ACCOUNT_ID));

        let settings = resolve_settings(None, &SettingsOverrides::default(), false).unwrap();
        assert!(settings.data_store.account_id.is_none());
    }

    #[test]
    fn test_dry_run_session_builds_against_scratch_api() {
        let settings = resolve_settings(None, &SettingsOverrides::default(), true).unwrap();
        let session = Session::open(settings, true).unwrap();

        let mut gateway = session.open_api("a1b2c3").unwrap();
        let jobs = gateway.ensure_path("/jobs").unwrap();
        assert_eq!(jobs.full_path(), "/jobs");

        let memory = session.memory.as_ref().unwrap();
        assert_eq!(memory.call_count("create_rest_api"), 1);
        assert_eq!(memory.call_count("create_resource"), 1);
    }

    #[test]
    fn test_open_logs_selected_backend() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let settings = resolve_settings(None, &SettingsOverrides::default(), true).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            Session::open(settings, true).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Opening session"));
        assert!(output.contains("backend=\"memory\""));
        assert!(output.contains("region=us-east-1"));
    }
}
