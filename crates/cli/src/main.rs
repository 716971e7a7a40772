//! apigw-forge CLI
//!
//! Command-line interface for building API Gateway REST APIs: resource trees,
//! methods, integrations, stages and the IAM roles integrations assume.

mod session;
mod wizard;

use anyhow::{Context, Result};
use apigw_forge_builder::{
    apply_blueprint, data_store_integration, lambda_proxy_target, CrudAction, IntegrationOptions,
    IntegrationTarget, MethodOptions, PublishRequest, DEFAULT_DEPLOYMENT_DESCRIPTION,
};
use apigw_forge_common::{ApiBlueprint, AuthorizationType, HttpVerb, IntegrationType};
use clap::{Parser, Subcommand};
use colored::*;
use session::{Session, SettingsOverrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apigw-forge")]
#[command(version, about = "Build API Gateway REST APIs and the roles they assume", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Region of the API and its backends
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// Named credentials profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// YAML settings file
    #[arg(short, long, global = true, env = "APIGW_FORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Table referenced by data-store integrations and the role policy
    #[arg(long, global = true, env = "APIGW_FORGE_TABLE")]
    table: Option<String>,

    /// Account owning the table and customer-managed policies
    #[arg(long, global = true, env = "APIGW_FORGE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Run against an in-memory control plane and print the calls it received
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new REST API
    #[command(after_help = "EXAMPLES:\n  \
        apigw-forge create-api --name jobs-api --description 'Job tracking'")]
    CreateApi {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Ensure every segment of a resource path exists
    #[command(after_help = "EXAMPLES:\n  \
        apigw-forge add-resource --api-id a1b2c3 --path '/jobs/{jobId}'")]
    AddResource {
        #[arg(long)]
        api_id: String,

        /// Full path, e.g. /jobs/{jobId}
        #[arg(short, long)]
        path: String,
    },

    /// Put a method on a resource
    AddMethod {
        #[arg(long)]
        api_id: String,

        #[arg(short, long)]
        path: String,

        /// HTTP verb (GET, POST, ..., ANY)
        #[arg(long)]
        verb: HttpVerb,

        #[arg(long, default_value = "NONE")]
        authorization: AuthorizationType,

        /// Required request parameter, e.g. method.request.path.jobId
        #[arg(long = "required-param")]
        required_params: Vec<String>,

        /// Optional request parameter
        #[arg(long = "optional-param")]
        optional_params: Vec<String>,
    },

    /// Attach an integration to a method
    #[command(after_help = "EXAMPLES:\n  \
        # Mock integration with a request template\n  \
        apigw-forge add-integration --api-id a1b2c3 --path /jobs --verb GET --type MOCK \\\n    \
        --option 'request_templates={\"application/json\": \"{\\\"statusCode\\\": 200}\"}'\n\n  \
        # Lambda proxy integration\n  \
        apigw-forge add-integration --api-id a1b2c3 --path /code --verb POST \\\n    \
        --lambda-arn arn:aws:lambda:us-east-1:123456789012:function:hello\n\n  \
        # Data-store integration (provisions the configured role)\n  \
        apigw-forge add-integration --api-id a1b2c3 --path '/jobs/{jobId}' --verb GET \\\n    \
        --data-store-action read --table job_details --account-id 123456789012")]
    AddIntegration {
        #[arg(long)]
        api_id: String,

        #[arg(short, long)]
        path: String,

        #[arg(long)]
        verb: HttpVerb,

        /// Integration type
        #[arg(long = "type", default_value = "MOCK")]
        integration_type: IntegrationType,

        /// Backend URI
        #[arg(long, conflicts_with_all = ["lambda_arn", "data_store_action"])]
        uri: Option<String>,

        /// Verb used against the backend (defaults to the method's verb)
        #[arg(long)]
        backend_verb: Option<HttpVerb>,

        /// Role ARN assumed to call the backend
        #[arg(long)]
        credentials: Option<String>,

        /// Lambda function invoked through a proxy integration
        #[arg(long, conflicts_with = "data_store_action")]
        lambda_arn: Option<String>,

        /// Table action: create, read, update, delete or list
        #[arg(long)]
        data_store_action: Option<CrudAction>,

        /// Extra integration option as KEY=VALUE (VALUE may be JSON)
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, serde_json::Value)>,
    },

    /// Deploy the API and point a stage at the deployment
    Deploy {
        #[arg(long)]
        api_id: String,

        #[arg(short, long, default_value = "dev")]
        stage: String,

        /// Deployment description
        #[arg(short, long, default_value = DEFAULT_DEPLOYMENT_DESCRIPTION)]
        description: String,

        /// Description given to the stage if it has to be created
        #[arg(long, default_value = "")]
        stage_description: String,
    },

    /// Ensure the integration role exists with its data-store policy
    ProvisionRole {
        /// Role name (defaults to the configured role)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Create a managed logging policy
    CreatePolicy {
        #[arg(short, long)]
        name: String,
    },

    /// Attach a managed policy to a role
    AttachPolicy {
        #[arg(short, long)]
        role: String,

        /// Policy name or ARN
        #[arg(short, long)]
        policy: String,
    },

    /// Apply a YAML blueprint end to end
    Apply {
        /// Blueprint file
        blueprint: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build an API interactively
    Wizard,
}

/// Parse `KEY=VALUE`, reading VALUE as JSON when it is valid JSON
fn parse_option(raw: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("missing option name in '{}'", raw));
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "apigw_forge={level},apigw_forge_builder={level},apigw_forge_control={level},warn"
            )
            .into()
        }))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.verbose {
        println!("{} Verbose mode enabled", "→".cyan());
    }

    let overrides = SettingsOverrides {
        region: cli.region.clone(),
        profile: cli.profile.clone(),
        table: cli.table.clone(),
        account_id: cli.account_id.clone(),
    };
    let settings = session::resolve_settings(cli.config.as_deref(), &overrides, cli.dry_run)?;
    let session = Session::open(settings, cli.dry_run)?;

    if cli.dry_run {
        println!(
            "{} Dry run: using an in-memory control plane",
            "→".cyan()
        );
    }

    match cli.command {
        Commands::CreateApi { name, description } => {
            create_api_command(&session, &name, &description)?;
        }
        Commands::AddResource { api_id, path } => {
            add_resource_command(&session, &api_id, &path)?;
        }
        Commands::AddMethod {
            api_id,
            path,
            verb,
            authorization,
            required_params,
            optional_params,
        } => {
            let mut options = MethodOptions::default().with_authorization(authorization);
            for param in required_params {
                options = options.with_request_parameter(param, true);
            }
            for param in optional_params {
                options = options.with_request_parameter(param, false);
            }
            add_method_command(&session, &api_id, &path, verb, options)?;
        }
        Commands::AddIntegration {
            api_id,
            path,
            verb,
            integration_type,
            uri,
            backend_verb,
            credentials,
            lambda_arn,
            data_store_action,
            options,
        } => {
            add_integration_command(
                &session,
                IntegrationArgs {
                    api_id: &api_id,
                    path: &path,
                    verb,
                    integration_type,
                    uri,
                    backend_verb,
                    credentials,
                    lambda_arn,
                    data_store_action,
                    options: IntegrationOptions::from(
                        options.into_iter().collect::<std::collections::BTreeMap<_, _>>(),
                    ),
                },
            )?;
        }
        Commands::Deploy {
            api_id,
            stage,
            description,
            stage_description,
        } => {
            let request = PublishRequest::new(stage)
                .with_deployment_description(description)
                .with_stage_description(stage_description);
            deploy_command(&session, &api_id, &request)?;
        }
        Commands::ProvisionRole { name } => {
            provision_role_command(&session, name.as_deref())?;
        }
        Commands::CreatePolicy { name } => {
            let provisioned = session
                .provisioner()
                .ensure_logging_policy(&name)
                .with_context(|| format!("Failed to create policy {}", name))?;
            if provisioned.created {
                println!("{} Created policy {}", "✓".green(), provisioned.policy.arn.yellow());
            } else {
                println!("{} Policy already exists: {}", "✓".green(), provisioned.policy.arn.yellow());
            }
        }
        Commands::AttachPolicy { role, policy } => {
            let attached = session
                .provisioner()
                .attach_policy(&role, &policy)
                .with_context(|| format!("Failed to attach {} to {}", policy, role))?;
            println!(
                "{} Attached {} to role {}",
                "✓".green(),
                attached.arn.yellow(),
                role.cyan()
            );
        }
        Commands::Apply { blueprint, json } => {
            apply_command(&session, &blueprint, json, cli.verbose)?;
        }
        Commands::Wizard => {
            wizard::run(&session)?;
        }
    }

    if cli.dry_run {
        session.print_journal();
    }

    Ok(())
}

fn create_api_command(session: &Session, name: &str, description: &str) -> Result<()> {
    println!("{} Creating API {}", "→".cyan(), name.yellow());

    let mut gateway = session.gateway();
    let api = gateway
        .create_api(name, description)
        .with_context(|| format!("Failed to create API {}", name))?;

    println!("\n{}", "✓ API created!".green().bold());
    println!("  Id: {}", api.id.yellow());
    println!("  Region: {}", api.region);
    Ok(())
}

fn add_resource_command(session: &Session, api_id: &str, path: &str) -> Result<()> {
    println!("{} Ensuring resource {}", "→".cyan(), path.yellow());

    let mut gateway = session.open_api(api_id)?;
    let resource = gateway
        .ensure_path(path)
        .with_context(|| format!("Failed to ensure resource {}", path))?;

    println!(
        "{} {} ({})",
        "✓".green(),
        resource.full_path().yellow(),
        resource.resource_id()
    );
    Ok(())
}

fn add_method_command(
    session: &Session,
    api_id: &str,
    path: &str,
    verb: HttpVerb,
    options: MethodOptions,
) -> Result<()> {
    let mut gateway = session.open_api(api_id)?;
    let mut resource = gateway
        .ensure_path(path)
        .with_context(|| format!("Failed to ensure resource {}", path))?;

    resource
        .add_method(verb, options)
        .with_context(|| format!("Failed to add {} to {}", verb, path))?;

    println!(
        "{} Added {} {}",
        "✓".green(),
        verb.to_string().cyan(),
        resource.full_path().yellow()
    );
    Ok(())
}

struct IntegrationArgs<'a> {
    api_id: &'a str,
    path: &'a str,
    verb: HttpVerb,
    integration_type: IntegrationType,
    uri: Option<String>,
    backend_verb: Option<HttpVerb>,
    credentials: Option<String>,
    lambda_arn: Option<String>,
    data_store_action: Option<CrudAction>,
    options: IntegrationOptions,
}

fn add_integration_command(session: &Session, args: IntegrationArgs<'_>) -> Result<()> {
    let mut gateway = session.open_api(args.api_id)?;
    let mut resource = gateway
        .ensure_path(args.path)
        .with_context(|| format!("Failed to ensure resource {}", args.path))?;

    let region = session.settings.region.clone();
    let (mut target, options) = match (args.data_store_action, &args.lambda_arn) {
        (Some(action), _) => {
            let role_arn = match args.credentials.clone() {
                Some(arn) => arn,
                None => {
                    let provisioned = session
                        .provisioner()
                        .provision_default_role()
                        .context("Failed to provision integration role")?;
                    provisioned.role.arn
                }
            };
            let (target, mut options) = data_store_integration(
                &region,
                &session.settings.data_store,
                &role_arn,
                action,
                resource.full_path(),
            )?;
            options.merge(&args.options);
            (target, options)
        }
        (None, Some(function_arn)) => (lambda_proxy_target(&region, function_arn), args.options),
        (None, None) => {
            let mut target = IntegrationTarget::new(args.integration_type);
            target.uri = args.uri;
            (target, args.options)
        }
    };
    if let Some(verb) = args.backend_verb {
        target.backend_verb = Some(verb);
    }
    if args.data_store_action.is_none() {
        if let Some(credentials) = args.credentials {
            target.credentials = Some(credentials);
        }
    }

    let integration = resource
        .add_integration(args.verb, target, &options)
        .with_context(|| format!("Failed to add integration to {} {}", args.verb, args.path))?;

    println!(
        "{} {} integration on {} {}",
        "✓".green(),
        integration.integration_type.to_string().cyan(),
        args.verb,
        args.path.yellow()
    );
    Ok(())
}

fn deploy_command(session: &Session, api_id: &str, request: &PublishRequest) -> Result<()> {
    println!(
        "{} Deploying to stage {}",
        "→".cyan(),
        request.stage_name.yellow()
    );

    let gateway = session.open_api(api_id)?;
    let outcome = gateway
        .publish(request)
        .with_context(|| format!("Failed to deploy stage {}", request.stage_name))?;

    println!("\n{}", "✓ API deployed!".green().bold());
    println!("  Deployment: {}", outcome.deployment_id);
    println!(
        "  Stage: {} ({})",
        outcome.stage_name,
        if outcome.stage_created { "created" } else { "updated" }
    );
    println!("  Endpoint: {}", outcome.url.cyan());
    Ok(())
}

fn provision_role_command(session: &Session, name: Option<&str>) -> Result<()> {
    let provisioner = session.provisioner();
    let name = name.unwrap_or(&session.settings.role.name);
    println!("{} Provisioning role {}", "→".cyan(), name.yellow());

    let provisioned = provisioner
        .provision_role(name)
        .with_context(|| format!("Failed to provision role {}", name))?;

    if provisioned.created {
        println!("{} Created role {}", "✓".green(), provisioned.role.arn.yellow());
    } else {
        println!("{} Reused role {}", "✓".green(), provisioned.role.arn.yellow());
    }
    Ok(())
}

fn apply_command(
    session: &Session,
    path: &std::path::Path,
    json: bool,
    verbose: bool,
) -> Result<()> {
    println!("{} Applying blueprint: {}", "→".cyan(), path.display());

    let blueprint = ApiBlueprint::load(path).context("Failed to load blueprint")?;
    let mut gateway = session.gateway();
    let report = apply_blueprint(&mut gateway, &session.provisioner(), &blueprint)
        .context("Failed to apply blueprint")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n{}", "✓ Blueprint applied!".green().bold());
    println!("  API: {} ({})", report.api.name.yellow(), report.api.id);
    println!("  Resources: {}", report.resources.len());
    if verbose {
        for resource in &report.resources {
            let verbs: Vec<&str> = resource.methods.iter().map(HttpVerb::as_str).collect();
            println!(
                "  • {} [{}] ({})",
                resource.path.cyan(),
                verbs.join(", "),
                resource.resource_id
            );
        }
    }
    if let Some(role) = &report.role {
        println!("  Role: {}", role.arn);
    }
    if let Some(publish) = &report.publish {
        println!("  Endpoint: {}", publish.url.cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_option_reads_json_values() {
        let (key, value) = parse_option("timeout_in_millis=5000").unwrap();
        assert_eq!(key, "timeout_in_millis");
        assert_eq!(value, serde_json::json!(5000));

        let (_, value) = parse_option(r#"request_templates={"application/json": "{}"}"#).unwrap();
        assert_eq!(value["application/json"], "{}");
    }

    #[test]
    fn test_parse_option_falls_back_to_string() {
        let (_, value) = parse_option("passthrough_behavior=WHEN_NO_MATCH").unwrap();
        assert_eq!(value, serde_json::json!("WHEN_NO_MATCH"));

        assert!(parse_option("no-equals-sign").is_err());
        assert!(parse_option("=value").is_err());
    }

    #[test]
    fn test_subcommand_arguments_parse() {
        let cli = Cli::try_parse_from([
            "apigw-forge",
            "--dry-run",
            "add-method",
            "--api-id",
            "a1",
            "--path",
            "/jobs",
            "--verb",
            "get",
            "--required-param",
            "method.request.querystring.page",
        ])
        .unwrap();

        assert!(cli.dry_run);
        match cli.command {
            Commands::AddMethod {
                verb,
                authorization,
                required_params,
                ..
            } => {
                assert_eq!(verb, HttpVerb::Get);
                assert_eq!(authorization, AuthorizationType::None);
                assert_eq!(required_params, vec!["method.request.querystring.page"]);
            }
            _ => panic!("expected add-method"),
        }
    }
}
