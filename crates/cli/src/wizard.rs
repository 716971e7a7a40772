//! Interactive API builder
//!
//! Asks for the API, one resource path, one method and its integration, then
//! applies the result as a blueprint.

use crate::session::Session;
use anyhow::{bail, Context, Result};
use apigw_forge_builder::{apply_blueprint, path_segments, validate_path_part, CrudAction};
use apigw_forge_common::{
    ApiBlueprint, ApiSection, HttpVerb, IntegrationBlueprint, IntegrationType, MethodBlueprint,
    ResourceBlueprint, StageBlueprint,
};
use colored::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Line-oriented prompts over any reader and writer
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask once; an empty answer yields `default`
    pub fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(default) => write!(self.output, "{} [{}]: ", question, default)?,
            None => write!(self.output, "{}: ", question)?,
        }
        self.output.flush()?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 && default.is_none() {
            bail!("input ended while asking: {}", question);
        }

        let answer = line.trim();
        match (answer.is_empty(), default) {
            (true, Some(default)) => Ok(default.to_string()),
            _ => Ok(answer.to_string()),
        }
    }

    /// Ask until the answer is non-empty
    pub fn ask_required(&mut self, question: &str) -> Result<String> {
        loop {
            let answer = self.ask(question, None)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            writeln!(self.output, "  a value is required")?;
        }
    }

    /// Ask until the answer parses
    pub fn ask_parsed<T>(&mut self, question: &str, default: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        loop {
            let answer = self.ask(question, Some(default))?;
            match answer.parse() {
                Ok(value) => return Ok(value),
                Err(e) => writeln!(self.output, "  {}", e)?,
            }
        }
    }

    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} (y/N)", question), Some("n"))?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Answers collected by the wizard
#[derive(Debug, Clone, PartialEq)]
pub struct WizardPlan {
    pub region: String,
    pub blueprint: ApiBlueprint,
    pub save_to: Option<PathBuf>,
}

/// Ask everything the wizard needs, validating as it goes
pub fn collect_plan<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    default_region: &str,
) -> Result<WizardPlan> {
    let name = prompter.ask_required("API name")?;
    let description = prompter.ask("Description", Some(""))?;
    let stage = prompter.ask("Stage", Some("dev"))?;
    let region = prompter.ask("Region", Some(default_region))?;

    let path = loop {
        let raw = prompter.ask_required("Resource path (e.g. /jobs/{jobId})")?;
        let path = format!("/{}", path_segments(&raw).collect::<Vec<_>>().join("/"));
        let checked = path_segments(&path).try_for_each(validate_path_part);
        match checked {
            Ok(()) => break path,
            Err(e) => writeln!(prompter.output, "  {}", e)?,
        }
    };

    let verb: HttpVerb = prompter.ask_parsed("HTTP verb", "GET")?;
    let integration_type: IntegrationType =
        prompter.ask_parsed("Integration type (MOCK, HTTP, HTTP_PROXY, AWS_PROXY, AWS)", "MOCK")?;

    let mut integration = IntegrationBlueprint {
        integration_type,
        backend_verb: None,
        uri: None,
        credentials: None,
        lambda_function_arn: None,
        data_store_action: None,
        options: Default::default(),
    };
    match integration_type {
        IntegrationType::Mock => {}
        IntegrationType::Http | IntegrationType::HttpProxy => {
            integration.uri = Some(prompter.ask_required("Backend URL")?);
        }
        IntegrationType::AwsProxy => {
            integration.lambda_function_arn = Some(prompter.ask_required("Lambda function ARN")?);
        }
        IntegrationType::Aws => {
            let action: CrudAction = prompter.ask_parsed(
                "Table action (create, read, update, delete, list)",
                "read",
            )?;
            integration.data_store_action = Some(action.to_string());
        }
    }

    let save_to = prompter.ask("Save blueprint to (blank to skip)", Some(""))?;

    Ok(WizardPlan {
        region,
        blueprint: ApiBlueprint {
            api: ApiSection {
                name,
                description: Some(description).filter(|d| !d.is_empty()),
                id: None,
            },
            resources: vec![ResourceBlueprint {
                path,
                methods: vec![MethodBlueprint {
                    verb,
                    authorization: Default::default(),
                    request_parameters: Default::default(),
                    integration: Some(integration),
                }],
            }],
            stage: Some(StageBlueprint {
                name: stage,
                description: None,
                deployment_description: None,
            }),
        },
        save_to: Some(PathBuf::from(save_to)).filter(|p| !p.as_os_str().is_empty()),
    })
}

pub fn run(session: &Session) -> Result<()> {
    println!("{}", "API Gateway wizard".bold());

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());
    let plan = collect_plan(&mut prompter, &session.settings.region)?;
    plan.blueprint.validate()?;

    if let Some(path) = &plan.save_to {
        let yaml = serde_yaml::to_string(&plan.blueprint)?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write blueprint to {}", path.display()))?;
        println!("{} Saved blueprint to {}", "✓".green(), path.display());
    }

    if !prompter.confirm("Create it now?")? {
        println!("{} Nothing created", "→".cyan());
        return Ok(());
    }

    let session = session.in_region(&plan.region)?;
    let mut gateway = session.gateway();
    let report = apply_blueprint(&mut gateway, &session.provisioner(), &plan.blueprint)
        .context("Failed to build API")?;

    println!("\n{}", "✓ API created!".green().bold());
    println!("  Id: {}", report.api.id.yellow());
    if let Some(publish) = &report.publish {
        println!("  Endpoint: {}", publish.url.cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn plan_from(answers: &str) -> Result<WizardPlan> {
        let mut output = Vec::new();
        let mut prompter = Prompter::new(Cursor::new(answers.as_bytes()), &mut output);
        collect_plan(&mut prompter, "us-east-1")
    }

    #[test]
    fn test_defaults_produce_mock_get() {
        let plan = plan_from("jobs-api\n\n\n\n/jobs\n\n\n\n").unwrap();

        assert_eq!(plan.region, "us-east-1");
        assert_eq!(plan.blueprint.api.name, "jobs-api");
        assert_eq!(plan.blueprint.api.description, None);
        assert_eq!(plan.blueprint.stage.as_ref().unwrap().name, "dev");
        assert!(plan.save_to.is_none());

        let resource = &plan.blueprint.resources[0];
        assert_eq!(resource.path, "/jobs");
        assert_eq!(resource.methods[0].verb, HttpVerb::Get);
        let integration = resource.methods[0].integration.as_ref().unwrap();
        assert_eq!(integration.integration_type, IntegrationType::Mock);
    }

    #[test]
    fn test_data_store_integration_asks_for_action() {
        let plan = plan_from("jobs-api\nJobs\nprod\neu-west-1\njobs/{jobId}/\ndelete\naws\ndelete\n\n")
            .unwrap();

        assert_eq!(plan.region, "eu-west-1");
        let resource = &plan.blueprint.resources[0];
        assert_eq!(resource.path, "/jobs/{jobId}");
        assert_eq!(resource.methods[0].verb, HttpVerb::Delete);

        let integration = resource.methods[0].integration.as_ref().unwrap();
        assert_eq!(integration.integration_type, IntegrationType::Aws);
        assert_eq!(integration.data_store_action.as_deref(), Some("delete"));
    }

    #[test]
    fn test_invalid_answers_are_asked_again() {
        let plan =
            plan_from("\njobs-api\n\n\n\n/jobs/{bad\n/jobs\nfetch\npost\nhttp\nhttps://example.com\n\n")
                .unwrap();

        let method = &plan.blueprint.resources[0].methods[0];
        assert_eq!(method.verb, HttpVerb::Post);
        assert_eq!(
            method.integration.as_ref().unwrap().uri.as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_input_ending_early_is_an_error() {
        assert!(plan_from("jobs-api\n").is_err());
    }
}
