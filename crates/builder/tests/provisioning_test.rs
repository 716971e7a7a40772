//! Role provisioning and blueprint application against the in-memory control plane

use apigw_forge_builder::{apply_blueprint, ApiGateway, RoleProvisioner};
use apigw_forge_common::{
    ApiBlueprint, DataStoreSettings, ForgeSettings, HttpVerb, IntegrationType,
};
use apigw_forge_control::{InMemoryControlPlane, MEMORY_ACCOUNT_ID};
use std::io::Write;
use std::rc::Rc;
use tempfile::NamedTempFile;

fn settings() -> ForgeSettings {
    ForgeSettings {
        data_store: DataStoreSettings {
            table_name: Some("job_details".to_string()),
            account_id: Some(MEMORY_ACCOUNT_ID.to_string()),
            ..DataStoreSettings::default()
        },
        ..ForgeSettings::default()
    }
}

#[test]
fn test_role_provisioning_is_idempotent() {
    let control = Rc::new(InMemoryControlPlane::new("us-east-1"));
    let provisioner = RoleProvisioner::new(control.clone(), settings());

    let first = provisioner.provision_default_role().unwrap();
    let second = provisioner.provision_default_role().unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.role.arn, second.role.arn);
    assert_eq!(control.call_count("create_role"), 1);
    assert_eq!(control.call_count("put_role_policy"), 2);

    let policy = control
        .inline_policy("api_gateway_role", "job_details_policy")
        .unwrap();
    let policy: serde_json::Value = serde_json::from_str(&policy).unwrap();
    assert_eq!(
        policy["Statement"][0]["Resource"],
        "arn:aws:dynamodb:us-east-1:000000000000:table/job_details"
    );
    assert_eq!(policy["Statement"][0]["Action"][0], "dynamodb:PutItem");
}

#[test]
fn test_logging_policy_created_once_and_attached() {
    let control = Rc::new(InMemoryControlPlane::new("us-east-1"));
    let provisioner = RoleProvisioner::new(control.clone(), settings());
    provisioner.provision_default_role().unwrap();

    let first = provisioner.ensure_logging_policy("gateway-logs").unwrap();
    let second = provisioner.ensure_logging_policy("gateway-logs").unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(control.call_count("create_policy"), 1);

    let attached = provisioner
        .attach_policy("api_gateway_role", "gateway-logs")
        .unwrap();
    assert_eq!(attached.arn, first.policy.arn);
    assert_eq!(
        control.attached_policies("api_gateway_role"),
        vec![first.policy.arn.clone()]
    );
}

#[test]
fn test_blueprint_with_data_store_integration() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
api:
  name: jobs-api
resources:
  - path: /jobs
    methods:
      - verb: post
        integration:
          type: aws
          data_store_action: create
  - path: /jobs/{{jobId}}
    methods:
      - verb: get
        integration:
          type: aws
          data_store_action: read
      - verb: delete
        integration:
          type: aws
          data_store_action: delete
          options:
            timeout_in_millis: 5000
stage:
  name: dev
  deployment_description: Initial deployment
"#
    )
    .unwrap();

    let blueprint = ApiBlueprint::load(file.path()).unwrap();

    let control = Rc::new(InMemoryControlPlane::new("us-east-1"));
    let provisioner = RoleProvisioner::new(control.clone(), settings());
    let mut gateway = ApiGateway::new(control.clone(), "us-east-1");

    let report = apply_blueprint(&mut gateway, &provisioner, &blueprint).unwrap();

    // One role serves every data-store integration
    let role = report.role.unwrap();
    assert_eq!(control.call_count("create_role"), 1);
    assert_eq!(control.call_count("put_integration"), 3);

    let job = &report.resources[1];
    assert_eq!(job.path, "/jobs/{jobId}");
    assert_eq!(job.methods, vec![HttpVerb::Get, HttpVerb::Delete]);

    let read = control
        .integration(&report.api.id, &job.resource_id, HttpVerb::Get)
        .unwrap()
        .integration;
    assert_eq!(read.integration_type, IntegrationType::Aws);
    assert_eq!(read.backend_verb, Some(HttpVerb::Post));
    assert_eq!(
        read.uri.as_deref(),
        Some("arn:aws:apigateway:us-east-1:dynamodb:action/GetItem")
    );
    assert_eq!(read.credentials.as_deref(), Some(role.arn.as_str()));
    assert!(read.request_templates["application/json"].contains("$input.params('jobId')"));

    let delete = control
        .integration(&report.api.id, &job.resource_id, HttpVerb::Delete)
        .unwrap()
        .integration;
    assert_eq!(delete.timeout_millis, Some(5000));

    let publish = report.publish.unwrap();
    assert_eq!(publish.stage_name, "dev");
    assert_eq!(
        control.deployments(&report.api.id)[0].description.as_deref(),
        Some("Initial deployment")
    );
}
