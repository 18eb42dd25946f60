//! Drives `TerraformResources` against a fake `terraform` executable that
//! logs its argv and environment.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;
use testing::servicebus::CONNECTION_STRING_OUTPUT;
use testing::stubs::write_script;
use testing::{
    AzureCredentials, DefaultNameGenerator, FixtureError, ProvisioningStep, ProvisioningTool,
    ServiceBusOptions, ServiceBusTestEnvironment, ServicePrincipal, TerraformResources,
    ToolError, VariableSet
};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const FAKE_TERRAFORM: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_TERRAFORM_LOG"
echo "env TF_IN_AUTOMATION=$TF_IN_AUTOMATION TF_INPUT=$TF_INPUT ARM_CLIENT_ID=$ARM_CLIENT_ID ARM_TENANT_ID=$ARM_TENANT_ID TF_LOG=$TF_LOG" >> "$FAKE_TERRAFORM_LOG"
case "$1" in
  init)
    echo "Initializing the backend..."
    if [ -n "$FAKE_TERRAFORM_MARKER" ]; then
      i=0
      while [ ! -f "$FAKE_TERRAFORM_MARKER" ]; do
        i=$((i + 1))
        if [ "$i" -gt 100 ]; then
          echo "Error: first line was never logged" >&2
          exit 1
        fi
        sleep 0.1
      done
    fi
    echo "Terraform has been successfully initialized!"
    ;;
  apply)
    if [ -n "$FAKE_TERRAFORM_FAIL_APPLY" ]; then
      echo "Error: creating namespace: quota exceeded" >&2
      exit 1
    fi
    echo "Apply complete! Resources: 2 added, 0 changed, 0 destroyed."
    ;;
  output)
    case "$4" in
      connection_string)
        echo '"Endpoint=sb://fake.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=c2VjcmV0"'
        ;;
      namespace_count)
        echo '3'
        ;;
      empty)
        echo 'null'
        ;;
      *)
        echo "Error: Output \"$4\" not found" >&2
        exit 1
        ;;
    esac
    ;;
  destroy)
    echo "Destroy complete! Resources: 2 destroyed."
    ;;
esac
"#;

struct FakeTerraform {
    _dir: TempDir,
    module_dir: PathBuf,
    binary: PathBuf,
    log: PathBuf
}

impl FakeTerraform {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let module_dir = dir.path().join("service_bus");
        fs::create_dir(&module_dir).unwrap();
        let binary = write_script(dir.path(), "terraform", FAKE_TERRAFORM);
        let log = dir.path().join("terraform.log");
        Self {
            _dir: dir,
            module_dir,
            binary,
            log
        }
    }

    fn tool(&self, credentials: &AzureCredentials) -> TerraformResources {
        TerraformResources::new(&self.module_dir, credentials)
            .unwrap()
            .with_binary(self.binary.display().to_string())
            .with_env("FAKE_TERRAFORM_LOG", self.log.display().to_string())
    }

    fn invocations(&self) -> Vec<String> {
        read_lines(&self.log)
            .into_iter()
            .filter(|line| !line.starts_with("env "))
            .collect()
    }

    fn environments(&self) -> Vec<String> {
        read_lines(&self.log)
            .into_iter()
            .filter(|line| line.starts_with("env "))
            .collect()
    }
}

/// Creates `marker` on the first event Terraform output produces.
struct MarkOnTerraformLine {
    marker: PathBuf
}

impl<S: tracing::Subscriber> Layer<S> for MarkOnTerraformLine {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() == "terraform" {
            let _ = fs::write(&self.marker, b"");
        }
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn service_principal() -> AzureCredentials {
    AzureCredentials::ServicePrincipal(ServicePrincipal::new(
        "client-id",
        "client-secret",
        "subscription-id",
        "tenant-id"
    ))
}

#[test]
#[serial]
fn init_and_apply_pass_automation_flags_and_variables() {
    let fake = FakeTerraform::new();
    let tool = fake.tool(&service_principal());
    let variables = VariableSet::new()
        .with("resource_group", "rg-test")
        .with("servicebus_namespace", "rust-abc");

    tool.init().unwrap();
    tool.apply(&variables).unwrap();

    assert_eq!(
        fake.invocations(),
        vec![
            "init -input=false -no-color".to_string(),
            "apply -auto-approve -input=false -no-color -var resource_group=rg-test -var servicebus_namespace=rust-abc".to_string(),
        ]
    );
    for env in fake.environments() {
        assert!(env.contains("TF_IN_AUTOMATION=1"), "{}", env);
        assert!(env.contains("TF_INPUT=0"), "{}", env);
        assert!(env.contains("ARM_CLIENT_ID=client-id"), "{}", env);
        assert!(env.contains("ARM_TENANT_ID=tenant-id"), "{}", env);
    }
}

#[test]
#[serial]
fn output_is_logged_while_terraform_runs() {
    let fake = FakeTerraform::new();
    let marker = fake.module_dir.join("first-line-logged");
    let tool = fake
        .tool(&service_principal())
        .with_env("FAKE_TERRAFORM_MARKER", marker.display().to_string());
    let subscriber = tracing_subscriber::registry().with(MarkOnTerraformLine {
        marker: marker.clone()
    });

    // The fake blocks after its first line until that line has been logged.
    tracing::subscriber::with_default(subscriber, || tool.init()).unwrap();

    assert!(marker.exists());
}

#[test]
#[serial]
fn output_decodes_json_values() {
    let fake = FakeTerraform::new();
    let tool = fake.tool(&service_principal());

    assert_eq!(
        tool.output(CONNECTION_STRING_OUTPUT).unwrap(),
        "Endpoint=sb://fake.servicebus.windows.net/;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=c2VjcmV0"
    );
    assert_eq!(tool.output("namespace_count").unwrap(), "3");
    assert_eq!(
        fake.invocations().first().map(String::as_str),
        Some("output -json -no-color connection_string")
    );
}

#[test]
#[serial]
fn unknown_and_null_outputs_are_not_found() {
    let fake = FakeTerraform::new();
    let tool = fake.tool(&service_principal());

    assert!(matches!(
        tool.output("missing"),
        Err(ToolError::OutputNotFound { name }) if name == "missing"
    ));
    assert!(matches!(
        tool.output("empty"),
        Err(ToolError::OutputNotFound { .. })
    ));
}

#[test]
#[serial]
fn failed_apply_reports_stderr() {
    let fake = FakeTerraform::new();
    let tool = fake
        .tool(&service_principal())
        .with_env("FAKE_TERRAFORM_FAIL_APPLY", "1");

    let err = tool.apply(&VariableSet::new()).unwrap_err();

    match err {
        ToolError::CommandFailed {
            command, stderr, ..
        } => {
            assert!(command.ends_with("apply"));
            assert!(stderr.contains("quota exceeded"));
        }
        other => panic!("unexpected error: {:?}", other)
    }
}

#[test]
#[serial]
fn missing_binary_is_a_spawn_error() {
    let fake = FakeTerraform::new();
    let tool = fake
        .tool(&service_principal())
        .with_binary("/nonexistent/terraform");

    assert!(matches!(tool.init(), Err(ToolError::Spawn { .. })));
}

#[test]
fn missing_module_directory_is_rejected() {
    let dir = TempDir::new().unwrap();

    let result = TerraformResources::new(dir.path().join("absent"), &service_principal());

    assert!(matches!(
        result,
        Err(ToolError::InvalidWorkingDirectory { .. })
    ));
}

#[test]
#[serial]
fn environment_lifecycle_through_cli() {
    let fake = FakeTerraform::new();
    let credentials = service_principal();

    let environment = ServiceBusTestEnvironment::provision(
        &credentials,
        &DefaultNameGenerator::new("cli"),
        &ServiceBusOptions::default(),
        |credentials| Ok(fake.tool(credentials))
    )
    .unwrap();

    let properties = environment.connection_properties().unwrap().unwrap();
    assert_eq!(properties.fully_qualified_namespace(), "fake.servicebus.windows.net");
    assert_eq!(properties.shared_access_key_name(), Some("RootManageSharedAccessKey"));

    environment.dispose().unwrap();

    let invocations = fake.invocations();
    let apply = invocations
        .iter()
        .find_map(|line| line.strip_prefix("apply "))
        .unwrap();
    let destroy = invocations
        .iter()
        .find_map(|line| line.strip_prefix("destroy "))
        .unwrap();
    assert_eq!(apply, destroy);
    assert!(apply.contains("-var resource_group=cli-service-bus-test-"));
    assert!(apply.contains("-var servicebus_namespace=rust-"));
}

#[test]
#[serial]
fn dropped_environment_still_destroys() {
    let fake = FakeTerraform::new();

    {
        let _environment = ServiceBusTestEnvironment::provision(
            &service_principal(),
            &DefaultNameGenerator::new("cli"),
            &ServiceBusOptions::default(),
            |credentials| Ok(fake.tool(credentials))
        )
        .unwrap();
    }

    assert_eq!(
        fake.invocations()
            .iter()
            .filter(|line| line.starts_with("destroy "))
            .count(),
        1
    );
}

#[test]
#[serial]
fn apply_failure_surfaces_as_provisioning_failure() {
    let fake = FakeTerraform::new();

    let err = ServiceBusTestEnvironment::provision(
        &service_principal(),
        &DefaultNameGenerator::new("cli"),
        &ServiceBusOptions::default(),
        |credentials| Ok(fake.tool(credentials).with_env("FAKE_TERRAFORM_FAIL_APPLY", "1"))
    )
    .unwrap_err();

    assert!(matches!(
        err,
        FixtureError::ProvisioningFailure {
            step: ProvisioningStep::Apply,
            source: ToolError::CommandFailed { .. }
        }
    ));
    assert!(err.may_leak_resources());
    assert!(
        !fake
            .invocations()
            .iter()
            .any(|line| line.starts_with("destroy "))
    );
}
