//! In-process stand-ins for the provisioning tool, for tests that must not
//! touch live infrastructure.

use crate::servicebus::{
    ConnectionStringParser, ServiceBusConnectionProperties, ServiceBusConnectionStringParser
};
use crate::terraform::{ProvisioningTool, VariableSet};
use errors::{ConnectionStringError, ToolError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Lifecycle step of a [`ProvisioningTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolStep {
    Init,
    Apply,
    Output,
    Destroy
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Init,
    Apply(VariableSet),
    Output(String),
    Destroy(VariableSet)
}

impl ToolCall {
    pub fn step(&self) -> ToolStep {
        match self {
            Self::Init => ToolStep::Init,
            Self::Apply(_) => ToolStep::Apply,
            Self::Output(_) => ToolStep::Output,
            Self::Destroy(_) => ToolStep::Destroy
        }
    }
}

/// Provisioning tool that records every call and answers from canned outputs.
#[derive(Debug, Default)]
pub struct RecordingTool {
    calls: Mutex<Vec<ToolCall>>,
    outputs: HashMap<String, String>,
    failing: HashSet<ToolStep>
}

impl RecordingTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    /// Make `step` fail with a command error.
    pub fn failing_on(mut self, step: ToolStep) -> Self {
        self.failing.insert(step);
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, step: ToolStep) -> usize {
        self.calls.lock().iter().filter(|c| c.step() == step).count()
    }

    fn record(&self, call: ToolCall) -> Result<(), ToolError> {
        let step = call.step();
        self.calls.lock().push(call);
        if self.failing.contains(&step) {
            return Err(ToolError::CommandFailed {
                command: format!("terraform {:?}", step).to_lowercase(),
                status: "exit status: 1".to_string(),
                stderr: "injected failure".to_string()
            });
        }
        Ok(())
    }
}

impl ProvisioningTool for RecordingTool {
    fn init(&self) -> Result<(), ToolError> {
        self.record(ToolCall::Init)
    }

    fn apply(&self, variables: &VariableSet) -> Result<(), ToolError> {
        self.record(ToolCall::Apply(variables.clone()))
    }

    fn output(&self, name: &str) -> Result<String, ToolError> {
        self.record(ToolCall::Output(name.to_string()))?;
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::OutputNotFound {
                name: name.to_string()
            })
    }

    fn destroy(&self, variables: &VariableSet) -> Result<(), ToolError> {
        self.record(ToolCall::Destroy(variables.clone()))
    }
}

/// Connection string parser that records its inputs and delegates to
/// [`ServiceBusConnectionStringParser`].
#[derive(Debug, Default)]
pub struct RecordingParser {
    inputs: Mutex<Vec<String>>
}

impl RecordingParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.inputs.lock().len()
    }
}

impl ConnectionStringParser for RecordingParser {
    fn parse(&self, raw: &str) -> Result<ServiceBusConnectionProperties, ConnectionStringError> {
        self.inputs.lock().push(raw.to_string());
        ServiceBusConnectionStringParser.parse(raw)
    }
}

/// Write an executable shell script named `name` into `dir`.
///
/// Panics on I/O failure; meant for test setup only.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    let mut permissions = std::fs::metadata(&path)
        .expect("script metadata")
        .permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).expect("make script executable");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_tool_records_and_fails_on_request() {
        let tool = RecordingTool::new()
            .with_output("connection_string", "value")
            .failing_on(ToolStep::Destroy);
        let variables = VariableSet::new().with("a", "1");

        tool.init().unwrap();
        tool.apply(&variables).unwrap();
        assert_eq!(tool.output("connection_string").unwrap(), "value");
        assert!(matches!(
            tool.output("other"),
            Err(ToolError::OutputNotFound { .. })
        ));
        assert!(tool.destroy(&variables).is_err());

        assert_eq!(tool.count(ToolStep::Output), 2);
        assert_eq!(tool.calls().last(), Some(&ToolCall::Destroy(variables)));
    }

    #[test]
    fn test_recording_parser_delegates() {
        let parser = RecordingParser::new();
        assert!(parser.parse("garbage").is_err());
        assert!(
            parser
                .parse("Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=K;SharedAccessKey=V")
                .is_ok()
        );
        assert_eq!(parser.count(), 2);
        assert_eq!(parser.inputs()[0], "garbage");
    }
}
