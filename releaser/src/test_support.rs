//! Test-only helpers for records, steps and a scripted shell runner.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::types::{ConfigMap, RawConfig, Record, ReleaseTarget, StepDefinition};
use crate::io::process::CommandOutput;
use crate::io::shell::{CommandRunner, ShellRequest};

/// Convert a JSON object literal into a map. Panics on non-objects.
pub fn config(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Record with `id`, `name` and `slug` all set to `name`.
pub fn named(name: &str) -> Record {
    config(json!({"id": name, "name": name, "slug": name}))
}

pub fn target(group: Record, entities: Vec<Record>) -> ReleaseTarget {
    ReleaseTarget { group, entities }
}

/// Step with a native mapping config.
pub fn step(name: &str, step_type: &str, order: f64, cfg: Value) -> StepDefinition {
    step_with_raw(name, step_type, order, RawConfig::from(cfg))
}

pub fn step_with_raw(name: &str, step_type: &str, order: f64, cfg: RawConfig) -> StepDefinition {
    StepDefinition {
        id: Some(format!("{name}-id")),
        name: name.to_string(),
        step_type: step_type.to_string(),
        order,
        config: cfg,
    }
}

pub fn shell_step(name: &str, order: f64, command: &str) -> StepDefinition {
    step(name, "shell", order, json!({"shell": command}))
}

enum Scripted {
    Output(CommandOutput),
    LaunchError(String),
}

/// Fake runner that records requests and replays queued outcomes.
///
/// With an empty queue every request succeeds with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    queue: RefCell<VecDeque<Scripted>>,
    requests: RefCell<Vec<ShellRequest>>,
}

impl ScriptedRunner {
    pub fn push_output(&self, output: CommandOutput) {
        self.queue.borrow_mut().push_back(Scripted::Output(output));
    }

    pub fn push_exit(&self, code: i32, stdout: &str) {
        self.push_output(CommandOutput {
            code: Some(code),
            stdout: stdout.as_bytes().to_vec(),
            ..Default::default()
        });
    }

    pub fn push_launch_error(&self, message: &str) {
        self.queue
            .borrow_mut()
            .push_back(Scripted::LaunchError(message.to_string()));
    }

    pub fn requests(&self) -> Vec<ShellRequest> {
        self.requests.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &ShellRequest) -> Result<CommandOutput> {
        self.requests.borrow_mut().push(request.clone());
        match self.queue.borrow_mut().pop_front() {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::LaunchError(message)) => Err(anyhow!(message)),
            None => Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            }),
        }
    }
}
