//! Aggregation of per-entity results in `eachEntity` mode.
//!
//! Fan-out never stops at the first failure: every entity is attempted and
//! the summary is decided only after the full iteration.

use serde_json::{Map, Value, json};

use crate::core::types::{Record, StepResult};

/// What one fan-out iteration produces, for summary wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutKind {
    Files,
    Commands,
}

impl FanOutKind {
    fn counter_key(self) -> &'static str {
        match self {
            FanOutKind::Files => "written",
            FanOutKind::Commands => "success",
        }
    }

    fn success_message(self, succeeded: usize) -> String {
        match self {
            FanOutKind::Files => format!("wrote {succeeded} files"),
            FanOutKind::Commands => format!("ran {succeeded} commands"),
        }
    }

    fn failure_message(self, succeeded: usize, attempted: usize, failed: usize) -> String {
        match self {
            FanOutKind::Files => format!("wrote {succeeded} files, {failed} failures"),
            FanOutKind::Commands => format!("ran {attempted} commands, {failed} failures"),
        }
    }
}

/// Running tally of a fan-out step.
#[derive(Debug, Clone)]
pub struct FanOutTally {
    kind: FanOutKind,
    attempted: usize,
    succeeded: usize,
    failures: Vec<Value>,
}

impl FanOutTally {
    pub fn new(kind: FanOutKind) -> Self {
        Self {
            kind,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    /// Count one entity's result, keeping failure details for the summary.
    pub fn record(&mut self, index: usize, entity: &Record, result: &StepResult) {
        self.attempted += 1;
        if result.status {
            self.succeeded += 1;
            return;
        }
        let mut failure = Map::new();
        failure.insert("index".to_string(), json!(index));
        failure.insert("entity".to_string(), Value::Object(entity.clone()));
        failure.insert("error".to_string(), json!(result.error));
        if let Some(output) = &result.output {
            failure.insert("output".to_string(), json!(output));
        }
        if let Some(path) = result.meta.as_ref().and_then(|meta| meta.get("path")) {
            failure.insert("path".to_string(), path.clone());
        }
        self.failures.push(Value::Object(failure));
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Summary result for the step: success only if every entity succeeded.
    pub fn summarize(self, name: &str) -> StepResult {
        let mut meta = Map::new();
        meta.insert("eachEntity".to_string(), json!(true));
        meta.insert(self.kind.counter_key().to_string(), json!(self.succeeded));

        if self.failures.is_empty() {
            return StepResult::success(name, self.kind.success_message(self.succeeded))
                .with_meta(Value::Object(meta));
        }

        let message = self
            .kind
            .failure_message(self.succeeded, self.attempted, self.failures.len());
        meta.insert("failures".to_string(), Value::Array(self.failures));
        StepResult::failure(name, message).with_meta(Value::Object(meta))
    }
}
