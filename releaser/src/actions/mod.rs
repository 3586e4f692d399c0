//! Step actions: the side-effecting work behind each step type.
//!
//! Every action returns its own ordered results. In `eachEntity` mode that is
//! one result per entity followed by a summary; the last result always decides
//! whether the pipeline continues.

pub mod shell;
pub mod template_file;

use serde_json::{Map, Value, json};

use crate::core::types::{ConfigMap, ReleaseTarget, StepKind, StepResult};
use crate::io::shell::CommandRunner;
use crate::template::TemplateEngine;

/// Message of the no-op result for step types without an action.
pub const SKIPPED_UNSUPPORTED: &str = "skipped (unsupported step type)";

/// Everything an action needs to run one step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Display name used on every emitted result.
    pub name: &'a str,
    /// Normalized step configuration.
    pub config: &'a ConfigMap,
    pub target: &'a ReleaseTarget,
    pub engine: &'a TemplateEngine,
}

/// Run the action for `kind`. `step_type` is only reported for unsupported types.
pub fn dispatch<R: CommandRunner>(
    kind: StepKind,
    step_type: &str,
    ctx: &StepContext<'_>,
    runner: &R,
) -> Vec<StepResult> {
    match kind {
        StepKind::Template => template_file::run(ctx),
        StepKind::Shell => shell::run(ctx, runner),
        StepKind::Unsupported => {
            vec![
                StepResult::success(ctx.name, SKIPPED_UNSUPPORTED)
                    .with_meta(json!({"type": step_type})),
            ]
        }
    }
}

/// Base meta of one fan-out iteration.
pub(crate) fn fan_out_meta(index: usize, entity: &Map<String, Value>) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("eachEntity".to_string(), Value::Bool(true));
    meta.insert("index".to_string(), json!(index));
    meta.insert("entity".to_string(), Value::Object(entity.clone()));
    meta
}

/// `base` extended with `pairs`; later keys win.
pub(crate) fn merge_meta<'k>(
    base: &Map<String, Value>,
    pairs: impl IntoIterator<Item = (&'k str, Value)>,
) -> Value {
    let mut meta = base.clone();
    for (key, value) in pairs {
        meta.insert(key.to_string(), value);
    }
    Value::Object(meta)
}

/// Failed result for config that is missing a key or cannot be used.
pub(crate) fn rejected_config(ctx: &StepContext<'_>, error: impl ToString) -> StepResult {
    StepResult::failure(ctx.name, error.to_string())
        .with_meta(json!({"config": Value::Object(ctx.config.clone())}))
}

/// Failed result for fan-out over an empty entity list.
pub(crate) fn empty_entities(ctx: &StepContext<'_>) -> StepResult {
    StepResult::failure(
        ctx.name,
        crate::core::error::ValidationError::EmptyEntities.to_string(),
    )
    .with_meta(json!({
        "config": Value::Object(ctx.config.clone()),
        "eachEntity": true,
    }))
}
