//! `template` steps: render a path and a content template, write the file.
//!
//! Config keys: `path` (template), `template` (template), `eachEntity` (bool).

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::actions::{StepContext, empty_entities, fan_out_meta, merge_meta, rejected_config};
use crate::core::config::{get_bool, get_text};
use crate::core::error::ValidationError;
use crate::core::fanout::{FanOutKind, FanOutTally};
use crate::core::path::{base_name, resolve_target};
use crate::core::types::{ConfigMap, RenderContext, StepResult};
use crate::io::fs::write_rendered;

/// Diagnostic label of the path template.
const PATH_TEMPLATE_NAME: &str = "path";

#[derive(Debug)]
struct TemplateSettings<'a> {
    path: &'a str,
    template: &'a str,
    each_entity: bool,
}

impl<'a> TemplateSettings<'a> {
    fn parse(config: &'a ConfigMap) -> Result<Self, ValidationError> {
        let path = get_text(config, "path").ok_or(ValidationError::MissingKey {
            step: "template",
            key: "path",
        })?;
        let template = get_text(config, "template").ok_or(ValidationError::MissingKey {
            step: "template",
            key: "template",
        })?;
        Ok(Self {
            path,
            template,
            each_entity: get_bool(config, "eachEntity"),
        })
    }
}

/// A file that was written.
#[derive(Debug)]
struct Written {
    path: PathBuf,
    rendered: String,
    bytes: usize,
}

impl Written {
    fn message(&self) -> String {
        format!("wrote {} bytes to {}", self.bytes, self.path.display())
    }

    fn path_text(&self) -> String {
        self.path.display().to_string()
    }
}

/// A write that failed in some phase.
#[derive(Debug)]
struct WriteFailure {
    error: String,
    /// Resolved target, once known.
    path: Option<String>,
    rendered: Option<String>,
}

impl WriteFailure {
    fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            path: None,
            rendered: None,
        }
    }

    fn at(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    fn with_rendered(mut self, rendered: String) -> Self {
        self.rendered = Some(rendered);
        self
    }
}

pub fn run(ctx: &StepContext<'_>) -> Vec<StepResult> {
    let settings = match TemplateSettings::parse(ctx.config) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(step = ctx.name, err = %err, "template step config incomplete");
            return vec![rejected_config(ctx, err)];
        }
    };

    if !settings.each_entity {
        return vec![run_single(ctx, &settings)];
    }

    if ctx.target.entities.is_empty() {
        warn!(step = ctx.name, "fan-out over empty entity list");
        return vec![empty_entities(ctx)];
    }

    let mut results = Vec::with_capacity(ctx.target.entities.len() + 1);
    let mut tally = FanOutTally::new(FanOutKind::Files);
    for (index, entity) in ctx.target.entities.iter().enumerate() {
        let base = fan_out_meta(index, entity);
        let render_ctx = RenderContext::single(ctx.target, entity);
        let result = match write_one(ctx, &settings, render_ctx) {
            Ok(written) => StepResult::success(ctx.name, written.message())
                .with_meta(merge_meta(&base, [("path", json!(written.path_text()))])),
            Err(failure) => {
                debug!(step = ctx.name, index, err = %failure.error, "entity write failed");
                StepResult::failure(ctx.name, failure.error.clone())
                    .with_meta(entity_failure_meta(&base, &failure))
            }
        };
        tally.record(index, entity, &result);
        results.push(result);
    }
    results.push(tally.summarize(ctx.name));
    results
}

fn run_single(ctx: &StepContext<'_>, settings: &TemplateSettings<'_>) -> StepResult {
    match write_one(ctx, settings, RenderContext::all(ctx.target)) {
        Ok(written) => StepResult::success(ctx.name, written.message()).with_meta(json!({
            "path": written.path_text(),
            "rendered": written.rendered,
        })),
        Err(failure) => {
            let mut meta = Map::new();
            // Before resolution the template source is the best reference we have.
            let path = failure.path.clone().unwrap_or_else(|| settings.path.to_string());
            meta.insert("path".to_string(), Value::String(path));
            if let Some(rendered) = &failure.rendered {
                meta.insert("rendered".to_string(), Value::String(rendered.clone()));
            }
            StepResult::failure(ctx.name, failure.error).with_meta(Value::Object(meta))
        }
    }
}

fn entity_failure_meta(base: &Map<String, Value>, failure: &WriteFailure) -> Value {
    match &failure.path {
        Some(path) => merge_meta(base, [("path", json!(path))]),
        None => Value::Object(base.clone()),
    }
}

/// Render path and content against `render_ctx`, then write the file.
fn write_one(
    ctx: &StepContext<'_>,
    settings: &TemplateSettings<'_>,
    render_ctx: RenderContext<'_>,
) -> Result<Written, WriteFailure> {
    let raw_path = ctx
        .engine
        .render(PATH_TEMPLATE_NAME, settings.path, render_ctx)
        .map_err(|err| WriteFailure::new(format!("path template render failed: {err}")))?;

    let path = resolve_target(&raw_path).map_err(|err| WriteFailure::new(err).at(raw_path))?;
    let path_text = path.display().to_string();

    let rendered = ctx
        .engine
        .render(&base_name(&path), settings.template, render_ctx)
        .map_err(|err| {
            WriteFailure::new(format!("template render failed: {err}")).at(path_text.clone())
        })?;

    match write_rendered(&path, &rendered) {
        Ok(bytes) => {
            info!(step = ctx.name, path = %path_text, bytes, "wrote rendered file");
            Ok(Written {
                path,
                rendered,
                bytes,
            })
        }
        Err(err) => Err(WriteFailure::new(err)
            .at(path_text)
            .with_rendered(rendered)),
    }
}
