//! `shell` steps: render a command line and run it through the shell.
//!
//! Config keys: `shell` (template), `workdir` (template, optional),
//! `env` (mapping or JSON text; keys and values are templates),
//! `eachEntity` (bool).

use std::path::PathBuf;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::actions::{StepContext, empty_entities, fan_out_meta, merge_meta, rejected_config};
use crate::core::config::{get_bool, get_str, get_text, normalize_value};
use crate::core::error::{ExecutionError, ValidationError};
use crate::core::fanout::{FanOutKind, FanOutTally};
use crate::core::types::{ConfigMap, RenderContext, StepResult};
use crate::io::shell::{CommandRunner, ShellRequest};

/// Output reported for a successful command that printed nothing.
pub const EMPTY_OUTPUT: &str = "ok";

#[derive(Debug)]
struct ShellSettings<'a> {
    shell: &'a str,
    workdir: Option<&'a str>,
    env: ConfigMap,
    each_entity: bool,
}

impl<'a> ShellSettings<'a> {
    fn parse(config: &'a ConfigMap) -> Result<Self, ValidationError> {
        let shell = get_text(config, "shell").ok_or(ValidationError::MissingKey {
            step: "shell",
            key: "shell",
        })?;
        let env = match config.get("env") {
            None | Some(Value::Null) => ConfigMap::new(),
            Some(raw) => normalize_value(raw).map_err(ValidationError::InvalidEnv)?,
        };
        Ok(Self {
            shell,
            workdir: get_str(config, "workdir"),
            env,
            each_entity: get_bool(config, "eachEntity"),
        })
    }
}

pub fn run<R: CommandRunner>(ctx: &StepContext<'_>, runner: &R) -> Vec<StepResult> {
    let settings = match ShellSettings::parse(ctx.config) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(step = ctx.name, err = %err, "shell step config rejected");
            return vec![rejected_config(ctx, err)];
        }
    };

    if !settings.each_entity {
        return vec![run_once(
            ctx,
            &settings,
            runner,
            RenderContext::all(ctx.target),
            &Map::new(),
        )];
    }

    if ctx.target.entities.is_empty() {
        warn!(step = ctx.name, "fan-out over empty entity list");
        return vec![empty_entities(ctx)];
    }

    let mut results = Vec::with_capacity(ctx.target.entities.len() + 1);
    let mut tally = FanOutTally::new(FanOutKind::Commands);
    for (index, entity) in ctx.target.entities.iter().enumerate() {
        let base = fan_out_meta(index, entity);
        let render_ctx = RenderContext::single(ctx.target, entity);
        let result = run_once(ctx, &settings, runner, render_ctx, &base);
        tally.record(index, entity, &result);
        results.push(result);
    }
    results.push(tally.summarize(ctx.name));
    results
}

/// Render and run one invocation. Never panics, never returns early without a result.
fn run_once<R: CommandRunner>(
    ctx: &StepContext<'_>,
    settings: &ShellSettings<'_>,
    runner: &R,
    render_ctx: RenderContext<'_>,
    base: &Map<String, Value>,
) -> StepResult {
    let command = match ctx.engine.render("shell", settings.shell, render_ctx) {
        Ok(command) => command,
        Err(err) => {
            return StepResult::failure(ctx.name, format!("shell template render failed: {err}"))
                .with_meta(merge_meta(base, [("shell", json!(settings.shell))]));
        }
    };

    let workdir = match settings.workdir {
        Some(source) => match ctx.engine.render("workdir", source, render_ctx) {
            Ok(rendered) => Some(rendered.trim().to_string()).filter(|dir| !dir.is_empty()),
            Err(err) => {
                return StepResult::failure(
                    ctx.name,
                    format!("workdir template render failed: {err}"),
                )
                .with_meta(merge_meta(
                    base,
                    [("shell", json!(command)), ("workdirSource", json!(source))],
                ));
            }
        },
        None => None,
    };

    let env = match render_env(ctx, &settings.env, render_ctx) {
        Ok(env) => env,
        Err(error) => {
            return StepResult::failure(ctx.name, error)
                .with_meta(merge_meta(base, [("shell", json!(command))]));
        }
    };

    let request = ShellRequest {
        command,
        workdir: workdir.as_ref().map(PathBuf::from),
        env,
    };
    debug!(step = ctx.name, command = %request.command, "running shell step");

    let invocation = runner.run(&request);

    let env_rendered: Map<String, Value> = request
        .env
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let meta = |stdout: &str, stderr: &str, dropped: (usize, usize)| {
        merge_meta(
            base,
            [
                ("shell", json!(request.command)),
                ("shellSource", json!(settings.shell)),
                ("stdout", json!(stdout)),
                ("stderr", json!(stderr)),
                ("stdoutTruncated", json!(dropped.0)),
                ("stderrTruncated", json!(dropped.1)),
                ("envRendered", Value::Object(env_rendered.clone())),
                ("workdir", json!(workdir)),
                ("workdirSource", json!(settings.workdir)),
            ],
        )
    };

    let output = match invocation {
        Ok(output) => output,
        Err(err) => {
            let error = ExecutionError::Launch(format!("{err:#}"));
            warn!(step = ctx.name, err = %error, "shell command could not start");
            return StepResult::failure(ctx.name, error.to_string())
                .with_meta(meta("", "", (0, 0)));
        }
    };

    let stdout = output.stdout_text();
    let stderr = output.stderr_text();
    let combined = format!(
        "{stdout}{}{stderr}{}",
        output.stdout_truncated_notice(),
        output.stderr_truncated_notice()
    );
    let meta = meta(
        &stdout,
        &stderr,
        (output.stdout_truncated, output.stderr_truncated),
    );

    let error = match output.code {
        Some(0) => {
            let text = if combined.is_empty() {
                EMPTY_OUTPUT.to_string()
            } else {
                combined
            };
            return StepResult::success(ctx.name, text).with_meta(meta);
        }
        Some(code) => ExecutionError::ExitCode(code),
        None => ExecutionError::Signal,
    };
    warn!(step = ctx.name, err = %error, "shell command failed");
    let result = StepResult::failure(ctx.name, error.to_string()).with_meta(meta);
    if combined.is_empty() {
        result
    } else {
        result.with_output(combined)
    }
}

/// Render env keys and stringified values. Pairs come out sorted by rendered key.
fn render_env(
    ctx: &StepContext<'_>,
    env: &ConfigMap,
    render_ctx: RenderContext<'_>,
) -> Result<Vec<(String, String)>, String> {
    let mut rendered = Vec::with_capacity(env.len());
    for (key, value) in env {
        let key = ctx
            .engine
            .render("env key", key, render_ctx)
            .map_err(|err| format!("env key template render failed: {err}"))?;
        let source = match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let value = ctx
            .engine
            .render("env value", &source, render_ctx)
            .map_err(|err| format!("env value template render failed: {err}"))?;
        rendered.push((key, value));
    }
    rendered.sort();
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ReleaseTarget;
    use crate::io::process::CommandOutput;
    use crate::io::config::ShellConfig;
    use crate::io::shell::SystemShell;
    use crate::template::TemplateEngine;
    use crate::test_support::{ScriptedRunner, config, named, target};

    fn run_with<R: CommandRunner>(
        config: &ConfigMap,
        target: &ReleaseTarget,
        runner: &R,
    ) -> Vec<StepResult> {
        let engine = TemplateEngine::new();
        run(
            &StepContext {
                name: "sh",
                config,
                target,
                engine: &engine,
            },
            runner,
        )
    }

    #[test]
    fn echo_reports_stdout() {
        let cfg = config(json!({"shell": "echo hi"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &SystemShell::default());
        assert_eq!(results.len(), 1);
        assert!(results[0].status);
        assert_eq!(results[0].output.as_deref(), Some("hi\n"));
        let meta = results[0].meta.as_ref().expect("meta");
        assert_eq!(meta["shell"], json!("echo hi"));
        assert_eq!(meta["shellSource"], json!("echo hi"));
        assert_eq!(meta["stdout"], json!("hi\n"));
        assert_eq!(meta["stderr"], json!(""));
        assert_eq!(meta["workdir"], Value::Null);
    }

    #[test]
    fn capped_output_is_marked_as_truncated() {
        let shell = SystemShell::new(&ShellConfig::default(), 4);
        let cfg = config(json!({"shell": "printf abcdefghij; printf xy >&2"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &shell);
        assert!(results[0].status);
        assert_eq!(
            results[0].output.as_deref(),
            Some("abcd\n[stdout truncated 6 bytes]\nxy")
        );
        let meta = results[0].meta.as_ref().expect("meta");
        assert_eq!(meta["stdout"], json!("abcd"));
        assert_eq!(meta["stdoutTruncated"], json!(6));
        assert_eq!(meta["stderrTruncated"], json!(0));
    }

    #[test]
    fn oversized_command_render_fails_without_running() {
        let runner = ScriptedRunner::default();
        let cfg = config(json!({"shell": "echo {{ 'ab' | repeat(9223372036854775807) }}"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &runner);
        assert_eq!(results.len(), 1);
        assert!(!results[0].status);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("shell template render failed:")
        );
        assert!(runner.requests().is_empty());
    }

    #[test]
    fn exit_code_fails_the_result() {
        let cfg = config(json!({"shell": "exit 3"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &SystemShell::default());
        assert!(!results[0].status);
        assert_eq!(
            results[0].error.as_deref(),
            Some("shell command failed: exit status 3")
        );
    }

    #[test]
    fn silent_success_reports_ok() {
        let cfg = config(json!({"shell": "true"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &SystemShell::default());
        assert!(results[0].status);
        assert_eq!(results[0].output.as_deref(), Some(EMPTY_OUTPUT));
    }

    #[test]
    fn renders_command_workdir_and_env() {
        let runner = ScriptedRunner::default();
        let cfg = config(json!({
            "shell": "deploy {{ group.name }}",
            "workdir": "/srv/{{ group.name }}",
            "env": "{\"TARGET_{{ group.slug | upper }}\": \"{{ group.name }}\", \"COUNT\": 2, \"EMPTY\": null}",
        }));

        let results = run_with(&cfg, &target(named("g1"), vec![]), &runner);
        assert!(results[0].status);

        let requests = runner.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].command, "deploy g1");
        assert_eq!(requests[0].workdir, Some(PathBuf::from("/srv/g1")));
        assert_eq!(
            requests[0].env,
            vec![
                ("COUNT".to_string(), "2".to_string()),
                ("EMPTY".to_string(), String::new()),
                ("TARGET_G1".to_string(), "g1".to_string()),
            ]
        );
        let meta = results[0].meta.as_ref().expect("meta");
        assert_eq!(meta["envRendered"]["TARGET_G1"], json!("g1"));
        assert_eq!(meta["workdirSource"], json!("/srv/{{ group.name }}"));
    }

    #[test]
    fn render_failures_name_the_phase() {
        let runner = ScriptedRunner::default();
        let tgt = target(named("g1"), vec![]);

        let cfg = config(json!({"shell": "echo {{ group.nope }}"}));
        let results = run_with(&cfg, &tgt, &runner);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("shell template render failed:")
        );
        assert_eq!(results[0].meta, Some(json!({"shell": "echo {{ group.nope }}"})));

        let cfg = config(json!({"shell": "true", "workdir": "{{ nope.x }}"}));
        let results = run_with(&cfg, &tgt, &runner);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("workdir template render failed:")
        );

        let cfg = config(json!({"shell": "true", "env": {"A": "{{ nope.x }}"}}));
        let results = run_with(&cfg, &tgt, &runner);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("env value template render failed:")
        );
        assert!(runner.requests().is_empty());
    }

    #[test]
    fn invalid_env_fails_the_step_before_running() {
        let runner = ScriptedRunner::default();
        let cfg = config(json!({"shell": "true", "env": "not json", "eachEntity": true}));
        let results = run_with(&cfg, &target(named("g1"), vec![named("e1")]), &runner);
        assert_eq!(results.len(), 1);
        assert!(
            results[0]
                .error
                .as_deref()
                .unwrap_or_default()
                .starts_with("invalid env config: config string unmarshal failed")
        );
        assert!(results[0].meta.as_ref().is_some_and(|m| m.get("config").is_some()));
        assert!(runner.requests().is_empty());
    }

    #[test]
    fn missing_shell_is_rejected() {
        let cfg = config(json!({"workdir": "/tmp"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &ScriptedRunner::default());
        assert_eq!(
            results[0].error.as_deref(),
            Some("shell step missing config.shell")
        );
    }

    #[test]
    fn launch_failure_is_reported() {
        let runner = ScriptedRunner::default();
        runner.push_launch_error("no such shell");
        let cfg = config(json!({"shell": "true"}));
        let results = run_with(&cfg, &ReleaseTarget::default(), &runner);
        assert!(!results[0].status);
        assert_eq!(
            results[0].error.as_deref(),
            Some("shell command failed: no such shell")
        );
    }

    #[test]
    fn fan_out_runs_every_entity() {
        let runner = ScriptedRunner::default();
        runner.push_output(CommandOutput {
            code: Some(0),
            stdout: b"one\n".to_vec(),
            ..Default::default()
        });
        runner.push_output(CommandOutput {
            code: Some(1),
            stderr: b"boom\n".to_vec(),
            ..Default::default()
        });
        runner.push_output(CommandOutput {
            code: Some(0),
            ..Default::default()
        });
        let cfg = config(json!({"shell": "deploy {{ entity.name }}", "eachEntity": true}));
        let tgt = target(named("g1"), vec![named("a"), named("b"), named("c")]);

        let results = run_with(&cfg, &tgt, &runner);
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].output.as_deref(), Some("boom\n"));
        assert_eq!(results[2].output.as_deref(), Some(EMPTY_OUTPUT));
        assert_eq!(results[1].meta.as_ref().map(|m| &m["index"]), Some(&json!(1)));

        let summary = &results[3];
        assert!(!summary.status);
        assert_eq!(summary.error.as_deref(), Some("ran 3 commands, 1 failures"));
        let meta = summary.meta.as_ref().expect("meta");
        assert_eq!(meta["success"], json!(2));
        assert_eq!(meta["failures"][0]["entity"]["name"], json!("b"));

        let commands: Vec<String> = runner.requests().into_iter().map(|r| r.command).collect();
        assert_eq!(commands, vec!["deploy a", "deploy b", "deploy c"]);
    }
}
