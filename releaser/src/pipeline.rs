//! Sequential pipeline executor.
//!
//! Steps run strictly in the order given. Each step's config is normalized,
//! the step is dispatched by type, and its results are appended to the trace.
//! The first step whose last result failed aborts the run: later steps are
//! neither evaluated nor recorded.
//!
//! ```text
//! Pending -> Running(i) -> Continuing(i + 1) -> Running(i + 1) -> ...
//!                       \-> Aborted(i)
//!                       \-> Completed
//! ```

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::actions::{StepContext, dispatch};
use crate::core::config::{normalize, raw_kind};
use crate::core::types::{ReleaseTarget, StepDefinition, StepKind, StepResult};
use crate::io::shell::CommandRunner;
use crate::template::TemplateEngine;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Running { index: usize },
    Continuing { next: usize },
    Aborted { index: usize },
    Completed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Aborted { .. } | PipelineState::Completed)
    }
}

/// Ordered results of a run plus where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrace {
    pub results: Vec<StepResult>,
    pub state: PipelineState,
}

impl RunTrace {
    /// Overall success: the run completed and every entry succeeded.
    pub fn ok(&self) -> bool {
        self.state == PipelineState::Completed && self.results.iter().all(|r| r.status)
    }
}

/// One run of a step list against a release target.
pub struct PipelineRun<'a, R: CommandRunner> {
    steps: &'a [StepDefinition],
    target: &'a ReleaseTarget,
    runner: &'a R,
    engine: TemplateEngine,
    state: PipelineState,
    results: Vec<StepResult>,
}

impl<'a, R: CommandRunner> PipelineRun<'a, R> {
    pub fn new(steps: &'a [StepDefinition], target: &'a ReleaseTarget, runner: &'a R) -> Self {
        Self {
            steps,
            target,
            runner,
            engine: TemplateEngine::new(),
            state: PipelineState::Pending,
            results: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Execute the next step, if any, and return the new state.
    ///
    /// Terminal states are sticky: advancing them is a no-op.
    pub fn advance(&mut self) -> PipelineState {
        let index = match self.state {
            PipelineState::Pending => 0,
            PipelineState::Continuing { next } => next,
            PipelineState::Running { index } => index,
            PipelineState::Aborted { .. } | PipelineState::Completed => return self.state,
        };

        let Some(step) = self.steps.get(index) else {
            self.state = PipelineState::Completed;
            return self.state;
        };

        self.state = PipelineState::Running { index };
        let (results, proceed) = self.execute_step(index, step);
        self.results.extend(results);

        self.state = if !proceed {
            PipelineState::Aborted { index }
        } else if index + 1 < self.steps.len() {
            PipelineState::Continuing { next: index + 1 }
        } else {
            PipelineState::Completed
        };
        self.state
    }

    /// Advance until a terminal state.
    pub fn run(mut self) -> RunTrace {
        while !self.state.is_terminal() {
            self.advance();
        }
        RunTrace {
            results: self.results,
            state: self.state,
        }
    }

    /// Results of one step, and whether the pipeline may continue.
    fn execute_step(&self, index: usize, step: &StepDefinition) -> (Vec<StepResult>, bool) {
        let name = step.display_name();
        debug!(index, step = name, step_type = %step.step_type, "executing step");

        let config = match normalize(&step.config) {
            Ok(config) => config,
            Err(err) => {
                warn!(index, step = name, err = %err, "step config rejected; aborting");
                let result = StepResult::failure(name, format!("step config rejected: {err}"))
                    .with_meta(json!({
                        "stepType": step.step_type,
                        "configType": raw_kind(&step.config),
                    }));
                return (vec![result], false);
            }
        };

        let ctx = StepContext {
            name,
            config: &config,
            target: self.target,
            engine: &self.engine,
        };
        let results = dispatch(
            StepKind::parse(&step.step_type),
            &step.step_type,
            &ctx,
            self.runner,
        );

        let proceed = results.last().is_none_or(|result| result.status);
        if !proceed {
            warn!(index, step = name, "step failed; aborting");
        }
        (results, proceed)
    }
}

/// Run `steps` in order against `target` and return the trace.
#[instrument(skip_all, fields(steps = steps.len(), entities = target.entities.len()))]
pub fn run_pipeline<R: CommandRunner>(
    steps: &[StepDefinition],
    target: &ReleaseTarget,
    runner: &R,
) -> RunTrace {
    info!("pipeline started");
    let trace = PipelineRun::new(steps, target, runner).run();
    info!(
        ok = trace.ok(),
        entries = trace.results.len(),
        state = ?trace.state,
        "pipeline finished"
    );
    trace
}
