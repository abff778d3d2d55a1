//! Declarative build steps and the loop that executes them.
//!
//! A stage is described as an ordered list of [`Step`]s. Each step carries
//! the command to run and a failure classification `K` chosen by the caller,
//! so one interpreter serves every stage and stages can be inspected without
//! running anything.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RunnerError;
use crate::executor::{CommandOutput, CommandSpec, ProcessRunner};

/// A log file whose head is attached to the error when the step fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLog {
    pub path: PathBuf,
    pub lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<K> {
    pub name: String,
    pub command: CommandSpec,
    pub failure: K,
    pub diagnostic_log: Option<DiagnosticLog>,
}

impl<K> Step<K> {
    pub fn new(name: impl Into<String>, command: CommandSpec, failure: K) -> Self {
        Self {
            name: name.into(),
            command,
            failure,
            diagnostic_log: None,
        }
    }

    pub fn with_diagnostic_log(mut self, path: &Path, lines: usize) -> Self {
        self.diagnostic_log = Some(DiagnosticLog {
            path: path.to_path_buf(),
            lines,
        });
        self
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{step} failed{}", format_excerpt(excerpt.as_deref()))]
pub struct StepError<K: fmt::Debug> {
    pub step: String,
    pub failure: K,
    /// Head of the step's diagnostic log, when one was declared.
    pub excerpt: Option<String>,
    pub source: RunnerError,
}

impl<K: fmt::Debug> StepError<K> {
    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

fn format_excerpt(excerpt: Option<&str>) -> String {
    match excerpt {
        Some(text) => format!("\n--- log excerpt ---\n{text}"),
        None => String::new(),
    }
}

/// Executes steps in order over a [`ProcessRunner`], stopping at the first
/// failure.
pub struct StepRunner<R: ProcessRunner> {
    runner: R,
}

impl<R: ProcessRunner> StepRunner<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub async fn run<K: Copy + fmt::Debug>(
        &self,
        step: &Step<K>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, StepError<K>> {
        info!(step = %step.name, "running");

        match self.runner.run(&step.command, cancel).await {
            Ok(output) => Ok(output),
            Err(source) => {
                let excerpt = match (&step.diagnostic_log, source.is_cancelled()) {
                    (Some(log), false) => Some(read_log_head(log).await),
                    _ => None,
                };
                Err(StepError {
                    step: step.name.clone(),
                    failure: step.failure,
                    excerpt,
                    source,
                })
            }
        }
    }

    pub async fn run_all<K: Copy + fmt::Debug>(
        &self,
        steps: &[Step<K>],
        cancel: &CancellationToken,
    ) -> Result<Vec<CommandOutput>, StepError<K>> {
        let mut outputs = Vec::with_capacity(steps.len());
        for step in steps {
            outputs.push(self.run(step, cancel).await?);
        }
        Ok(outputs)
    }
}

async fn read_log_head(log: &DiagnosticLog) -> String {
    match tokio::fs::read(&log.path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .take(log.lines)
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            warn!(path = %log.path.display(), error = %e, "diagnostic log unreadable");
            format!("({} unavailable: {e})", log.path.display())
        }
    }
}
