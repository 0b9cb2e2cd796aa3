//! Sequential job runner.
//!
//! Executes labelled steps strictly in order and keeps started/done/total
//! counts. The runner has no business logic: what a step does is decided by
//! the [`JobHandler`] it is given. One runner is shared by every nested run of
//! an isolation batch, so its counters cover the whole dependency tree.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, info};

/// One unit of work.
#[derive(Debug, Clone)]
pub struct Job<S> {
    pub label: String,
    /// Milestone job (a whole package) rather than a nested sub-step.
    pub big: bool,
    pub step: S,
    /// Runs after `step` completes.
    pub after: Option<S>,
}

impl<S> Job<S> {
    pub fn new(label: impl Into<String>, step: S) -> Self {
        Self {
            label: label.into(),
            big: false,
            step,
            after: None,
        }
    }

    pub fn big(mut self) -> Self {
        self.big = true;
        self
    }

    pub fn then(mut self, after: S) -> Self {
        self.after = Some(after);
        self
    }
}

/// Executes the steps a [`JobRunner`] hands out.
#[async_trait]
pub trait JobHandler<S: Sync>: Send {
    async fn run(&mut self, step: &S) -> Result<()>;
}

/// Snapshot of runner counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub started: usize,
    pub done: usize,
    pub total: usize,
    /// Label of the innermost running `big` job.
    pub milestone: Option<String>,
}

impl Progress {
    /// Completed share of all jobs seen so far, 0 to 100.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.done * 100 / self.total;
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}

#[derive(Debug, Default)]
pub struct JobRunner {
    progress: Mutex<Progress>,
}

impl JobRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Run `jobs` in order, awaiting each before starting the next.
    ///
    /// The first error aborts the remaining queue and is returned.
    pub async fn run_jobs<S, H>(&self, handler: &mut H, jobs: Vec<Job<S>>) -> Result<()>
    where
        S: Send + Sync,
        H: JobHandler<S> + ?Sized,
    {
        self.update(|p| p.total += jobs.len());

        for job in jobs {
            let previous = self.start(&job);

            let outcome = match handler.run(&job.step).await {
                Ok(()) => match &job.after {
                    Some(after) => handler.run(after).await,
                    None => Ok(()),
                },
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                self.abort(&job, previous);
                return Err(e);
            }
            self.finish(&job, previous);
        }

        Ok(())
    }

    fn start<S>(&self, job: &Job<S>) -> Option<String> {
        let mut previous = None;
        self.update(|p| {
            p.started += 1;
            if job.big {
                previous = p.milestone.replace(job.label.clone());
            }
        });

        if job.big {
            info!(job = %job.label, "started");
        } else {
            debug!(job = %job.label, "started");
        }
        previous
    }

    fn finish<S>(&self, job: &Job<S>, previous: Option<String>) {
        self.update(|p| {
            p.done += 1;
            if job.big {
                p.milestone = previous;
            }
        });

        let percent = self.progress().percent();
        if job.big {
            info!(job = %job.label, percent, "done");
        } else {
            debug!(job = %job.label, percent, "done");
        }
    }

    /// Undo the milestone of a failed job. It does not count as done.
    fn abort<S>(&self, job: &Job<S>, previous: Option<String>) {
        if job.big {
            self.update(|p| p.milestone = previous);
        }
        debug!(job = %job.label, "failed");
    }

    fn update(&self, f: impl FnOnce(&mut Progress)) {
        if let Ok(mut progress) = self.progress.lock() {
            f(&mut progress);
        }
    }
}
