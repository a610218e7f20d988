//! Logging context handed to every long running operation

use std::time::{Duration, Instant};

/// Explicit logging context for one operation or pipeline step
///
/// The name is used as the `log` target so that `RUST_LOG` can filter
/// individual steps, e.g. `RUST_LOG=ndvi_mask=debug`.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    name: String,
    /// Minimum time between two progress messages
    pub progress_interval: Duration,
}

impl Default for ProcessingContext {
    fn default() -> Self {
        Self {
            name: "rastercalc".to_string(),
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl ProcessingContext {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Context for a sub-step, e.g. `pipeline/job-3`
    pub fn child(&self, name: &str) -> Self {
        Self {
            name: format!("{}/{}", self.name, name),
            progress_interval: self.progress_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target for `log` macros
    pub fn target(&self) -> &str {
        &self.name
    }

    pub fn progress(&self, total_blocks: usize) -> Progress<'_> {
        Progress {
            ctx: self,
            total: total_blocks,
            done: 0,
            last_report: Instant::now(),
        }
    }
}

/// Block counter that logs percent complete at most once per interval
pub struct Progress<'a> {
    ctx: &'a ProcessingContext,
    total: usize,
    done: usize,
    last_report: Instant,
}

impl<'a> Progress<'a> {
    pub fn step(&mut self) {
        self.done += 1;
        if self.last_report.elapsed() >= self.ctx.progress_interval {
            log::info!(target: self.ctx.target(), "{:.1}% complete", self.percent());
            self.last_report = Instant::now();
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.done as f64 / self.total as f64 * 100.0
        }
    }
}
