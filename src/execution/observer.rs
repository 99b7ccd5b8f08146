use std::fmt;
use std::time::Duration;

/// Per-stage outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Configured processor name.
    pub processor: String,
    /// Records entering the stage.
    pub input: usize,
    /// Records leaving the stage.
    pub kept: usize,
    /// Records removed by the stage.
    pub dropped: usize,
    pub elapsed: Duration,
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: kept {}/{} (dropped {}) in {:?}",
            self.processor, self.kept, self.input, self.dropped, self.elapsed
        )
    }
}

/// Events emitted by [`super::Pipeline::run`].
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted { stages: usize, records: usize },
    StageStarted { index: usize, processor: String, records: usize },
    StageFinished { index: usize, report: StageReport },
    RunFailed { index: usize, processor: String, error: String },
    RunFinished { records: usize, elapsed: Duration },
}

/// Observer hook for pipeline events.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Logs pipeline events through `tracing`. This is the default observer.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { stages, records } => {
                tracing::info!(stages, records, "pipeline started");
            }
            PipelineEvent::StageStarted {
                index,
                processor,
                records,
            } => {
                tracing::info!(stage = index + 1, %processor, records, "applying processor");
            }
            PipelineEvent::StageFinished { index, report } => {
                tracing::info!(
                    stage = index + 1,
                    processor = %report.processor,
                    kept = report.kept,
                    dropped = report.dropped,
                    elapsed = ?report.elapsed,
                    "processor finished"
                );
            }
            PipelineEvent::RunFailed {
                index,
                processor,
                error,
            } => {
                tracing::error!(stage = index + 1, %processor, %error, "pipeline aborted");
            }
            PipelineEvent::RunFinished { records, elapsed } => {
                tracing::info!(records, ?elapsed, "pipeline finished");
            }
        }
    }
}
