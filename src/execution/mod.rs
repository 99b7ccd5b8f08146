//! Pipeline execution.
//!
//! A [`Pipeline`] is an ordered list of processor instances built once, in configuration
//! order, from a [`ProcessorRegistry`]. [`Pipeline::run`] threads a dataset through the stages
//! strictly one after another:
//!
//! 1. check the stage's required columns against the current schema
//!    ([`PipelineError::MissingColumn`] aborts the run)
//! 2. apply the processor ([`Processor::apply_to_dataset`], by default a per-record
//!    map-and-filter)
//! 3. replace the working dataset with the stage output and report kept/dropped counts
//!
//! Any error aborts the whole run; the executor does not isolate per-record failures, that is
//! each processor's own policy.
//!
//! Besides the sequential executor this module provides:
//!
//! - [`ShardedMapper`]: a rayon-backed per-record mapper for callers that want to shard
//!   large datasets across threads
//! - [`PipelineObserver`] hooks; [`TracingObserver`] is installed by default
//!
//! ## Example
//!
//! ```rust
//! use data_preproc::config::PipelineConfig;
//! use data_preproc::execution::Pipeline;
//! use data_preproc::processing::ProcessorRegistry;
//! use data_preproc::types::DataSet;
//!
//! let cfg = PipelineConfig::from_yaml_str(
//!     "processors:\n  - type: longest_explanation_mapping\n",
//! )
//! .unwrap();
//! let registry = ProcessorRegistry::with_builtin();
//! let pipeline = Pipeline::build(&registry, &cfg.processors).unwrap();
//!
//! // An empty dataset has no `qa_pairs` column, so the schema check rejects the stage.
//! let err = pipeline.run(DataSet::default()).unwrap_err();
//! assert!(err.to_string().contains("missing required column(s): qa_pairs"));
//! ```

mod observer;
mod sharded;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{PipelineConfig, ProcessorSpec};
use crate::error::{PipelineError, PipelineResult};
use crate::processing::{Outcome, Processor, ProcessorRegistry};
use crate::types::DataSet;
use crate::{ingestion, persist};

pub use observer::{PipelineEvent, PipelineObserver, StageReport, TracingObserver};
pub use sharded::{ShardOptions, ShardedMapper};

/// File name used for the prepared dataset inside `dataset_prepared_path`.
pub const PREPARED_FILE_NAME: &str = "data.ndjson";

/// Default per-record execution: map `process_example` over every record in order and
/// remove dropped records.
pub fn map_filter<P>(processor: &P, dataset: &DataSet) -> PipelineResult<DataSet>
where
    P: Processor + ?Sized,
{
    let out = dataset
        .try_filter_map(|record| processor.process_example(record).map(Outcome::into_option))?;
    tracing::debug!(
        processor = processor.name(),
        kept = out.len(),
        dropped = dataset.len() - out.len(),
        "per-record map complete"
    );
    Ok(out)
}

struct Stage {
    name: String,
    processor: Box<dyn Processor>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Final dataset, ready for persistence.
    pub dataset: DataSet,
    /// One report per stage, in execution order.
    pub reports: Vec<StageReport>,
}

/// An ordered sequence of live processor instances.
pub struct Pipeline {
    stages: Vec<Stage>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    /// Instantiate every configured processor, in order, before any data is touched.
    ///
    /// Unknown names and invalid configs abort construction.
    pub fn build(registry: &ProcessorRegistry, specs: &[ProcessorSpec]) -> PipelineResult<Self> {
        let stages = specs
            .iter()
            .map(|spec| -> PipelineResult<Stage> {
                Ok(Stage {
                    name: spec.name.clone(),
                    processor: registry.create(&spec.name, &spec.config)?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self::from_stages(stages))
    }

    /// Build a pipeline from already-constructed processors.
    pub fn from_processors(processors: Vec<Box<dyn Processor>>) -> Self {
        Self::from_stages(
            processors
                .into_iter()
                .map(|processor| Stage {
                    name: processor.name().to_string(),
                    processor,
                })
                .collect(),
        )
    }

    fn from_stages(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Run every stage over `dataset` in declared order.
    pub fn run(&self, dataset: DataSet) -> PipelineResult<PipelineRun> {
        let start = Instant::now();
        self.observer.on_event(&PipelineEvent::RunStarted {
            stages: self.stages.len(),
            records: dataset.len(),
        });

        let mut current = dataset;
        let mut reports = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            let required = stage.processor.required_columns();
            let missing = current.schema.missing(required.as_slice());
            if !missing.is_empty() {
                return Err(self.fail(
                    index,
                    stage,
                    PipelineError::MissingColumn {
                        processor: stage.name.clone(),
                        columns: missing,
                    },
                ));
            }

            let input = current.len();
            self.observer.on_event(&PipelineEvent::StageStarted {
                index,
                processor: stage.name.clone(),
                records: input,
            });

            let stage_start = Instant::now();
            let out = match stage.processor.apply_to_dataset(&current) {
                Ok(out) => out,
                Err(source) => {
                    let err = PipelineError::StageFailed {
                        processor: stage.name.clone(),
                        index,
                        source: Box::new(source),
                    };
                    return Err(self.fail(index, stage, err));
                }
            };

            let report = StageReport {
                processor: stage.name.clone(),
                input,
                kept: out.len(),
                dropped: input.saturating_sub(out.len()),
                elapsed: stage_start.elapsed(),
            };
            self.observer.on_event(&PipelineEvent::StageFinished {
                index,
                report: report.clone(),
            });
            reports.push(report);
            current = out;
        }

        self.observer.on_event(&PipelineEvent::RunFinished {
            records: current.len(),
            elapsed: start.elapsed(),
        });
        Ok(PipelineRun {
            dataset: current,
            reports,
        })
    }

    fn fail(&self, index: usize, stage: &Stage, error: PipelineError) -> PipelineError {
        self.observer.on_event(&PipelineEvent::RunFailed {
            index,
            processor: stage.name.clone(),
            error: error.to_string(),
        });
        error
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Load the configured source dataset, run the configured processors, and persist the
/// result as NDJSON under the prepared path.
pub fn preprocess(config: &PipelineConfig, registry: &ProcessorRegistry) -> PipelineResult<PipelineRun> {
    let source = config
        .dataset_path
        .as_ref()
        .ok_or_else(|| PipelineError::PipelineConfig {
            message: "config does not set dataset_path".to_string(),
        })?;

    let pipeline = Pipeline::build(registry, &config.processors)?;
    let dataset = ingestion::ingest_json_from_path(source)?;
    let run = pipeline.run(dataset)?;

    let out_path = config.prepared_path().join(PREPARED_FILE_NAME);
    let written = persist::write_ndjson(&run.dataset, &out_path)?;
    tracing::info!(records = written, path = %out_path.display(), "preprocessed data written");
    Ok(run)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{map_filter, Pipeline, PipelineEvent, PipelineObserver};
    use crate::error::{PipelineError, PipelineResult};
    use crate::processing::{Outcome, Processor};
    use crate::types::{DataSet, Record, Value};

    /// Keeps records whose `id` is even.
    struct EvenIds;

    impl Processor for EvenIds {
        fn name(&self) -> &str {
            "even_ids"
        }

        fn required_columns(&self) -> Vec<String> {
            vec!["id".to_string()]
        }

        fn process_example(&self, record: &Record) -> PipelineResult<Outcome> {
            Ok(match record.get("id") {
                Some(Value::Int64(v)) if v % 2 == 0 => Outcome::Keep(record.clone()),
                _ => Outcome::Drop,
            })
        }
    }

    struct Failing;

    impl Processor for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn required_columns(&self) -> Vec<String> {
            Vec::new()
        }

        fn process_example(&self, _record: &Record) -> PipelineResult<Outcome> {
            Err(PipelineError::SchemaMismatch {
                message: "boom".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl PipelineObserver for Recording {
        fn on_event(&self, event: &PipelineEvent) {
            let tag = match event {
                PipelineEvent::RunStarted { .. } => "run_started".to_string(),
                PipelineEvent::StageStarted { processor, .. } => format!("start:{processor}"),
                PipelineEvent::StageFinished { report, .. } => {
                    format!("finish:{}:{}/{}", report.processor, report.kept, report.input)
                }
                PipelineEvent::RunFailed { processor, .. } => format!("failed:{processor}"),
                PipelineEvent::RunFinished { .. } => "run_finished".to_string(),
            };
            self.0.lock().unwrap().push(tag);
        }
    }

    fn ids(n: i64) -> DataSet {
        DataSet::from_records(
            (0..n)
                .map(|i| {
                    let mut r = Record::new();
                    r.insert("id".to_string(), Value::Int64(i));
                    r
                })
                .collect(),
        )
    }

    #[test]
    fn map_filter_reports_kept_records_in_order() {
        let out = map_filter(&EvenIds, &ids(5)).unwrap();
        let got: Vec<&Value> = out.records().filter_map(|r| r.get("id")).collect();
        assert_eq!(got, vec![&Value::Int64(0), &Value::Int64(2), &Value::Int64(4)]);
    }

    #[test]
    fn run_emits_events_and_stage_reports() {
        let recording = Arc::new(Recording::default());
        let pipeline = Pipeline::from_processors(vec![Box::new(EvenIds), Box::new(EvenIds)])
            .with_observer(recording.clone());

        let run = pipeline.run(ids(6)).unwrap();
        assert_eq!(run.dataset.len(), 3);
        assert_eq!(run.reports.len(), 2);
        assert_eq!((run.reports[0].kept, run.reports[0].dropped), (3, 3));
        assert_eq!((run.reports[1].kept, run.reports[1].dropped), (3, 0));

        let events = recording.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "run_started",
                "start:even_ids",
                "finish:even_ids:3/6",
                "start:even_ids",
                "finish:even_ids:3/3",
                "run_finished",
            ]
        );
    }

    #[test]
    fn stage_errors_abort_and_name_the_stage() {
        let recording = Arc::new(Recording::default());
        let pipeline = Pipeline::from_processors(vec![Box::new(EvenIds), Box::new(Failing)])
            .with_observer(recording.clone());

        let err = pipeline.run(ids(4)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed { ref processor, index: 1, .. } if processor == "failing"
        ));
        assert_eq!(
            recording.0.lock().unwrap().last().map(String::as_str),
            Some("failed:failing")
        );
    }

    #[test]
    fn missing_columns_are_checked_before_the_stage_runs() {
        let ds = DataSet::from_records(vec![Record::new()]);
        let err = Pipeline::from_processors(vec![Box::new(EvenIds)])
            .run(ds)
            .unwrap_err();
        match err {
            PipelineError::MissingColumn { processor, columns } => {
                assert_eq!(processor, "even_ids");
                assert_eq!(columns, vec!["id"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_pipeline_returns_input() {
        let run = Pipeline::from_processors(Vec::new()).run(ids(2)).unwrap();
        assert_eq!(run.dataset, ids(2));
        assert!(run.reports.is_empty());
    }
}
