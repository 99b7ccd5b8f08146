use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::PipelineResult;
use crate::processing::{Outcome, Processor};
use crate::types::{DataSet, Record};

/// Configuration for the [`ShardedMapper`].
#[derive(Debug, Clone)]
pub struct ShardOptions {
    /// Number of worker threads. If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Number of records per shard.
    pub shard_size: usize,
}

impl Default for ShardOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            shard_size: 1_024,
        }
    }
}

/// Applies a processor's per-record transform to shards of a dataset on a rayon pool.
///
/// The output is identical to [`super::map_filter`]: records keep their original order and
/// dropped records are removed. The first error from any shard is returned.
pub struct ShardedMapper {
    pool: ThreadPool,
    shard_size: usize,
}

impl ShardedMapper {
    /// Create a mapper. A zero `shard_size` is treated as one.
    pub fn new(opts: ShardOptions) -> PipelineResult<Self> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = opts.num_threads {
            builder = builder.num_threads(n.max(1));
        }
        Ok(Self {
            pool: builder.build()?,
            shard_size: opts.shard_size.max(1),
        })
    }

    /// Number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Map `processor.process_example` over `dataset` shard by shard.
    pub fn map_filter(&self, processor: &dyn Processor, dataset: &DataSet) -> PipelineResult<DataSet> {
        let shards = shard_ranges(dataset.len(), self.shard_size);
        let per_shard: Vec<Vec<Record>> = self.pool.install(|| {
            shards
                .into_par_iter()
                .map(|range| -> PipelineResult<Vec<Record>> {
                    let mut out = Vec::with_capacity(range.len());
                    for record in &dataset.records[range] {
                        if let Outcome::Keep(r) = processor.process_example(record)? {
                            out.push(r);
                        }
                    }
                    Ok(out)
                })
                .collect::<PipelineResult<Vec<_>>>()
        })?;

        let records: Vec<Record> = per_shard.into_iter().flatten().collect();
        tracing::debug!(
            processor = processor.name(),
            kept = records.len(),
            dropped = dataset.len() - records.len(),
            "sharded map complete"
        );
        Ok(dataset.with_records(records))
    }
}

fn shard_ranges(len: usize, shard_size: usize) -> Vec<Range<usize>> {
    let mut out = Vec::with_capacity(len.div_ceil(shard_size));
    let mut start = 0usize;
    while start < len {
        let end = (start + shard_size).min(len);
        out.push(start..end);
        start = end;
    }
    out
}
