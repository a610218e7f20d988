//! Staged execution of independent raster calculator jobs
//!
//! Jobs inside one stage run concurrently on the rayon pool; stages run in
//! order, so a job may read the target of any job in an earlier stage. Every
//! job owns its read handles and its target, and no two jobs may share a
//! target path.

use crate::core::calculator::RasterCalculator;
use crate::core::context::ProcessingContext;
use crate::core::operators::RasterOperator;
use crate::io::raster::RasterInfo;
use crate::types::{RasterDataType, RasterError, RasterResult, SourceTerm};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;

/// One raster calculator invocation
pub struct CalculatorJob {
    pub name: String,
    pub sources: Vec<SourceTerm>,
    pub operator: Box<dyn RasterOperator + Send + Sync>,
    pub target_path: PathBuf,
    pub target_datatype: RasterDataType,
    pub target_nodata: f64,
}

impl CalculatorJob {
    pub fn new<O, P>(
        name: &str,
        sources: Vec<SourceTerm>,
        operator: O,
        target_path: P,
        target_datatype: RasterDataType,
        target_nodata: f64,
    ) -> Self
    where
        O: RasterOperator + Send + Sync + 'static,
        P: Into<PathBuf>,
    {
        Self {
            name: name.to_string(),
            sources,
            operator: Box::new(operator),
            target_path: target_path.into(),
            target_datatype,
            target_nodata,
        }
    }

    fn run(&self, calculator: &RasterCalculator, ctx: &ProcessingContext) -> RasterResult<RasterInfo> {
        let ctx = ctx.child(&self.name);
        calculator.evaluate(
            &ctx,
            &self.sources,
            &self.operator,
            &self.target_path,
            self.target_datatype,
            self.target_nodata,
        )
    }
}

/// Ordered stages of calculator jobs
pub struct Pipeline {
    calculator: RasterCalculator,
    stages: Vec<Vec<CalculatorJob>>,
}

impl Pipeline {
    pub fn new(calculator: RasterCalculator) -> Self {
        Self {
            calculator,
            stages: Vec::new(),
        }
    }

    /// Append a stage; its jobs may depend on targets of earlier stages only
    pub fn stage(mut self, jobs: Vec<CalculatorJob>) -> Self {
        self.stages.push(jobs);
        self
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    fn check_disjoint_targets(&self) -> RasterResult<()> {
        let mut seen = HashSet::new();
        for job in self.stages.iter().flatten() {
            if !seen.insert(job.target_path.clone()) {
                return Err(RasterError::InvalidInput(format!(
                    "Target {} is written by more than one job",
                    job.target_path.display()
                )));
            }
        }
        Ok(())
    }

    /// Run every stage; the first failing stage stops the pipeline
    ///
    /// Returns the output metadata of every job, in stage and job order.
    pub fn run(&self, ctx: &ProcessingContext) -> RasterResult<Vec<RasterInfo>> {
        self.check_disjoint_targets()?;
        log::info!(
            target: ctx.target(),
            "Running pipeline: {} stages, {} jobs",
            self.stages.len(),
            self.job_count()
        );

        let mut outputs = Vec::with_capacity(self.job_count());
        for (index, jobs) in self.stages.iter().enumerate() {
            log::debug!(target: ctx.target(), "Stage {}: {} jobs", index, jobs.len());
            let results: Vec<RasterResult<RasterInfo>> = jobs
                .par_iter()
                .map(|job| job.run(&self.calculator, ctx))
                .collect();
            for result in results {
                outputs.push(result?);
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operators::Add;

    #[test]
    fn test_duplicate_targets_rejected() {
        let job = |name: &str| {
            CalculatorJob::new(
                name,
                vec![SourceTerm::raster("in.tif")],
                Add,
                "/tmp/same.tif",
                RasterDataType::Float32,
                -1.0,
            )
        };
        let pipeline = Pipeline::new(RasterCalculator::standard())
            .stage(vec![job("a")])
            .stage(vec![job("b")]);
        assert_eq!(pipeline.job_count(), 2);
        assert!(matches!(
            pipeline.run(&ProcessingContext::default()),
            Err(RasterError::InvalidInput(_))
        ));
    }
}
