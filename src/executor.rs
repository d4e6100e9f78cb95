//! Runs a finalized pipeline against one compilation's state

use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn};

use crate::compiler::CompilerState;
use crate::optimization::{PassDescriptor, PassError};
use crate::pipeline::{Pipeline, PipelineError};

/// Outcome of one executed pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    pub name: &'static str,
    pub changed: bool,
    pub elapsed: Duration,
}

/// Outcome of a whole pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Logical OR of every pass's `changed` flag
    pub changed: bool,
    pub passes: Vec<PassRecord>,
}

impl RunReport {
    /// Names of the passes that ran, in order
    pub fn executed(&self) -> Vec<&'static str> {
        self.passes.iter().map(|record| record.name).collect()
    }

    pub fn total_time(&self) -> Duration {
        self.passes.iter().map(|record| record.elapsed).sum()
    }

    fn record(&mut self, name: &'static str, changed: bool, elapsed: Duration) {
        self.changed |= changed;
        self.passes.push(PassRecord {
            name,
            changed,
            elapsed,
        });
    }
}

pub(crate) fn execute(
    pipeline: &Pipeline,
    state: &mut CompilerState,
) -> Result<RunReport, PipelineError> {
    if !pipeline.is_finalized() {
        return Err(PipelineError::NotFinalized {
            pipeline: pipeline.name().to_string(),
        });
    }

    let span = info_span!(
        "pipeline",
        pipeline = pipeline.name(),
        function = %state.func_ir.name
    );
    let _enter = span.enter();

    let mut report = RunReport::default();
    for entry in pipeline.entries() {
        let descriptor = &entry.descriptor;
        let started = Instant::now();

        let changed = entry
            .pass
            .run_pass(state)
            .map_err(|source| failure(pipeline, descriptor, source))?;

        if changed && descriptor.analysis_only {
            let source = PassError::Precondition(
                "analysis-only pass reported a mutation".to_string(),
            );
            return Err(failure(pipeline, descriptor, source));
        }

        if changed && state.options.verify_each_pass {
            state
                .func_ir
                .verify()
                .map_err(|err| failure(pipeline, descriptor, err.into()))?;
        }

        let elapsed = started.elapsed();
        debug!(pass = descriptor.name, changed, ?elapsed, "pass finished");
        if state.options.dump_ir {
            debug!(pass = descriptor.name, "IR after pass:\n{}", state.func_ir);
        }

        report.record(descriptor.name, changed, elapsed);
    }

    info!(
        changed = report.changed,
        passes = report.passes.len(),
        "pipeline finished"
    );
    Ok(report)
}

fn failure(pipeline: &Pipeline, descriptor: &PassDescriptor, source: PassError) -> PipelineError {
    warn!(pass = descriptor.name, error = %source, "pass failed, skipping remaining passes");
    PipelineError::PassExecutionFailure {
        pipeline: pipeline.name().to_string(),
        pass: descriptor.name,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerOptions;
    use crate::ir::{BlockId, FunctionIr, Literal};
    use crate::optimization::Pass;
    use pretty_assertions::assert_eq;

    /// Bumps the first constant, optionally claiming to be analysis-only
    struct Bump {
        name: &'static str,
        analysis_only: bool,
    }

    impl Pass for Bump {
        fn name(&self) -> &'static str {
            self.name
        }

        fn analysis_only(&self) -> bool {
            self.analysis_only
        }

        fn run_pass(&self, state: &mut CompilerState) -> Result<bool, PassError> {
            if let Some(Literal::Int(i)) = state.func_ir.constant_mut(crate::ir::ConstId(0)) {
                *i += 1;
            }
            Ok(true)
        }
    }

    struct Idle(&'static str);

    impl Pass for Idle {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run_pass(&self, _state: &mut CompilerState) -> Result<bool, PassError> {
            Ok(false)
        }
    }

    struct Fail;

    impl Pass for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn run_pass(&self, _state: &mut CompilerState) -> Result<bool, PassError> {
            Err(PassError::Precondition("always fails".to_string()))
        }
    }

    fn state() -> CompilerState {
        let mut func = FunctionIr::new("f", vec![], BlockId(0));
        func.add_constant(0i64);
        CompilerState::new(func, CompilerOptions::default())
    }

    fn counter(state: &CompilerState) -> Literal {
        state.func_ir.constant(crate::ir::ConstId(0)).cloned().unwrap()
    }

    #[test]
    fn test_changed_is_or_of_all_passes() {
        let mut pm = Pipeline::new("test");
        pm.add_pass(Idle("first")).unwrap();
        pm.add_pass(Bump { name: "bump", analysis_only: false }).unwrap();
        pm.add_pass(Idle("last")).unwrap();
        pm.finalize();

        let mut state = state();
        let report = pm.run(&mut state).unwrap();

        assert!(report.changed);
        assert_eq!(report.executed(), ["first", "bump", "last"]);
        assert_eq!(
            report.passes.iter().map(|r| r.changed).collect::<Vec<_>>(),
            [false, true, false]
        );
    }

    #[test]
    fn test_unchanged_run() {
        let mut pm = Pipeline::new("test");
        pm.add_pass(Idle("only")).unwrap();
        pm.finalize();

        let report = pm.run(&mut state()).unwrap();
        assert!(!report.changed);
    }

    #[test]
    fn test_building_pipeline_refuses_to_run() {
        let pm = Pipeline::new("test");
        let err = pm.run(&mut state()).unwrap_err();
        assert!(matches!(err, PipelineError::NotFinalized { .. }));
    }

    #[test]
    fn test_failure_aborts_without_rollback() {
        let mut pm = Pipeline::new("test");
        pm.add_pass(Bump { name: "bump", analysis_only: false }).unwrap();
        pm.add_pass(Fail).unwrap();
        pm.add_pass(Bump { name: "never", analysis_only: false }).unwrap();
        pm.finalize();

        let mut state = state();
        let err = pm.run(&mut state).unwrap_err();

        assert!(matches!(err, PipelineError::PassExecutionFailure { pass: "fail", .. }));
        // first bump committed, third pass skipped
        assert_eq!(counter(&state), Literal::Int(1));

        // the pipeline stays usable for the next compilation
        let mut next = self::state();
        assert!(pm.run(&mut next).is_err());
        assert_eq!(counter(&next), Literal::Int(1));
    }

    #[test]
    fn test_analysis_only_pass_must_not_report_change() {
        let mut pm = Pipeline::new("test");
        pm.add_pass(Bump { name: "liar", analysis_only: true }).unwrap();
        pm.finalize();

        let err = pm.run(&mut state()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PassExecutionFailure {
                pass: "liar",
                source: PassError::Precondition(_),
                ..
            }
        ));
    }
}
