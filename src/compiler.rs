//! Main compiler orchestration

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::executor::RunReport;
use crate::ir::{FunctionIr, IrError};
use crate::optimization::{DeadCodeElimination, IrLegalization, IrProcessing};
use crate::pipeline::{Pipeline, PipelineError};

pub type CompilerResult<T> = Result<T, CompilerError>;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Invalid IR: {0}")]
    InvalidIr(#[from] IrError),

    #[error("No pipeline was defined")]
    NoPipelines,
}

/// Knobs threaded through every pass via [`CompilerState`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Re-verify the IR after every pass that reports a change
    pub verify_each_pass: bool,
    /// Log the full IR after every pass at debug level
    pub dump_ir: bool,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self {
            verify_each_pass: true,
            dump_ir: false,
        }
    }

    pub fn with_verify_each_pass(mut self, enabled: bool) -> Self {
        self.verify_each_pass = enabled;
        self
    }

    pub fn with_dump_ir(mut self, enabled: bool) -> Self {
        self.dump_ir = enabled;
        self
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Note,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub pass: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Note => "note",
            Severity::Warning => "warning",
        };
        write!(f, "{level}[{}]: {}", self.pass, self.message)
    }
}

/// Mutable context for compiling one function
#[derive(Debug, Clone)]
pub struct CompilerState {
    pub func_ir: FunctionIr,
    pub diagnostics: Vec<Diagnostic>,
    pub options: CompilerOptions,
}

impl CompilerState {
    pub fn new(func_ir: FunctionIr, options: CompilerOptions) -> Self {
        Self {
            func_ir,
            diagnostics: Vec::new(),
            options,
        }
    }

    pub fn note(&mut self, pass: &'static str, message: impl Into<String>) {
        self.push(Severity::Note, pass, message.into());
    }

    pub fn warn(&mut self, pass: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, pass, message.into());
    }

    fn push(&mut self, severity: Severity, pass: &'static str, message: String) {
        debug!(pass, ?severity, "{message}");
        self.diagnostics.push(Diagnostic {
            severity,
            pass,
            message,
        });
    }
}

/// Override point deciding which pipelines a compiler runs.
///
/// Custom configurations call [`DefaultPassBuilder::define_default_pipeline`],
/// graft their passes, finalize, and return the result. Only the first
/// pipeline returned is run; later ones are fallbacks with no selection
/// policy yet.
pub trait DefinePipelines {
    fn define_pipelines(&self, state: &CompilerState) -> Result<Vec<Pipeline>, PipelineError>;
}

impl<F> DefinePipelines for F
where
    F: Fn(&CompilerState) -> Result<Vec<Pipeline>, PipelineError>,
{
    fn define_pipelines(&self, state: &CompilerState) -> Result<Vec<Pipeline>, PipelineError> {
        self(state)
    }
}

/// Factory for the standard pass list
pub struct DefaultPassBuilder;

impl DefaultPassBuilder {
    pub const PIPELINE_NAME: &'static str = "default";

    /// `ir_processing`, `dead_code_elimination`, `ir_legalization`, still open
    /// for insertion
    pub fn define_default_pipeline(_state: &CompilerState) -> Result<Pipeline, PipelineError> {
        let mut pm = Pipeline::new(Self::PIPELINE_NAME);
        pm.add_pass(IrProcessing)?;
        pm.add_pass(DeadCodeElimination)?;
        pm.add_pass(IrLegalization)?;
        Ok(pm)
    }
}

/// The default pipeline with nothing grafted
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPipelines;

impl DefinePipelines for DefaultPipelines {
    fn define_pipelines(&self, state: &CompilerState) -> Result<Vec<Pipeline>, PipelineError> {
        let mut pm = DefaultPassBuilder::define_default_pipeline(state)?;
        pm.finalize();
        Ok(vec![pm])
    }
}

/// Result of compiling one function
#[derive(Debug, Clone)]
pub struct Compilation {
    pub func_ir: FunctionIr,
    pub changed: bool,
    pub report: RunReport,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs a function's IR through the pipelines chosen by `P`
pub struct Compiler<P = DefaultPipelines> {
    pipelines: P,
    options: CompilerOptions,
}

impl Compiler {
    /// Create a compiler running the default pipeline
    pub fn new() -> Self {
        Self::with_pipelines(DefaultPipelines)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: DefinePipelines> Compiler<P> {
    /// Create a compiler whose pipelines come from `pipelines`
    pub fn with_pipelines(pipelines: P) -> Self {
        Self {
            pipelines,
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile one function
    pub fn compile(&self, func_ir: FunctionIr) -> CompilerResult<Compilation> {
        func_ir.verify()?;

        let mut state = CompilerState::new(func_ir, self.options.clone());
        let pipelines = self.pipelines.define_pipelines(&state)?;
        let (primary, fallbacks) = pipelines.split_first().ok_or(CompilerError::NoPipelines)?;
        if !fallbacks.is_empty() {
            warn!(
                count = fallbacks.len(),
                "fallback pipelines are not supported, running `{}` only",
                primary.name()
            );
        }

        let report = primary.run(&mut state)?;
        Ok(Compilation {
            func_ir: state.func_ir,
            changed: report.changed,
            report,
            diagnostics: state.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, FunctionBuilder};
    use crate::optimization::IncrementConstants;
    use pretty_assertions::assert_eq;

    fn constant_return() -> FunctionIr {
        let mut b = FunctionBuilder::new("k", &[]);
        let v = b.assign_const("v", 41i64).unwrap();
        b.ret(&v).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_compiler_options() {
        let options = CompilerOptions::new();
        assert!(options.verify_each_pass);
        assert!(!options.dump_ir);

        let options = CompilerOptions::new()
            .with_verify_each_pass(false)
            .with_dump_ir(true);
        assert!(!options.verify_each_pass);
        assert!(options.dump_ir);

        let compiler = Compiler::new().with_options(options.clone());
        assert_eq!(compiler.options(), &options);
    }

    #[test]
    fn test_default_pipeline_shape() {
        let state = CompilerState::new(constant_return(), CompilerOptions::default());
        let pm = DefaultPassBuilder::define_default_pipeline(&state).unwrap();

        assert!(!pm.is_finalized());
        assert_eq!(
            pm.pass_names(),
            [IrProcessing::NAME, DeadCodeElimination::NAME, IrLegalization::NAME]
        );
    }

    #[test]
    fn test_default_compiler_leaves_ir_alone() {
        let func = constant_return();
        let compilation = Compiler::new().compile(func.clone()).unwrap();

        assert!(!compilation.changed);
        assert_eq!(compilation.func_ir, func);
        assert_eq!(compilation.diagnostics.len(), 1);
        assert_eq!(compilation.diagnostics[0].pass, IrProcessing::NAME);
    }

    #[test]
    fn test_closure_as_custom_compiler() {
        let custom = |state: &CompilerState| -> Result<Vec<Pipeline>, PipelineError> {
            let mut pm = DefaultPassBuilder::define_default_pipeline(state)?;
            pm.add_pass_before(IncrementConstants, IrLegalization::NAME)?;
            pm.finalize();
            Ok(vec![pm])
        };

        let compilation = Compiler::with_pipelines(custom)
            .compile(constant_return())
            .unwrap();

        assert!(compilation.changed);
        assert_eq!(
            compilation.report.executed(),
            [
                IrProcessing::NAME,
                DeadCodeElimination::NAME,
                IncrementConstants::NAME,
                IrLegalization::NAME
            ]
        );
    }

    #[test]
    fn test_no_pipelines() {
        let empty = |_: &CompilerState| -> Result<Vec<Pipeline>, PipelineError> { Ok(Vec::new()) };
        let err = Compiler::with_pipelines(empty)
            .compile(constant_return())
            .unwrap_err();
        assert!(matches!(err, CompilerError::NoPipelines));
    }

    #[test]
    fn test_only_first_pipeline_runs() {
        let two = |state: &CompilerState| -> Result<Vec<Pipeline>, PipelineError> {
            let mut primary = DefaultPassBuilder::define_default_pipeline(state)?;
            primary.finalize();

            let mut fallback = Pipeline::new("fallback");
            fallback.add_pass(IncrementConstants)?;
            fallback.finalize();
            Ok(vec![primary, fallback])
        };

        let compilation = Compiler::with_pipelines(two)
            .compile(constant_return())
            .unwrap();
        assert!(!compilation.changed);
        assert!(!compilation.report.executed().contains(&IncrementConstants::NAME));
    }

    #[test]
    fn test_unknown_anchor_stops_assembly() {
        let broken = |state: &CompilerState| -> Result<Vec<Pipeline>, PipelineError> {
            let mut pm = DefaultPassBuilder::define_default_pipeline(state)?;
            pm.add_pass_after(IncrementConstants, "no_such_pass")?;
            pm.finalize();
            Ok(vec![pm])
        };

        let err = Compiler::with_pipelines(broken)
            .compile(constant_return())
            .unwrap_err();
        assert!(matches!(
            err,
            CompilerError::Pipeline(PipelineError::UnknownAnchor { .. })
        ));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        let mut func = constant_return();
        func.entry = BlockId(9);

        let err = Compiler::new().compile(func).unwrap_err();
        assert!(matches!(err, CompilerError::InvalidIr(IrError::MissingEntry(_))));
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic {
            severity: Severity::Warning,
            pass: "p",
            message: "careful".to_string(),
        };
        assert_eq!(diagnostic.to_string(), "warning[p]: careful");
    }
}
