//! Pass Pipeline
//!
//! An ordered, freezable pass manager over a per-function IR, with custom
//! passes grafted relative to the built-in ones.

pub mod compiler;
pub mod eval;
pub mod executor;
pub mod ir;
pub mod optimization;
pub mod pipeline;

pub use compiler::{
    Compilation, Compiler, CompilerError, CompilerOptions, CompilerResult, CompilerState,
    DefaultPassBuilder, DefaultPipelines, DefinePipelines,
};
pub use executor::{PassRecord, RunReport};
pub use optimization::{Pass, PassDescriptor, PassError};
pub use pipeline::{Pipeline, PipelineError, PipelineState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, FunctionBuilder, Literal};
    use crate::optimization::{IncrementConstants, IrProcessing};

    #[test]
    fn test_basic_compilation() {
        let mut b = FunctionBuilder::new("add_one", &["x"]);
        let x = b.assign_arg("x", 0).unwrap();
        let one = b.assign_const("one", 1i64).unwrap();
        let y = b.binop("y", BinOp::Add, &x, &one).unwrap();
        b.ret(&y).unwrap();
        let func = b.finish().unwrap();

        let custom = |state: &CompilerState| -> Result<Vec<Pipeline>, PipelineError> {
            let mut pm = DefaultPassBuilder::define_default_pipeline(state)?;
            pm.add_pass_after(IncrementConstants, IrProcessing::NAME)?;
            pm.finalize();
            Ok(vec![pm])
        };
        let compiled = Compiler::with_pipelines(custom).compile(func).unwrap();

        let result = eval::evaluate(&compiled.func_ir, &[Literal::Int(5)]);
        assert_eq!(result, Ok(Literal::Int(7)));
    }
}
