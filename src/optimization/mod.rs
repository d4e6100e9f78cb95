//! Pass interface and the built-in passes

pub mod passes;

use thiserror::Error;

use crate::compiler::CompilerState;
use crate::ir::IrError;

pub use passes::{DeadCodeElimination, IncrementConstants, IrLegalization, IrProcessing};

#[derive(Debug, Error)]
pub enum PassError {
    #[error("malformed IR: {0}")]
    MalformedIr(#[from] IrError),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),
}

/// Metadata a pipeline records for each pass it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassDescriptor {
    pub name: &'static str,
    /// The pass may add, remove or reorder blocks or edges
    pub mutates_control_flow: bool,
    /// The pass never mutates the IR
    pub analysis_only: bool,
}

/// A single transformation or analysis over one function's IR.
///
/// Passes are plain values: construct one and hand it to
/// [`Pipeline::add_pass_after`](crate::pipeline::Pipeline::add_pass_after) or
/// [`Pipeline::add_pass_before`](crate::pipeline::Pipeline::add_pass_before).
/// A finalized pipeline can be shared between threads, hence `Send + Sync`.
pub trait Pass: Send + Sync {
    /// Name unique within a pipeline; used as an insertion anchor
    fn name(&self) -> &'static str;

    fn mutates_control_flow(&self) -> bool {
        false
    }

    fn analysis_only(&self) -> bool {
        false
    }

    /// Run over `state.func_ir`, returning `true` iff the IR was mutated
    fn run_pass(&self, state: &mut CompilerState) -> Result<bool, PassError>;

    fn descriptor(&self) -> PassDescriptor {
        PassDescriptor {
            name: self.name(),
            mutates_control_flow: self.mutates_control_flow(),
            analysis_only: self.analysis_only(),
        }
    }
}
