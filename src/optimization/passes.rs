//! Individual passes

use itertools::Itertools;
use tracing::debug;

use super::{Pass, PassError};
use crate::compiler::CompilerState;
use crate::ir::{ConstId, Expr, IrError, Literal};

/// Verifies the incoming IR; the anchor custom passes are usually grafted after.
pub struct IrProcessing;

impl IrProcessing {
    pub const NAME: &'static str = "ir_processing";
}

impl Pass for IrProcessing {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn analysis_only(&self) -> bool {
        true
    }

    fn run_pass(&self, state: &mut CompilerState) -> Result<bool, PassError> {
        state.func_ir.verify()?;
        for id in state.func_ir.unreachable_blocks() {
            state.warn(Self::NAME, format!("{id} is unreachable from the entry block"));
        }
        let summary = format!(
            "{}: {} block(s), {} instruction(s)",
            state.func_ir.name,
            state.func_ir.block_count(),
            state.func_ir.instruction_count()
        );
        state.note(Self::NAME, summary);
        Ok(false)
    }
}

/// Dead code elimination: drop instructions following a block's first terminator
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    pub const NAME: &'static str = "dead_code_elimination";
}

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_pass(&self, state: &mut CompilerState) -> Result<bool, PassError> {
        let mut truncated = Vec::new();

        for (id, block) in state.func_ir.blocks_mut() {
            let Some(end) = block
                .instructions
                .iter()
                .position(|inst| inst.is_terminator())
            else {
                continue;
            };
            let removed = block.instructions.len() - (end + 1);
            if removed > 0 {
                block.instructions.truncate(end + 1);
                truncated.push((id, removed));
            }
        }

        for (id, removed) in &truncated {
            state.note(
                Self::NAME,
                format!("removed {removed} unreachable instruction(s) from {id}"),
            );
        }

        Ok(!truncated.is_empty())
    }
}

/// Checks every block ends in exactly one terminator.
pub struct IrLegalization;

impl IrLegalization {
    pub const NAME: &'static str = "ir_legalization";
}

impl Pass for IrLegalization {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn analysis_only(&self) -> bool {
        true
    }

    fn run_pass(&self, state: &mut CompilerState) -> Result<bool, PassError> {
        for (id, block) in state.func_ir.blocks() {
            let terminators = block
                .instructions
                .iter()
                .positions(|inst| inst.is_terminator())
                .collect::<Vec<_>>();
            match terminators.as_slice() {
                [last] if *last + 1 == block.instructions.len() => {}
                [] => {
                    return Err(PassError::Precondition(format!(
                        "{id} has no terminator"
                    )))
                }
                _ => {
                    return Err(PassError::Precondition(format!(
                        "{id} must end in exactly one terminator, found {} at {:?}",
                        terminators.len(),
                        terminators
                    )))
                }
            }
        }
        Ok(false)
    }
}

/// Adds one to every numeric constant assigned anywhere in the function.
///
/// A constant node referenced by several assignments is incremented once per
/// run. Non-numeric literals are left untouched. Running the pass twice
/// increments twice.
pub struct IncrementConstants;

impl IncrementConstants {
    pub const NAME: &'static str = "increment_numeric_constants";
}

impl Pass for IncrementConstants {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_pass(&self, state: &mut CompilerState) -> Result<bool, PassError> {
        let func_ir = &mut state.func_ir;
        let nodes: Vec<ConstId> = func_ir
            .blocks()
            .flat_map(|(_, block)| block.assignments())
            .filter_map(|(_, value)| match value {
                Expr::Const(id) => Some(*id),
                _ => None,
            })
            .unique()
            .collect();

        let mut mutated = false;
        for id in nodes {
            let value = func_ir
                .constant_mut(id)
                .ok_or(IrError::UnknownConstant(id))?;
            match value {
                Literal::Int(i) => {
                    let bumped = i
                        .checked_add(1)
                        .ok_or_else(|| PassError::Overflow(format!("{id} holds {i}")))?;
                    *i = bumped;
                    mutated = true;
                }
                Literal::Float(x) => {
                    *x += 1.0;
                    mutated = true;
                }
                Literal::Bool(_) | Literal::Str(_) | Literal::None => {}
            }
            debug!(constant = %id, value = %value, "visited constant");
        }

        Ok(mutated)
    }
}
