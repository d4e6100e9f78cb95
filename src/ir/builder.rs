//! Instruction builder for assembling a [`FunctionIr`] block by block

use super::{BinOp, BlockId, ConstId, Expr, FunctionIr, Instruction, IrError, Literal, Var};

/// Appends instructions to the block it is positioned at.
///
/// New functions start positioned at their entry block.
pub struct FunctionBuilder {
    func: FunctionIr,
    current: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: &[&str]) -> Self {
        let entry = BlockId(0);
        let params = params.iter().map(|p| Var::from(*p)).collect();
        Self {
            func: FunctionIr::new(name, params, entry),
            current: entry,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.func.entry
    }

    /// Add a block after the highest existing label
    pub fn append_block(&mut self) -> BlockId {
        let next = self
            .func
            .blocks()
            .map(|(id, _)| id.0 + 1)
            .max()
            .unwrap_or_default();
        let id = BlockId(next);
        self.func.blocks.entry(id).or_default();
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) -> Result<(), IrError> {
        if self.func.block(block).is_none() {
            return Err(IrError::UnknownBlock(block));
        }
        self.current = block;
        Ok(())
    }

    /// Register a constant node without assigning it
    pub fn constant(&mut self, value: impl Into<Literal>) -> ConstId {
        self.func.add_constant(value)
    }

    pub fn assign(&mut self, target: &str, value: Expr) -> Result<Var, IrError> {
        let target = Var::from(target);
        self.push(Instruction::Assign {
            target: target.clone(),
            value,
        })?;
        Ok(target)
    }

    /// `target = const(value)` with a fresh constant node
    pub fn assign_const(&mut self, target: &str, value: impl Into<Literal>) -> Result<Var, IrError> {
        let id = self.constant(value);
        self.assign(target, Expr::Const(id))
    }

    pub fn assign_arg(&mut self, target: &str, index: usize) -> Result<Var, IrError> {
        self.assign(target, Expr::Arg(index))
    }

    pub fn binop(&mut self, target: &str, op: BinOp, lhs: &Var, rhs: &Var) -> Result<Var, IrError> {
        self.assign(
            target,
            Expr::Binary {
                op,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            },
        )
    }

    pub fn jump(&mut self, to: BlockId) -> Result<(), IrError> {
        self.push(Instruction::Jump(to))
    }

    pub fn ret(&mut self, var: &Var) -> Result<(), IrError> {
        self.push(Instruction::Return(var.clone()))
    }

    /// Finish construction, verifying the result
    pub fn finish(self) -> Result<FunctionIr, IrError> {
        self.func.verify()?;
        Ok(self.func)
    }

    fn push(&mut self, inst: Instruction) -> Result<(), IrError> {
        let current = self.current;
        let block = self
            .func
            .block_mut(current)
            .ok_or(IrError::UnknownBlock(current))?;
        block.instructions.push(inst);
        Ok(())
    }
}
