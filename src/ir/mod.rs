//! Per-function intermediate representation consumed by the pass pipeline

pub mod builder;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;
use thiserror::Error;

pub use builder::FunctionBuilder;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("entry block {0} does not exist")]
    MissingEntry(BlockId),

    #[error("duplicate block {0}")]
    DuplicateBlock(BlockId),

    #[error("constant {0} is not defined in the constant table")]
    UnknownConstant(ConstId),

    #[error("jump from {from} targets missing block {to}")]
    UnknownJumpTarget { from: BlockId, to: BlockId },

    #[error("argument index {index} out of range for {arity} parameter(s)")]
    ArgumentOutOfRange { index: usize, arity: usize },

    #[error("block {0} does not exist")]
    UnknownBlock(BlockId),
}

/// Label of a basic block. Blocks iterate in ascending label order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// Index of a constant node in [`FunctionIr`]'s constant table.
///
/// Every expression referencing the same id observes the same literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstId(pub u32);

impl fmt::Display for ConstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "const#{}", self.0)
    }
}

/// Named local variable
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Int,
    Float,
    Bool,
    Str,
    None,
}

impl LiteralKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, LiteralKind::Int | LiteralKind::Float)
    }
}

/// Literal value held by a constant node
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
}

impl Literal {
    pub fn kind(&self) -> LiteralKind {
        match self {
            Literal::Int(_) => LiteralKind::Int,
            Literal::Float(_) => LiteralKind::Float,
            Literal::Bool(_) => LiteralKind::Bool,
            Literal::Str(_) => LiteralKind::Str,
            Literal::None => LiteralKind::None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind().is_numeric()
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::None => f.write_str("none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
        })
    }
}

/// Right-hand side of an assignment
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(ConstId),
    Arg(usize),
    Var(Var),
    Binary { op: BinOp, lhs: Var, rhs: Var },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstKind {
    Assign,
    Jump,
    Return,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Assign { target: Var, value: Expr },
    Jump(BlockId),
    Return(Var),
}

impl Instruction {
    pub fn kind(&self) -> InstKind {
        match self {
            Instruction::Assign { .. } => InstKind::Assign,
            Instruction::Jump(_) => InstKind::Jump,
            Instruction::Return(_) => InstKind::Return,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Instruction::Jump(_) | Instruction::Return(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions of the given kind, in program order
    pub fn find_insts(&self, kind: InstKind) -> impl Iterator<Item = &Instruction> + '_ {
        self.instructions.iter().filter(move |inst| inst.kind() == kind)
    }

    /// `(target, value)` of every assignment, in program order
    pub fn assignments(&self) -> impl Iterator<Item = (&Var, &Expr)> + '_ {
        self.instructions.iter().filter_map(|inst| match inst {
            Instruction::Assign { target, value } => Some((target, value)),
            _ => None,
        })
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|inst| inst.is_terminator())
    }

    /// Blocks control may transfer to; only the first terminator executes
    pub fn successors(&self) -> impl Iterator<Item = BlockId> {
        let target = match self.instructions.iter().find(|inst| inst.is_terminator()) {
            Some(Instruction::Jump(to)) => Some(*to),
            _ => None,
        };
        target.into_iter()
    }
}

/// A function body: labelled blocks plus the constant nodes they share
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionIr {
    pub name: String,
    pub params: Vec<Var>,
    pub entry: BlockId,
    blocks: BTreeMap<BlockId, BasicBlock>,
    constants: Vec<Literal>,
}

impl FunctionIr {
    /// Create a function containing only an empty entry block
    pub fn new(name: impl Into<String>, params: Vec<Var>, entry: BlockId) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(entry, BasicBlock::new());
        Self {
            name: name.into(),
            params,
            entry,
            blocks,
            constants: Vec::new(),
        }
    }

    pub fn add_block(&mut self, id: BlockId) -> Result<&mut BasicBlock, IrError> {
        if self.blocks.contains_key(&id) {
            return Err(IrError::DuplicateBlock(id));
        }
        Ok(self.blocks.entry(id).or_default())
    }

    pub fn add_constant(&mut self, value: impl Into<Literal>) -> ConstId {
        self.constants.push(value.into());
        ConstId((self.constants.len() - 1) as u32)
    }

    pub fn constant(&self, id: ConstId) -> Option<&Literal> {
        self.constants.get(id.0 as usize)
    }

    /// Mutable access to a shared constant node
    pub fn constant_mut(&mut self, id: ConstId) -> Option<&mut Literal> {
        self.constants.get_mut(id.0 as usize)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> + '_ {
        self.blocks.iter().map(|(id, block)| (*id, block))
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = (BlockId, &mut BasicBlock)> + '_ {
        self.blocks.iter_mut().map(|(id, block)| (*id, block))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.values().map(|b| b.instructions.len()).sum()
    }

    /// Blocks no chain of jumps from the entry block reaches
    pub fn unreachable_blocks(&self) -> Vec<BlockId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(block) = self.blocks.get(&id) {
                stack.extend(block.successors());
            }
        }
        self.blocks
            .keys()
            .filter(|id| !seen.contains(*id))
            .copied()
            .collect()
    }

    /// Check the structural invariants every pass may rely on
    pub fn verify(&self) -> Result<(), IrError> {
        if !self.blocks.contains_key(&self.entry) {
            return Err(IrError::MissingEntry(self.entry));
        }

        for (id, block) in self.blocks() {
            for inst in &block.instructions {
                match inst {
                    Instruction::Assign { value, .. } => self.verify_expr(value)?,
                    Instruction::Jump(to) if !self.blocks.contains_key(to) => {
                        return Err(IrError::UnknownJumpTarget { from: id, to: *to });
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn verify_expr(&self, expr: &Expr) -> Result<(), IrError> {
        match expr {
            Expr::Const(id) if self.constant(*id).is_none() => Err(IrError::UnknownConstant(*id)),
            Expr::Arg(index) if *index >= self.params.len() => Err(IrError::ArgumentOutOfRange {
                index: *index,
                arity: self.params.len(),
            }),
            _ => Ok(()),
        }
    }

    fn fmt_expr(&self, expr: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match expr {
            Expr::Const(id) => match self.constant(*id) {
                Some(lit) => write!(f, "const({lit})"),
                None => write!(f, "const(<missing {id}>)"),
            },
            Expr::Arg(index) => match self.params.get(*index) {
                Some(name) => write!(f, "arg({index}, name={name})"),
                None => write!(f, "arg({index})"),
            },
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}

impl fmt::Display for FunctionIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {}({}):", self.name, self.params.iter().join(", "))?;
        for (id, block) in self.blocks() {
            writeln!(f, "  {id}:")?;
            for inst in &block.instructions {
                f.write_str("    ")?;
                match inst {
                    Instruction::Assign { target, value } => {
                        write!(f, "{target} = ")?;
                        self.fmt_expr(value, f)?;
                    }
                    Instruction::Jump(to) => write!(f, "jump {to}")?,
                    Instruction::Return(var) => write!(f, "return {var}")?,
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
