//! Reference interpreter for observing what a pipeline did to a function

use std::collections::HashMap;

use thiserror::Error;
use tracing::trace;

use crate::ir::{BinOp, BlockId, Expr, FunctionIr, Instruction, IrError, Literal, LiteralKind, Var};

pub const DEFAULT_STEP_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("`{function}` expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("variable `{0}` is not bound")]
    Unbound(Var),

    #[error("cannot apply `{op}` to {lhs:?} and {rhs:?}")]
    TypeMismatch {
        op: BinOp,
        lhs: LiteralKind,
        rhs: LiteralKind,
    },

    #[error("integer overflow evaluating `{0}`")]
    Overflow(BinOp),

    #[error("{0} ends without a terminator")]
    MissingTerminator(BlockId),

    #[error("step limit of {0} instructions exceeded")]
    StepLimit(usize),

    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Evaluate `func` with the default step limit
pub fn evaluate(func: &FunctionIr, args: &[Literal]) -> Result<Literal, EvalError> {
    Evaluator::new(func).call(args)
}

pub struct Evaluator<'f> {
    func: &'f FunctionIr,
    step_limit: usize,
}

impl<'f> Evaluator<'f> {
    pub fn new(func: &'f FunctionIr) -> Self {
        Self {
            func,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn call(&self, args: &[Literal]) -> Result<Literal, EvalError> {
        if args.len() != self.func.params.len() {
            return Err(EvalError::ArgumentCount {
                function: self.func.name.clone(),
                expected: self.func.params.len(),
                got: args.len(),
            });
        }

        let mut env: HashMap<&Var, Literal> = HashMap::new();
        let mut current = self.func.entry;
        let mut steps = 0usize;

        loop {
            let block = self
                .func
                .block(current)
                .ok_or(IrError::UnknownBlock(current))?;
            trace!(block = %current, "entering block");

            let mut next = None;
            for inst in &block.instructions {
                steps += 1;
                if steps > self.step_limit {
                    return Err(EvalError::StepLimit(self.step_limit));
                }

                match inst {
                    Instruction::Assign { target, value } => {
                        let value = self.eval_expr(value, args, &env)?;
                        env.insert(target, value);
                    }
                    Instruction::Jump(to) => {
                        next = Some(*to);
                        break;
                    }
                    Instruction::Return(var) => return lookup(&env, var),
                }
            }

            current = next.ok_or(EvalError::MissingTerminator(current))?;
        }
    }

    fn eval_expr(
        &self,
        expr: &Expr,
        args: &[Literal],
        env: &HashMap<&Var, Literal>,
    ) -> Result<Literal, EvalError> {
        match expr {
            Expr::Const(id) => self
                .func
                .constant(*id)
                .cloned()
                .ok_or(EvalError::Ir(IrError::UnknownConstant(*id))),
            Expr::Arg(index) => args.get(*index).cloned().ok_or(EvalError::Ir(
                IrError::ArgumentOutOfRange {
                    index: *index,
                    arity: args.len(),
                },
            )),
            Expr::Var(var) => lookup(env, var),
            Expr::Binary { op, lhs, rhs } => binary(*op, &lookup(env, lhs)?, &lookup(env, rhs)?),
        }
    }
}

fn lookup(env: &HashMap<&Var, Literal>, var: &Var) -> Result<Literal, EvalError> {
    env.get(var)
        .cloned()
        .ok_or_else(|| EvalError::Unbound(var.clone()))
}

fn binary(op: BinOp, lhs: &Literal, rhs: &Literal) -> Result<Literal, EvalError> {
    let float = |a: f64, b: f64| match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
    };

    match (lhs, rhs) {
        (Literal::Int(a), Literal::Int(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Sub => a.checked_sub(*b),
                BinOp::Mul => a.checked_mul(*b),
            };
            result.map(Literal::Int).ok_or(EvalError::Overflow(op))
        }
        (Literal::Int(a), Literal::Float(b)) => Ok(Literal::Float(float(*a as f64, *b))),
        (Literal::Float(a), Literal::Int(b)) => Ok(Literal::Float(float(*a, *b as f64))),
        (Literal::Float(a), Literal::Float(b)) => Ok(Literal::Float(float(*a, *b))),
        _ => Err(EvalError::TypeMismatch {
            op,
            lhs: lhs.kind(),
            rhs: rhs.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    #[test]
    fn test_mixed_arithmetic() {
        let mut b = FunctionBuilder::new("f", &["x"]);
        let x = b.assign_arg("x", 0).unwrap();
        let k = b.assign_const("k", 0.5).unwrap();
        let y = b.binop("y", BinOp::Mul, &x, &k).unwrap();
        b.ret(&y).unwrap();
        let func = b.finish().unwrap();

        assert_eq!(evaluate(&func, &[Literal::Int(8)]), Ok(Literal::Float(4.0)));
    }

    #[test]
    fn test_follows_jumps() {
        let mut b = FunctionBuilder::new("f", &[]);
        let exit = b.append_block();
        let v = b.assign_const("v", 3i64).unwrap();
        b.jump(exit).unwrap();
        b.position_at_end(exit).unwrap();
        let w = b.binop("w", BinOp::Sub, &v, &v).unwrap();
        b.ret(&w).unwrap();
        let func = b.finish().unwrap();

        assert_eq!(evaluate(&func, &[]), Ok(Literal::Int(0)));
    }

    #[test]
    fn test_errors() {
        let mut b = FunctionBuilder::new("f", &["x"]);
        let s = b.assign_const("s", "text").unwrap();
        let x = b.assign_arg("x", 0).unwrap();
        let bad = b.binop("bad", BinOp::Add, &s, &x).unwrap();
        b.ret(&bad).unwrap();
        let func = b.finish().unwrap();

        assert!(matches!(
            evaluate(&func, &[]),
            Err(EvalError::ArgumentCount { expected: 1, got: 0, .. })
        ));
        assert_eq!(
            evaluate(&func, &[Literal::Int(1)]),
            Err(EvalError::TypeMismatch {
                op: BinOp::Add,
                lhs: LiteralKind::Str,
                rhs: LiteralKind::Int,
            })
        );
    }

    #[test]
    fn test_unbound_and_missing_terminator() {
        let mut b = FunctionBuilder::new("f", &[]);
        b.ret(&Var::from("nope")).unwrap();
        let func = b.finish().unwrap();
        assert_eq!(evaluate(&func, &[]), Err(EvalError::Unbound(Var::from("nope"))));

        let mut b = FunctionBuilder::new("g", &[]);
        b.assign_const("v", 1i64).unwrap();
        let func = b.finish().unwrap();
        assert_eq!(
            evaluate(&func, &[]),
            Err(EvalError::MissingTerminator(BlockId(0)))
        );
    }

    #[test]
    fn test_step_limit() {
        let mut b = FunctionBuilder::new("spin", &[]);
        let entry = b.entry();
        b.jump(entry).unwrap();
        let func = b.finish().unwrap();

        let result = Evaluator::new(&func).with_step_limit(50).call(&[]);
        assert_eq!(result, Err(EvalError::StepLimit(50)));
    }

    #[test]
    fn test_overflow() {
        let mut b = FunctionBuilder::new("f", &[]);
        let big = b.assign_const("big", i64::MAX).unwrap();
        let sum = b.binop("sum", BinOp::Add, &big, &big).unwrap();
        b.ret(&sum).unwrap();
        let func = b.finish().unwrap();

        assert_eq!(evaluate(&func, &[]), Err(EvalError::Overflow(BinOp::Add)));
    }
}
