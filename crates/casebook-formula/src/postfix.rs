//! Postfix evaluator
//!
//! Flattens an expression tree into a post-order instruction list and runs it on an explicit
//! value stack, so deeply nested formulas never recurse.
//!
//! Every node becomes exactly one instruction. Flattening also records gates: instruction ranges
//! that only run when the tree-walking evaluator would reach them. These are the right operand of
//! `&&`/`||`, the branches of a conditional and the operands of an unrecognized operator. A
//! skipped range leaves a placeholder on the stack for the instruction that consumes it, and the
//! first failure ends the run, so the context sees the same calls in the same order as with
//! [`crate::evaluator`].

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};
use crate::context::{EvalContext, FormulaContext};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{apply_binary, apply_unary};
use casebook_core::Value;
use std::cmp::Reverse;
use std::fmt;

/// One step of a postfix program
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction<'a> {
    Boolean(bool),
    Number(f64),
    String(&'a str),
    Variable(&'a str),
    /// Call with the top `argc` stack slots as arguments
    Call { name: &'a str, argc: usize },
    Unary(&'a str),
    Binary(&'a str),
    /// Pops else, then, condition
    Conditional,
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Boolean(b) => write!(f, "push {b}"),
            Instruction::Number(n) => write!(f, "push {n}"),
            Instruction::String(s) => write!(f, "push {s:?}"),
            Instruction::Variable(name) => write!(f, "load {name}"),
            Instruction::Call { name, argc } => write!(f, "call {name}/{argc}"),
            Instruction::Unary(op) => write!(f, "unary {op}"),
            Instruction::Binary(op) => write!(f, "binary {op}"),
            Instruction::Conditional => write!(f, "select"),
        }
    }
}

/// A range of instructions that may be skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gate {
    /// First instruction of the range
    at: usize,
    /// Instruction consuming the range; execution resumes here after a skip
    end: usize,
    kind: GateKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateKind {
    /// Right operand of `&&` (`and`) or `||`, run only when the left value on top of the stack
    /// does not decide the result
    Right { and: bool },
    /// Both branches of a conditional whose condition is on top of the stack
    Branches { else_start: usize },
    /// Operands of an unrecognized operator, never run
    Unreachable { operands: usize },
}

/// A flattened expression tree
#[derive(Debug, Clone, PartialEq)]
pub struct PostfixProgram<'a> {
    instructions: Vec<Instruction<'a>>,
    /// Ordered by position, enclosing ranges first
    gates: Vec<Gate>,
}

/// Flatten a tree into post-order (children left to right, then the node)
pub fn flatten(expr: &FormulaExpr) -> PostfixProgram<'_> {
    let mut instructions = Vec::new();
    // first instruction of each emitted node's subtree
    let mut starts = Vec::new();
    // (node, subtree start once its children are scheduled)
    let mut pending: Vec<(&FormulaExpr, Option<usize>)> = vec![(expr, None)];

    while let Some((node, start)) = pending.pop() {
        if let Some(start) = start {
            starts.push(start);
            instructions.push(instruction_for(node));
            continue;
        }

        pending.push((node, Some(instructions.len())));
        match node {
            FormulaExpr::Boolean(_)
            | FormulaExpr::Number(_)
            | FormulaExpr::String(_)
            | FormulaExpr::Variable(_) => {}
            FormulaExpr::Function { args, .. } => {
                pending.extend(args.iter().rev().map(|arg| (arg, None)));
            }
            FormulaExpr::UnaryOp { operand, .. } => pending.push((operand.as_ref(), None)),
            FormulaExpr::BinaryOp { left, right, .. } => {
                pending.push((right.as_ref(), None));
                pending.push((left.as_ref(), None));
            }
            FormulaExpr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                pending.push((if_false.as_ref(), None));
                pending.push((if_true.as_ref(), None));
                pending.push((condition.as_ref(), None));
            }
        }
    }

    let mut gates: Vec<Gate> = instructions
        .iter()
        .enumerate()
        .filter_map(|(end, instruction)| gate_for(instruction, end, &starts))
        .collect();
    gates.sort_by_key(|gate| (gate.at, Reverse(gate.end)));

    PostfixProgram {
        instructions,
        gates,
    }
}

fn instruction_for(node: &FormulaExpr) -> Instruction<'_> {
    match node {
        FormulaExpr::Boolean(b) => Instruction::Boolean(*b),
        FormulaExpr::Number(n) => Instruction::Number(*n),
        FormulaExpr::String(s) => Instruction::String(s),
        FormulaExpr::Variable(name) => Instruction::Variable(name),
        FormulaExpr::Function { name, args } => Instruction::Call {
            name,
            argc: args.len(),
        },
        FormulaExpr::UnaryOp { op, .. } => Instruction::Unary(op),
        FormulaExpr::BinaryOp { op, .. } => Instruction::Binary(op),
        FormulaExpr::Conditional { .. } => Instruction::Conditional,
    }
}

/// The gate guarding the operands of the instruction at `end`, if any.
///
/// The last operand ends right before `end` and starts at `starts[end - 1]`; the operand before
/// it ends right before that start, and so on.
fn gate_for(instruction: &Instruction<'_>, end: usize, starts: &[usize]) -> Option<Gate> {
    let gate = |at, kind| Some(Gate { at, end, kind });
    match instruction {
        Instruction::Unary(op) if UnaryOperator::from_symbol(op).is_none() => {
            gate(starts[end], GateKind::Unreachable { operands: 1 })
        }
        Instruction::Binary(op) => match BinaryOperator::from_symbol(op) {
            None => gate(starts[end], GateKind::Unreachable { operands: 2 }),
            Some(BinaryOperator::And) => gate(starts[end - 1], GateKind::Right { and: true }),
            Some(BinaryOperator::Or) => gate(starts[end - 1], GateKind::Right { and: false }),
            Some(_) => None,
        },
        Instruction::Conditional => {
            let else_start = starts[end - 1];
            gate(starts[else_start - 1], GateKind::Branches { else_start })
        }
        _ => None,
    }
}

impl<'a> PostfixProgram<'a> {
    pub fn instructions(&self) -> &[Instruction<'a>] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Run the program
    pub fn evaluate(&self, ctx: &dyn FormulaContext, eval: &EvalContext) -> FormulaResult<Value> {
        let mut stack: Vec<Value> = Vec::with_capacity(self.instructions.len());
        let mut gates = self.gates.iter().peekable();
        // (else_start, end) of conditionals running their then-branch
        let mut taken: Vec<(usize, usize)> = Vec::new();
        let mut pc = 0;

        'run: while let Some(instruction) = self.instructions.get(pc) {
            // a finished then-branch skips its else-branch
            if let Some(&(else_start, end)) = taken.last() {
                if else_start == pc {
                    taken.pop();
                    stack.push(Value::Empty);
                    pc = end;
                    continue;
                }
            }

            while gates.next_if(|gate| gate.at < pc).is_some() {}
            while let Some(gate) = gates.next_if(|gate| gate.at == pc) {
                let resume = match gate.kind {
                    GateKind::Right { and } => {
                        let left = stack.last().ok_or_else(malformed)?;
                        (left.is_truthy() != and).then_some((gate.end, 1))
                    }
                    GateKind::Branches { else_start } => {
                        if stack.last().ok_or_else(malformed)?.is_truthy() {
                            taken.push((else_start, gate.end));
                            None
                        } else {
                            Some((else_start, 1))
                        }
                    }
                    GateKind::Unreachable { operands } => Some((gate.end, operands)),
                };
                if let Some((target, placeholders)) = resume {
                    stack.extend(std::iter::repeat(Value::Empty).take(placeholders));
                    pc = target;
                    continue 'run;
                }
            }

            let value = match instruction {
                Instruction::Boolean(b) => Value::Boolean(*b),
                Instruction::Number(n) => Value::Number(*n),
                Instruction::String(s) => Value::String((*s).to_string()),
                Instruction::Variable(name) => ctx.evaluate_variable(name, eval)?,

                Instruction::Call { name, argc } => {
                    let args = pop_n(&mut stack, *argc)?;
                    ctx.evaluate_function(name, args)?
                }

                Instruction::Unary(op) => {
                    let operand = pop(&mut stack)?;
                    let op = UnaryOperator::from_symbol(op)
                        .ok_or_else(|| FormulaError::unknown_operator(op))?;
                    apply_unary(op, &operand)
                }

                // `&&` and `||` select an operand; a skipped right operand is never selected
                Instruction::Binary(op) => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let op = BinaryOperator::from_symbol(op)
                        .ok_or_else(|| FormulaError::unknown_operator(op))?;
                    apply_binary(op, &left, &right)?
                }

                Instruction::Conditional => {
                    let if_false = pop(&mut stack)?;
                    let if_true = pop(&mut stack)?;
                    if pop(&mut stack)?.is_truthy() {
                        if_true
                    } else {
                        if_false
                    }
                }
            };
            stack.push(value);
            pc += 1;
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            _ => Err(malformed()),
        }
    }
}

/// Evaluate a tree through its postfix form
pub fn evaluate(expr: &FormulaExpr, ctx: &dyn FormulaContext, eval: &EvalContext) -> FormulaResult<Value> {
    flatten(expr).evaluate(ctx, eval)
}

fn pop(stack: &mut Vec<Value>) -> FormulaResult<Value> {
    stack.pop().ok_or_else(malformed)
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> FormulaResult<Vec<Value>> {
    let start = stack.len().checked_sub(n).ok_or_else(malformed)?;
    Ok(stack.split_off(start))
}

fn malformed() -> FormulaError {
    FormulaError::Evaluation("postfix program is malformed".into())
}
