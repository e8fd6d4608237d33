//! FILENAME: core/evaluator/src/evaluator.rs
//! PURPOSE: Evaluates formula expressions to scalar results.
//! CONTEXT: There is no grid behind this evaluator. Names are the only
//! external inputs; they resolve through a `NameTable`, which binds each
//! name to an expression (for a pivot cell, `SUM(...)` of the values that
//! contributed to it).
//!
//! Internally every step returns `Result<EvalResult, CellError>` so the
//! first error short-circuits with `?`. Only IF and IFERROR evaluate their
//! arguments lazily; every other builtin sees its arguments already
//! evaluated, errors included, and decides for itself what to do with them.

use crate::cell::{CellError, CellValue};
use crate::names::NameTable;
use formula_parser::{BinaryOperator, Expression, UnaryOperator, Value};
use std::cell::Cell;
use std::cmp::Ordering;

/// Maximum nesting of name lookups before a name is treated as unresolvable.
pub const MAX_NAME_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl EvalResult {
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            EvalResult::Number(n) => CellValue::Number(*n),
            EvalResult::Text(s) => CellValue::Text(s.clone()),
            EvalResult::Boolean(b) => CellValue::Boolean(*b),
            EvalResult::Error(e) => CellValue::Error(*e),
        }
    }

    /// Numeric view: booleans are 0/1, text must parse.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EvalResult::Number(n) => Some(*n),
            EvalResult::Boolean(b) => Some(f64::from(u8::from(*b))),
            EvalResult::Text(s) => s.trim().parse().ok(),
            EvalResult::Error(_) => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            EvalResult::Boolean(b) => Some(*b),
            EvalResult::Number(n) => Some(*n != 0.0),
            EvalResult::Text(s) if s.eq_ignore_ascii_case("TRUE") => Some(true),
            EvalResult::Text(s) if s.eq_ignore_ascii_case("FALSE") => Some(false),
            _ => None,
        }
    }

    /// Text used by `&`. Whole numbers print without a decimal point.
    pub fn as_text(&self) -> String {
        match self {
            EvalResult::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{n:.0}"),
            EvalResult::Number(n) => n.to_string(),
            EvalResult::Text(s) => s.clone(),
            EvalResult::Boolean(true) => "TRUE".to_string(),
            EvalResult::Boolean(false) => "FALSE".to_string(),
            EvalResult::Error(e) => e.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EvalResult::Error(_))
    }
}

type Outcome = Result<EvalResult, CellError>;

/// Reads a number out of an evaluated argument. Errors pass through,
/// anything non-numeric is `#VALUE!`.
fn number(value: &EvalResult) -> Result<f64, CellError> {
    match value {
        EvalResult::Error(e) => Err(*e),
        other => other.as_number().ok_or(CellError::Value),
    }
}

fn truthy(value: &EvalResult) -> Result<bool, CellError> {
    match value {
        EvalResult::Error(e) => Err(*e),
        other => other.as_boolean().ok_or(CellError::Value),
    }
}

fn finite(n: f64) -> Outcome {
    if n.is_finite() {
        Ok(EvalResult::Number(n))
    } else {
        Err(CellError::Num)
    }
}

pub struct Evaluator<'a> {
    names: &'a NameTable,
    depth: Cell<usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(names: &'a NameTable) -> Self {
        Evaluator {
            names,
            depth: Cell::new(0),
        }
    }

    pub fn evaluate(&self, expr: &Expression) -> EvalResult {
        self.eval(expr).unwrap_or_else(EvalResult::Error)
    }

    fn eval(&self, expr: &Expression) -> Outcome {
        match expr {
            Expression::Literal(Value::Number(n)) => Ok(EvalResult::Number(*n)),
            Expression::Literal(Value::String(s)) => Ok(EvalResult::Text(s.clone())),
            Expression::Literal(Value::Boolean(b)) => Ok(EvalResult::Boolean(*b)),
            Expression::Name(name) => self.lookup(name),
            Expression::BinaryOp { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expression::UnaryOp { op, operand } => {
                let n = number(&self.eval(operand)?)?;
                Ok(EvalResult::Number(match op {
                    UnaryOperator::Negate => -n,
                    UnaryOperator::Percent => n / 100.0,
                }))
            }
            Expression::FunctionCall { name, args } => self.call(name, args),
        }
    }

    /// Unbound names and runaway (self-referencing) bindings yield `#NAME?`.
    fn lookup(&self, name: &str) -> Outcome {
        let bound = self.names.get(name).ok_or(CellError::Name)?;
        let depth = self.depth.get();
        if depth >= MAX_NAME_DEPTH {
            return Err(CellError::Name);
        }

        self.depth.set(depth + 1);
        let result = self.eval(bound);
        self.depth.set(depth);
        result
    }

    fn call(&self, name: &str, args: &[Expression]) -> Outcome {
        let builtin = Builtin::lookup(name).ok_or(CellError::Name)?;
        if !builtin.accepts(args.len()) {
            return Err(CellError::Value);
        }

        match builtin {
            Builtin::If => {
                let branch = match (truthy(&self.eval(&args[0])?)?, args.get(2)) {
                    (true, _) => &args[1],
                    (false, Some(otherwise)) => otherwise,
                    (false, None) => return Ok(EvalResult::Boolean(false)),
                };
                self.eval(branch)
            }
            Builtin::IfError => self.eval(&args[0]).or_else(|_| self.eval(&args[1])),
            eager => {
                let values: Vec<EvalResult> = args.iter().map(|a| self.evaluate(a)).collect();
                eager.apply(&values)
            }
        }
    }
}

fn binary(op: BinaryOperator, left: &EvalResult, right: &EvalResult) -> Outcome {
    let arithmetic = |f: fn(f64, f64) -> f64| -> Outcome {
        Ok(EvalResult::Number(f(number(left)?, number(right)?)))
    };
    let ordered = |test: fn(Ordering) -> bool| -> Outcome {
        Ok(EvalResult::Boolean(test(compare(left, right)?)))
    };

    match op {
        BinaryOperator::Add => arithmetic(|a, b| a + b),
        BinaryOperator::Subtract => arithmetic(|a, b| a - b),
        BinaryOperator::Multiply => arithmetic(|a, b| a * b),
        BinaryOperator::Divide => {
            let (a, b) = (number(left)?, number(right)?);
            if b == 0.0 {
                Err(CellError::Div0)
            } else {
                Ok(EvalResult::Number(a / b))
            }
        }
        BinaryOperator::Power => finite(number(left)?.powf(number(right)?)),
        BinaryOperator::Concat => Ok(EvalResult::Text(left.as_text() + &right.as_text())),
        BinaryOperator::Equal => Ok(EvalResult::Boolean(values_equal(left, right))),
        BinaryOperator::NotEqual => Ok(EvalResult::Boolean(!values_equal(left, right))),
        BinaryOperator::LessThan => ordered(Ordering::is_lt),
        BinaryOperator::GreaterThan => ordered(Ordering::is_gt),
        BinaryOperator::LessEqual => ordered(Ordering::is_le),
        BinaryOperator::GreaterEqual => ordered(Ordering::is_ge),
    }
}

fn values_equal(left: &EvalResult, right: &EvalResult) -> bool {
    let close = |a: f64, b: f64| (a - b).abs() < f64::EPSILON;
    match (left, right) {
        (EvalResult::Number(a), EvalResult::Number(b)) => close(*a, *b),
        (EvalResult::Text(a), EvalResult::Text(b)) => a.to_uppercase() == b.to_uppercase(),
        (EvalResult::Boolean(a), EvalResult::Boolean(b)) => a == b,
        (EvalResult::Number(n), EvalResult::Text(s)) | (EvalResult::Text(s), EvalResult::Number(n)) => {
            s.trim().parse().is_ok_and(|parsed| close(parsed, *n))
        }
        _ => false,
    }
}

/// Numbers compare numerically, text case-insensitively. Mixed
/// operands that are not both numeric are `#VALUE!`.
fn compare(left: &EvalResult, right: &EvalResult) -> Result<Ordering, CellError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return a.partial_cmp(&b).ok_or(CellError::Value);
    }
    match (left, right) {
        (EvalResult::Text(a), EvalResult::Text(b)) => Ok(a.to_uppercase().cmp(&b.to_uppercase())),
        _ => Err(CellError::Value),
    }
}

// ============================================================================
// BUILTINS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Sum,
    Average,
    Min,
    Max,
    Count,
    CountA,
    Product,
    If,
    IfError,
    And,
    Or,
    Not,
    Abs,
    Int,
    Sign,
    Sqrt,
    Round,
    Mod,
    Power,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        let builtin = match name.to_uppercase().as_str() {
            "SUM" => Builtin::Sum,
            "AVERAGE" => Builtin::Average,
            "MIN" => Builtin::Min,
            "MAX" => Builtin::Max,
            "COUNT" => Builtin::Count,
            "COUNTA" => Builtin::CountA,
            "PRODUCT" => Builtin::Product,
            "IF" => Builtin::If,
            "IFERROR" => Builtin::IfError,
            "AND" => Builtin::And,
            "OR" => Builtin::Or,
            "NOT" => Builtin::Not,
            "ABS" => Builtin::Abs,
            "INT" => Builtin::Int,
            "SIGN" => Builtin::Sign,
            "SQRT" => Builtin::Sqrt,
            "ROUND" => Builtin::Round,
            "MOD" => Builtin::Mod,
            "POWER" => Builtin::Power,
            _ => return None,
        };
        Some(builtin)
    }

    fn accepts(self, argc: usize) -> bool {
        use Builtin::*;
        match self {
            Sum | Average | Min | Max | Count | CountA | Product => true,
            And | Or => argc >= 1,
            Not | Abs | Int | Sign | Sqrt => argc == 1,
            Round => (1..=2).contains(&argc),
            If => (2..=3).contains(&argc),
            IfError | Mod | Power => argc == 2,
        }
    }

    /// Applies an eagerly evaluated builtin. Argument counts are already
    /// checked by `accepts`.
    fn apply(self, values: &[EvalResult]) -> Outcome {
        use Builtin::*;
        let num = |i: usize| number(&values[i]);

        match self {
            Sum => Ok(EvalResult::Number(numbers(values)?.iter().sum())),
            Average => {
                let ns = numbers(values)?;
                if ns.is_empty() {
                    return Err(CellError::Div0);
                }
                Ok(EvalResult::Number(ns.iter().sum::<f64>() / ns.len() as f64))
            }
            Min => Ok(EvalResult::Number(extreme(values, f64::min)?)),
            Max => Ok(EvalResult::Number(extreme(values, f64::max)?)),
            Product => {
                let ns = numbers(values)?;
                if ns.is_empty() {
                    Ok(EvalResult::Number(0.0))
                } else {
                    finite(ns.iter().product())
                }
            }
            // COUNT ignores errors; COUNTA counts them
            Count => Ok(count(values, |v| matches!(v, EvalResult::Number(_)))),
            CountA => Ok(count(values, |v| !matches!(v, EvalResult::Text(s) if s.is_empty()))),
            And => logical(values, true),
            Or => logical(values, false),
            Not => Ok(EvalResult::Boolean(!truthy(&values[0])?)),
            Abs => Ok(EvalResult::Number(num(0)?.abs())),
            Int => Ok(EvalResult::Number(num(0)?.floor())),
            Sign => {
                let n = num(0)?;
                Ok(EvalResult::Number(if n == 0.0 { 0.0 } else { n.signum() }))
            }
            Sqrt => match num(0)? {
                n if n < 0.0 => Err(CellError::Num),
                n => Ok(EvalResult::Number(n.sqrt())),
            },
            Round => {
                let n = num(0)?;
                let digits = if values.len() > 1 { num(1)? as i32 } else { 0 };
                let scale = 10_f64.powi(digits);
                Ok(EvalResult::Number((n * scale).round() / scale))
            }
            Mod => {
                let (n, d) = (num(0)?, num(1)?);
                if d == 0.0 {
                    return Err(CellError::Div0);
                }
                // sign follows the divisor
                Ok(EvalResult::Number(n - d * (n / d).floor()))
            }
            Power => finite(num(0)?.powf(num(1)?)),
            If | IfError => Err(CellError::Value),
        }
    }
}

/// Numeric arguments of an aggregate. Text is skipped, booleans count as
/// 0/1, and the first error wins.
fn numbers(values: &[EvalResult]) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            EvalResult::Error(e) => return Err(*e),
            EvalResult::Text(_) => {}
            other => out.extend(other.as_number()),
        }
    }
    Ok(out)
}

/// MIN/MAX; zero when there is nothing numeric.
fn extreme(values: &[EvalResult], pick: fn(f64, f64) -> f64) -> Result<f64, CellError> {
    Ok(numbers(values)?.into_iter().reduce(pick).unwrap_or(0.0))
}

fn count(values: &[EvalResult], counted: impl Fn(&EvalResult) -> bool) -> EvalResult {
    EvalResult::Number(values.iter().filter(|&v| counted(v)).count() as f64)
}

/// AND (`identity` true) or OR (`identity` false). Stops at the first
/// argument that decides the result.
fn logical(values: &[EvalResult], identity: bool) -> Outcome {
    for value in values {
        if truthy(value)? != identity {
            return Ok(EvalResult::Boolean(!identity));
        }
    }
    Ok(EvalResult::Boolean(identity))
}
