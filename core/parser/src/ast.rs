//! FILENAME: core/parser/src/ast.rs
//! Expression tree produced by the parser and walked by the evaluator.

use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Literal(Value),

    /// A named value. Bare identifiers arrive upper-cased; quoted
    /// identifiers keep their original spelling.
    Name(String),

    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    FunctionCall { name: String, args: Vec<Expression> },
}

impl Expression {
    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn number(n: f64) -> Self {
        Expression::Literal(Value::Number(n))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Concat,
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl BinaryOperator {
    /// Left and right binding power. Comparison binds loosest, then `&`,
    /// then `+ -`, then `* /`. Power binds tighter than unary minus. Every
    /// level associates to the left, `^` included (`2^3^2` is 64).
    pub fn binding_power(self) -> (u8, u8) {
        use BinaryOperator::*;
        match self {
            Equal | NotEqual | LessThan | GreaterThan | LessEqual | GreaterEqual => (1, 2),
            Concat => (3, 4),
            Add | Subtract => (5, 6),
            Multiply | Divide => (7, 8),
            Power => (10, 11),
        }
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Equal => "=",
            NotEqual => "<>",
            LessThan => "<",
            GreaterThan => ">",
            LessEqual => "<=",
            GreaterEqual => ">=",
            Concat => "&",
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Power => "^",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    /// Prefix `-`.
    Negate,
    /// Postfix `%`, divides by 100.
    Percent,
}

/// Binding power of prefix minus: above `* /`, below `^`.
pub const NEGATE_BINDING_POWER: u8 = 9;

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Percent => "%",
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
        }
    }
}
