//! FILENAME: core/parser/src/lib.rs
//! Formula language for pivot calculated fields.
//!
//! `Lexer` turns text into `Token`s, `parse` turns text into an
//! `Expression`. Operators, loosest first: comparison (`= <> < > <= >=`),
//! `&`, `+ -`, `* /`, prefix `-`, `^`, postfix `%`. Names are bare
//! (`Total`) or quoted (`'Wholesale Price'`); calls look like `SUM(a, b)`.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;


pub use ast::{BinaryOperator, Expression, UnaryOperator, Value};
pub use lexer::{is_valid_identifier, Lexer};
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use token::{tokens_to_formula, Token};
