//! FILENAME: core/parser/src/parser.rs
//! PURPOSE: Builds an `Expression` from formula text.
//! CONTEXT: The whole formula is lexed up front. Infix operators are then
//! folded by binding power (see `BinaryOperator::binding_power`); operands
//! are literals, names, calls, or parenthesized groups, each optionally
//! followed by one or more `%` signs. A leading `=` is optional.

use crate::ast::{BinaryOperator, Expression, UnaryOperator, Value, NEGATE_BINDING_POWER};
use crate::lexer::Lexer;
use crate::token::Token;

#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

static END: Token = Token::EOF;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Parser {
            tokens: Lexer::tokenize(input),
            pos: 0,
        }
    }

    pub fn parse(&mut self) -> ParseResult<Expression> {
        self.eat(&Token::Equals);
        if self.peek() == &Token::EOF {
            return Err(ParseError::new("Empty expression"));
        }

        let expr = self.expression(0)?;
        match self.peek() {
            Token::EOF => Ok(expr),
            extra => Err(ParseError::new(format!("unexpected {extra} after expression"))),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&END)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        let hit = self.peek() == token;
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expect(&mut self, token: &Token) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(ParseError::new(format!("expected {token} but found {}", self.peek())))
        }
    }

    /// Parses operators whose left binding power is at least `min_power`.
    fn expression(&mut self, min_power: u8) -> ParseResult<Expression> {
        let mut lhs = if self.eat(&Token::Minus) {
            let operand = self.expression(NEGATE_BINDING_POWER)?;
            Expression::unary(UnaryOperator::Negate, operand)
        } else {
            self.operand()?
        };

        while let Some(op) = infix_operator(self.peek()) {
            let (left_power, right_power) = op.binding_power();
            if left_power < min_power {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(right_power)?;
            lhs = Expression::binary(lhs, op, rhs);
        }

        Ok(lhs)
    }

    /// A primary term with any trailing percent signs applied.
    fn operand(&mut self) -> ParseResult<Expression> {
        let mut expr = self.primary()?;
        while self.eat(&Token::Percent) {
            expr = Expression::unary(UnaryOperator::Percent, expr);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        match self.advance() {
            Token::Number(n) => Ok(Expression::number(n)),
            Token::String(s) => Ok(Expression::Literal(Value::String(s))),
            Token::Boolean(b) => Ok(Expression::Literal(Value::Boolean(b))),
            Token::QuotedIdentifier(name) => Ok(Expression::Name(name)),
            Token::Identifier(name) if self.eat(&Token::LParen) => self.call(name),
            Token::Identifier(name) => Ok(Expression::Name(name)),
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::EOF => Err(ParseError::new("Unexpected end of expression")),
            other => Err(ParseError::new(format!("unexpected {other}"))),
        }
    }

    /// Argument list of `name(`; the parenthesis is already consumed.
    fn call(&mut self, name: String) -> ParseResult<Expression> {
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression(0)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(Expression::FunctionCall { name, args })
    }
}

fn infix_operator(token: &Token) -> Option<BinaryOperator> {
    let op = match token {
        Token::Equals => BinaryOperator::Equal,
        Token::NotEqual => BinaryOperator::NotEqual,
        Token::LessThan => BinaryOperator::LessThan,
        Token::GreaterThan => BinaryOperator::GreaterThan,
        Token::LessEqual => BinaryOperator::LessEqual,
        Token::GreaterEqual => BinaryOperator::GreaterEqual,
        Token::Ampersand => BinaryOperator::Concat,
        Token::Plus => BinaryOperator::Add,
        Token::Minus => BinaryOperator::Subtract,
        Token::Asterisk => BinaryOperator::Multiply,
        Token::Slash => BinaryOperator::Divide,
        Token::Caret => BinaryOperator::Power,
        _ => return None,
    };
    Some(op)
}

pub fn parse(input: &str) -> ParseResult<Expression> {
    Parser::new(input).parse()
}
