//! FILENAME: core/parser/src/token.rs
//! Token vocabulary shared by the lexer, the parser, and the pivot engine's
//! formula rewriting. `Display` prints a token the way it must be re-lexed,
//! so a rewritten stream can be turned back into formula text.

use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Number(f64),
    String(String),
    Boolean(bool),
    /// Bare word, upper-cased by the lexer.
    Identifier(String),
    /// `'...'` name, spelling preserved.
    QuotedIdentifier(String),

    Plus,
    Minus,
    Asterisk,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Equals,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    LParen,
    RParen,
    Comma,

    EOF,
    Illegal(char),
}

impl Token {
    pub fn is_name(&self) -> bool {
        self.name().is_some()
    }

    /// Returns the referenced name for identifier tokens.
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::Identifier(s) | Token::QuotedIdentifier(s) => Some(s),
            _ => None,
        }
    }

    /// Fixed spelling of punctuation and operator tokens.
    pub fn symbol(&self) -> Option<&'static str> {
        let text = match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Asterisk => "*",
            Token::Slash => "/",
            Token::Caret => "^",
            Token::Ampersand => "&",
            Token::Percent => "%",
            Token::Equals => "=",
            Token::NotEqual => "<>",
            Token::LessThan => "<",
            Token::GreaterThan => ">",
            Token::LessEqual => "<=",
            Token::GreaterEqual => ">=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            _ => return None,
        };
        Some(text)
    }
}

/// Wraps `text` in `quote`, doubling any embedded quote characters.
fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str, quote: char) -> fmt::Result {
    let doubled: String = [quote, quote].iter().collect();
    write!(f, "{quote}{}{quote}", text.replace(quote, &doubled))
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(symbol) = self.symbol() {
            return f.write_str(symbol);
        }
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::String(s) => write_quoted(f, s, '"'),
            Token::Boolean(true) => f.write_str("TRUE"),
            Token::Boolean(false) => f.write_str("FALSE"),
            Token::Identifier(s) => f.write_str(s),
            Token::QuotedIdentifier(s) => write_quoted(f, s, '\''),
            Token::EOF => f.write_str("end of formula"),
            Token::Illegal(c) => write!(f, "illegal character '{c}'"),
            _ => Ok(()),
        }
    }
}

/// Joins a token stream back into formula text. Stops at `EOF`.
pub fn tokens_to_formula(tokens: &[Token]) -> String {
    tokens
        .iter()
        .take_while(|t| **t != Token::EOF)
        .map(Token::to_string)
        .collect()
}
