//! FILENAME: core/parser/src/lexer.rs
//! PURPOSE: Splits formula text into tokens.
//! CONTEXT: The lexer keeps a byte offset into the source and slices
//! numbers and identifiers straight out of it. Quoted text ('name' and
//! "string") unescapes doubled quotes. An unterminated quote runs to the
//! end of the input rather than failing; the parser reports what follows.

use crate::token::Token;

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    /// Lexes all of `src`. The returned tokens do not include `EOF`.
    pub fn tokenize(src: &'a str) -> Vec<Token> {
        Lexer::new(src).collect()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Consumes `ch` if it is next.
    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    /// Advances while `pred` holds and returns the consumed slice.
    fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .char_indices()
            .find(|&(_, ch)| !pred(ch))
            .map_or(self.rest().len(), |(i, _)| i);
        self.pos += len;
        &self.src[start..self.pos]
    }

    pub fn next_token(&mut self) -> Token {
        self.take_while(char::is_whitespace);

        let start = self.pos;
        let Some(ch) = self.bump() else {
            return Token::EOF;
        };

        match ch {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Asterisk,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '&' => Token::Ampersand,
            '%' => Token::Percent,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '=' => Token::Equals,
            '<' if self.eat('=') => Token::LessEqual,
            '<' if self.eat('>') => Token::NotEqual,
            '<' => Token::LessThan,
            '>' if self.eat('=') => Token::GreaterEqual,
            '>' => Token::GreaterThan,
            '"' => Token::String(self.quoted('"')),
            '\'' => Token::QuotedIdentifier(self.quoted('\'')),
            c if c.is_ascii_digit() || c == '.' => {
                self.pos = start;
                self.number()
            }
            c if starts_identifier(c) => {
                self.take_while(continues_identifier);
                keyword_or_identifier(&self.src[start..self.pos])
            }
            c => Token::Illegal(c),
        }
    }

    /// Body of a quoted run; the opening quote is already consumed.
    fn quoted(&mut self, quote: char) -> String {
        let mut text = String::new();
        loop {
            text.push_str(self.take_while(|c| c != quote));
            if self.bump().is_none() || !self.eat(quote) {
                return text;
            }
            text.push(quote);
        }
    }

    fn number(&mut self) -> Token {
        let start = self.pos;
        let mut seen_dot = false;
        self.take_while(|c| match c {
            '.' if !seen_dot => {
                seen_dot = true;
                true
            }
            c => c.is_ascii_digit(),
        });
        self.exponent();
        self.src[start..self.pos]
            .parse::<f64>()
            .map(Token::Number)
            .unwrap_or(Token::Illegal('.'))
    }

    /// Consumes `e[+-]digits` after a mantissa. Without a digit the `e`
    /// is left for the identifier that follows.
    fn exponent(&mut self) {
        let rest = self.rest().as_bytes();
        if !matches!(rest.first(), Some(b'e' | b'E')) {
            return;
        }
        let sign = usize::from(matches!(rest.get(1), Some(b'+' | b'-')));
        if rest.get(1 + sign).is_some_and(u8::is_ascii_digit) {
            self.pos += 1 + sign;
            self.take_while(|c| c.is_ascii_digit());
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::EOF => None,
            token => Some(token),
        }
    }
}

fn keyword_or_identifier(word: &str) -> Token {
    let upper = word.to_uppercase();
    match upper.as_str() {
        "TRUE" => Token::Boolean(true),
        "FALSE" => Token::Boolean(false),
        _ => Token::Identifier(upper),
    }
}

/// Letters, `_`, and `\` (as in `\TaxRate`) start a name.
fn starts_identifier(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '\\'
}

/// Digits and `.` may follow the first character ("Q1.Sales").
fn continues_identifier(ch: char) -> bool {
    starts_identifier(ch) || ch.is_ascii_digit() || ch == '.'
}

/// Returns true if `name` lexes as a single bare identifier.
/// Anything else must be quoted or swapped for a substitute name before it
/// can appear unquoted in a formula.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let head_ok = chars.next().is_some_and(starts_identifier);
    head_ok
        && chars.all(continues_identifier)
        && !matches!(keyword_or_identifier(name), Token::Boolean(_))
}
