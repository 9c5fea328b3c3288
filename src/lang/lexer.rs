//! Line tokenizer.
//!
//! Tokens are classified lazily: nothing past the current lookahead is ever examined, so a
//! malformed number at the end of a line is only reported once the parser actually reaches it.

use std::fmt;

use crate::lang::error::{CalcError, Result};

const OPERATORS: &str = "+-*/%^=";

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Identifier(String),
    Operator(char),
    Punctuation(char),
    EndOfInput,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Identifier(i) => write!(f, "identifier {}", i),
            Token::Operator(c) | Token::Punctuation(c) => write!(f, "'{}'", c),
            Token::EndOfInput => write!(f, "end of input"),
        }
    }
}

#[derive(Default)]
pub struct Tokenizer {
    line: Vec<char>,
    pos: usize,
    peeked: Option<Token>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current line and drop any lookahead
    pub fn reset(&mut self, line: &str) {
        self.line = line.chars().collect();
        self.pos = 0;
        self.peeked = None;
    }

    pub fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            let tok = self.lex()?;
            self.peeked = Some(tok);
        }

        Ok(self.peeked.get_or_insert(Token::EndOfInput))
    }

    pub fn next(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(tok) => Ok(tok),
            None => self.lex(),
        }
    }

    fn current(&self) -> Option<char> {
        self.line.get(self.pos).copied()
    }

    fn lex(&mut self) -> Result<Token> {
        while self.current().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }

        let c = match self.current() {
            Some(c) => c,
            None => return Ok(Token::EndOfInput),
        };

        if c.is_ascii_digit() || c == '.' {
            return self.lex_number();
        }

        if c.is_alphabetic() {
            let start = self.pos;
            while self.current().map_or(false, char::is_alphanumeric) {
                self.pos += 1;
            }
            return Ok(Token::Identifier(self.line[start..self.pos].iter().collect()));
        }

        self.pos += 1;
        if OPERATORS.contains(c) {
            Ok(Token::Operator(c))
        } else {
            Ok(Token::Punctuation(c))
        }
    }

    /// digits, at most one `.`, at most one `e` optionally followed directly by a sign
    fn lex_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut decimal = false;
        let mut exponent = false;

        while let Some(c) = self.current() {
            match c {
                '0'..='9' => (),
                '.' => {
                    if decimal || exponent {
                        return Err(self.malformed_number(start));
                    }
                    decimal = true;
                }
                'e' => {
                    if exponent {
                        return Err(self.malformed_number(start));
                    }
                    exponent = true;
                }
                '+' | '-' if self.pos > start && self.line[self.pos - 1] == 'e' => (),
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.line[start..self.pos].iter().collect();
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Token::Number(n)),
            _ => Err(CalcError::MalformedNumber(text)),
        }
    }

    fn malformed_number(&mut self, start: usize) -> CalcError {
        self.pos += 1;
        while self
            .current()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '.')
        {
            self.pos += 1;
        }

        CalcError::MalformedNumber(self.line[start..self.pos].iter().collect())
    }
}

#[cfg(test)]
fn tokenize(line: &str) -> Result<Vec<Token>> {
    let mut lex = Tokenizer::new();
    lex.reset(line);

    let mut toks = Vec::new();
    loop {
        match lex.next()? {
            Token::EndOfInput => break,
            tok => toks.push(tok),
        }
    }

    Ok(toks)
}

#[test]
fn test_number() {
    let data = vec![
        ("42", 42.0),
        ("42.0", 42.0),
        ("4.2e+1", 42.0),
        ("4.2e1", 42.0),
        ("420e-1", 42.0),
        (".5", 0.5),
        ("5.", 5.0),
        ("0.000001", 0.000001),
    ];

    for (input, expected) in data {
        assert_eq!(tokenize(input), Ok(vec![Token::Number(expected)]), "{}", input);
    }
}

#[test]
fn test_malformed_number() {
    let data = vec!["1.2.3", "1e2e3", "1e2.5", ".", "2e", "1e+", "1e999"];

    for input in data {
        match tokenize(input) {
            Err(CalcError::MalformedNumber(_)) => (),
            r => panic!("{} lexed as {:?}", input, r),
        }
    }
}

#[test]
fn test_sign_only_after_exponent() {
    assert_eq!(
        tokenize("1e5-3").unwrap(),
        vec![
            Token::Number(100000.0),
            Token::Operator('-'),
            Token::Number(3.0)
        ]
    );
    assert_eq!(
        tokenize("1+2").unwrap(),
        vec![Token::Number(1.0), Token::Operator('+'), Token::Number(2.0)]
    );
}

#[test]
fn test_identifiers_and_punctuation() {
    assert_eq!(
        tokenize("  foo2(x1, y) = bar ^ 2 ").unwrap(),
        vec![
            Token::Identifier("foo2".to_string()),
            Token::Punctuation('('),
            Token::Identifier("x1".to_string()),
            Token::Punctuation(','),
            Token::Identifier("y".to_string()),
            Token::Punctuation(')'),
            Token::Operator('='),
            Token::Identifier("bar".to_string()),
            Token::Operator('^'),
            Token::Number(2.0),
        ]
    );
    assert_eq!(
        tokenize("Ab_c").unwrap(),
        vec![
            Token::Identifier("Ab".to_string()),
            Token::Punctuation('_'),
            Token::Identifier("c".to_string()),
        ]
    );
}

#[test]
fn test_peek_is_lazy() {
    let mut lex = Tokenizer::new();
    lex.reset("x 1.2.3");
    assert_eq!(lex.peek(), Ok(&Token::Identifier("x".to_string())));
    assert_eq!(lex.next(), Ok(Token::Identifier("x".to_string())));
    assert!(lex.peek().is_err());

    lex.reset("   ");
    assert_eq!(lex.peek(), Ok(&Token::EndOfInput));
    assert_eq!(lex.next(), Ok(Token::EndOfInput));
    assert_eq!(lex.next(), Ok(Token::EndOfInput));
}
