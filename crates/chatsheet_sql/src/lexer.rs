//! SQL tokenizer.
//!
//! Produces identifiers, quoted identifiers, numbers, string literals,
//! parameters, operators and punctuation. Comments are dropped. String
//! forms DuckDB understands (`'..'`, `E'..'` with backslash escapes,
//! `$tag$..$tag$`) are all recognised so that no literal can hide tokens
//! from the validator.
//!
//! Block comments do not nest: anything after the first `*/` is tokenized.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword or unquoted identifier, original spelling.
    Word(String),
    /// `"..."` identifier, unescaped.
    QuotedIdent(String),
    Number(String),
    /// String literal contents, unescaped.
    Str(String),
    /// `?`, `$1`, `$name`
    Parameter(String),
    Operator(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semicolon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character in the source.
    pub offset: usize,
}

impl Token {
    /// Upper-cased text if this is a bare word.
    pub fn word_upper(&self) -> Option<String> {
        match &self.kind {
            TokenKind::Word(w) => Some(w.to_ascii_uppercase()),
            _ => None,
        }
    }

    pub fn is_word(&self, upper: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(upper))
    }

    pub fn is_operator(&self, op: &str) -> bool {
        matches!(&self.kind, TokenKind::Operator(o) if o == op)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "{}", w),
            TokenKind::QuotedIdent(w) => write!(f, "\"{}\"", w.replace('"', "\"\"")),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            TokenKind::Parameter(p) => write!(f, "{}", p),
            TokenKind::Operator(o) => write!(f, "{}", o),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Semicolon => f.write_str(";"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unterminated quoted identifier starting at offset {0}")]
    UnterminatedIdentifier(usize),

    #[error("unterminated block comment starting at offset {0}")]
    UnterminatedComment(usize),

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
}

const OPERATOR_CHARS: &str = "+-*/%<>=!|&^~@#:";

fn is_word_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            let offset = self.offset();

            if ch.is_whitespace() {
                self.bump();
                continue;
            }
            if ch == '-' && self.peek_at(1) == Some('-') {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            if ch == '/' && self.peek_at(1) == Some('*') {
                self.bump();
                self.bump();
                let mut closed = false;
                while let Some(c) = self.bump() {
                    if c == '*' && self.peek() == Some('/') {
                        self.bump();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(LexError::UnterminatedComment(offset));
                }
                continue;
            }

            let kind = match ch {
                '\'' => {
                    self.bump();
                    TokenKind::Str(self.quoted_body('\'', false, offset)?)
                }
                'e' | 'E' if self.peek_at(1) == Some('\'') => {
                    self.bump();
                    self.bump();
                    TokenKind::Str(self.quoted_body('\'', true, offset)?)
                }
                '"' => {
                    self.bump();
                    let body = self
                        .quoted_body('"', false, offset)
                        .map_err(|_| LexError::UnterminatedIdentifier(offset))?;
                    TokenKind::QuotedIdent(body)
                }
                '$' => self.dollar(offset)?,
                '?' => {
                    self.bump();
                    TokenKind::Parameter("?".to_string())
                }
                '(' => {
                    self.bump();
                    TokenKind::LParen
                }
                ')' => {
                    self.bump();
                    TokenKind::RParen
                }
                '[' => {
                    self.bump();
                    TokenKind::LBracket
                }
                ']' => {
                    self.bump();
                    TokenKind::RBracket
                }
                '{' => {
                    self.bump();
                    TokenKind::LBrace
                }
                '}' => {
                    self.bump();
                    TokenKind::RBrace
                }
                ',' => {
                    self.bump();
                    TokenKind::Comma
                }
                ';' => {
                    self.bump();
                    TokenKind::Semicolon
                }
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
                '.' => {
                    self.bump();
                    TokenKind::Dot
                }
                c if c.is_ascii_digit() => self.number(),
                c if is_word_start(c) => {
                    let mut word = String::new();
                    while let Some(c) = self.peek() {
                        if !is_word_char(c) {
                            break;
                        }
                        word.push(c);
                        self.bump();
                    }
                    TokenKind::Word(word)
                }
                c if OPERATOR_CHARS.contains(c) => {
                    let mut op = String::new();
                    while let Some(c) = self.peek() {
                        if !OPERATOR_CHARS.contains(c) {
                            break;
                        }
                        // A comment opener ends the operator.
                        if !op.is_empty()
                            && ((c == '-' && self.peek_at(1) == Some('-'))
                                || (c == '/' && self.peek_at(1) == Some('*')))
                        {
                            break;
                        }
                        op.push(c);
                        self.bump();
                    }
                    TokenKind::Operator(op)
                }
                other => {
                    return Err(LexError::UnexpectedChar { ch: other, offset });
                }
            };

            tokens.push(Token { kind, offset });
        }

        Ok(tokens)
    }

    /// Body of a quoted token; the opening quote is already consumed.
    /// A doubled quote is an escaped quote.
    fn quoted_body(
        &mut self,
        quote: char,
        backslash_escapes: bool,
        start: usize,
    ) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedString(start)),
                Some('\\') if backslash_escapes => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(LexError::UnterminatedString(start)),
                },
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// `$1` parameter or `$tag$ ... $tag$` string.
    fn dollar(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.bump();
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let mut param = String::from("$");
            while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                param.push(c);
                self.bump();
            }
            return Ok(TokenKind::Parameter(param));
        }

        let mut tag = String::new();
        while let Some(c) = self.peek() {
            if c == '$' {
                break;
            }
            if !(c.is_alphanumeric() || c == '_') {
                return Ok(TokenKind::Parameter(format!("${}", tag)));
            }
            tag.push(c);
            self.bump();
        }
        if self.peek() != Some('$') {
            return Ok(TokenKind::Parameter(format!("${}", tag)));
        }
        self.bump();

        let delimiter = format!("${}$", tag);
        let body_start = self.offset();
        match self.src[body_start..].find(&delimiter) {
            Some(rel) => {
                let body = self.src[body_start..body_start + rel].to_string();
                let end = body_start + rel + delimiter.len();
                while self.offset() < end {
                    self.bump();
                }
                Ok(TokenKind::Str(body))
            }
            None => Err(LexError::UnterminatedString(start)),
        }
    }

    fn number(&mut self) -> TokenKind {
        let mut text = String::new();
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.bump();
            } else if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                text.push(c);
                self.bump();
            } else if (c == 'e' || c == 'E') && !seen_exp && self.exponent_follows() {
                seen_exp = true;
                text.push(c);
                self.bump();
                if let Some(sign) = self.peek().filter(|s| *s == '+' || *s == '-') {
                    text.push(sign);
                    self.bump();
                }
            } else {
                break;
            }
        }
        TokenKind::Number(text)
    }

    /// After an `e`: digits, or a sign followed by digits.
    fn exponent_follows(&self) -> bool {
        match self.peek_at(1) {
            Some(d) if d.is_ascii_digit() => true,
            Some('+') | Some('-') => self.peek_at(2).is_some_and(|d| d.is_ascii_digit()),
            _ => false,
        }
    }
}

/// Tokenize `sql`, dropping comments.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(sql).run()
}
