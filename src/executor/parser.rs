//! Action-line parser.
//!
//! Accepts exactly one `do(key=value, ...)` or `finish(key=value, ...)` call whose
//! values are string literals, `[x, y]` / `(x, y)` number pairs, bare numbers or
//! `None`. Nothing else is evaluated. [`parse_action`] never fails: every error
//! degrades to a `Wait` action whose `message` explains what went wrong.
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::agent_engine::state::{Action, ParamValue};

const TRAILING_PUNCTUATION: [char; 4] = ['。', '.', '!', '！'];

#[derive(Debug, Clone, PartialEq)]
enum ParseError {
    Syntax(String),
    /// Unknown constructor or bare identifier used as a value.
    UnknownName(String),
    Positional,
    DuplicateKeyword(String),
}

impl ParseError {
    fn is_syntax_or_name(&self) -> bool {
        matches!(self, ParseError::Syntax(_) | ParseError::UnknownName(_))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax(msg) => write!(f, "invalid syntax: {msg}"),
            ParseError::UnknownName(name) => write!(f, "name '{name}' is not defined"),
            ParseError::Positional => f.write_str("positional arguments are not accepted"),
            ParseError::DuplicateKeyword(key) => write!(f, "keyword argument repeated: {key}"),
        }
    }
}

/// Decode one model action line into an [`Action`].
pub fn parse_action(raw: &str) -> Action {
    let text = raw.trim();
    if text.is_empty() {
        tracing::warn!("empty action line, degrading to Wait");
        return Action::wait("1 seconds", "No action received, waiting for next turn.");
    }

    let text = strip_terminal_punctuation(text);
    let text = first_call(text);

    if text.starts_with("do") {
        match parse_call(text) {
            Ok(action) => action,
            Err(e) if e.is_syntax_or_name() => {
                tracing::warn!(error = %e, raw = %text, "malformed do action, degrading to Wait");
                Action::wait("1 seconds", format!("Malformed do action: {text}"))
            }
            Err(e) => {
                tracing::warn!(error = %e, raw = %text, "action parse error, degrading to Wait");
                Action::wait("2 seconds", format!("Parse error: {e}"))
            }
        }
    } else if text.starts_with("finish") {
        match parse_call(text) {
            Ok(action) => action,
            Err(e) => {
                tracing::debug!(error = %e, raw = %text, "finish call not well-formed, extracting message text");
                finish_from_text(text)
            }
        }
    } else {
        tracing::warn!(raw = %text, "unrecognized action format, degrading to Wait");
        Action::wait("2 seconds", format!("Unrecognized format: {text}"))
    }
}

fn strip_terminal_punctuation(text: &str) -> &str {
    match text.strip_suffix(TRAILING_PUNCTUATION) {
        Some(rest) => rest.trim_end(),
        None => text,
    }
}

/// Cut `text` after the parenthesis closing the leading `do(` / `finish(`.
/// Parentheses inside string literals are ignored.
fn first_call(text: &str) -> &str {
    if !(text.starts_with("do(") || text.starts_with("finish(")) {
        return text;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[..idx + c.len_utf8()];
                }
            }
            _ => {}
        }
    }
    text
}

/// Textual fallback for a `finish(...)` line that does not parse.
fn finish_from_text(text: &str) -> Action {
    // Only a `finish(` wrapper is stripped; `finishing ...` stays as written.
    let body = match text.strip_prefix("finish(") {
        Some(inner) => {
            let inner = inner.strip_suffix(')').unwrap_or(inner).trim();
            match inner.strip_prefix("message") {
                Some(rest) if rest.trim_start().starts_with('=') => rest.trim_start()[1..].trim_start(),
                _ => inner,
            }
        }
        None => text,
    };
    let message = body.trim_matches(|c| c == '"' || c == '\'').trim();
    Action::Finish {
        message: (!message.is_empty()).then(|| message.to_string()),
    }
}

// ── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    /// Parsed value plus the literal text.
    Num(f64, String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(&(start, c)) = self.chars.peek() {
            let token = match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                ',' => self.single(Token::Comma),
                '=' => self.single(Token::Eq),
                '"' | '\'' => self.string(c)?,
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(start)?,
                c if c.is_alphabetic() || c == '_' => self.ident(start),
                other => {
                    return Err(ParseError::Syntax(format!(
                        "unexpected character '{other}' at {start}"
                    )))
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn string(&mut self, quote: char) -> Result<Token, ParseError> {
        self.chars.next();
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, e @ ('\\' | '"' | '\''))) => out.push(e),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                c if c == quote => return Ok(Token::Str(out)),
                c => out.push(c),
            }
        }
        Err(ParseError::Syntax("unterminated string literal".into()))
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        let mut end = start;
        let mut first = true;
        while let Some(&(idx, c)) = self.chars.peek() {
            let sign = first && (c == '-' || c == '+');
            if !(sign || c.is_ascii_digit() || c == '.') {
                break;
            }
            first = false;
            end = idx + c.len_utf8();
            self.chars.next();
        }
        let literal = &self.src[start..end];
        literal
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Token::Num(v, literal.to_string()))
            .ok_or_else(|| ParseError::Syntax(format!("invalid number literal '{literal}'")))
    }

    fn ident(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            end = idx + c.len_utf8();
            self.chars.next();
        }
        Token::Ident(self.src[start..end].to_string())
    }
}

// ── Parser ──────────────────────────────────────────────────────────────────

enum Constructor {
    Do,
    Finish,
}

struct CallParser {
    tokens: Vec<Token>,
    pos: usize,
}

fn parse_call(text: &str) -> Result<Action, ParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    CallParser { tokens, pos: 0 }.call()
}

impl CallParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(ParseError::Syntax(format!("expected {what}, found {t:?}"))),
            None => Err(ParseError::Syntax(format!("expected {what}, found end of input"))),
        }
    }

    fn call(mut self) -> Result<Action, ParseError> {
        let constructor = match self.next() {
            Some(Token::Ident(name)) => match name.as_str() {
                "do" => Constructor::Do,
                "finish" => Constructor::Finish,
                _ => return Err(ParseError::UnknownName(name)),
            },
            _ => return Err(ParseError::Syntax("expected do(...) or finish(...)".into())),
        };
        self.expect(Token::LParen, "'('")?;
        let args = self.arguments()?;
        if let Some(extra) = self.peek() {
            return Err(ParseError::Syntax(format!(
                "unexpected {extra:?} after the closing ')'"
            )));
        }
        Ok(build_action(constructor, args))
    }

    /// Keyword arguments up to and including the closing `)`.
    fn arguments(&mut self) -> Result<BTreeMap<String, ParamValue>, ParseError> {
        let mut args = BTreeMap::new();
        let mut positional = false;
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.next();
                break;
            }
            let keyword = match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
                (Some(Token::Ident(key)), Some(Token::Eq)) => Some(key.clone()),
                _ => None,
            };
            if let Some(key) = keyword {
                self.pos += 2;
                let value = self.value()?;
                if args.insert(key.clone(), value).is_some() {
                    return Err(ParseError::DuplicateKeyword(key));
                }
            } else {
                self.value()?;
                positional = true;
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(t) => return Err(ParseError::Syntax(format!("expected ',' or ')', found {t:?}"))),
                None => return Err(ParseError::Syntax("unclosed '('".into())),
            }
        }
        if positional {
            return Err(ParseError::Positional);
        }
        Ok(args)
    }

    fn value(&mut self) -> Result<ParamValue, ParseError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(ParamValue::Text(s)),
            Some(Token::Num(_, literal)) => Ok(ParamValue::Text(literal)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(ParseError::Syntax(format!("nested call to '{name}'")));
                }
                if name == "None" {
                    Ok(ParamValue::Absent)
                } else {
                    Err(ParseError::UnknownName(name))
                }
            }
            Some(Token::LBracket) => self.pair(Token::RBracket),
            Some(Token::LParen) => self.pair(Token::RParen),
            Some(t) => Err(ParseError::Syntax(format!("unexpected {t:?} where a value was expected"))),
            None => Err(ParseError::Syntax("missing value".into())),
        }
    }

    fn pair(&mut self, close: Token) -> Result<ParamValue, ParseError> {
        let x = self.number()?;
        self.expect(Token::Comma, "','")?;
        let y = self.number()?;
        if self.peek() == Some(&Token::Comma) {
            self.next();
        }
        self.expect(close, "end of coordinate pair")?;
        Ok(ParamValue::Point(x, y))
    }

    fn number(&mut self) -> Result<f64, ParseError> {
        match self.next() {
            Some(Token::Num(v, _)) => Ok(v),
            Some(t) => Err(ParseError::Syntax(format!("coordinate must be a number, found {t:?}"))),
            None => Err(ParseError::Syntax("unterminated coordinate pair".into())),
        }
    }
}

fn build_action(constructor: Constructor, mut args: BTreeMap<String, ParamValue>) -> Action {
    match constructor {
        Constructor::Do => {
            let name = match args.remove("action") {
                Some(ParamValue::Text(name)) => name,
                _ => String::new(),
            };
            Action::Do { name, params: args }
        }
        Constructor::Finish => {
            let message = match args.remove("message") {
                Some(ParamValue::Text(m)) => Some(m),
                Some(point @ ParamValue::Point(..)) => Some(point.to_string()),
                Some(ParamValue::Absent) | None => None,
            };
            Action::Finish { message }
        }
    }
}
