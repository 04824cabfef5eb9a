//! Lexical analysis for the shell: quoting, `$` expansion and leading assignments.
//!
//! The lexer produces fully expanded words; the session table is only
//! touched here, before any stage starts.

use crate::env::Environment;
use std::fmt;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word after quote removal and expansion. May be empty (`''`).
    Word(String),
    /// The pipe operator, `|`.
    Pipe,
    /// The conditional operator, `&&`.
    AndIf,
}

impl Token {
    /// Shorthand used heavily by tests and the resolver.
    pub fn word(s: impl Into<String>) -> Self {
        Token::Word(s.into())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Pipe => f.write_str("|"),
            Token::AndIf => f.write_str("&&"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Unquoted,
    SingleQuote,
    DoubleQuote,
}

struct LexingFSM<'a> {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current: String,
    /// A quote was opened inside the current word, so it exists even if empty.
    touched: bool,
    env: &'a Environment,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &str, env: &'a Environment) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Unquoted,
            current: String::new(),
            touched: false,
            env,
        }
    }

    fn make_tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Unquoted => self.handle_unquoted(ch, &mut out),
                LexingState::SingleQuote => self.handle_single_quote(ch),
                LexingState::DoubleQuote => self.handle_double_quote(ch),
            }
        }

        if self.state != LexingState::Unquoted {
            log::warn!("unterminated quote, keeping {:?} as the last word", self.current);
        }
        self.finish_word(&mut out);
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if !self.current.is_empty() || self.touched {
            out.push(Token::Word(std::mem::take(&mut self.current)));
        }
        self.touched = false;
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            c if c.is_whitespace() => self.finish_word(out),
            '\'' => {
                self.touched = true;
                self.state = LexingState::SingleQuote;
            }
            '"' => {
                self.touched = true;
                self.state = LexingState::DoubleQuote;
            }
            '|' => {
                self.finish_word(out);
                out.push(Token::Pipe);
            }
            '&' if self.peek_char() == Some('&') => {
                self.read_char();
                self.finish_word(out);
                out.push(Token::AndIf);
            }
            '$' => self.expand(),
            c => self.current.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::Unquoted,
            c => self.current.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::Unquoted,
            '$' => self.expand(),
            c => self.current.push(c),
        }
    }

    /// Handle the text after a `$`: `${NAME}`, `$NAME`, or a literal dollar.
    fn expand(&mut self) {
        let name = match self.peek_char() {
            Some('{') => {
                self.read_char();
                let mut name = String::new();
                while let Some(c) = self.read_char() {
                    if c == '}' {
                        break;
                    }
                    name.push(c);
                }
                name
            }
            Some(c) if is_name_char(c) => {
                let mut name = String::new();
                while let Some(c) = self.peek_char().filter(|&c| is_name_char(c)) {
                    name.push(c);
                    self.pos += 1;
                }
                name
            }
            _ => {
                self.current.push('$');
                return;
            }
        };

        if let Some(value) = self.env.get_var(&name) {
            self.current.push_str(&value);
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split `word` into a `(name, value)` pair if it is a valid `NAME=VALUE`.
fn parse_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    if name.is_empty() || !name.chars().all(is_name_char) {
        return None;
    }
    Some((name, value))
}

/// Consume leading `NAME=VALUE` words into `env`, returning the byte offset
/// where the command proper starts.
///
/// Values are taken raw up to the next whitespace; no quote removal or
/// expansion is applied to them.
fn extract_assignments(line: &str, env: &mut Environment) -> usize {
    let mut pos = 0;
    loop {
        let rest = &line[pos..];
        let start = pos + (rest.len() - rest.trim_start().len());
        let word_len = line[start..]
            .find(char::is_whitespace)
            .unwrap_or(line.len() - start);
        let word = &line[start..start + word_len];

        match parse_assignment(word) {
            Some((name, value)) => {
                log::debug!("assignment {}={:?}", name, value);
                env.set_var(name, value);
                pos = start + word_len;
            }
            None => return start,
        }
    }
}

/// The main entry point to perform lexical analysis.
///
/// Leading assignments are stored in `env` and removed from the result; every
/// `$NAME`/`${NAME}` outside single quotes is replaced by its value from `env`
/// (session table first, then the process environment), or by nothing when it
/// is unset. Unquoted `|` and `&&` become operator tokens.
///
/// Malformed input never fails: an unterminated quote simply ends the last word.
pub fn tokenize(line: &str, env: &mut Environment) -> Vec<Token> {
    let start = extract_assignments(line, env);
    let tokens = LexingFSM::new(&line[start..], env).make_tokens();
    log::debug!("tokens: {:?}", tokens);
    tokens
}
