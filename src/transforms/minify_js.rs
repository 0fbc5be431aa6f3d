// src/transforms/minify_js.rs

//! Whitespace and comment stripping for JavaScript.
//!
//! The source is split into tokens and printed back with the least
//! whitespace that keeps every token boundary. A line break between two
//! tokens survives when automatic semicolon insertion could depend on it.
//! Names are never rewritten. `/*! ... */` comments (licences) are kept.
//!
//! Printing the tokens of minified output yields the same output, which is
//! what makes the step idempotent.

use anyhow::Result;

use crate::pipeline::{Asset, MappedWriter, Position, SourceMap};
use crate::transforms::{StepOutput, Transform};

#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyJsStep;

impl Transform for MinifyJsStep {
    fn name(&self) -> &str {
        "minify-js"
    }

    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>> {
        let text = asset.text()?;
        let (js, map) = minify_js(asset.file_name(), text)?;
        Ok(Some(StepOutput::text(js, map)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Number,
    String,
    Template,
    Regex,
    Punct,
    KeptComment,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    kind: Kind,
    text: &'a str,
    pos: Position,
    /// A line break separated this token from the previous one.
    newline_before: bool,
}

/// Punctuators longer than one char, longest first.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>",
];

/// Keywords after which a `/` starts a regular expression.
const REGEX_PRECEDING_WORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

/// Minify `text`, returning the code and a map back to `text`.
pub fn minify_js(name: &str, text: &str) -> Result<(String, SourceMap)> {
    let tokens = tokenize(text)?;
    let mut writer = MappedWriter::new(name);
    let mut prev: Option<&Token> = None;

    for token in tokens.iter() {
        if let Some(p) = prev {
            if token.kind == Kind::KeptComment || p.kind == Kind::KeptComment {
                writer.push_generated("\n");
            } else if token.newline_before && ends_statement(p) && starts_statement(token) {
                writer.push_generated("\n");
            } else if needs_space(p, token) {
                writer.push_generated(" ");
            }
        }
        writer.push_from(token.text, 0, token.pos);
        prev = Some(token);
    }

    Ok(writer.finish())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\\'
}

fn ends_statement(token: &Token) -> bool {
    match token.kind {
        Kind::Word | Kind::Number | Kind::String | Kind::Template | Kind::Regex => true,
        Kind::Punct => matches!(token.text, ")" | "]" | "}" | "++" | "--"),
        Kind::KeptComment => false,
    }
}

fn starts_statement(token: &Token) -> bool {
    match token.kind {
        Kind::Word | Kind::Number | Kind::String | Kind::Template | Kind::Regex => true,
        Kind::Punct => matches!(
            token.text,
            "(" | "[" | "{" | "+" | "-" | "!" | "~" | "++" | "--" | "/" | "..."
        ),
        Kind::KeptComment => false,
    }
}

fn needs_space(prev: &Token, next: &Token) -> bool {
    let (Some(last), Some(first)) = (prev.text.chars().next_back(), next.text.chars().next()) else {
        return false;
    };

    if is_word_char(last) && is_word_char(first) {
        return true;
    }
    // A word right after a regex would read as its flags.
    if prev.kind == Kind::Regex && is_word_char(first) {
        return true;
    }
    // `1 .toString()` must not become a decimal.
    if prev.kind == Kind::Number && first == '.' {
        return true;
    }
    if prev.kind == Kind::Punct && next.kind == Kind::Punct {
        let joined = format!("{}{}", prev.text, next.text);
        return longest_punctuator(&joined) > prev.text.len();
    }
    // `a / /re/` and `x / *y` style collisions that would open a comment.
    if last == '/' && (first == '/' || first == '*') {
        return true;
    }
    // `a < !--b` would read as an HTML comment opener.
    if last == '<' && next.text.starts_with("!--") {
        return true;
    }
    false
}

fn longest_punctuator(s: &str) -> usize {
    PUNCTUATORS
        .iter()
        .filter(|p| s.starts_with(*p))
        .map(|p| p.len())
        .max()
        .unwrap_or(1)
}

struct Lexer<'a> {
    text: &'a str,
    offset: usize,
    pos: Position,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.pos = Position::new(self.pos.line + 1, 0);
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    fn bump_n(&mut self, bytes: usize) {
        let end = self.offset + bytes;
        while self.offset < end {
            self.bump();
        }
    }

    fn error(&self, msg: &str) -> anyhow::Error {
        anyhow::anyhow!("{msg} at line {}, column {}", self.pos.line + 1, self.pos.column + 1)
    }

    /// Consume a quoted string body up to the closing `quote`.
    fn quoted(&mut self, quote: char) -> Result<()> {
        self.bump();
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some('\n') if quote != '`' => return Err(self.error("unterminated string")),
                Some(_) => {}
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    /// Consume a template literal, including nested `${ ... }` code.
    fn template(&mut self) -> Result<()> {
        self.bump();
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('`') => return Ok(()),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    self.template_expression()?;
                }
                Some(_) => {}
                None => return Err(self.error("unterminated template literal")),
            }
        }
    }

    fn template_expression(&mut self) -> Result<()> {
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '\'' | '"' => self.quoted(c)?,
                '`' => self.template()?,
                '{' => {
                    depth += 1;
                    self.bump();
                }
                '}' => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
        Err(self.error("unterminated template expression"))
    }

    fn regex(&mut self) -> Result<()> {
        self.bump();
        let mut in_class = false;
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some('\n') | None => return Err(self.error("unterminated regular expression")),
                Some(_) => {}
            }
        }
        while self.peek().is_some_and(is_word_char) {
            self.bump();
        }
        Ok(())
    }

    fn number(&mut self) {
        let start = self.offset;
        let mut prev = '\0';
        while let Some(c) = self.peek() {
            let literal = &self.text[start..self.offset];
            let hex = literal.starts_with("0x") || literal.starts_with("0X");
            let exponent_sign = matches!(c, '+' | '-') && matches!(prev, 'e' | 'E') && !hex;
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                prev = c;
                self.bump();
            } else {
                break;
            }
        }
    }
}

fn regex_allowed(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(t) => match t.kind {
            Kind::Word => REGEX_PRECEDING_WORDS.contains(&t.text),
            Kind::Punct => !matches!(t.text, ")" | "]" | "}"),
            Kind::KeptComment => true,
            _ => false,
        },
    }
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>> {
    let mut lx = Lexer {
        text,
        offset: 0,
        pos: Position::default(),
    };
    let mut tokens: Vec<Token> = Vec::new();
    let mut newline = false;

    while let Some(c) = lx.peek() {
        if c.is_whitespace() {
            newline |= matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}');
            lx.bump();
            continue;
        }

        let rest = lx.rest();
        if rest.starts_with("//") {
            while lx.peek().is_some_and(|c| c != '\n') {
                lx.bump();
            }
            continue;
        }
        if rest.starts_with("/*") {
            let start = lx.offset;
            let pos = lx.pos;
            let end = rest[2..]
                .find("*/")
                .ok_or_else(|| lx.error("unterminated comment"))?;
            let body = &rest[..end + 4];
            newline |= body.contains('\n');
            lx.bump_n(end + 4);
            if body.starts_with("/*!") {
                tokens.push(Token {
                    kind: Kind::KeptComment,
                    text: &text[start..lx.offset],
                    pos,
                    newline_before: newline,
                });
                newline = false;
            }
            continue;
        }

        let start = lx.offset;
        let pos = lx.pos;
        let kind = match c {
            '\'' | '"' => {
                lx.quoted(c)?;
                Kind::String
            }
            '`' => {
                lx.template()?;
                Kind::Template
            }
            '/' if regex_allowed(tokens.last()) => {
                lx.regex()?;
                Kind::Regex
            }
            c if c.is_ascii_digit() => {
                lx.number();
                Kind::Number
            }
            '.' if rest[1..].starts_with(|d: char| d.is_ascii_digit()) => {
                lx.number();
                Kind::Number
            }
            c if is_word_char(c) || c == '#' => {
                lx.bump();
                while lx.peek().is_some_and(is_word_char) {
                    lx.bump();
                }
                Kind::Word
            }
            _ => {
                let mut len = longest_punctuator(rest);
                // `a?.5:b` is a conditional, not optional chaining.
                if rest.starts_with("?.") && rest[2..].starts_with(|d: char| d.is_ascii_digit()) {
                    len = 1;
                }
                if len == 1 {
                    lx.bump();
                } else {
                    lx.bump_n(len);
                }
                Kind::Punct
            }
        };

        tokens.push(Token {
            kind,
            text: &text[start..lx.offset],
            pos,
            newline_before: newline,
        });
        newline = false;
    }

    Ok(tokens)
}
