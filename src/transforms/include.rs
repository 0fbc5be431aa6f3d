// src/transforms/include.rs

//! HTML include step.
//!
//! `@@include('header.html', {"title": "Home"})` is replaced by the processed
//! contents of the named file; `@@name` and `@@user.name` are replaced by
//! values from the context. The JSON argument of an include is merged over
//! the current context for the included file only. Unknown variables are
//! left untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;

use crate::fs::FileSystem;
use crate::pipeline::{Asset, MappedWriter, Position, SourceMap};
use crate::transforms::{StepOutput, Transform, source_name};

/// Includes nested deeper than this are treated as a loop.
pub const MAX_INCLUDE_DEPTH: usize = 10;

/// Where include paths are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Basepath {
    /// Relative to the including file.
    File,
    /// Relative to a fixed directory.
    Dir(PathBuf),
}

#[derive(Debug)]
pub struct IncludeStep {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    prefix: String,
    basepath: Basepath,
    context: Value,
}

impl IncludeStep {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        basepath: Basepath,
        context: Value,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            prefix: prefix.into(),
            basepath,
            context,
        }
    }

    fn expand(&self, text: &str, file: &Path, context: &Value, depth: usize) -> Result<(String, SourceMap)> {
        let mut writer = MappedWriter::new(source_name(&self.root, file));
        let include_token = format!("{}include(", self.prefix);

        let mut cursor = Cursor::default();
        while let Some(found) = text[cursor.offset..].find(&self.prefix) {
            let start = cursor.offset + found;
            writer.push_from(&text[cursor.offset..start], 0, cursor.pos);
            cursor.advance_to(text, start);

            let rest = &text[start..];
            if rest.starts_with(&include_token) {
                let call = parse_include(&rest[include_token.len()..])
                    .with_context(|| format!("malformed include at {}:{}", file.display(), cursor.pos.line + 1))?;

                if depth + 1 > MAX_INCLUDE_DEPTH {
                    bail!(
                        "includes nested deeper than {MAX_INCLUDE_DEPTH} levels (at {})",
                        call.path
                    );
                }

                let target = self.resolve(file, &call.path);
                let contents = self
                    .fs
                    .read_to_string(&target)
                    .with_context(|| format!("cannot include '{}'", call.path))?;
                let child_context = merge(context, call.context.as_ref());
                let (child_text, child_map) = self.expand(&contents, &target, &child_context, depth + 1)?;

                writer.push_mapped(&child_text, &child_map);
                cursor.advance_to(text, start + include_token.len() + call.consumed);
                continue;
            }

            let name_len = rest[self.prefix.len()..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'))
                .unwrap_or(rest.len() - self.prefix.len());
            let name = rest[self.prefix.len()..self.prefix.len() + name_len].trim_end_matches('.');

            match lookup(context, name) {
                Some(value) if !name.is_empty() => {
                    writer.push_replacement(&value, 0, cursor.pos);
                    cursor.advance_to(text, start + self.prefix.len() + name.len());
                }
                _ => {
                    writer.push_from(&self.prefix, 0, cursor.pos);
                    cursor.advance_to(text, start + self.prefix.len());
                }
            }
        }
        writer.push_from(&text[cursor.offset..], 0, cursor.pos);

        Ok(writer.finish())
    }

    fn resolve(&self, including: &Path, target: &str) -> PathBuf {
        match &self.basepath {
            Basepath::File => including
                .parent()
                .map(|dir| dir.join(target))
                .unwrap_or_else(|| PathBuf::from(target)),
            Basepath::Dir(dir) => dir.join(target),
        }
    }
}

impl Transform for IncludeStep {
    fn name(&self) -> &str {
        "include"
    }

    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>> {
        let text = asset.text()?;
        let (out, map) = self.expand(text, &asset.source, &self.context, 0)?;
        Ok(Some(StepOutput::text(out, map)))
    }
}

/// Byte offset into the text being scanned plus its line/column.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    offset: usize,
    pos: Position,
}

impl Cursor {
    fn advance_to(&mut self, text: &str, offset: usize) {
        for ch in text[self.offset..offset].chars() {
            if ch == '\n' {
                self.pos = Position::new(self.pos.line + 1, 0);
            } else {
                self.pos.column += 1;
            }
        }
        self.offset = offset;
    }
}

#[derive(Debug, PartialEq)]
struct IncludeCall {
    path: String,
    context: Option<Value>,
    /// Bytes consumed after the opening parenthesis, including the closing one.
    consumed: usize,
}

/// Parse `'path', {json})` (the part after `include(`).
fn parse_include(args: &str) -> Result<IncludeCall> {
    let mut i = skip_ws(args, 0);
    let quote = args[i..]
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| anyhow!("expected a quoted path"))?;
    i += 1;
    let end = args[i..]
        .find(quote)
        .ok_or_else(|| anyhow!("unterminated path string"))?;
    let path = args[i..i + end].to_string();
    i = skip_ws(args, i + end + 1);

    let mut context = None;
    if args[i..].starts_with(',') {
        i = skip_ws(args, i + 1);
        let len = json_object_len(&args[i..]).ok_or_else(|| anyhow!("expected a JSON object"))?;
        let value: Value = serde_json::from_str(&args[i..i + len]).context("invalid include context")?;
        context = Some(value);
        i = skip_ws(args, i + len);
    }

    if !args[i..].starts_with(')') {
        bail!("expected ')'");
    }

    Ok(IncludeCall {
        path,
        context,
        consumed: i + 1,
    })
}

fn skip_ws(s: &str, from: usize) -> usize {
    from + s[from..].len() - s[from..].trim_start().len()
}

/// Length of the balanced `{...}` at the start of `s`, honouring strings.
fn json_object_len(s: &str) -> Option<usize> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn merge(base: &Value, overlay: Option<&Value>) -> Value {
    match (base, overlay) {
        (Value::Object(base), Some(Value::Object(overlay))) => {
            let mut merged = base.clone();
            for (k, v) in overlay.iter() {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (Value::Null, Some(overlay)) => overlay.clone(),
        _ => base.clone(),
    }
}

/// Resolve a dotted name such as `user.name` to display text.
fn lookup(context: &Value, name: &str) -> Option<String> {
    let mut value = context;
    for part in name.split('.') {
        value = value.get(part)?;
    }
    Some(match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

