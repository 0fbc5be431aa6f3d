// src/transforms/sass.rs

//! SCSS compilation.
//!
//! Supported: nested rules with `&` and selector lists, variables (with
//! `!default`, `!global` and block scoping), `#{}` interpolation, `@import`
//! of partials, `@mixin`/`@include` with default and named arguments plus
//! `@content`, and `@media`/`@supports` bubbling out of style rules.
//! `@font-face`, `@keyframes` and `@page` blocks pass through.
//!
//! Values are substituted, not computed. A value that would need Sass to
//! compute it (arithmetic on variables or numbers, or a Sass built-in such
//! as `darken()` or `percentage()`) is an error rather than being emitted
//! verbatim. Arguments of CSS functions like `calc()` and `url()` are
//! passed through untouched. Control directives (`@if`, `@each`, `@for`,
//! `@while`, `@function`) and `@extend`, `@use`, `@forward` are rejected
//! with an error.
//!
//! Partials (`_name.scss`) produce no output file. Output is expanded CSS
//! with a source map covering every selector and declaration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};

use crate::fs::FileSystem;
use crate::pipeline::{Asset, MappedWriter, Position};
use crate::transforms::{StepOutput, Transform, source_name};

#[derive(Debug)]
pub struct SassStep {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    load_paths: Vec<PathBuf>,
}

impl SassStep {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>, load_paths: Vec<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            load_paths,
        }
    }

    /// Compile SCSS `text` read from `path`. Returns the CSS and its map.
    pub fn compile(&self, path: &Path, text: &str) -> Result<(String, crate::pipeline::SourceMap)> {
        let mut loader = Loader {
            fs: self.fs.as_ref(),
            root: &self.root,
            load_paths: &self.load_paths,
            sources: vec![source_name(&self.root, path)],
            stack: vec![path.to_path_buf()],
        };
        let stmts = loader.parse_file(text, path, 0)?;

        let mut eval = Evaluator::default();
        let mut nodes = Vec::new();
        let mut slot = None;
        eval.block(&stmts, None, &mut nodes, &mut slot)?;

        let mut writer = MappedWriter::new(loader.sources[0].clone());
        for name in loader.sources.iter().skip(1) {
            writer.add_source(name.clone());
        }
        emit(&mut writer, &eval.imports, &nodes);
        Ok(writer.finish())
    }
}

impl Transform for SassStep {
    fn name(&self) -> &str {
        "sass"
    }

    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>> {
        if asset.file_name().starts_with('_') {
            return Ok(None);
        }
        let text = asset.text()?;
        let (css, map) = self.compile(&asset.source, text)?;
        Ok(Some(StepOutput::text(css, map).with_extension("css")))
    }
}

/// Where a statement came from: source index and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Origin {
    source: u32,
    pos: Position,
}

#[derive(Debug, Clone)]
enum Stmt {
    Var {
        name: String,
        value: String,
        default: bool,
        global: bool,
        origin: Origin,
    },
    Decl {
        prop: String,
        value: String,
        origin: Origin,
    },
    Rule {
        selector: String,
        body: Vec<Stmt>,
        origin: Origin,
    },
    AtRule {
        name: String,
        params: String,
        body: Option<Vec<Stmt>>,
        origin: Origin,
    },
    Comment {
        text: String,
        origin: Origin,
    },
}

// ---------------------------------------------------------------------------
// Parsing and import resolution
// ---------------------------------------------------------------------------

struct Loader<'a> {
    fs: &'a dyn FileSystem,
    root: &'a Path,
    load_paths: &'a [PathBuf],
    sources: Vec<String>,
    /// Files currently being parsed, for cycle detection.
    stack: Vec<PathBuf>,
}

impl Loader<'_> {
    fn parse_file(&mut self, text: &str, path: &Path, source: u32) -> Result<Vec<Stmt>> {
        let mut parser = Parser::new(text, source);
        let raw = parser
            .block_body(false)
            .with_context(|| format!("parsing {}", path.display()))?;
        self.resolve_imports(raw, path)
    }

    /// Replace `@import` of Sass files by the imported statements.
    fn resolve_imports(&mut self, stmts: Vec<Stmt>, path: &Path) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::AtRule {
                    name,
                    params,
                    body: None,
                    origin,
                } if name == "import" => {
                    for target in split_top_level(&params, ',') {
                        let target = target.trim();
                        if is_plain_css_import(target) {
                            out.push(Stmt::AtRule {
                                name: "import".to_string(),
                                params: target.to_string(),
                                body: None,
                                origin,
                            });
                            continue;
                        }
                        let target = unquote(target);
                        out.extend(self.import(&target, path)?);
                    }
                }
                Stmt::Rule {
                    selector,
                    body,
                    origin,
                } => out.push(Stmt::Rule {
                    selector,
                    body: self.resolve_imports(body, path)?,
                    origin,
                }),
                Stmt::AtRule {
                    name,
                    params,
                    body: Some(body),
                    origin,
                } => out.push(Stmt::AtRule {
                    name,
                    params,
                    body: Some(self.resolve_imports(body, path)?),
                    origin,
                }),
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn import(&mut self, target: &str, from: &Path) -> Result<Vec<Stmt>> {
        let file = self
            .locate(target, from)
            .ok_or_else(|| anyhow!("cannot find stylesheet to import: '{target}' (from {})", from.display()))?;

        if self.stack.contains(&file) {
            bail!("import loop: {} imports itself", file.display());
        }

        let text = self
            .fs
            .read_to_string(&file)
            .with_context(|| format!("reading import '{target}'"))?;

        let name = source_name(self.root, &file);
        let index = match self.sources.iter().position(|s| *s == name) {
            Some(i) => i as u32,
            None => {
                self.sources.push(name);
                (self.sources.len() - 1) as u32
            }
        };

        self.stack.push(file.clone());
        let stmts = self.parse_file(&text, &file, index);
        self.stack.pop();
        stmts
    }

    /// Find the file an import refers to: next to the importing file first,
    /// then in each load path. `foo` matches `foo.scss`, `_foo.scss`,
    /// `foo/_index.scss` and `foo/index.scss`.
    fn locate(&self, target: &str, from: &Path) -> Option<PathBuf> {
        let dirs = from
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(self.load_paths.iter().cloned());

        for dir in dirs {
            for candidate in import_candidates(target) {
                let path = dir.join(&candidate);
                if self.fs.is_file(&path) {
                    return Some(path);
                }
            }
        }
        None
    }
}

fn import_candidates(target: &str) -> Vec<PathBuf> {
    let path = Path::new(target);
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
        return Vec::new();
    };

    if file.ends_with(".scss") {
        return vec![dir.join(file), dir.join(format!("_{file}"))];
    }
    vec![
        dir.join(format!("{file}.scss")),
        dir.join(format!("_{file}.scss")),
        path.join("_index.scss"),
        path.join("index.scss"),
    ]
}

fn is_plain_css_import(target: &str) -> bool {
    let bare = unquote(target);
    target.starts_with("url(")
        || bare.ends_with(".css")
        || bare.starts_with("http://")
        || bare.starts_with("https://")
        || bare.starts_with("//")
        || target.contains(' ')
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

struct Parser {
    chars: Vec<char>,
    idx: usize,
    pos: Position,
    source: u32,
}

impl Parser {
    fn new(text: &str, source: u32) -> Self {
        Self {
            chars: text.chars().collect(),
            idx: 0,
            pos: Position::default(),
            source,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.idx += 1;
        if ch == '\n' {
            self.pos = Position::new(self.pos.line + 1, 0);
        } else {
            self.pos.column += 1;
        }
        Some(ch)
    }

    fn origin(&self) -> Origin {
        Origin {
            source: self.source,
            pos: self.pos,
        }
    }

    fn error(&self, msg: impl std::fmt::Display) -> anyhow::Error {
        anyhow!("{msg} at line {}, column {}", self.pos.line + 1, self.pos.column + 1)
    }

    /// Skip whitespace and `//` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    /// Statements until `}` (when `nested`) or end of input.
    fn block_body(&mut self, nested: bool) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None if nested => return Err(self.error("expected '}'")),
                None => return Ok(stmts),
                Some('}') if nested => {
                    self.bump();
                    return Ok(stmts);
                }
                Some('}') => return Err(self.error("unexpected '}'")),
                Some(';') => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('*') => stmts.push(self.comment()?),
                Some(_) => stmts.push(self.statement()?),
            }
        }
    }

    fn comment(&mut self) -> Result<Stmt> {
        let origin = self.origin();
        let mut text = String::new();
        while let Some(c) = self.bump() {
            text.push(c);
            if text.len() > 3 && text.ends_with("*/") {
                return Ok(Stmt::Comment { text, origin });
            }
        }
        Err(self.error("unterminated comment"))
    }

    /// Read up to a top-level `;`, `{` or `}`. Returns the text and the
    /// terminator (not consumed for `}`).
    fn prelude(&mut self) -> Result<(String, Option<char>)> {
        let mut text = String::new();
        let mut parens = 0usize;
        let mut quote: Option<char> = None;

        while let Some(c) = self.peek() {
            if let Some(q) = quote {
                text.push(c);
                self.bump();
                if c == '\\' {
                    if let Some(next) = self.bump() {
                        text.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                '#' if self.peek_at(1) == Some('{') => {
                    text.push_str("#{");
                    self.bump();
                    self.bump();
                    let mut depth = 1;
                    while let Some(c) = self.bump() {
                        text.push(c);
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    continue;
                }
                '/' if self.peek_at(1) == Some('/') && parens == 0 && !text.ends_with(':') => {
                    self.skip_trivia();
                    if !text.ends_with(char::is_whitespace) {
                        text.push(' ');
                    }
                    continue;
                }
                '/' if self.peek_at(1) == Some('*') => {
                    while let Some(c) = self.bump() {
                        if c == '*' && self.peek() == Some('/') {
                            self.bump();
                            break;
                        }
                    }
                    continue;
                }
                ';' | '{' if parens == 0 => {
                    self.bump();
                    return Ok((text.trim().to_string(), Some(c)));
                }
                '}' if parens == 0 => return Ok((text.trim().to_string(), Some('}'))),
                _ => {}
            }
            text.push(c);
            self.bump();
        }
        Ok((text.trim().to_string(), None))
    }

    fn statement(&mut self) -> Result<Stmt> {
        let origin = self.origin();
        let (text, terminator) = self.prelude()?;

        if terminator == Some('{') {
            let body = self.block_body(true)?;
            if let Some(rest) = text.strip_prefix('@') {
                let (name, params) = split_at_rule(rest);
                return Ok(Stmt::AtRule {
                    name,
                    params,
                    body: Some(body),
                    origin,
                });
            }
            return Ok(Stmt::Rule {
                selector: text,
                body,
                origin,
            });
        }

        if let Some(rest) = text.strip_prefix('@') {
            let (name, params) = split_at_rule(rest);
            return Ok(Stmt::AtRule {
                name,
                params,
                body: None,
                origin,
            });
        }

        if let Some(rest) = text.strip_prefix('$') {
            let (name, value) = rest
                .split_once(':')
                .ok_or_else(|| self.error(format!("expected ':' after ${rest}")))?;
            let mut value = value.trim().to_string();
            let mut default = false;
            let mut global = false;
            loop {
                if let Some(v) = value.strip_suffix("!default") {
                    default = true;
                    value = v.trim_end().to_string();
                } else if let Some(v) = value.strip_suffix("!global") {
                    global = true;
                    value = v.trim_end().to_string();
                } else {
                    break;
                }
            }
            return Ok(Stmt::Var {
                name: name.trim().to_string(),
                value,
                default,
                global,
                origin,
            });
        }

        let (prop, value) = split_declaration(&text)
            .ok_or_else(|| self.error(format!("expected a declaration, found '{text}'")))?;
        Ok(Stmt::Decl {
            prop,
            value,
            origin,
        })
    }
}

fn split_at_rule(rest: &str) -> (String, String) {
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    (rest[..end].to_string(), rest[end..].trim().to_string())
}

/// `prop: value`, where `prop` may contain interpolation.
fn split_declaration(text: &str) -> Option<(String, String)> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                let prop = text[..i].trim();
                let value = text[i + 1..].trim();
                if prop.is_empty() || value.is_empty() {
                    return None;
                }
                return Some((prop.to_string(), value.to_string()));
            }
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside parentheses, brackets and quotes.
fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in text.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Mixin {
    params: Vec<(String, Option<String>)>,
    body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
struct Declaration {
    prop: String,
    value: String,
    origin: Origin,
}

#[derive(Debug, Clone)]
enum CssNode {
    Rule {
        selectors: Vec<String>,
        decls: Vec<Declaration>,
        origin: Origin,
    },
    AtBlock {
        name: String,
        params: String,
        decls: Vec<Declaration>,
        children: Vec<CssNode>,
        origin: Origin,
    },
    AtStatement {
        name: String,
        params: String,
        origin: Origin,
    },
    Comment {
        text: String,
        origin: Origin,
    },
}

/// At-rules whose bodies hold declarations directly.
const DECLARATION_AT_RULES: &[&str] = &["font-face", "page", "viewport", "counter-style"];

/// At-rules that bubble out of style rules.
const CONDITIONAL_AT_RULES: &[&str] = &["media", "supports", "document"];

const UNSUPPORTED_AT_RULES: &[&str] = &[
    "if", "else", "each", "for", "while", "function", "return", "extend", "use", "forward",
];

/// Sass built-ins that have no CSS function of the same name.
const SASS_FUNCTIONS: &[&str] = &[
    "darken", "lighten", "desaturate", "adjust-hue", "mix", "transparentize", "opacify",
    "fade-in", "fade-out", "complement", "scale-color", "adjust-color", "change-color",
    "red", "green", "blue", "hue", "lightness", "percentage", "ceil", "floor", "random",
    "unit", "unitless", "comparable", "type-of", "unquote", "quote", "str-length",
    "str-index", "str-insert", "str-slice", "to-upper-case", "to-lower-case", "length",
    "nth", "join", "append", "index", "map-get", "map-merge", "map-has-key", "map-keys",
    "map-values",
];

/// CSS functions whose arguments are left as written.
const OPAQUE_FUNCTIONS: &[&str] = &[
    "calc", "-webkit-calc", "-moz-calc", "min", "max", "clamp", "var", "env", "url", "attr",
    "format", "local", "expression",
];

#[derive(Default)]
struct Evaluator {
    scopes: Vec<HashMap<String, String>>,
    mixins: HashMap<String, Mixin>,
    /// Plain CSS imports, hoisted to the top of the output.
    imports: Vec<(String, Origin)>,
    /// `@content` blocks of the mixins being included, innermost last.
    content: Vec<Option<Vec<Stmt>>>,
}

impl Evaluator {
    fn block(
        &mut self,
        stmts: &[Stmt],
        selectors: Option<&[String]>,
        out: &mut Vec<CssNode>,
        slot: &mut Option<usize>,
    ) -> Result<()> {
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
        for stmt in stmts {
            self.statement(stmt, selectors, out, slot)?;
        }
        Ok(())
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn statement(
        &mut self,
        stmt: &Stmt,
        selectors: Option<&[String]>,
        out: &mut Vec<CssNode>,
        slot: &mut Option<usize>,
    ) -> Result<()> {
        match stmt {
            Stmt::Var {
                name,
                value,
                default,
                global,
                origin,
            } => {
                if *default && self.lookup_var(name).is_some_and(|v| v != "null") {
                    return Ok(());
                }
                ensure_plain_value(value, *origin)?;
                let value = self.substitute(value)?;
                self.assign(name, value, *global);
            }
            Stmt::Decl {
                prop,
                value,
                origin,
            } => {
                let prop = self.interpolate(prop)?;
                // Custom property values are opaque to Sass.
                let custom = prop.starts_with("--");
                if !custom {
                    ensure_plain_value(value, *origin)?;
                }
                let value = self.substitute(value)?;
                if !custom {
                    ensure_plain_value(&value, *origin)?;
                }
                let index = match *slot {
                    Some(i) => i,
                    None => {
                        let selectors = selectors.ok_or_else(|| {
                            anyhow!(
                                "declaration '{prop}' outside a style rule (line {})",
                                origin.pos.line + 1
                            )
                        })?;
                        out.push(CssNode::Rule {
                            selectors: selectors.to_vec(),
                            decls: Vec::new(),
                            origin: *origin,
                        });
                        *slot = Some(out.len() - 1);
                        out.len() - 1
                    }
                };
                let decl = Declaration {
                    prop,
                    value,
                    origin: *origin,
                };
                match out.get_mut(index) {
                    Some(CssNode::Rule { decls, .. }) | Some(CssNode::AtBlock { decls, .. }) => {
                        decls.push(decl)
                    }
                    _ => bail!("internal error: declaration target missing"),
                }
            }
            Stmt::Rule { selector, body, .. } => {
                let selector = self.interpolate(selector)?;
                let resolved = resolve_selectors(selectors, &selector);
                let mut child_slot = None;
                self.scoped(|ev| {
                    for stmt in body {
                        ev.statement(stmt, Some(&resolved), out, &mut child_slot)?;
                    }
                    Ok(())
                })?;
            }
            Stmt::Comment { text, origin } => out.push(CssNode::Comment {
                text: text.clone(),
                origin: *origin,
            }),
            Stmt::AtRule {
                name,
                params,
                body,
                origin,
            } => self.at_rule(name, params, body.as_deref(), *origin, selectors, out, slot)?,
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn at_rule(
        &mut self,
        name: &str,
        params: &str,
        body: Option<&[Stmt]>,
        origin: Origin,
        selectors: Option<&[String]>,
        out: &mut Vec<CssNode>,
        slot: &mut Option<usize>,
    ) -> Result<()> {
        let line = origin.pos.line + 1;

        if UNSUPPORTED_AT_RULES.contains(&name) {
            bail!("@{name} is not supported (line {line})");
        }

        match (name, body) {
            ("mixin", Some(body)) => {
                let (mixin_name, params) = split_call(params);
                let params = split_top_level(&params, ',')
                    .into_iter()
                    .map(|p| {
                        let p = p.trim();
                        match p.split_once(':') {
                            Some((n, d)) => (normalize_var(n.trim()), Some(d.trim().to_string())),
                            None => (normalize_var(p), None),
                        }
                    })
                    .filter(|(n, _)| !n.is_empty())
                    .collect();
                self.mixins.insert(
                    mixin_name,
                    Mixin {
                        params,
                        body: body.to_vec(),
                    },
                );
            }
            ("include", content) => {
                let (mixin_name, args) = split_call(params);
                let mixin = self
                    .mixins
                    .get(&mixin_name)
                    .cloned()
                    .ok_or_else(|| anyhow!("undefined mixin '{mixin_name}' (line {line})"))?;
                let bindings = self.bind_arguments(&mixin, &args)?;

                self.content.push(content.map(<[Stmt]>::to_vec));
                let result = self.scoped(|ev| {
                    if let Some(scope) = ev.scopes.last_mut() {
                        scope.extend(bindings);
                    }
                    for stmt in mixin.body.iter() {
                        ev.statement(stmt, selectors, out, slot)?;
                    }
                    Ok(())
                });
                self.content.pop();
                result?;
            }
            ("content", None) => {
                if let Some(Some(block)) = self.content.last().cloned() {
                    // The content block sees the includer's `@content` stack.
                    let saved = self.content.pop();
                    let result = self.scoped(|ev| {
                        for stmt in block.iter() {
                            ev.statement(stmt, selectors, out, slot)?;
                        }
                        Ok(())
                    });
                    if let Some(saved) = saved {
                        self.content.push(saved);
                    }
                    result?;
                }
            }
            ("import", None) => {
                let params = self.substitute(params)?;
                self.imports.push((params, origin));
            }
            ("charset", None) => {}
            ("debug" | "warn", None) => {
                tracing::warn!(line, "@{name} {}", self.substitute(params)?);
            }
            ("error", None) => bail!("@error {} (line {line})", self.substitute(params)?),
            (_, Some(body)) if CONDITIONAL_AT_RULES.contains(&name) => {
                let params = self.substitute(params)?;
                let mut children = Vec::new();
                let mut inner_slot = None;
                self.scoped(|ev| {
                    for stmt in body {
                        ev.statement(stmt, selectors, &mut children, &mut inner_slot)?;
                    }
                    Ok(())
                })?;
                out.push(CssNode::AtBlock {
                    name: name.to_string(),
                    params,
                    decls: Vec::new(),
                    children,
                    origin,
                });
            }
            (_, Some(body)) => {
                let params = self.substitute(params)?;
                let takes_decls = DECLARATION_AT_RULES.contains(&name);
                let mut node = vec![CssNode::AtBlock {
                    name: name.to_string(),
                    params,
                    decls: Vec::new(),
                    children: Vec::new(),
                    origin,
                }];
                let mut children = Vec::new();
                self.scoped(|ev| {
                    for stmt in body {
                        if takes_decls && matches!(stmt, Stmt::Decl { .. }) {
                            let mut own = Some(0);
                            ev.statement(stmt, None, &mut node, &mut own)?;
                        } else {
                            let mut child_slot = None;
                            ev.statement(stmt, None, &mut children, &mut child_slot)?;
                        }
                    }
                    Ok(())
                })?;
                if let Some(CssNode::AtBlock { children: c, .. }) = node.first_mut() {
                    *c = children;
                }
                out.extend(node);
                // Later declarations of the enclosing rule need a new block.
                *slot = None;
            }
            (_, None) => {
                let params = self.substitute(params)?;
                out.push(CssNode::AtStatement {
                    name: name.to_string(),
                    params,
                    origin,
                });
            }
        }
        Ok(())
    }

    fn bind_arguments(&mut self, mixin: &Mixin, args: &str) -> Result<HashMap<String, String>> {
        let mut bound: HashMap<String, String> = HashMap::new();
        let mut positional = 0usize;

        for arg in split_top_level(args, ',') {
            let arg = arg.trim();
            if arg.is_empty() {
                continue;
            }
            let named = arg
                .strip_prefix('$')
                .and_then(|rest| rest.split_once(':'))
                .map(|(n, v)| (normalize_var(n.trim()), v.trim().to_string()));
            match named {
                Some((name, value)) => {
                    if !mixin.params.iter().any(|(p, _)| *p == name) {
                        bail!("no argument named ${name}");
                    }
                    bound.insert(name, self.substitute(&value)?);
                }
                None => {
                    let (name, _) = mixin
                        .params
                        .get(positional)
                        .ok_or_else(|| anyhow!("too many arguments"))?;
                    bound.insert(name.clone(), self.substitute(arg)?);
                    positional += 1;
                }
            }
        }

        for (name, default) in mixin.params.iter() {
            if bound.contains_key(name) {
                continue;
            }
            let default = default
                .as_ref()
                .ok_or_else(|| anyhow!("missing argument ${name}"))?;
            // Defaults may refer to earlier parameters.
            self.scopes.push(bound.clone());
            let value = self.substitute(default);
            self.scopes.pop();
            bound.insert(name.clone(), value?);
        }
        Ok(bound)
    }

    fn lookup_var(&self, name: &str) -> Option<&String> {
        let name = normalize_var(name);
        self.scopes.iter().rev().find_map(|s| s.get(&name))
    }

    fn assign(&mut self, name: &str, value: String, global: bool) {
        let name = normalize_var(name);
        if global || self.scopes.len() == 1 {
            if let Some(scope) = self.scopes.first_mut() {
                scope.insert(name, value);
            }
            return;
        }
        let local = self.scopes.len() - 1;
        for scope in self.scopes[1..].iter_mut().rev() {
            if let Some(slot) = scope.get_mut(&name) {
                *slot = value;
                return;
            }
        }
        self.scopes[local].insert(name, value);
    }

    /// Replace `$vars` and `#{}` in a value.
    fn substitute(&self, value: &str) -> Result<String> {
        let interpolated = self.interpolate(value)?;
        let mut out = String::with_capacity(interpolated.len());
        let mut chars = interpolated.char_indices().peekable();
        let mut quote: Option<char> = None;

        while let Some((_, c)) = chars.next() {
            if let Some(q) = quote {
                out.push(c);
                if c == q {
                    quote = None;
                }
                continue;
            }
            if c == '"' || c == '\'' {
                quote = Some(c);
                out.push(c);
                continue;
            }
            if c == '$' {
                let mut name = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '-' || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    out.push('$');
                    continue;
                }
                let v = self
                    .lookup_var(&name)
                    .ok_or_else(|| anyhow!("undefined variable ${name}"))?;
                out.push_str(v);
                continue;
            }
            out.push(c);
        }
        Ok(out)
    }

    /// Replace `#{expr}`; quoted strings are unquoted.
    fn interpolate(&self, text: &str) -> Result<String> {
        if !text.contains("#{") {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("#{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| anyhow!("unterminated interpolation in '{text}'"))?;
            let expr = self.substitute(after[..end].trim())?;
            out.push_str(&unquote(&expr));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn ensure_plain_value(value: &str, origin: Origin) -> Result<()> {
    match needs_evaluation(value) {
        Some(why) => bail!(
            "'{value}' needs Sass evaluation ({why}), which is not supported (line {})",
            origin.pos.line + 1
        ),
        None => Ok(()),
    }
}

/// What in `value` only Sass could compute, if anything. Quoted strings,
/// `#{}` interpolations and the arguments of [`OPAQUE_FUNCTIONS`] are
/// skipped.
fn needs_evaluation(value: &str) -> Option<String> {
    let chars: Vec<char> = value.chars().collect();
    // One entry per open paren: whether it opened an opaque function.
    let mut parens: Vec<bool> = Vec::new();
    let mut opaque = 0usize;
    // Index of the last `)` that closed a bare group like `($a + 1)`.
    let mut bare_close: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            i += 1;
            continue;
        }
        if c == '#' && chars.get(i + 1) == Some(&'{') {
            while i < chars.len() && chars[i] != '}' {
                i += 1;
            }
            i += 1;
            continue;
        }

        match c {
            '(' => {
                let name = ident_before(&chars, i).to_ascii_lowercase();
                if opaque == 0 {
                    if SASS_FUNCTIONS.contains(&name.as_str()) {
                        return Some(format!("{name}()"));
                    }
                    if (name == "rgb" || name == "rgba") && color_with_alpha(&chars[i + 1..]) {
                        return Some(format!("{name}() of a color"));
                    }
                }
                let is_opaque = OPAQUE_FUNCTIONS.contains(&name.as_str());
                if is_opaque {
                    opaque += 1;
                }
                parens.push(is_opaque);
            }
            ')' => match parens.pop() {
                Some(true) => opaque = opaque.saturating_sub(1),
                Some(false) if opaque == 0 && ident_before(&chars, open_paren(&chars, i)).is_empty() => {
                    bare_close = Some(i)
                }
                _ => {}
            },
            _ if opaque > 0 => {}
            '*' => return Some("'*'".to_string()),
            '+' | '-' if is_spaced(&chars, i) => return Some(format!("'{c}'")),
            '+' if after_variable(&chars, i) || next_non_space(&chars, i) == Some('$') => {
                return Some("'+'".to_string());
            }
            '/' => {
                let prev = prev_non_space(&chars, i);
                let grouped = prev.is_some_and(|p| bare_close == Some(p));
                let next = next_non_space(&chars, i);
                if grouped || after_variable(&chars, i) || matches!(next, Some('$') | Some('(')) {
                    return Some("'/'".to_string());
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Identifier ending right before index `at`.
fn ident_before(chars: &[char], at: usize) -> String {
    let start = chars[..at]
        .iter()
        .rposition(|c| !(c.is_alphanumeric() || *c == '-' || *c == '_'))
        .map_or(0, |p| p + 1);
    chars[start..at].iter().collect()
}

/// Index of the `(` matching the `)` at `close`.
fn open_paren(chars: &[char], close: usize) -> usize {
    let mut depth = 0usize;
    for j in (0..close).rev() {
        match chars[j] {
            ')' => depth += 1,
            '(' if depth == 0 => return j,
            '(' => depth -= 1,
            _ => {}
        }
    }
    0
}

fn prev_non_space(chars: &[char], at: usize) -> Option<usize> {
    chars[..at].iter().rposition(|c| !c.is_whitespace())
}

fn next_non_space(chars: &[char], at: usize) -> Option<char> {
    chars[at + 1..].iter().copied().find(|c| !c.is_whitespace())
}

fn is_spaced(chars: &[char], at: usize) -> bool {
    at > 0
        && chars[at - 1].is_whitespace()
        && chars.get(at + 1).is_some_and(|c| c.is_whitespace())
}

/// Whether the operand before `at` is a `$variable`.
fn after_variable(chars: &[char], at: usize) -> bool {
    let Some(end) = prev_non_space(chars, at) else {
        return false;
    };
    let name = ident_before(chars, end + 1);
    let start = end + 1 - name.chars().count();
    !name.is_empty() && start > 0 && chars[start - 1] == '$'
}

/// `rgba(#fff, .5)` style arguments: exactly two, the first a color
/// literal or variable.
fn color_with_alpha(args: &[char]) -> bool {
    let mut depth = 0usize;
    let mut commas = 0;
    let mut end = args.len();
    for (j, c) in args.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => {
                end = j;
                break;
            }
            ')' => depth -= 1,
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    let first: String = args[..end].iter().take_while(|c| **c != ',').collect();
    let first = first.trim();
    commas == 1 && (first.starts_with('#') || first.starts_with('$'))
}

/// Sass treats `-` and `_` in names as the same character.
fn normalize_var(name: &str) -> String {
    name.trim_start_matches('$').replace('_', "-")
}

fn split_call(text: &str) -> (String, String) {
    match text.find('(') {
        Some(i) => {
            let name = text[..i].trim().to_string();
            let args = text[i + 1..].trim_end();
            let args = args.strip_suffix(')').unwrap_or(args);
            (name, args.to_string())
        }
        None => (text.trim().to_string(), String::new()),
    }
}

/// Combine parent selectors with a nested selector list.
fn resolve_selectors(parents: Option<&[String]>, selector: &str) -> Vec<String> {
    let children: Vec<String> = split_top_level(selector, ',')
        .into_iter()
        .map(|s| collapse_whitespace(&s))
        .filter(|s| !s.is_empty())
        .collect();

    let Some(parents) = parents else {
        return children;
    };

    let mut out = Vec::with_capacity(parents.len() * children.len());
    for parent in parents {
        for child in children.iter() {
            if child.contains('&') {
                out.push(child.replace('&', parent));
            } else {
                out.push(format!("{parent} {child}"));
            }
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn emit(writer: &mut MappedWriter, imports: &[(String, Origin)], nodes: &[CssNode]) {
    let mut first = true;
    for (import, origin) in imports.iter() {
        writer.push_replacement(&format!("@import {import};"), origin.source, origin.pos);
        writer.push_generated("\n");
        first = false;
    }
    emit_nodes(writer, nodes, 0, &mut first);
}

fn emit_nodes(writer: &mut MappedWriter, nodes: &[CssNode], depth: usize, first: &mut bool) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        if node_is_empty(node) {
            continue;
        }
        if !*first && depth == 0 {
            writer.push_generated("\n");
        }
        *first = false;

        match node {
            CssNode::Rule {
                selectors,
                decls,
                origin,
            } => {
                let selector = selectors.join(&format!(",\n{indent}"));
                writer.push_generated(&indent);
                writer.push_replacement(&selector, origin.source, origin.pos);
                writer.push_generated(" {\n");
                emit_decls(writer, decls, depth + 1);
                writer.push_generated(&indent);
                writer.push_generated("}\n");
            }
            CssNode::AtBlock {
                name,
                params,
                decls,
                children,
                origin,
            } => {
                writer.push_generated(&indent);
                let head = if params.is_empty() {
                    format!("@{name}")
                } else {
                    format!("@{name} {params}")
                };
                writer.push_replacement(&head, origin.source, origin.pos);
                writer.push_generated(" {\n");
                emit_decls(writer, decls, depth + 1);
                let mut inner_first = true;
                emit_nodes(writer, children, depth + 1, &mut inner_first);
                writer.push_generated(&indent);
                writer.push_generated("}\n");
            }
            CssNode::AtStatement {
                name,
                params,
                origin,
            } => {
                writer.push_generated(&indent);
                writer.push_replacement(&format!("@{name} {params};"), origin.source, origin.pos);
                writer.push_generated("\n");
            }
            CssNode::Comment { text, origin } => {
                writer.push_generated(&indent);
                writer.push_from(text, origin.source, origin.pos);
                writer.push_generated("\n");
            }
        }
    }
}

fn emit_decls(writer: &mut MappedWriter, decls: &[Declaration], depth: usize) {
    let indent = "  ".repeat(depth);
    for decl in decls {
        writer.push_generated(&indent);
        writer.push_replacement(
            &format!("{}: {};", decl.prop, decl.value),
            decl.origin.source,
            decl.origin.pos,
        );
        writer.push_generated("\n");
    }
}

fn node_is_empty(node: &CssNode) -> bool {
    match node {
        CssNode::Rule { decls, .. } => decls.is_empty(),
        CssNode::AtBlock {
            name,
            decls,
            children,
            ..
        } => {
            decls.is_empty()
                && children.iter().all(node_is_empty)
                && CONDITIONAL_AT_RULES.contains(&name.as_str())
        }
        _ => false,
    }
}
