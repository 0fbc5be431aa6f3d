// src/pipeline/sourcemap.rs

//! Minimal Source Map v3 model used to chain maps across transform steps.
//!
//! Every step that moves text around reports a [`SourceMap`] from its output
//! back to its input. Source index 0 always denotes the step's input; any
//! further sources are files the step read on its own (Sass imports, HTML
//! includes). [`SourceMap::compose`] folds a step's map onto the chain built
//! so far, so the final map points at the original files.
//!
//! Lines and columns are zero-based; columns count chars. The VLQ
//! `mappings` string is written by `parcel_sourcemap`.

use parcel_sourcemap::OriginalLocation;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated: Position,
    pub original: Position,
    pub source: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    sources: Vec<String>,
    mappings: Vec<Mapping>,
}

#[derive(Serialize)]
struct SourceMapJson<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMap {
    /// A map whose source 0 is `input`.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            sources: vec![input.into()],
            mappings: Vec::new(),
        }
    }

    /// Line-by-line identity map for `text`.
    pub fn identity(input: impl Into<String>, text: &str) -> Self {
        let mut map = Self::new(input);
        for line in 0..text.lines().count().max(1) {
            let pos = Position::new(line as u32, 0);
            map.add_mapping(pos, pos, 0);
        }
        map
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Register a source and return its index. Existing names are reused.
    pub fn add_source(&mut self, name: impl Into<String>) -> u32 {
        let name = name.into();
        if let Some(i) = self.sources.iter().position(|s| *s == name) {
            return i as u32;
        }
        self.sources.push(name);
        (self.sources.len() - 1) as u32
    }

    /// Rename an existing source.
    pub fn set_source_name(&mut self, index: u32, name: impl Into<String>) {
        if let Some(slot) = self.sources.get_mut(index as usize) {
            *slot = name.into();
        }
    }

    /// Add a mapping. Mappings may be added in any order.
    pub fn add_mapping(&mut self, generated: Position, original: Position, source: u32) {
        let mapping = Mapping {
            generated,
            original,
            source,
        };
        match self
            .mappings
            .binary_search_by(|m| m.generated.cmp(&generated))
        {
            Ok(i) => self.mappings[i] = mapping,
            Err(i) => self.mappings.insert(i, mapping),
        }
    }

    /// Original location of a generated position, from the closest mapping
    /// at or before `pos` on the same generated line. The column distance to
    /// that mapping is carried over, so line-level maps still resolve
    /// columns.
    pub fn lookup(&self, pos: Position) -> Option<(u32, Position)> {
        let idx = match self.mappings.binary_search_by(|m| m.generated.cmp(&pos)) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let m = self.mappings[idx];
        if m.generated.line != pos.line {
            return None;
        }
        let column = m.original.column + (pos.column - m.generated.column);
        Some((m.source, Position::new(m.original.line, column)))
    }

    /// Chain `self` (output -> this step's input) onto `previous`
    /// (this step's input -> originals).
    ///
    /// Mappings into source 0 are resolved through `previous`; mappings into
    /// other sources are kept and re-indexed. Mappings that `previous` cannot
    /// resolve are dropped.
    pub fn compose(&self, previous: &SourceMap) -> SourceMap {
        let mut out = SourceMap {
            sources: previous.sources.clone(),
            mappings: Vec::with_capacity(self.mappings.len()),
        };

        let remap: Vec<u32> = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, name)| if i == 0 { 0 } else { out.add_source(name.clone()) })
            .collect();

        for m in self.mappings.iter() {
            if m.source == 0 {
                if let Some((source, original)) = previous.lookup(m.original) {
                    out.mappings.push(Mapping {
                        generated: m.generated,
                        original,
                        source,
                    });
                }
            } else if let Some(&source) = remap.get(m.source as usize) {
                out.mappings.push(Mapping {
                    generated: m.generated,
                    original: m.original,
                    source,
                });
            }
        }

        out
    }

    /// Serialize as Source Map v3 JSON.
    pub fn to_json(&self, file: &str) -> String {
        let json = SourceMapJson {
            version: 3,
            file,
            sources: &self.sources,
            names: [],
            mappings: self.encode_mappings(),
        };
        // Serializing plain strings and numbers cannot fail.
        serde_json::to_string(&json).unwrap_or_default()
    }

    /// VLQ `mappings` field, written by `parcel_sourcemap`. Source indices
    /// are ours; the parcel map only carries the mappings.
    fn encode_mappings(&self) -> String {
        let mut parcel = parcel_sourcemap::SourceMap::new("/");
        for m in self.mappings.iter() {
            parcel.add_mapping(
                m.generated.line,
                m.generated.column,
                Some(OriginalLocation::new(m.original.line, m.original.column, m.source, None)),
            );
        }
        let mut out: Vec<u8> = Vec::new();
        // Writing into a Vec cannot fail and VLQ output is ASCII.
        match parcel.write_vlq(&mut out) {
            Ok(()) => String::from_utf8(out).unwrap_or_default(),
            Err(_) => String::new(),
        }
    }
}

/// Builds output text while recording where each piece came from.
#[derive(Debug)]
pub struct MappedWriter {
    out: String,
    line: u32,
    column: u32,
    map: SourceMap,
}

impl MappedWriter {
    /// `input` names source 0.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            out: String::new(),
            line: 0,
            column: 0,
            map: SourceMap::new(input),
        }
    }

    pub fn add_source(&mut self, name: impl Into<String>) -> u32 {
        self.map.add_source(name)
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn text(&self) -> &str {
        &self.out
    }

    /// Append `text` copied from `source` starting at `origin`.
    ///
    /// The start and the beginning of every following line are mapped.
    pub fn push_from(&mut self, text: &str, source: u32, origin: Position) {
        let mut orig = origin;
        let mut at_segment_start = true;
        for ch in text.chars() {
            if at_segment_start {
                self.map.add_mapping(self.position(), orig, source);
                at_segment_start = false;
            }
            self.advance(ch);
            if ch == '\n' {
                orig = Position::new(orig.line + 1, 0);
                at_segment_start = true;
            } else {
                orig.column += 1;
            }
        }
    }

    /// Append text that replaces a token of `source` at `origin`. Only its
    /// start is mapped.
    pub fn push_replacement(&mut self, text: &str, source: u32, origin: Position) {
        if !text.is_empty() {
            self.map.add_mapping(self.position(), origin, source);
        }
        self.push_generated(text);
    }

    /// Append text that has no counterpart in any source.
    pub fn push_generated(&mut self, text: &str) {
        for ch in text.chars() {
            self.advance(ch);
        }
    }

    /// Append text that already carries its own map (e.g. an included file
    /// processed recursively). Its sources are merged into this writer.
    pub fn push_mapped(&mut self, text: &str, map: &SourceMap) {
        let remap: Vec<u32> = map
            .sources
            .iter()
            .map(|name| self.map.add_source(name.clone()))
            .collect();
        let start = self.position();

        for m in map.mappings.iter() {
            let generated = if m.generated.line == 0 {
                Position::new(start.line, start.column + m.generated.column)
            } else {
                Position::new(start.line + m.generated.line, m.generated.column)
            };
            if let Some(&source) = remap.get(m.source as usize) {
                self.map.add_mapping(generated, m.original, source);
            }
        }

        self.push_generated(text);
    }

    pub fn finish(self) -> (String, SourceMap) {
        (self.out, self.map)
    }

    fn advance(&mut self, ch: char) {
        self.out.push(ch);
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
    }
}
