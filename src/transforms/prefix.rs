// src/transforms/prefix.rs

//! Vendor prefixing for stylesheet declarations.
//!
//! Works line by line on CSS or SCSS source: a line holding a single
//! declaration of a known property gets prefixed copies inserted above it.
//! Prefixed declarations already present in the same block are not added
//! again, so running the step twice changes nothing.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::pipeline::{Asset, MappedWriter, Position};
use crate::transforms::{StepOutput, Transform};

/// Properties that get prefixed, and for which vendors.
const PREFIXED_PROPERTIES: &[(&str, &[&str])] = &[
    ("animation", &["webkit", "moz"]),
    ("animation-delay", &["webkit", "moz"]),
    ("animation-direction", &["webkit", "moz"]),
    ("animation-duration", &["webkit", "moz"]),
    ("animation-fill-mode", &["webkit", "moz"]),
    ("animation-iteration-count", &["webkit", "moz"]),
    ("animation-name", &["webkit", "moz"]),
    ("animation-timing-function", &["webkit", "moz"]),
    ("appearance", &["webkit", "moz"]),
    ("backface-visibility", &["webkit"]),
    ("box-shadow", &["webkit"]),
    ("column-count", &["webkit", "moz"]),
    ("column-gap", &["webkit", "moz"]),
    ("columns", &["webkit", "moz"]),
    ("filter", &["webkit"]),
    ("flex", &["webkit", "ms"]),
    ("flex-basis", &["webkit"]),
    ("flex-direction", &["webkit", "ms"]),
    ("flex-flow", &["webkit", "ms"]),
    ("flex-grow", &["webkit"]),
    ("flex-shrink", &["webkit"]),
    ("flex-wrap", &["webkit", "ms"]),
    ("hyphens", &["webkit", "ms"]),
    ("align-items", &["webkit"]),
    ("align-self", &["webkit"]),
    ("justify-content", &["webkit"]),
    ("order", &["webkit"]),
    ("perspective", &["webkit"]),
    ("transform", &["webkit", "moz", "ms"]),
    ("transform-origin", &["webkit", "moz", "ms"]),
    ("transition", &["webkit", "moz"]),
    ("transition-delay", &["webkit", "moz"]),
    ("transition-duration", &["webkit", "moz"]),
    ("transition-property", &["webkit", "moz"]),
    ("transition-timing-function", &["webkit", "moz"]),
    ("user-select", &["webkit", "moz", "ms"]),
];

/// `display` values that need vendor spellings.
const DISPLAY_VALUES: &[(&str, &[(&str, &str)])] = &[
    ("flex", &[("webkit", "-webkit-flex"), ("ms", "-ms-flexbox")]),
    (
        "inline-flex",
        &[("webkit", "-webkit-inline-flex"), ("ms", "-ms-inline-flexbox")],
    ),
];

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<prop>-?[a-zA-Z][a-zA-Z-]*)[ \t]*:[ \t]*(?P<value>[^;{}]*?)[ \t]*(?P<semi>;?)[ \t]*(?P<eol>\r?\n?)$")
        .expect("declaration regex is valid")
});

static TRANSFORM_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[\s,])transform\b").expect("transform regex is valid"));

#[derive(Debug, Clone)]
pub struct PrefixStep {
    vendors: Vec<String>,
}

impl PrefixStep {
    pub fn new(vendors: &[String]) -> Self {
        Self {
            vendors: vendors.to_vec(),
        }
    }

    fn enabled(&self, vendor: &str) -> bool {
        self.vendors.iter().any(|v| v == vendor)
    }

    /// Prefixed copies of one declaration, skipping those in `seen`.
    fn expand(&self, prop: &str, value: &str, seen: &HashSet<String>) -> Vec<String> {
        let mut out = Vec::new();

        if prop == "display" {
            if let Some((_, spellings)) = DISPLAY_VALUES.iter().find(|(v, _)| *v == value) {
                for (vendor, spelling) in spellings.iter() {
                    let decl = format!("display: {spelling}");
                    if self.enabled(vendor) && !seen.contains(&decl) {
                        out.push(decl);
                    }
                }
            }
            return out;
        }

        let Some((_, vendors)) = PREFIXED_PROPERTIES.iter().find(|(p, _)| *p == prop) else {
            return out;
        };

        for vendor in vendors.iter().filter(|v| self.enabled(v)) {
            let prefixed = format!("-{vendor}-{prop}");
            if seen.contains(&prefixed) {
                continue;
            }
            let value = if prop.starts_with("transition") {
                TRANSFORM_WORD
                    .replace_all(value, format!("${{1}}-{vendor}-transform"))
                    .into_owned()
            } else {
                value.to_string()
            };
            out.push(format!("{prefixed}: {value}"));
        }
        out
    }
}

impl Transform for PrefixStep {
    fn name(&self) -> &str {
        "prefix"
    }

    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>> {
        let text = asset.text()?;
        let mut writer = MappedWriter::new(asset.file_name());
        // One set of seen declarations per open block.
        let mut blocks: Vec<HashSet<String>> = vec![HashSet::new()];

        for (line_no, line) in text.split_inclusive('\n').enumerate() {
            let origin = Position::new(line_no as u32, 0);

            if let Some(caps) = DECLARATION.captures(line) {
                let indent = &caps["indent"];
                let prop = caps["prop"].to_ascii_lowercase();
                let value = caps["value"].to_string();
                let seen = blocks.last_mut().map(std::mem::take).unwrap_or_default();

                let decl_origin = Position::new(line_no as u32, indent.chars().count() as u32);
                for extra in self.expand(&prop, &value, &seen) {
                    writer.push_generated(indent);
                    writer.push_replacement(&format!("{extra};"), 0, decl_origin);
                    writer.push_generated("\n");
                }

                let mut seen = seen;
                seen.insert(prop.clone());
                seen.insert(format!("{prop}: {value}"));
                if let Some(top) = blocks.last_mut() {
                    *top = seen;
                }

                writer.push_from(line, 0, origin);
                continue;
            }

            for ch in line.chars() {
                match ch {
                    '{' => blocks.push(HashSet::new()),
                    '}' if blocks.len() > 1 => {
                        blocks.pop();
                    }
                    _ => {}
                }
            }
            writer.push_from(line, 0, origin);
        }

        let (out, map) = writer.finish();
        Ok(Some(StepOutput::text(out, map)))
    }
}
