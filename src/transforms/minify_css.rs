// src/transforms/minify_css.rs

use anyhow::{Result, anyhow};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

use crate::pipeline::{Asset, Position, SourceMap};
use crate::transforms::{StepOutput, Transform};

/// CSS minification through lightningcss. Minified output parses back to
/// the same stylesheet, so a second pass is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyCssStep;

impl Transform for MinifyCssStep {
    fn name(&self) -> &str {
        "minify-css"
    }

    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>> {
        let text = asset.text()?;
        let (css, map) = minify_css(asset.file_name(), text)?;
        Ok(Some(StepOutput::text(css, map)))
    }
}

/// Minify `text`, returning the CSS and a map back to `text`.
pub fn minify_css(name: &str, text: &str) -> Result<(String, SourceMap)> {
    let mut sheet = StyleSheet::parse(
        text,
        ParserOptions {
            filename: name.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| anyhow!("{e}"))?;

    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| anyhow!("{e}"))?;

    let mut parcel = parcel_sourcemap::SourceMap::new("/");
    parcel.add_source(name);

    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            source_map: Some(&mut parcel),
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{e}"))?;

    let mut map = SourceMap::new(name);
    for mapping in parcel.get_mappings() {
        if let Some(original) = mapping.original {
            map.add_mapping(
                Position::new(mapping.generated_line, mapping.generated_column),
                Position::new(original.original_line, original.original_column),
                0,
            );
        }
    }

    Ok((printed.code, map))
}
