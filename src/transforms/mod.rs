// src/transforms/mod.rs

//! Built-in transform steps.
//!
//! A step turns one [`Asset`] into new contents. Steps that move text around
//! also return a [`SourceMap`] from their output back to their input, which
//! the pipeline chains onto the maps of earlier steps.

pub mod image;
pub mod include;
pub mod minify_css;
pub mod minify_js;
pub mod prefix;
pub mod sass;

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::config::StepConfig;
use crate::fs::FileSystem;
use crate::pipeline::{Asset, PathSet, SourceMap};

pub use image::ImageStep;
pub use include::IncludeStep;
pub use minify_css::MinifyCssStep;
pub use minify_js::MinifyJsStep;
pub use prefix::PrefixStep;
pub use sass::SassStep;

/// What a step produced for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub contents: Vec<u8>,
    /// Output -> input positions. `None` when positions are unchanged.
    pub map: Option<SourceMap>,
    /// New output extension, e.g. `css` after Sass.
    pub extension: Option<String>,
}

impl StepOutput {
    pub fn bytes(contents: Vec<u8>) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    pub fn text(text: String, map: SourceMap) -> Self {
        Self {
            contents: text.into_bytes(),
            map: Some(map),
            extension: None,
        }
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }
}

/// One step of a pipeline.
///
/// `Ok(None)` drops the file from the output.
pub trait Transform: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn apply(&self, asset: &Asset) -> Result<Option<StepOutput>>;
}

/// Instantiate a configured step for a path set rooted at `root`.
pub fn from_config(
    step: &StepConfig,
    fs: Arc<dyn FileSystem>,
    root: &Path,
    set: &PathSet,
) -> Box<dyn Transform> {
    let template = set.template.as_ref().map(|t| root.join(t));
    match step {
        StepConfig::Include {
            prefix,
            basepath,
            context,
        } => {
            let basepath = match basepath.as_deref() {
                Some("@file") => include::Basepath::File,
                Some(dir) => include::Basepath::Dir(root.join(dir)),
                None => match template {
                    Some(dir) => include::Basepath::Dir(dir),
                    None => include::Basepath::File,
                },
            };
            Box::new(IncludeStep::new(
                fs,
                root,
                prefix.clone(),
                basepath,
                context.clone(),
            ))
        }
        StepConfig::Prefix { vendors } => Box::new(PrefixStep::new(vendors)),
        StepConfig::Sass { load_paths } => {
            let mut paths: Vec<PathBuf> = load_paths.iter().map(|p| root.join(p)).collect();
            paths.extend(template);
            Box::new(SassStep::new(fs, root, paths))
        }
        StepConfig::MinifyCss => Box::new(MinifyCssStep),
        StepConfig::MinifyJs => Box::new(MinifyJsStep),
        StepConfig::Image { jpeg_quality } => Box::new(ImageStep::new(*jpeg_quality)),
    }
}

/// Name a file in source maps: its path relative to the project root,
/// `/`-separated.
pub fn source_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = rel.strip_prefix(".").unwrap_or(rel);
    rel.to_string_lossy().replace('\\', "/")
}
