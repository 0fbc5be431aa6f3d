// tests/pipeline_build.rs

mod common;
use crate::common::init_tracing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use tokio::sync::broadcast;

use assetdag::errors::AssetdagError;
use assetdag::fs::{FileSystem, MockFileSystem};
use assetdag::pipeline::{Asset, BuildOptions, PathSet, Pipeline, build};
use assetdag::transforms::{MinifyCssStep, PrefixStep, SassStep, StepOutput, Transform};

fn path_set(src: &[&str], dest: &str) -> PathSet {
    PathSet {
        name: "test".to_string(),
        src: src.iter().map(|s| s.to_string()).collect(),
        exclude: Vec::new(),
        template: None,
        dest: PathBuf::from(dest),
    }
}

/// `./build/js/a.js` -> `build/js/a.js`
fn normalized(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            let p = p.strip_prefix("./").unwrap_or(p);
            p.to_string_lossy().replace('\\', "/")
        })
        .collect()
}

/// Fails on one file name, passes everything else through.
#[derive(Debug)]
struct FailOn(&'static str);

impl Transform for FailOn {
    fn name(&self) -> &str {
        "fail-on"
    }

    fn apply(&self, asset: &Asset) -> anyhow::Result<Option<StepOutput>> {
        if asset.file_name() == self.0 {
            bail!("cannot process {}", self.0);
        }
        Ok(Some(StepOutput::bytes(asset.contents.clone())))
    }
}

#[test]
fn zero_steps_copy_files_and_keep_structure_below_glob_base() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("app/js/main.js", "var a = 1;\n");
    fs.add_file("app/js/lib/util.js", "var b = 2;\n");
    fs.add_file("app/js/readme.md", "not matched");

    let set = path_set(&["app/js/**/*.js"], "build/js");
    let report = build(&fs, Path::new("."), &set, &[], BuildOptions::default()).unwrap();

    assert!(report.is_success());
    assert_eq!(
        normalized(&report.outputs),
        vec!["build/js/lib/util.js".to_string(), "build/js/main.js".to_string()]
    );
    assert_eq!(fs.contents("build/js/main.js").as_deref(), Some("var a = 1;\n"));
    assert_eq!(fs.contents("build/js/lib/util.js").as_deref(), Some("var b = 2;\n"));
    assert!(!fs.exists(Path::new("build/js/readme.md")));
}

#[test]
fn single_star_does_not_cross_directories() {
    let fs = MockFileSystem::new();
    fs.add_file("app/index.html", "<p>home</p>");
    fs.add_file("app/partials/header.html", "<header></header>");

    let set = path_set(&["app/*.html"], "build");
    let report = build(&fs, Path::new("."), &set, &[], BuildOptions::default()).unwrap();

    assert_eq!(normalized(&report.outputs), vec!["build/index.html".to_string()]);
}

#[test]
fn excluded_and_missing_literal_files_are_left_out() {
    let fs = MockFileSystem::new();
    fs.add_file("app/js/main.js", "main();");
    fs.add_file("app/js/vendor/jquery.js", "jq();");

    let mut set = path_set(&["app/js/**/*.js", "app/js/missing.js"], "build/js");
    set.exclude = vec!["app/js/vendor/**".to_string()];

    let report = build(&fs, Path::new("."), &set, &[], BuildOptions::default()).unwrap();
    assert_eq!(normalized(&report.outputs), vec!["build/js/main.js".to_string()]);
}

#[test]
fn missing_glob_base_fails_the_whole_build() {
    let fs = MockFileSystem::new();
    let set = path_set(&["app/fonts/**/*"], "build/fonts");

    let err = build(&fs, Path::new("."), &set, &[], BuildOptions::default()).unwrap_err();
    assert!(matches!(err, AssetdagError::FileSystem { .. }), "got {err:?}");
}

#[test]
fn failing_file_does_not_stop_its_siblings() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("app/js/a.js", "a();");
    fs.add_file("app/js/b.js", "b();");
    fs.add_file("app/js/c.js", "c();");

    let set = path_set(&["app/js/*.js"], "build/js");
    let steps: Vec<Box<dyn Transform>> = vec![Box::new(FailOn("b.js"))];
    let report = build(&fs, Path::new("."), &set, &steps, BuildOptions::default()).unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "fail-on");
    assert!(report.failures[0].path.ends_with("b.js"));
    assert!(report.failures[0].message.contains("cannot process b.js"));

    assert_eq!(
        normalized(&report.outputs),
        vec!["build/js/a.js".to_string(), "build/js/c.js".to_string()]
    );
    assert!(!fs.exists(Path::new("build/js/b.js")));
}

#[test]
fn sourcemaps_are_written_next_to_text_outputs() {
    let fs = MockFileSystem::new();
    fs.add_file("app/css/site.css", "body {\n  color: red;\n}\n");

    let set = path_set(&["app/css/*.css"], "build/css");
    let report = build(
        &fs,
        Path::new("."),
        &set,
        &[],
        BuildOptions { sourcemaps: true },
    )
    .unwrap();

    assert_eq!(
        normalized(&report.outputs),
        vec!["build/css/site.css".to_string(), "build/css/site.css.map".to_string()]
    );

    let css = fs.contents("build/css/site.css").unwrap();
    assert!(css.starts_with("body {\n  color: red;\n}\n"));
    assert!(css.ends_with("/*# sourceMappingURL=site.css.map */\n"));

    let map: serde_json::Value = serde_json::from_str(&fs.contents("build/css/site.css.map").unwrap()).unwrap();
    assert_eq!(map["version"], 3);
    assert_eq!(map["file"], "site.css");
    assert_eq!(map["sources"], serde_json::json!(["app/css/site.css"]));
    assert!(!map["mappings"].as_str().unwrap().is_empty());
}

#[test]
fn sass_partials_are_dropped_and_imports_resolved() {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("app/css/_vars.scss", "$main: #333;\n");
    fs.add_file(
        "app/css/main.scss",
        "@import \"vars\";\n.box {\n  color: $main;\n  .inner {\n    margin: 0;\n  }\n}\n",
    );

    let set = path_set(&["app/css/*.scss"], "build/css");
    let dyn_fs: Arc<dyn FileSystem> = fs.clone();
    let steps: Vec<Box<dyn Transform>> = vec![Box::new(SassStep::new(dyn_fs, ".", Vec::new()))];

    let report = build(fs.as_ref(), Path::new("."), &set, &steps, BuildOptions::default()).unwrap();

    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(normalized(&report.outputs), vec!["build/css/main.css".to_string()]);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].ends_with("_vars.scss"));

    let css = fs.contents("build/css/main.css").unwrap();
    assert!(css.contains(".box {\n  color: #333;\n}"), "{css}");
    assert!(css.contains(".box .inner {\n  margin: 0;\n}"), "{css}");
    assert!(!css.contains('$'));
}

#[test]
fn pipeline_run_broadcasts_written_paths() {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("app/js/a.js", "a();");
    fs.add_file("app/js/b.js", "b();");

    let (tx, mut rx) = broadcast::channel(4);
    let pipeline = Pipeline::new(
        "js:build",
        fs.clone(),
        ".",
        path_set(&["app/js/*.js"], "build/js"),
        vec![Box::new(FailOn("b.js"))],
        BuildOptions::default(),
    )
    .with_events(tx);

    let report = pipeline.run().unwrap();
    assert_eq!(report.failures.len(), 1);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.task, "js:build");
    assert_eq!(normalized(&event.outputs), vec!["build/js/a.js".to_string()]);
}

#[test]
fn stylesheets_go_through_prefix_compile_and_minify() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("app/css/_vars.scss", "$gap: 4px;\n");
    fs.add_file(
        "app/css/a.scss",
        "@import \"vars\";\n.a {\n  transition: opacity 1s;\n  .b {\n    margin: $gap;\n  }\n}\n",
    );
    fs.add_file("app/css/b.scss", "@import \"vars\";\n.c {\n  padding: $gap;\n}\n");

    let dyn_fs: Arc<dyn FileSystem> = fs.clone();
    let steps: Vec<Box<dyn Transform>> = vec![
        Box::new(PrefixStep::new(&["webkit".to_string()])),
        Box::new(SassStep::new(dyn_fs, ".", Vec::new())),
        Box::new(MinifyCssStep),
    ];
    let set = path_set(&["app/css/*.scss"], "build/css");

    let report = build(fs.as_ref(), Path::new("."), &set, &steps, BuildOptions::default()).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(
        normalized(&report.outputs),
        vec!["build/css/a.css".to_string(), "build/css/b.css".to_string()]
    );

    let a = fs.contents("build/css/a.css").unwrap();
    let b = fs.contents("build/css/b.css").unwrap();
    for css in [&a, &b] {
        assert!(!css.contains("@import"), "{css}");
        assert!(!css.contains('$'), "{css}");
        assert!(!css.contains("\n  "), "{css}");
    }
    assert!(a.contains("transition:opacity 1s"), "{a}");
    assert!(a.contains(".a .b{margin:4px}"), "{a}");
    assert_eq!(b.trim_end(), ".c{padding:4px}");
}

#[test]
fn empty_glob_base_builds_nothing() {
    let fs = MockFileSystem::new();
    fs.add_dir("app/asset/fonts");

    let set = path_set(&["app/asset/fonts/**/*.*"], "build/fonts");
    let report = build(&fs, Path::new("."), &set, &[], BuildOptions::default()).unwrap();

    assert!(report.is_success());
    assert!(report.outputs.is_empty());
    assert!(report.skipped.is_empty());
}
