// tests/transforms.rs

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use serde_json::json;

use assetdag::fs::{FileSystem, MockFileSystem};
use assetdag::pipeline::Asset;
use assetdag::transforms::include::Basepath;
use assetdag::transforms::minify_css::minify_css;
use assetdag::transforms::minify_js::minify_js;
use assetdag::transforms::{
    ImageStep, IncludeStep, MinifyJsStep, PrefixStep, SassStep, StepOutput,
    Transform,
};

fn asset(path: &str, text: &str) -> Asset {
    let relative = PathBuf::from(path).file_name().map(PathBuf::from).unwrap_or_default();
    Asset::new(path, relative, text.as_bytes().to_vec())
}

fn apply_text(step: &dyn Transform, asset: &Asset) -> String {
    let out = step.apply(asset).unwrap().expect("step produced output");
    String::from_utf8(out.contents).unwrap()
}

fn vendors() -> Vec<String> {
    vec!["webkit".into(), "moz".into(), "ms".into()]
}

#[test]
fn css_minify_is_idempotent() {
    let src = "/* header */\n.a {\n  color: #ff0000;\n  margin: 0px 0px;\n}\n\n.b { padding: 1px }\n";
    let (once, _) = minify_css("a.css", src).unwrap();
    let (twice, _) = minify_css("a.css", &once).unwrap();

    assert_eq!(once, twice);
    assert!(!once.contains('\n'));
    assert!(once.contains(".a{"), "{once}");
}

#[test]
fn js_minify_is_idempotent_and_keeps_semantics_sensitive_breaks() {
    let src = "/*! keep me */\n// drop me\nvar a = 1\nvar b = a\n++b\nreturn /x/g.test(s) ? 'y' : \"n\";\nvar t = `a ${b} c`;\n";
    let (once, _) = minify_js("a.js", src).unwrap();
    let (twice, _) = minify_js("a.js", &once).unwrap();

    assert_eq!(once, twice);
    assert!(once.starts_with("/*! keep me */\n"), "{once}");
    assert!(!once.contains("drop me"));
    assert!(once.contains("var a=1\nvar b=a\n++b"), "{once}");
    assert!(once.contains("/x/g.test(s)?'y':\"n\""), "{once}");
    assert!(once.contains("`a ${b} c`"), "{once}");
}

#[test]
fn js_minify_keeps_spaces_between_words() {
    let (out, _) = minify_js("a.js", "if (x) { return typeof y; } else { throw new Error('e'); }").unwrap();
    assert_eq!(out, "if(x){return typeof y;}else{throw new Error('e');}");

    let step = MinifyJsStep;
    let a = asset("app/js/a.js", "let  x  =  1 ;");
    assert_eq!(apply_text(&step, &a), "let x=1;");
}

#[test]
fn prefix_inserts_vendor_declarations_once() {
    let step = PrefixStep::new(&vendors());
    let src = ".a {\n  transform: rotate(1deg);\n  color: red;\n}\n";
    let once = apply_text(&step, &asset("a.css", src));

    assert_eq!(
        once,
        ".a {\n  -webkit-transform: rotate(1deg);\n  -moz-transform: rotate(1deg);\n  -ms-transform: rotate(1deg);\n  transform: rotate(1deg);\n  color: red;\n}\n"
    );

    let twice = apply_text(&step, &asset("a.css", &once));
    assert_eq!(once, twice);
}

#[test]
fn prefix_handles_transitions_and_display_values() {
    let step = PrefixStep::new(&["webkit".to_string()]);
    let src = ".a {\n  transition: transform 1s;\n  display: flex;\n}\n";
    let out = apply_text(&step, &asset("a.scss", src));

    assert!(out.contains("  -webkit-transition: -webkit-transform 1s;\n  transition: transform 1s;"), "{out}");
    assert!(out.contains("  display: -webkit-flex;\n  display: flex;"), "{out}");
    assert!(!out.contains("-moz-"));
    assert!(!out.contains("-ms-"));
}

#[test]
fn sass_compiles_variables_mixins_and_media() {
    let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
    let step = SassStep::new(fs, ".", Vec::new());
    let src = r#"$pad: 4px !default;
@mixin box($color, $border: none) {
  color: $color;
  border: $border;
  @content;
}
.card {
  @include box(red, $border: 1px solid);
  &:hover { color: blue; }
  @media (max-width: 600px) {
    padding: $pad;
  }
}
"#;
    let out = apply_text(&step, &asset("app/css/card.scss", src));

    assert!(out.contains(".card {\n  color: red;\n  border: 1px solid;\n}"), "{out}");
    assert!(out.contains(".card:hover {\n  color: blue;\n}"), "{out}");
    assert!(out.contains("@media (max-width: 600px) {\n  .card {\n    padding: 4px;\n  }\n}"), "{out}");
}

#[test]
fn sass_renames_output_and_skips_partials() {
    let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
    let step = SassStep::new(fs, ".", Vec::new());

    let out = step.apply(&asset("app/css/site.scss", "a { b: c; }")).unwrap().unwrap();
    assert_eq!(out.extension.as_deref(), Some("css"));
    assert!(step.apply(&asset("app/css/_part.scss", "a { b: c; }")).unwrap().is_none());
}

#[test]
fn sass_rejects_control_directives_and_missing_imports() {
    let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
    let step = SassStep::new(fs, ".", Vec::new());

    let err = step
        .apply(&asset("app/css/a.scss", "@each $c in red, blue { .x { color: $c; } }"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("each"), "{err:#}");

    assert!(step.apply(&asset("app/css/b.scss", "@import \"nowhere\";")).is_err());
}

#[test]
fn sass_refuses_values_it_cannot_compute() {
    let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
    let step = SassStep::new(fs, ".", Vec::new());

    let computed = [
        "$w: 960px;\n.a { width: $w / 2; }",
        "$w: 960px;\n.a { width: $w/2; }",
        "$w: 960px;\n$half: $w/2;\n.a { width: $half; }",
        "$gap: 4px;\n.a { margin: $gap * 2; }",
        "$gap: 4px;\n.a { margin: $gap + 1px; }",
        ".a { margin: 10px - 2px; }",
        "$c: #336699;\n.a { color: darken($c, 10%); }",
        ".a { width: percentage(0.5); }",
        "$c: #336699;\n.a { background: rgba($c, 0.5); }",
        "@mixin w($n) { width: $n; }\n.a { @include w(2px * 3); }",
    ];
    for src in computed {
        let err = step.apply(&asset("app/css/a.scss", src)).unwrap_err();
        assert!(format!("{err:#}").contains("needs Sass evaluation"), "{src}: {err:#}");
    }

    // Plain CSS syntax that merely looks like arithmetic still compiles.
    let src = r#"$size: 12px;
$stack: "Helvetica Neue", sans-serif;
.a {
  font: #{$size}/1.5 $stack;
  grid-area: 1 / 2 / 3 / 4;
  width: calc(100% - #{$size} * 2);
  margin: 0 -4px;
  transform: translate(-50%, -50%);
  background: url(img/a+b.png) rgba(0, 0, 0, 0.5);
  filter: saturate(2);
  content: "a - b * c";
  unicode-range: U+0025-00FF;
}
"#;
    let out = apply_text(&step, &asset("app/css/b.scss", src));
    assert!(out.contains("font: 12px/1.5 \"Helvetica Neue\", sans-serif;"), "{out}");
    assert!(out.contains("width: calc(100% - 12px * 2);"), "{out}");
    assert!(out.contains("grid-area: 1 / 2 / 3 / 4;"), "{out}");
}

#[test]
fn include_expands_nested_files_and_variables() {
    let mock = Arc::new(MockFileSystem::new());
    mock.add_file("app/partials/header.html", "<h1>@@title</h1>@@include('nav.html')");
    mock.add_file("app/partials/nav.html", "<nav>@@site.name</nav>");

    let fs: Arc<dyn FileSystem> = mock.clone();
    let step = IncludeStep::new(
        fs,
        ".",
        "@@",
        Basepath::Dir(PathBuf::from("app/partials")),
        json!({"site": {"name": "Demo"}, "title": "Default"}),
    );

    // Paths resolve against the configured dir, also for nested includes.
    let nested = IncludeStep::new(
        mock.clone(),
        ".",
        "@@",
        Basepath::File,
        json!({"site": {"name": "Demo"}}),
    );

    let page = "<body>@@include('header.html', {\"title\": \"Home\"})<p>@@unknown @@site.name</p></body>";
    let out = apply_text(&step, &asset("app/index.html", page));
    assert_eq!(out, "<body><h1>Home</h1><nav>Demo</nav><p>@@unknown Demo</p></body>");

    let out = apply_text(&nested, &asset("app/partials/header.html", "@@include('nav.html')!"));
    assert_eq!(out, "<nav>Demo</nav>!");
}

#[test]
fn include_reports_missing_files_and_loops() {
    let mock = Arc::new(MockFileSystem::new());
    mock.add_file("app/loop.html", "@@include('loop.html')");
    let step = IncludeStep::new(mock.clone(), ".", "@@", Basepath::File, json!({}));

    let err = step.apply(&asset("app/index.html", "@@include('missing.html')")).unwrap_err();
    assert!(format!("{err:#}").contains("missing.html"));

    let err = step.apply(&asset("app/loop.html", "@@include('loop.html')")).unwrap_err();
    assert!(format!("{err:#}").contains("nested deeper"), "{err:#}");
}

fn noisy_png() -> Vec<u8> {
    let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
    let mut buf = Vec::new();
    PngEncoder::new_with_quality(Cursor::new(&mut buf), CompressionType::Fast, FilterType::NoFilter)
        .write_image(img.as_raw(), 32, 32, ColorType::Rgb8)
        .unwrap();
    buf
}

#[test]
fn image_step_never_grows_files_and_keeps_pixels() {
    let step = ImageStep::new(85);
    let original = noisy_png();
    let input = Asset::new("app/img/a.png", "a.png", original.clone());

    let StepOutput { contents, .. } = step.apply(&input).unwrap().unwrap();
    assert!(contents.len() <= original.len());

    let before = image::load_from_memory(&original).unwrap().to_rgb8();
    let after = image::load_from_memory(&contents).unwrap().to_rgb8();
    assert_eq!(before, after);
}

#[test]
fn image_step_passes_other_files_through() {
    let step = ImageStep::new(85);
    let svg = Asset::new("app/img/logo.svg", "logo.svg", b"<svg/>".to_vec());
    let out = step.apply(&svg).unwrap().unwrap();
    assert_eq!(out.contents, b"<svg/>".to_vec());

    let broken = Asset::new("app/img/bad.png", "bad.png", b"not a png".to_vec());
    assert!(step.apply(&broken).is_err());
}
