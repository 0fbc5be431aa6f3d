// tests/sourcemap_chain.rs

use std::path::Path;
use std::sync::Arc;

use assetdag::fs::{FileSystem, MockFileSystem};
use assetdag::pipeline::{Asset, BuildOptions, MappedWriter, PathSet, Position, SourceMap, build};
use assetdag::transforms::minify_js::minify_js;
use assetdag::transforms::{MinifyJsStep, PrefixStep, SassStep, Transform};

#[test]
fn identity_map_encodes_one_segment_per_line() {
    let map = SourceMap::identity("a.js", "one\ntwo\nthree\n");
    assert_eq!(map.mappings().len(), 3);

    let json: serde_json::Value = serde_json::from_str(&map.to_json("a.min.js")).unwrap();
    assert_eq!(json["mappings"], "AAAA;AACA;AACA");
    assert_eq!(json["sources"], serde_json::json!(["a.js"]));
    assert_eq!(json["file"], "a.min.js");
}

#[test]
fn mappings_use_relative_deltas_across_sources_and_blank_lines() {
    let mut map = SourceMap::new("a.scss");
    let import = map.add_source("_b.scss");
    map.add_mapping(Position::new(0, 0), Position::new(0, 0), 0);
    map.add_mapping(Position::new(0, 5), Position::new(10, 3), import);
    map.add_mapping(Position::new(2, 1), Position::new(1, 0), 0);

    let json: serde_json::Value = serde_json::from_str(&map.to_json("a.css")).unwrap();
    assert_eq!(json["mappings"], "AAAA,KCUG;;CDTH");
    assert_eq!(json["sources"], serde_json::json!(["a.scss", "_b.scss"]));
    assert_eq!(json["version"], 3);
}

#[test]
fn lookup_carries_the_column_offset_within_a_segment() {
    let mut writer = MappedWriter::new("in.txt");
    writer.push_generated(">>");
    writer.push_from("hello\nworld", 0, Position::new(4, 2));
    let (text, map) = writer.finish();

    assert_eq!(text, ">>hello\nworld");
    assert_eq!(map.lookup(Position::new(0, 1)), None);
    assert_eq!(map.lookup(Position::new(0, 4)), Some((0, Position::new(4, 4))));
    assert_eq!(map.lookup(Position::new(1, 3)), Some((0, Position::new(5, 3))));
}

#[test]
fn minified_tokens_point_back_to_their_original_position() {
    let src = "function add(a, b) {\n  return a + b;\n}\n";
    let (out, map) = minify_js("add.js", src).unwrap();

    assert_eq!(out, "function add(a,b){return a+b;}");
    let col = out.find("return").unwrap() as u32;
    assert_eq!(map.lookup(Position::new(0, col)), Some((0, Position::new(1, 2))));
}

#[test]
fn composing_two_steps_resolves_to_the_first_input() {
    // Step one moves every line down by two (e.g. a banner was prepended).
    let mut first = SourceMap::new("orig.js");
    first.add_mapping(Position::new(2, 0), Position::new(0, 0), 0);
    first.add_mapping(Position::new(3, 0), Position::new(1, 0), 0);

    // Step two joins lines two and three into line zero.
    let mut second = SourceMap::new("intermediate.js");
    second.add_mapping(Position::new(0, 0), Position::new(2, 0), 0);
    second.add_mapping(Position::new(0, 10), Position::new(3, 4), 0);
    // Points into the banner, which has no original.
    second.add_mapping(Position::new(0, 20), Position::new(0, 0), 0);

    let chained = second.compose(&first);
    assert_eq!(chained.sources(), ["orig.js".to_string()]);
    assert_eq!(chained.mappings().len(), 2);
    assert_eq!(chained.lookup(Position::new(0, 0)), Some((0, Position::new(0, 0))));
    assert_eq!(chained.lookup(Position::new(0, 12)), Some((0, Position::new(1, 6))));
}

#[test]
fn composing_keeps_extra_sources_of_the_later_step() {
    let previous = SourceMap::identity("page.html", "a\nb\n");

    let mut later = SourceMap::new("page.html");
    let header = later.add_source("header.html");
    later.add_mapping(Position::new(0, 0), Position::new(0, 0), header);
    later.add_mapping(Position::new(1, 0), Position::new(1, 0), 0);

    let chained = later.compose(&previous);
    assert_eq!(chained.sources(), ["page.html".to_string(), "header.html".to_string()]);
    assert_eq!(chained.lookup(Position::new(0, 0)), Some((1, Position::new(0, 0))));
    assert_eq!(chained.lookup(Position::new(1, 0)), Some((0, Position::new(1, 0))));
}

#[test]
fn built_map_names_the_project_relative_source_and_imports() {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("app/css/_colors.scss", "$fg: #111;\n.note {\n  color: $fg;\n}\n");
    fs.add_file("app/css/site.scss", "@import \"colors\";\nbody {\n  margin: 0;\n}\n");

    let dyn_fs: Arc<dyn FileSystem> = fs.clone();
    let steps: Vec<Box<dyn Transform>> = vec![Box::new(SassStep::new(dyn_fs, ".", Vec::new()))];
    let set = PathSet {
        name: "style".to_string(),
        src: vec!["app/css/*.scss".to_string()],
        exclude: Vec::new(),
        template: None,
        dest: "build/css".into(),
    };

    let report = build(fs.as_ref(), Path::new("."), &set, &steps, BuildOptions { sourcemaps: true }).unwrap();
    assert!(report.is_success(), "{:?}", report.failures);

    let map: serde_json::Value =
        serde_json::from_str(&fs.contents("build/css/site.css.map").unwrap()).unwrap();
    assert_eq!(map["file"], "site.css");
    assert_eq!(
        map["sources"],
        serde_json::json!(["app/css/site.scss", "app/css/_colors.scss"])
    );
    let css = fs.contents("build/css/site.css").unwrap();
    assert!(css.ends_with("/*# sourceMappingURL=site.css.map */\n"));
}

#[test]
fn js_pipeline_map_survives_two_minify_passes() {
    let fs = MockFileSystem::new();
    // No semicolons: the line break between the statements must survive.
    fs.add_file("app/js/main.js", "var total = 0\n\nvar count = 1\n");

    let steps: Vec<Box<dyn Transform>> = vec![Box::new(MinifyJsStep), Box::new(MinifyJsStep)];
    let set = PathSet {
        name: "js".to_string(),
        src: vec!["app/js/*.js".to_string()],
        exclude: Vec::new(),
        template: None,
        dest: "build/js".into(),
    };
    build(&fs, Path::new("."), &set, &steps, BuildOptions { sourcemaps: true }).unwrap();

    let js = fs.contents("build/js/main.js").unwrap();
    assert!(js.starts_with("var total=0\nvar count=1\n"), "{js}");
    assert!(js.ends_with("//# sourceMappingURL=main.js.map\n"));

    let map: serde_json::Value =
        serde_json::from_str(&fs.contents("build/js/main.js.map").unwrap()).unwrap();
    assert_eq!(map["sources"], serde_json::json!(["app/js/main.js"]));
    let mappings = map["mappings"].as_str().unwrap();
    assert_eq!(mappings.split(';').count(), 2);
}

#[test]
fn chained_map_points_back_through_prefix_and_nesting() {
    let fs: Arc<dyn FileSystem> = Arc::new(MockFileSystem::new());
    let scss = ".box {\n  transform: none;\n  .inner {\n    margin: 0;\n  }\n}\n";
    let input = Asset::new("app/css/box.scss", "box.scss", scss.as_bytes().to_vec());

    let prefix = PrefixStep::new(&["webkit".to_string()]);
    let prefixed = prefix.apply(&input).unwrap().unwrap();
    let prefixed_text = String::from_utf8(prefixed.contents.clone()).unwrap();
    assert!(prefixed_text.contains("-webkit-transform: none;"));

    let sass = SassStep::new(fs, ".", Vec::new());
    let mid = Asset::new("app/css/box.scss", "box.scss", prefixed.contents);
    let compiled = sass.apply(&mid).unwrap().unwrap();
    let css = String::from_utf8(compiled.contents).unwrap();

    let chain = compiled.map.unwrap().compose(&prefixed.map.unwrap());

    // `margin: 0;` sits on line 3 of the SCSS; after prefixing and
    // flattening it has moved.
    let (line, text) = css
        .lines()
        .enumerate()
        .find(|(_, l)| l.contains("margin: 0;"))
        .unwrap();
    let column = text.find("margin").unwrap() as u32;
    assert_ne!(line, 3);

    let (source, original) = chain.lookup(Position::new(line as u32, column)).unwrap();
    assert_eq!(source, 0);
    assert_eq!(original, Position::new(3, 4));

    // The inserted vendor line maps to the declaration it came from.
    let (line, text) = css
        .lines()
        .enumerate()
        .find(|(_, l)| l.contains("-webkit-transform"))
        .unwrap();
    let column = text.find('-').unwrap() as u32;
    let (_, original) = chain.lookup(Position::new(line as u32, column)).unwrap();
    assert_eq!(original.line, 1);
}
