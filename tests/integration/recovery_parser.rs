//! Recovering projects from realistic model output.

use kiln::artifact::FileEntry;
use kiln::recovery::parse_artifact;

#[test]
fn fenced_output_with_prose_around_it() {
    let text = "Sure! Here is your landing page.\n\n```json\n{\"project\": {\"name\": \"bakery\", \"files\": {\"index.html\": \"<h1>Bread</h1>\"}}}\n```\n\nLet me know if you want changes.";
    let artifact = parse_artifact(text).unwrap();
    assert_eq!(artifact.name.as_deref(), Some("bakery"));
    assert_eq!(artifact.files["index.html"].text(), "<h1>Bread</h1>");
}

#[test]
fn comments_and_trailing_commas_are_repaired() {
    let text = r#"```json
{
  // generated
  "project": {
    "files": {
      "src/App.tsx": "const url = 'https://example.com';", /* entry */
      "src/main.tsx": "import App from './App';",
    },
  },
}
```"#;
    let artifact = parse_artifact(text).unwrap();
    assert_eq!(artifact.files_count(), 2);
    // the `//` inside a string literal survives
    assert!(artifact.files["src/App.tsx"].text().contains("https://example.com"));
}

#[test]
fn bare_and_listed_shapes_are_accepted() {
    let bare = r#"{"files": {"a.css": "body {}"}, "dirents": ["a.css"]}"#;
    let artifact = parse_artifact(bare).unwrap();
    assert!(artifact.metadata.contains_key("dirents"));

    let listed = r#"[{"note": "x"}, {"project": {"files": {"b.js": "1"}}}]"#;
    assert!(parse_artifact(listed).unwrap().files.contains_key("b.js"));
}

#[test]
fn stray_items_after_a_closed_array_are_moved_back() {
    let text = r#"{"project": {"files": {"a.ts": "x"}, "dirents": ["src", "public"], "assets"}}"#;
    let artifact = parse_artifact(text).unwrap();
    assert_eq!(
        artifact.metadata["dirents"],
        serde_json::json!(["src", "public", "assets"])
    );
}

#[test]
fn record_entries_keep_their_language() {
    let text = r#"{"project": {"files": {"styles/site": {"content": "body {}", "language": "css"}}}}"#;
    let artifact = parse_artifact(text).unwrap();
    assert!(matches!(artifact.files["styles/site"], FileEntry::Record { .. }));
    assert_eq!(artifact.language_of("styles/site").as_deref(), Some("css"));
}

#[test]
fn syntax_failures_carry_position() {
    let text = "{\n  \"project\": {\n    \"files\": {\n      \"a.ts\": \"x\"\n      \"b.ts\": \"y\"\n    }\n  }\n}";
    let failure = parse_artifact(text).unwrap_err();
    assert_eq!(failure.line, 5);
    assert!(failure.error_line.contains("b.ts"));
    assert!(!failure.context.is_empty());
    assert!(failure.to_string().contains("line 5"));
}

#[test]
fn shape_failures_are_not_positional() {
    let failure = parse_artifact(r#"{"project": {"name": "no files"}}"#).unwrap_err();
    assert_eq!(failure.line, 0);
    assert!(failure.reason.contains("files"));
}

#[test]
fn unsafe_paths_fail_parsing() {
    let failure = parse_artifact(r#"{"project": {"files": {"../../etc/passwd": "x"}}}"#).unwrap_err();
    assert!(failure.reason.contains("escapes"));
}

#[test]
fn plain_prose_is_a_failure() {
    let failure = parse_artifact("I'm sorry, I can't help with that.").unwrap_err();
    assert_eq!(failure.reason, "no JSON value found in model output");
}
