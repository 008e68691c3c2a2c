//! Recovery holds for any well-formed project, however it is wrapped.

use kiln::artifact::{Artifact, FileEntry};
use kiln::recovery::parse_artifact;
use kiln::recovery::repair::{remove_trailing_commas, strip_comments};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn artifact_strategy() -> impl Strategy<Value = Artifact> {
    let path = "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.(ts|tsx|css|json|html)";
    // backticks would open a second fence inside the payload
    let content = "[^`]{0,60}";
    (
        proptest::option::of("[a-z]{1,10}"),
        proptest::collection::btree_map(path, content, 1..6),
        proptest::option::of("[a-z]{1,10}"),
    )
        .prop_map(|(name, files, project)| {
            let mut artifact = Artifact {
                name,
                files: files
                    .into_iter()
                    .map(|(path, text)| (path, FileEntry::Text(text)))
                    .collect::<BTreeMap<_, _>>(),
                ..Default::default()
            };
            // a plain `project` label is metadata, not a wrapper
            if let Some(project) = project {
                artifact.metadata.insert("project".to_string(), project.into());
            }
            artifact
        })
}

fn add_trailing_comma(json: &str) -> String {
    match json.rfind("\n}") {
        Some(at) => format!("{},{}", &json[..at], &json[at..]),
        None => json.to_string(),
    }
}

proptest! {
    #[test]
    fn wrapped_projects_parse_back(
        artifact in artifact_strategy(),
        fenced in any::<bool>(),
        trailing_comma in any::<bool>(),
        prose in "[A-Za-z ,.!]{0,40}",
    ) {
        let mut json = artifact.manifest_json().unwrap();
        if trailing_comma {
            json = add_trailing_comma(&json);
        }
        let text = if fenced {
            format!("{}\n```json\n{}\n```\n{}", prose, json, prose)
        } else {
            json
        };

        let parsed = parse_artifact(&text).unwrap();
        prop_assert_eq!(parsed, artifact);
    }

    #[test]
    fn parser_never_panics(text in any::<String>()) {
        let _ = parse_artifact(&text);
    }

    #[test]
    fn near_json_noise_never_panics(text in "[\\[\\]{}\",:a-z /*\\\\]{0,80}") {
        let _ = parse_artifact(&text);
    }

    #[test]
    fn repairs_leave_valid_json_alone(
        values in proptest::collection::btree_map("[a-z]{1,6}", ".{0,30}", 0..6),
    ) {
        let json = serde_json::to_string_pretty(&values).unwrap();
        prop_assert_eq!(strip_comments(&json), json.clone());
        prop_assert_eq!(remove_trailing_commas(&json), json);
    }
}
