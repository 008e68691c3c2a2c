//! Prompt text sent to models.

use crate::artifact::Artifact;
use crate::catalog::{PageProfile, GENERIC_PAGE_TYPE};
use crate::request::{AnswerValue, WizardInputs};
use std::collections::BTreeMap;
use std::fmt::Write;

const GENERATION_CONTRACT: &str = "\
Return JSON only: a React + Vite + TypeScript project.
Schema: {\"project\": {\"name\": string, \"description\": string, \"files\": {...}, \"dirents\": {...}, \"meta\": {...}}}.
File values are strings or {\"content\": \"...\"}.

Requirements:
1. React 18+ with TypeScript (.tsx components, no static HTML pages)
2. Vite with @vitejs/plugin-react
3. src/main.tsx, src/App.tsx with React Router, src/pages/*.tsx, src/components/*.tsx, src/types/*.ts
4. package.json listing react, react-dom, vite, typescript and react-router-dom
5. Functional components with typed props and working interactions
6. index.html is the entry point only
";

const USER_REQUEST_MARKER: &str = "\n\n=== USER REQUEST ===\n";

/// System part of a generation prompt.
pub fn generation_base(
    profile: Option<&PageProfile>,
    answers: &BTreeMap<String, AnswerValue>,
    wizard: Option<&WizardInputs>,
) -> String {
    let mut prompt = String::from(GENERATION_CONTRACT);

    if let Some(profile) = profile {
        let _ = write!(
            prompt,
            "\n=== PAGE TYPE: {} ({}) ===\nTarget User: {}\n\nREQUIRED CORE PAGES:\n",
            profile.name, profile.category, profile.end_user
        );
        for (i, page) in profile.core_pages.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, page);
        }
        prompt.push_str("\nREQUIRED COMPONENTS:\n");
        for (i, component) in profile.components.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}: {}", i + 1, component.name, component.description);
        }
    }

    let answered: Vec<_> = answers.iter().filter(|(_, v)| !v.is_empty()).collect();
    if !answered.is_empty() {
        prompt.push_str("\n=== USER REQUIREMENTS (from questionnaire) ===\n");
        for (key, value) in answered {
            match value {
                AnswerValue::Text(text) => {
                    let _ = writeln!(prompt, "- {}\n  Answer: {}", key, text);
                }
                AnswerValue::List(items) => {
                    let _ = writeln!(prompt, "- {}\n  Selected: {}", key, items.join(", "));
                }
                AnswerValue::Fields(fields) => {
                    let rendered = fields
                        .iter()
                        .map(|(label, v)| format!("{}: {}", label, v.render()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = writeln!(prompt, "- {}\n  Answer: {}", key, rendered);
                }
            }
        }
    }

    if let Some(wizard) = wizard {
        if let Ok(fields) = serde_json::to_string(wizard) {
            let _ = write!(prompt, "\nUSER_FIELDS:\n{}", fields);
        }
    }
    prompt
}

/// Full generation prompt: system part followed by the user's own words.
pub fn with_user_request(base: &str, request: &str) -> String {
    format!("{}{}{}", base, USER_REQUEST_MARKER, request)
}

pub fn modification(base: &Artifact, instruction: &str) -> Result<String, serde_json::Error> {
    Ok(format!(
        "Modify the project JSON. Return JSON only: {{\"project\": {{...}}}}, matching the base schema. \
Change only the requested parts and keep everything else unchanged. No markdown, code fences or explanations.\n\n\
Base: {}\nRequest: {}",
        base.manifest_json()?,
        instruction
    ))
}

fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

pub fn intent(user_text: &str) -> String {
    format!(
        "Classify intent. Return JSON only:\n\
{{ \"label\": \"webpage_build|greeting_only|chat|illegal|other\", \"explanation\": \"<1-2 sentences>\", \"confidence\": 0.0 }}\n\
webpage_build = wants a webpage; greeting_only = hello; chat = question and answer; illegal = disallowed; other = anything else. \
Treat 'what is a webpage' as chat.\n\nUser message:\n{}",
        quoted(user_text)
    )
}

pub fn page_type(user_text: &str, keys: &[String]) -> String {
    let mut options: Vec<&str> = keys.iter().map(String::as_str).collect();
    options.push(GENERIC_PAGE_TYPE);
    format!(
        "Classify page type. Return JSON only:\n\
{{ \"page_type\": \"{}\", \"explanation\": \"<1-2 sentences>\", \"confidence\": 0.0 }}\n\
Use {} when nothing fits.\n\nUser message:\n{}",
        options.join("|"),
        GENERIC_PAGE_TYPE,
        quoted(user_text)
    )
}

pub fn query_detail(user_text: &str) -> String {
    format!(
        "Analyze whether the request needs follow-up questions. Return JSON only:\n\
{{ \"needs_followup\": true, \"explanation\": \"<1-2 sentences>\", \"confidence\": 0.0 }}\n\
true = vague ('build a CRM'); false = specific about industry, audience, features and purpose.\n\nUser request:\n{}",
        quoted(user_text)
    )
}

pub fn complexity(instruction: &str) -> String {
    format!(
        "Classify modification complexity. Return JSON only:\n\
{{ \"complexity\": \"low|medium|high\", \"explanation\": \"<1-2 sentences>\", \"confidence\": 0.0 }}\n\
low = change text or colors; medium = add a component or change layout; high = refactor or major changes.\n\n\
Modification request:\n{}",
        quoted(instruction)
    )
}
