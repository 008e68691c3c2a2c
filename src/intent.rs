//! Model-backed classifiers with deterministic fallbacks.
//!
//! Every classifier asks the family's cheap model for a small JSON verdict through
//! the fallback controller. A failed call or unusable output never fails the flow:
//! each classifier degrades to a heuristic or a fixed default and says so in its
//! [`Classification`].

use crate::catalog::{Catalog, GENERIC_PAGE_TYPE};
use crate::prompt;
use crate::provider::{Complexity, FallbackController, ModelProviderClient};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, warn};

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(hi|hello|hey|yo|hi there|hello there)[!.]*$").expect("valid greeting pattern")
});

const QUESTION_PREFIXES: [&str; 6] = ["what is", "what's", "define", "explain", "how does", "how to"];

const BUILD_PHRASES: [&str; 7] = [
    "build a website",
    "make a website",
    "create a webpage",
    "generate a webpage",
    "build webpage",
    "make a landing page",
    "generate project",
];

const ILLEGAL_MARKERS: [&str; 6] = ["hack", "ddos", "steal", "crack", "illegal", "bypass"];

/// Minimum trimmed length of model output worth interpreting.
pub const UNCERTAINTY_MIN_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    WebpageBuild,
    GreetingOnly,
    Chat,
    Illegal,
    Other,
}

impl IntentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentLabel::WebpageBuild => "webpage_build",
            IntentLabel::GreetingOnly => "greeting_only",
            IntentLabel::Chat => "chat",
            IntentLabel::Illegal => "illegal",
            IntentLabel::Other => "other",
        }
    }

    /// Unknown labels read as `other`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "webpage_build" => IntentLabel::WebpageBuild,
            "greeting_only" => IntentLabel::GreetingOnly,
            "chat" => IntentLabel::Chat,
            "illegal" => IntentLabel::Illegal,
            _ => IntentLabel::Other,
        }
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict plus how it was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification<T> {
    pub value: T,
    pub explanation: String,
    pub confidence: f64,
    /// Model that answered; `None` when a fallback decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl<T> Classification<T> {
    fn fallback(value: T, explanation: impl Into<String>, confidence: f64) -> Self {
        Self {
            value,
            explanation: explanation.into(),
            confidence,
            model: None,
            degraded: true,
        }
    }
}

/// Keyword rules used when the model is unavailable.
pub fn heuristic_intent(text: &str) -> Classification<IntentLabel> {
    let lowered = text.trim().to_lowercase();
    let (label, explanation, confidence) = if GREETING.is_match(&lowered) {
        (IntentLabel::GreetingOnly, "Simple greeting detected", 0.9)
    } else if QUESTION_PREFIXES.iter().any(|p| lowered.starts_with(p)) && lowered.contains("webpage") {
        (IntentLabel::Chat, "Question about webpages, treated as chat", 0.8)
    } else if BUILD_PHRASES.iter().any(|p| lowered.contains(p)) {
        (IntentLabel::WebpageBuild, "Explicit webpage generation request", 0.95)
    } else if ILLEGAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        (IntentLabel::Illegal, "Potentially illegal intent detected", 0.99)
    } else {
        (IntentLabel::Chat, "Default to chat", 0.3)
    };
    Classification::fallback(label, explanation, confidence)
}

pub fn greeting_response(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    if ["hi", "hello", "hey"].iter().any(|g| lowered.contains(g)) {
        "Hello! How can I help you today? If you'd like to build a webpage, tell me what type and a short description."
    } else {
        "Hello! How can I help?"
    }
}

/// False for output too short to carry a verdict.
pub fn passes_uncertainty_gate(output: &str) -> bool {
    output.trim().chars().count() >= UNCERTAINTY_MIN_CHARS
}

/// The `{...}` span of `output` as JSON.
fn verdict_json(output: &str) -> Option<Value> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&output[start..=end]).ok()
}

fn explanation_of(verdict: &Value) -> String {
    verdict
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn confidence_of(verdict: &Value) -> f64 {
    verdict
        .get("confidence")
        .and_then(|c| c.as_f64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0.0)
}

pub struct Classifier<'a> {
    client: &'a dyn ModelProviderClient,
    controller: &'a FallbackController,
}

enum Verdict {
    Parsed(Value, String),
    Unusable(String),
    Failed(String),
}

impl<'a> Classifier<'a> {
    pub fn new(client: &'a dyn ModelProviderClient, controller: &'a FallbackController) -> Self {
        Self { client, controller }
    }

    async fn ask(&self, kind: &str, prompt: &str) -> Verdict {
        let cheap = self.client.cheap_model().to_string();
        let fallbacks = [cheap.clone(), self.client.default_model().to_string()];
        match self.controller.complete(self.client, prompt, &cheap, &fallbacks).await {
            Ok((output, model)) => {
                if !passes_uncertainty_gate(&output) {
                    warn!(classifier = kind, model = %model, "Classifier output failed the uncertainty gate");
                    return Verdict::Unusable(model);
                }
                match verdict_json(&output) {
                    Some(verdict) => {
                        debug!(classifier = kind, model = %model, "Classifier answered");
                        Verdict::Parsed(verdict, model)
                    }
                    None => {
                        warn!(classifier = kind, model = %model, "Could not parse classifier output");
                        Verdict::Unusable(model)
                    }
                }
            }
            Err(err) => {
                warn!(classifier = kind, error = %err, "Classifier call failed");
                Verdict::Failed(err.to_string())
            }
        }
    }

    pub async fn intent(&self, text: &str) -> Classification<IntentLabel> {
        match self.ask("intent", &prompt::intent(text)).await {
            Verdict::Parsed(verdict, model) => Classification {
                value: IntentLabel::parse(verdict.get("label").and_then(Value::as_str).unwrap_or("other")),
                explanation: explanation_of(&verdict),
                confidence: confidence_of(&verdict),
                model: Some(model),
                degraded: false,
            },
            Verdict::Unusable(model) => Classification {
                model: Some(model),
                ..Classification::fallback(IntentLabel::Chat, "Could not parse classifier output", 0.0)
            },
            Verdict::Failed(_) => heuristic_intent(text),
        }
    }

    /// Page type key from the catalog, or [`GENERIC_PAGE_TYPE`].
    pub async fn page_type(&self, text: &str, catalog: &dyn Catalog) -> Classification<String> {
        let keys: Vec<String> = catalog.categories().into_iter().map(|c| c.key).collect();
        let keyword_fallback = |explanation: &str| match catalog.match_keywords(text) {
            Some((key, confidence)) => Classification::fallback(key, "Matched catalog keywords", confidence),
            None => Classification::fallback(GENERIC_PAGE_TYPE.to_string(), explanation, 0.0),
        };

        match self.ask("page_type", &prompt::page_type(text, &keys)).await {
            Verdict::Parsed(verdict, model) => {
                let key = verdict
                    .get("page_type")
                    .and_then(Value::as_str)
                    .unwrap_or(GENERIC_PAGE_TYPE)
                    .trim()
                    .to_string();
                if key == GENERIC_PAGE_TYPE || catalog.is_known(&key) {
                    Classification {
                        value: key,
                        explanation: explanation_of(&verdict),
                        confidence: confidence_of(&verdict),
                        model: Some(model),
                        degraded: false,
                    }
                } else {
                    warn!(page_type = %key, "Classifier returned an unknown page type");
                    keyword_fallback("Unknown page type")
                }
            }
            Verdict::Unusable(_) => keyword_fallback("Could not parse classifier output"),
            Verdict::Failed(err) => keyword_fallback(format!("classifier error: {}", err).as_str()),
        }
    }

    /// Whether the request is too vague to build from. Defaults to `true`.
    pub async fn needs_followup(&self, text: &str) -> Classification<bool> {
        match self.ask("query_detail", &prompt::query_detail(text)).await {
            Verdict::Parsed(verdict, model) => Classification {
                value: verdict
                    .get("needs_followup")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
                explanation: explanation_of(&verdict),
                confidence: confidence_of(&verdict),
                model: Some(model),
                degraded: false,
            },
            Verdict::Unusable(_) | Verdict::Failed(_) => {
                Classification::fallback(true, "Assuming follow-up is needed", 0.0)
            }
        }
    }

    /// Modification complexity. Defaults to medium.
    pub async fn complexity(&self, instruction: &str) -> Classification<Complexity> {
        match self.ask("complexity", &prompt::complexity(instruction)).await {
            Verdict::Parsed(verdict, model) => Classification {
                value: verdict
                    .get("complexity")
                    .and_then(Value::as_str)
                    .and_then(Complexity::parse)
                    .unwrap_or_default(),
                explanation: explanation_of(&verdict),
                confidence: confidence_of(&verdict),
                model: Some(model),
                degraded: false,
            },
            Verdict::Unusable(_) | Verdict::Failed(_) => {
                Classification::fallback(Complexity::Medium, "Defaulting to medium complexity", 0.0)
            }
        }
    }
}
