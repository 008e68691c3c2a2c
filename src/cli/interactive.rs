//! Interactive chat: renders streamed events and prompts for pending questions.

use crate::api::KilnApi;
use crate::cli::presentation::render_event;
use crate::error::ApiError;
use crate::events::{EventStream, EventType, Question, QuestionKind};
use crate::provider::ModelFamily;
use crate::request::{
    new_session_id, FieldValue, FormAnswer, MessageRequest, QuestionResponse, ResponseContent,
    StreamRequest,
};
use dialoguer::{Input, MultiSelect, Select};
use futures::StreamExt;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// What one streamed turn left behind.
#[derive(Debug, Default)]
struct Turn {
    terminal: Option<EventType>,
    questions: Vec<Question>,
}

fn input_error(e: dialoguer::Error) -> ApiError {
    ApiError::ConfigError(format!("Failed to get user input: {}", e))
}

async fn render_stream(mut stream: EventStream) -> Turn {
    let mut turn = Turn::default();
    while let Some(envelope) = stream.next().await {
        if let Some(line) = render_event(&envelope) {
            println!("{}", line);
        }
        match envelope.event_type {
            EventType::ChatQuestion | EventType::ChatSuggestion => {
                match serde_json::from_value::<Question>(envelope.payload.clone()) {
                    Ok(question) => turn.questions.push(question),
                    Err(e) => warn!(error = %e, "Unreadable question payload"),
                }
            }
            t if t.is_terminal() => turn.terminal = Some(t),
            _ => {}
        }
    }
    turn
}

fn skipped(question: &Question) -> QuestionResponse {
    QuestionResponse {
        q_id: question.q_id.clone(),
        q_type: question.kind.as_str().to_string(),
        content: ResponseContent {
            label: question.label.clone(),
            ..Default::default()
        },
        skipped: true,
    }
}

fn ask(question: &Question) -> Result<QuestionResponse, ApiError> {
    let mut response = skipped(question);
    response.skipped = false;
    let options = &question.content.options;
    match question.kind {
        QuestionKind::Mcq => {
            let mut items: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
            if question.is_skippable {
                items.push("Skip");
            }
            let picked = Select::new()
                .with_prompt(&question.label)
                .items(&items)
                .default(0)
                .interact()
                .map_err(input_error)?;
            match options.get(picked) {
                Some(option) => response.content.selected_option = Some(option.id.clone()),
                None => return Ok(skipped(question)),
            }
        }
        QuestionKind::MultiSelect => {
            let items: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
            let picked = MultiSelect::new()
                .with_prompt(&question.label)
                .items(&items)
                .interact()
                .map_err(input_error)?;
            if picked.is_empty() && question.is_skippable {
                return Ok(skipped(question));
            }
            response.content.selected_options =
                Some(picked.into_iter().map(|i| options[i].id.clone()).collect());
        }
        QuestionKind::OpenEnded => {
            let answer: String = Input::new()
                .with_prompt(&question.label)
                .allow_empty(question.is_skippable)
                .interact_text()
                .map_err(input_error)?;
            if answer.trim().is_empty() {
                return Ok(skipped(question));
            }
            response.content.answer = Some(answer);
        }
        QuestionKind::Form => {
            let mut answers = Vec::new();
            for field in &question.content.fields {
                let value: String = Input::new()
                    .with_prompt(&field.label)
                    .allow_empty(true)
                    .interact_text()
                    .map_err(input_error)?;
                if !value.trim().is_empty() {
                    answers.push(FormAnswer {
                        label: field.label.clone(),
                        answer: FieldValue::Text(value),
                    });
                }
            }
            if answers.is_empty() && question.is_skippable {
                return Ok(skipped(question));
            }
            response.content.answers = Some(answers);
        }
    }
    Ok(response)
}

/// An open-ended answer must travel alone, so when it is mixed with other
/// responses its text moves into `user_input`.
fn fold_open_ended(mut responses: Vec<QuestionResponse>) -> (Vec<QuestionResponse>, Option<String>) {
    let open = QuestionKind::OpenEnded.as_str();
    if responses.len() <= 1 {
        return (responses, None);
    }
    let keep_first_open = responses.iter().all(|r| r.q_type == open);
    let mut extra = Vec::new();
    let mut kept_open = false;
    responses.retain(|r| {
        if r.q_type != open {
            return true;
        }
        if keep_first_open && !kept_open {
            kept_open = true;
            return true;
        }
        if let Some(answer) = r.content.answer.as_ref().filter(|a| !a.trim().is_empty()) {
            extra.push(format!("{}: {}", r.content.label, answer.trim()));
        }
        false
    });
    let extra = (!extra.is_empty()).then(|| extra.join("\n"));
    (responses, extra)
}

/// Chat until the user enters nothing, `exit` or `quit`.
pub fn run_chat(
    runtime: &Runtime,
    api: &KilnApi,
    family: Option<ModelFamily>,
    project_id: Option<String>,
) -> Result<String, ApiError> {
    let session_id = new_session_id();
    let project_id = project_id.unwrap_or_else(new_session_id);
    let orchestrator = api.orchestrator();
    let mut turns = 0usize;

    loop {
        let line: String = Input::new()
            .with_prompt("you")
            .allow_empty(true)
            .interact_text()
            .map_err(input_error)?;
        let line = line.trim();
        if line.is_empty() || matches!(line, "exit" | "quit") {
            break;
        }

        let request = StreamRequest {
            session_id: Some(session_id.clone()),
            model_family: family,
            user_input: Some(line.to_string()),
            project_id: Some(project_id.clone()),
            ..Default::default()
        };
        let mut turn = runtime.block_on(async { render_stream(orchestrator.stream(request)).await });

        while turn.terminal == Some(EventType::StreamAwaitInput) && !turn.questions.is_empty() {
            let responses = turn
                .questions
                .iter()
                .map(ask)
                .collect::<Result<Vec<_>, _>>()?;
            let (responses, user_input) = fold_open_ended(responses);
            let message = MessageRequest {
                project_id: project_id.clone(),
                chat_id: session_id.clone(),
                responses,
                user_input,
            };
            debug!(responses = message.responses.len(), "Answering pending questions");
            turn = runtime.block_on(async {
                let stream = orchestrator.resume(message)?;
                Ok::<_, ApiError>(render_stream(stream).await)
            })?;
        }
        turns += 1;
    }

    Ok(format!(
        "Conversation ended after {} turn(s). Session: {}",
        turns, session_id
    ))
}
