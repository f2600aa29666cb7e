//! Submission validation.
//!
//! A question hidden by its visibility rules is neither required nor type
//! checked, so a client and the server agree on what must be filled in.

use serde_json::Value;

use crate::model::{Answers, Form, Question, QuestionType};
use crate::rules;

/// Validation failures for one submission, one message per offending question.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("submission failed validation: {}", .messages.join("; "))]
pub struct ValidationErrors {
    pub messages: Vec<String>,
}

/// Check required answers and answer shapes against the form's questions.
pub fn validate_submission(form: &Form, answers: &Answers) -> Result<(), ValidationErrors> {
    let mut messages = Vec::new();

    for question in &form.questions {
        if !rules::is_visible(question, answers) {
            continue;
        }

        let answer = answers.get(&question.question_key);
        if is_blank(answer) {
            if question.required {
                messages.push(format!("Question {} is required", question.question_key));
            }
            continue;
        }

        if let Some(value) = answer {
            if let Some(message) = check_shape(question, value) {
                messages.push(message);
            }
        }
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors { messages })
    }
}

fn is_blank(answer: Option<&Value>) -> bool {
    match answer {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn check_shape(question: &Question, value: &Value) -> Option<String> {
    let key = &question.question_key;
    match question.kind {
        QuestionType::SingleLineText | QuestionType::MultilineText => {
            (!value.is_string()).then(|| format!("Question {key} should be a text"))
        }
        QuestionType::SingleSelect => match value.as_str() {
            None => Some(format!("Question {key} should be a single selection")),
            Some(choice) if !option_allowed(question, choice) => {
                Some(format!("Question {key} has an unknown option '{choice}'"))
            }
            Some(_) => None,
        },
        QuestionType::MultipleSelects => match value.as_array() {
            None => Some(format!("Question {key} should be a array of selections")),
            Some(items) => items
                .iter()
                .find(|item| !item.as_str().is_some_and(|c| option_allowed(question, c)))
                .map(|item| format!("Question {key} has an unknown option {item}")),
        },
        QuestionType::MultipleAttachments => {
            (!value.is_array()).then(|| format!("Question {key} should be a array of attachments"))
        }
    }
}

/// Options are only enforced when the question declares any.
fn option_allowed(question: &Question, choice: &str) -> bool {
    match &question.options {
        Some(options) if !options.is_empty() => options.iter().any(|o| o.name == choice),
        _ => true,
    }
}
