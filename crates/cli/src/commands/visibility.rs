use std::path::Path;

use formsync_core::{is_visible, validate_submission, Answers, Form, Question};
use serde_json::json;

use super::read_json;
use crate::OutputFormat;

/// Show which questions of `form_path` are visible for the answers in
/// `answers_path`, and whether those answers would pass validation.
pub(crate) fn cmd_visibility(
    form_path: &Path,
    answers_path: &Path,
    output: OutputFormat,
) -> Result<(), String> {
    let form: Form = read_json(form_path)?;
    let answers: Answers = read_json(answers_path)?;

    let (visible, hidden): (Vec<_>, Vec<_>) = form
        .questions
        .iter()
        .partition(|q| is_visible(q, &answers));
    let errors = validate_submission(&form, &answers)
        .err()
        .map(|e| e.messages)
        .unwrap_or_default();

    match output {
        OutputFormat::Json => {
            let keys = |qs: &[&Question]| -> Vec<String> {
                qs.iter().map(|q| q.question_key.clone()).collect()
            };
            let report = json!({
                "visible": keys(&visible),
                "hidden": keys(&hidden),
                "valid": errors.is_empty(),
                "errors": errors,
            });
            println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
        }
        OutputFormat::Text => {
            for q in &form.questions {
                let mark = if is_visible(q, &answers) { "shown" } else { "hidden" };
                println!("{:<7} {}  {}", mark, q.question_key, q.label);
            }
            if errors.is_empty() {
                println!("answers are valid");
            } else {
                for e in &errors {
                    println!("invalid: {}", e);
                }
            }
        }
    }
    Ok(())
}
