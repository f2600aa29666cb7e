//! Translation between Airtable cell values and the flat answer map.
//!
//! Airtable reports cells keyed by field id (`fldXXX`) and, for select
//! fields, as `{id, name, color}` choice objects. Locally, answers are keyed
//! by the question's stable `questionKey` and hold plain values.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::model::{Answers, Question};

/// Translate Airtable cell values into answers.
///
/// Fields that no question is bound to are dropped. Null cells are omitted
/// from the result so that merging never clears a stored answer.
pub fn map_external_values_to_answers(
    values_by_field_id: &Map<String, Value>,
    questions: &[Question],
) -> Answers {
    let keys_by_field: HashMap<&str, &str> = questions
        .iter()
        .map(|q| (q.airtable_field_id.as_str(), q.question_key.as_str()))
        .collect();

    let mut answers = Answers::new();
    for (field_id, value) in values_by_field_id {
        let Some(question_key) = keys_by_field.get(field_id.as_str()) else {
            continue;
        };
        if let Some(normalized) = normalize_value(value) {
            answers.insert((*question_key).to_string(), normalized);
        }
    }
    answers
}

/// Merge `patch` into `target`, touching only the keys present in `patch`.
pub fn merge_answers(target: &mut Answers, patch: &Answers) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// Translate submitted answers into the `{fieldId: value}` map Airtable
/// expects when creating a record.
///
/// Absent, null and empty-string answers are left out.
pub fn answers_to_external_fields(answers: &Answers, questions: &[Question]) -> Map<String, Value> {
    let mut fields = Map::new();
    for question in questions {
        match answers.get(&question.question_key) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(value) => {
                fields.insert(question.airtable_field_id.clone(), value.clone());
            }
        }
    }
    fields
}

fn normalize_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(obj) => match choice_parts(obj) {
            Some((id, name)) => Some(Value::String(name.unwrap_or(id).to_string())),
            None => Some(value.clone()),
        },
        Value::Array(items) => Some(Value::Array(
            items.iter().map(normalize_list_element).collect(),
        )),
        other => Some(other.clone()),
    }
}

fn normalize_list_element(item: &Value) -> Value {
    match item {
        Value::Object(obj) => match choice_parts(obj) {
            Some((_, Some(name))) => Value::String(name.to_string()),
            _ => item.clone(),
        },
        other => other.clone(),
    }
}

/// `(id, name)` of a choice-shaped object: a string `id` and optional string `name`.
fn choice_parts(obj: &Map<String, Value>) -> Option<(&str, Option<&str>)> {
    let id = obj.get("id")?.as_str()?;
    let name = obj.get("name").and_then(|n| n.as_str());
    Some((id, name))
}
