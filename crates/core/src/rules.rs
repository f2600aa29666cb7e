//! Conditional visibility evaluation.
//!
//! The same functions back submission validation on the server and question
//! visibility in any client, so results must not depend on where they run.
//! Everything here is pure: no I/O, no clock, no randomness.

use serde_json::Value;

use crate::model::{Answers, Condition, ConditionalRuleSet, Form, Logic, Operator, Question};

/// Evaluate one condition against the current answers.
///
/// A missing or null answer makes the condition false for every operator,
/// `doesNotEqual` included. Unknown operators are false.
pub fn evaluate_condition(condition: &Condition, answers: &Answers) -> bool {
    let answer = match answers.get(&condition.question_key) {
        None | Some(Value::Null) => return false,
        Some(v) => v,
    };

    match &condition.operator {
        Operator::Equals => strict_equals(answer, &condition.value),
        Operator::DoesNotEqual => !strict_equals(answer, &condition.value),
        Operator::Contains => contains(answer, &condition.value),
        Operator::Missing | Operator::Unknown(_) => false,
    }
}

/// Decide whether a question guarded by `rules` is shown.
///
/// No rule set, or a rule set without conditions, always shows.
pub fn should_show(rules: Option<&ConditionalRuleSet>, answers: Option<&Answers>) -> bool {
    let rules = match rules {
        Some(r) if !r.conditions.is_empty() => r,
        _ => return true,
    };

    let empty = Answers::new();
    let answers = answers.unwrap_or(&empty);

    let mut results = rules
        .conditions
        .iter()
        .map(|c| evaluate_condition(c, answers));

    match rules.logic {
        Logic::Or => results.any(|r| r),
        Logic::And => results.all(|r| r),
    }
}

/// Whether a single question is shown for the given answers.
pub fn is_visible(question: &Question, answers: &Answers) -> bool {
    should_show(question.conditional_logic_rules.as_ref(), Some(answers))
}

/// The questions of `form` that are shown for `answers`, in form order.
pub fn visible_questions<'a>(form: &'a Form, answers: &Answers) -> Vec<&'a Question> {
    form.questions
        .iter()
        .filter(|q| is_visible(q, answers))
        .collect()
}

/// Type-sensitive equality with no coercion between kinds.
///
/// Numbers compare by numeric value, so `1` and `1.0` are equal. Lists and
/// objects compare by identity in the browser client, and two separately
/// decoded values are never identical, so they are never equal here.
fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => a == b,
    }
}

fn contains(answer: &Value, needle: &Value) -> bool {
    match answer {
        Value::Array(items) => items.iter().any(|item| strict_equals(item, needle)),
        Value::String(s) => s
            .to_lowercase()
            .contains(&coerce_to_string(needle).to_lowercase()),
        _ => false,
    }
}

/// String form of a rule value for substring matching.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.abs() < 1e21 {
                    format!("{}", f as i128)
                } else {
                    f.to_string()
                }
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(value: Value) -> Answers {
        value.as_object().cloned().unwrap_or_default()
    }

    fn cond(key: &str, op: &str, value: Value) -> Condition {
        Condition {
            question_key: key.to_string(),
            operator: Operator::parse(op),
            value,
        }
    }

    fn rules(logic: Logic, conditions: Vec<Condition>) -> ConditionalRuleSet {
        ConditionalRuleSet { logic, conditions }
    }

    #[test]
    fn empty_rule_sets_always_show() {
        let a = answers(json!({"x": 1}));
        assert!(should_show(None, Some(&a)));
        assert!(should_show(None, None));
        assert!(should_show(Some(&rules(Logic::And, vec![])), Some(&a)));
        assert!(should_show(Some(&rules(Logic::Or, vec![])), None));
    }

    #[test]
    fn missing_answer_is_false_for_every_operator() {
        let a = answers(json!({"other": "x", "nulled": null}));
        for op in ["equals", "doesNotEqual", "contains", "bogus"] {
            assert!(!evaluate_condition(&cond("absent", op, json!("x")), &a), "{op}");
            assert!(!evaluate_condition(&cond("nulled", op, json!("x")), &a), "{op}");
        }
    }

    #[test]
    fn equals_is_type_sensitive() {
        let a = answers(json!({"n": 5, "s": "5", "f": 5.0}));
        assert!(evaluate_condition(&cond("n", "equals", json!(5)), &a));
        assert!(!evaluate_condition(&cond("s", "equals", json!(5)), &a));
        assert!(evaluate_condition(&cond("f", "equals", json!(5)), &a));
        assert!(evaluate_condition(&cond("s", "doesNotEqual", json!(5)), &a));
        assert!(!evaluate_condition(&cond("n", "doesNotEqual", json!(5)), &a));
    }

    #[test]
    fn lists_and_objects_are_never_equal() {
        let a = answers(json!({"tags": [1], "meta": {"k": "v"}}));
        assert!(!evaluate_condition(&cond("tags", "equals", json!([1])), &a));
        assert!(evaluate_condition(&cond("tags", "doesNotEqual", json!([1])), &a));
        assert!(!evaluate_condition(&cond("meta", "equals", json!({"k": "v"})), &a));
    }

    #[test]
    fn contains_on_list_string_and_number() {
        let a = answers(json!({
            "tags": ["a", "b"],
            "greeting": "Hello World",
            "count": 42
        }));
        assert!(evaluate_condition(&cond("tags", "contains", json!("b")), &a));
        assert!(!evaluate_condition(&cond("tags", "contains", json!("c")), &a));
        assert!(evaluate_condition(&cond("greeting", "contains", json!("world")), &a));
        assert!(!evaluate_condition(&cond("count", "contains", json!(4)), &a));
    }

    #[test]
    fn contains_coerces_rule_value_to_string() {
        let a = answers(json!({"code": "Room 101", "flag": "is TRUE"}));
        assert!(evaluate_condition(&cond("code", "contains", json!(101)), &a));
        assert!(evaluate_condition(&cond("flag", "contains", json!(true)), &a));
    }

    #[test]
    fn unknown_operator_fails_closed() {
        let a = answers(json!({"x": "y"}));
        assert!(!evaluate_condition(&cond("x", "startsWith", json!("y")), &a));
        let missing = Condition {
            question_key: "x".into(),
            operator: Operator::Missing,
            value: json!("y"),
        };
        assert!(!evaluate_condition(&missing, &a));
    }

    #[test]
    fn or_and_combinators() {
        let a = answers(json!({"x": "yes"}));
        let f = cond("x", "equals", json!("no"));
        let t = cond("x", "equals", json!("yes"));
        assert!(should_show(Some(&rules(Logic::Or, vec![f.clone(), t.clone()])), Some(&a)));
        assert!(!should_show(Some(&rules(Logic::And, vec![f, t])), Some(&a)));
    }

    #[test]
    fn absent_answers_hide_conditional_questions() {
        let r = rules(Logic::And, vec![cond("x", "doesNotEqual", json!("no"))]);
        assert!(!should_show(Some(&r), None));
    }

    #[test]
    fn visible_questions_preserves_form_order() {
        let form: Form = serde_json::from_value(json!({
            "id": "f1",
            "userId": "u1",
            "formName": "Signup",
            "baseId": "app1",
            "tableId": "tbl1",
            "questions": [
                {"questionKey": "role", "airtableFieldId": "fld1", "type": "singleSelect"},
                {
                    "questionKey": "github",
                    "airtableFieldId": "fld2",
                    "type": "singleLineText",
                    "conditionalLogicRules": {
                        "logic": "AND",
                        "conditions": [{"questionKey": "role", "operator": "equals", "value": "Engineer"}]
                    }
                },
                {"questionKey": "notes", "airtableFieldId": "fld3", "type": "multilineText"}
            ]
        }))
        .unwrap();

        let shown: Vec<_> = visible_questions(&form, &answers(json!({"role": "Designer"})))
            .iter()
            .map(|q| q.question_key.as_str())
            .collect();
        assert_eq!(shown, vec!["role", "notes"]);

        let shown: Vec<_> = visible_questions(&form, &answers(json!({"role": "Engineer"})))
            .iter()
            .map(|q| q.question_key.as_str())
            .collect();
        assert_eq!(shown, vec!["role", "github", "notes"]);
    }
}
