//! Form, question and response types.
//!
//! Wire names are camelCase to match the JSON documents exchanged with the
//! browser client and stored by persistence backends.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Flat answer map keyed by `questionKey`.
pub type Answers = serde_json::Map<String, serde_json::Value>;

// ──────────────────────────────────────────────
// Questions
// ──────────────────────────────────────────────

/// The closed set of Airtable field types a question may be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionType {
    SingleLineText,
    MultilineText,
    SingleSelect,
    MultipleSelects,
    MultipleAttachments,
}

impl QuestionType {
    /// Airtable field type name (e.g. `"singleSelect"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleLineText => "singleLineText",
            QuestionType::MultilineText => "multilineText",
            QuestionType::SingleSelect => "singleSelect",
            QuestionType::MultipleSelects => "multipleSelects",
            QuestionType::MultipleAttachments => "multipleAttachments",
        }
    }

    /// Parse an Airtable field type name. Returns `None` for unsupported types.
    pub fn from_airtable(name: &str) -> Option<Self> {
        match name {
            "singleLineText" => Some(QuestionType::SingleLineText),
            "multilineText" => Some(QuestionType::MultilineText),
            "singleSelect" => Some(QuestionType::SingleSelect),
            "multipleSelects" => Some(QuestionType::MultipleSelects),
            "multipleAttachments" => Some(QuestionType::MultipleAttachments),
            _ => None,
        }
    }

    /// Whether answers to this question are lists.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            QuestionType::MultipleSelects | QuestionType::MultipleAttachments
        )
    }
}

/// A selectable option for select-type questions.
///
/// The Airtable field catalog returns choices either as bare strings or as
/// `{id, name, color}` objects. Both deserialize into this one shape; a bare
/// string becomes a nameless-id option whose `name` is the string itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawOption")]
pub struct SelectOption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Plain(String),
    Choice {
        id: Option<String>,
        name: Option<String>,
    },
}

impl From<RawOption> for SelectOption {
    fn from(raw: RawOption) -> Self {
        match raw {
            RawOption::Plain(name) => SelectOption { id: None, name },
            RawOption::Choice { id, name } => {
                let name = name.or_else(|| id.clone()).unwrap_or_default();
                SelectOption { id, name }
            }
        }
    }
}

/// One question of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Stable internal key, immutable once created.
    pub question_key: String,
    pub airtable_field_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_logic_rules: Option<ConditionalRuleSet>,
}

// ──────────────────────────────────────────────
// Conditional rules
// ──────────────────────────────────────────────

/// How the conditions of a rule set are combined.
///
/// Anything other than `"OR"` (including a missing or null value) is `AND`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Serialize for Logic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        })
    }
}

impl<'de> Deserialize<'de> for Logic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw.as_ref().and_then(|v| v.as_str()) {
            Some("OR") => Logic::Or,
            _ => Logic::And,
        })
    }
}

/// Comparison operator of a single condition.
///
/// Unrecognized operator names (and non-string operators) are preserved as `Unknown` so that they
/// round-trip and evaluate to false instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Operator {
    Equals,
    DoesNotEqual,
    Contains,
    #[default]
    Missing,
    Unknown(String),
}

impl Operator {
    pub fn parse(name: &str) -> Self {
        match name {
            "equals" => Operator::Equals,
            // `notEquals` is the legacy spelling still present in older forms.
            "doesNotEqual" | "notEquals" => Operator::DoesNotEqual,
            "contains" => Operator::Contains,
            other => Operator::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::DoesNotEqual => "doesNotEqual",
            Operator::Contains => "contains",
            Operator::Missing => "",
            Operator::Unknown(name) => name,
        }
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(serde_json::Value::Null) => Operator::Missing,
            Some(serde_json::Value::String(name)) => Operator::parse(&name),
            Some(other) => Operator::Unknown(other.to_string()),
        })
    }
}

/// A single visibility condition: `answers[question_key] <operator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub question_key: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A set of conditions combined with AND/OR logic.
///
/// A null `conditions` list is read as empty, which shows the question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRuleSet {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub conditions: Vec<Condition>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ──────────────────────────────────────────────
// Forms and responses
// ──────────────────────────────────────────────

/// A form bound to one Airtable base/table pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: String,
    /// Owner of the form; their credentials are used for upstream calls.
    pub user_id: String,
    pub form_name: String,
    pub base_id: String,
    pub table_id: String,
    /// Active webhook subscription, if registration succeeded.
    #[serde(default)]
    pub webhook_id: Option<String>,
    pub questions: Vec<Question>,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub created_at: String,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub updated_at: String,
}

impl Form {
    pub fn question(&self, question_key: &str) -> Option<&Question> {
        self.questions
            .iter()
            .find(|q| q.question_key == question_key)
    }
}

/// One submission, mirrored from an Airtable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub form_id: String,
    /// Assigned by Airtable at creation time; never changes afterwards.
    pub airtable_record_id: String,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub deleted_in_airtable: bool,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub created_at: String,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_deserializes_from_camel_case() {
        let q: Question = serde_json::from_value(json!({
            "questionKey": "email",
            "airtableFieldId": "fldXYZ",
            "label": "Email",
            "type": "singleLineText",
            "required": true
        }))
        .unwrap();
        assert_eq!(q.question_key, "email");
        assert_eq!(q.kind, QuestionType::SingleLineText);
        assert!(q.required);
        assert!(q.conditional_logic_rules.is_none());
    }

    #[test]
    fn options_accept_strings_and_choice_objects() {
        let q: Question = serde_json::from_value(json!({
            "questionKey": "color",
            "airtableFieldId": "fldC",
            "label": "Color",
            "type": "singleSelect",
            "options": ["Red", {"id": "selB", "name": "Blue"}, {"id": "selG"}]
        }))
        .unwrap();
        let options = q.options.unwrap();
        assert_eq!(options[0], SelectOption { id: None, name: "Red".into() });
        assert_eq!(options[1].name, "Blue");
        assert_eq!(options[1].id.as_deref(), Some("selB"));
        assert_eq!(options[2].name, "selG");
    }

    #[test]
    fn logic_defaults_to_and() {
        let rules: ConditionalRuleSet = serde_json::from_value(json!({"conditions": []})).unwrap();
        assert_eq!(rules.logic, Logic::And);

        let rules: ConditionalRuleSet =
            serde_json::from_value(json!({"logic": "XOR", "conditions": []})).unwrap();
        assert_eq!(rules.logic, Logic::And);

        let rules: ConditionalRuleSet =
            serde_json::from_value(json!({"logic": null, "conditions": []})).unwrap();
        assert_eq!(rules.logic, Logic::And);

        let rules: ConditionalRuleSet =
            serde_json::from_value(json!({"logic": "OR", "conditions": []})).unwrap();
        assert_eq!(rules.logic, Logic::Or);
    }

    #[test]
    fn operators_parse_with_legacy_alias_and_unknowns() {
        let c: Condition = serde_json::from_value(json!({
            "questionKey": "a", "operator": "notEquals", "value": 1
        }))
        .unwrap();
        assert_eq!(c.operator, Operator::DoesNotEqual);

        let c: Condition = serde_json::from_value(json!({
            "questionKey": "a", "operator": "greaterThan", "value": 1
        }))
        .unwrap();
        assert_eq!(c.operator, Operator::Unknown("greaterThan".into()));
        assert_eq!(serde_json::to_value(&c.operator).unwrap(), json!("greaterThan"));
    }

    #[test]
    fn malformed_rule_fields_fall_back_to_defaults() {
        let rules: ConditionalRuleSet =
            serde_json::from_value(json!({"logic": 1, "conditions": []})).unwrap();
        assert_eq!(rules.logic, Logic::And);

        let rules: ConditionalRuleSet =
            serde_json::from_value(json!({"logic": "OR", "conditions": null})).unwrap();
        assert!(rules.conditions.is_empty());

        let c: Condition = serde_json::from_value(json!({
            "questionKey": "a", "operator": 7, "value": 1
        }))
        .unwrap();
        assert_eq!(c.operator, Operator::Unknown("7".into()));

        let c: Condition =
            serde_json::from_value(json!({"questionKey": "a", "operator": null})).unwrap();
        assert_eq!(c.operator, Operator::Missing);
    }

    #[test]
    fn form_with_malformed_rules_still_loads() {
        let form: Form = serde_json::from_value(json!({
            "id": "f1", "userId": "u1", "formName": "F", "baseId": "app", "tableId": "tbl",
            "questions": [{
                "questionKey": "q", "airtableFieldId": "fldQ", "label": "Q",
                "type": "singleLineText",
                "conditionalLogicRules": {"logic": false, "conditions": null}
            }]
        }))
        .unwrap();
        let rules = form.questions[0].conditional_logic_rules.as_ref().unwrap();
        assert_eq!(rules.logic, Logic::And);
        assert!(rules.conditions.is_empty());
    }

    #[test]
    fn unsupported_question_type_is_rejected() {
        let result: Result<Question, _> = serde_json::from_value(json!({
            "questionKey": "n",
            "airtableFieldId": "fldN",
            "type": "number"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn response_defaults_missing_flags() {
        let r: Response = serde_json::from_value(json!({
            "id": "r1",
            "formId": "f1",
            "airtableRecordId": "rec1"
        }))
        .unwrap();
        assert!(!r.deleted_in_airtable);
        assert!(r.answers.is_empty());
    }
}
