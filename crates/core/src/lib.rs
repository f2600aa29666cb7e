//! formsync-core: form model and the pure logic shared by every surface.
//!
//! - [`rules`] -- conditional visibility evaluation (client and server agree)
//! - [`mapper`] -- Airtable cell values <-> flat answer map
//! - [`validate`] -- submission validation on top of the visibility rules
//!
//! Nothing in this crate performs I/O.

pub mod mapper;
pub mod model;
pub mod rules;
pub mod validate;

pub use mapper::{answers_to_external_fields, map_external_values_to_answers, merge_answers};
pub use model::{
    Answers, Condition, ConditionalRuleSet, Form, Logic, Operator, Question, QuestionType,
    Response, SelectOption,
};
pub use rules::{evaluate_condition, is_visible, should_show, visible_questions};
pub use validate::{validate_submission, ValidationErrors};
