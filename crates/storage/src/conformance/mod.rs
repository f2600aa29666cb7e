//! Conformance test suite for `FormStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `FormStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Forms**: insert/get/list/update/delete, webhook id lookup
//! - **Responses**: `(record, form)` scoped lookup, partial answer merges,
//!   soft delete, listing filters
//! - **Credentials**: user token storage and refresh updates
//! - **OAuth state**: single-use consumption and expiry
//! - **Concurrency**: disjoint-key answer patches commute
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use formsync_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod credentials;
mod forms;
mod responses;

use std::fmt;
use std::future::Future;

use formsync_core::{Answers, Form, Question, QuestionType, Response};

use crate::FormStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "forms", "responses").
    pub category: String,
    /// Test name (e.g. "insert_then_get_form").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: FormStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(forms::run_form_tests(&factory).await);
    results.extend(responses::run_response_tests(&factory).await);
    results.extend(credentials::run_credential_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_form(id: &str, user_id: &str, created_at: &str) -> Form {
    Form {
        id: id.to_string(),
        user_id: user_id.to_string(),
        form_name: format!("Form {id}"),
        base_id: "appBase".to_string(),
        table_id: "tblTable".to_string(),
        webhook_id: None,
        questions: vec![Question {
            question_key: "email".to_string(),
            airtable_field_id: "fldEmail".to_string(),
            label: "Email".to_string(),
            kind: QuestionType::SingleLineText,
            required: true,
            options: None,
            conditional_logic_rules: None,
        }],
        created_at: created_at.to_string(),
        updated_at: created_at.to_string(),
    }
}

fn make_response(id: &str, form_id: &str, record_id: &str, answers: serde_json::Value) -> Response {
    Response {
        id: id.to_string(),
        form_id: form_id.to_string(),
        airtable_record_id: record_id.to_string(),
        answers: answers_of(answers),
        deleted_in_airtable: false,
        created_at: "2025-01-01T00:00:00Z".to_string(),
        updated_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn answers_of(value: serde_json::Value) -> Answers {
    value.as_object().cloned().unwrap_or_default()
}
