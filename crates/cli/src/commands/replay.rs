use std::path::Path;
use std::sync::Arc;

use formsync_storage::{FormStore, MemoryStore, SeedData};
use formsync_sync::ReconciliationEngine;
use serde_json::{json, Value};

use super::read_json;
use crate::OutputFormat;

/// Accepts either a bare array of payloads or a fetched page
/// (`{"payloads": [...], ...}`).
fn payload_list(value: Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut page) => match page.remove("payloads") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err("payload file object has no 'payloads' array".into()),
        },
        _ => Err("payload file must be an array or an object with 'payloads'".into()),
    }
}

/// Apply recorded webhook payloads to a seeded store and print the
/// resulting statistics and responses. Nothing is contacted upstream.
pub(crate) async fn cmd_replay(
    seed_path: &Path,
    form_id: &str,
    payloads_path: &Path,
    output: OutputFormat,
) -> Result<(), String> {
    let seed: SeedData = read_json(seed_path)?;
    let payloads = payload_list(read_json(payloads_path)?)?;

    let store = Arc::new(MemoryStore::from_seed(seed));
    let form = store.get_form(form_id).await.map_err(|e| e.to_string())?;
    let engine = ReconciliationEngine::new(store.clone());

    let stats = engine.reconcile(&form, &payloads).await;
    let responses = store
        .list_responses(form_id, true)
        .await
        .map_err(|e| e.to_string())?;

    match output {
        OutputFormat::Json => {
            let report = json!({
                "formId": form.id,
                "payloads": payloads.len(),
                "stats": stats,
                "responses": responses,
            });
            println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
        }
        OutputFormat::Text => {
            println!(
                "replayed {} payload(s) for form {}: processed {}, not found {}, errors {}, skipped {}",
                payloads.len(),
                form.id,
                stats.processed,
                stats.not_found,
                stats.errors,
                stats.skipped
            );
            for r in &responses {
                let flag = if r.deleted_in_airtable { " (deleted)" } else { "" };
                println!(
                    "{} {}{} {}",
                    r.id,
                    r.airtable_record_id,
                    flag,
                    Value::Object(r.answers.clone())
                );
            }
        }
    }
    Ok(())
}
