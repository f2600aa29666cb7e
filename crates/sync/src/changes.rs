//! Normalization of webhook payloads into record changes.
//!
//! Airtable delivers record changes in two shapes:
//!
//! - the event shape: `{"event": {"type": "record.updated", "record": {"id", "fields"}}}`
//! - the table-delta shape: `{"changedTablesById": {tableId: {createdRecordsById,
//!   changedRecordsById, destroyedRecordIds}}}`
//!
//! Each shape has its own adapter; both produce [`RecordChange`] values so
//! reconciliation has a single merge path.

use serde::Serialize;
use serde_json::{Map, Value};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One normalized record change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChange {
    pub record_id: String,
    pub kind: ChangeKind,
    /// Cell values keyed by Airtable field id. `None` for deletes.
    pub fields: Option<Map<String, Value>>,
}

/// The changes extracted from one payload, plus how many entries could not
/// be used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPayload {
    pub changes: Vec<RecordChange>,
    pub skipped: usize,
}

/// Extract the record changes for `table_id` from one payload.
///
/// Entries for other tables and malformed entries are counted in
/// `skipped`. A payload matching neither shape counts as one skipped entry.
pub fn normalize_payload(payload: &Value, table_id: &str) -> NormalizedPayload {
    let mut out = NormalizedPayload::default();
    let Some(obj) = payload.as_object() else {
        out.skipped = 1;
        return out;
    };

    let mut recognized = false;
    if let Some(event) = obj.get("event") {
        recognized = true;
        match from_event(event) {
            Some(change) => out.changes.push(change),
            None => out.skipped += 1,
        }
    }
    if let Some(tables) = obj.get("changedTablesById") {
        recognized = true;
        from_table_deltas(tables, table_id, &mut out);
    }
    if !recognized {
        out.skipped = 1;
    }
    out
}

// ── Event shape ──────────────────────────────────────────────────────────────

fn from_event(event: &Value) -> Option<RecordChange> {
    let kind = match event.get("type")?.as_str()? {
        "record.created" => ChangeKind::Created,
        "record.updated" => ChangeKind::Updated,
        "record.deleted" => ChangeKind::Deleted,
        _ => return None,
    };
    let record = event.get("record")?;
    let record_id = non_empty_str(record.get("id"))?;
    let fields = match kind {
        ChangeKind::Deleted => None,
        _ => record.get("fields").and_then(Value::as_object).cloned(),
    };
    Some(RecordChange {
        record_id,
        kind,
        fields,
    })
}

// ── Table-delta shape ────────────────────────────────────────────────────────

fn from_table_deltas(tables: &Value, table_id: &str, out: &mut NormalizedPayload) {
    let Some(tables) = tables.as_object() else {
        out.skipped += 1;
        return;
    };
    for (id, delta) in tables {
        if id != table_id {
            out.skipped += count_entries(delta).max(1);
            continue;
        }
        let Some(delta) = delta.as_object() else {
            out.skipped += 1;
            continue;
        };

        if let Some(created) = delta.get("createdRecordsById") {
            for_each_record(created, out, |record_id, entry| {
                let fields = cell_values(entry)?;
                Some(RecordChange {
                    record_id,
                    kind: ChangeKind::Created,
                    fields: Some(fields),
                })
            });
        }

        if let Some(changed) = delta.get("changedRecordsById") {
            for_each_record(changed, out, |record_id, entry| {
                match (entry.get("current"), entry.get("previous")) {
                    (Some(Value::Object(current)), _) => Some(RecordChange {
                        record_id,
                        kind: ChangeKind::Updated,
                        fields: Some(cell_values(current)?),
                    }),
                    (None | Some(Value::Null), Some(previous)) if previous.is_object() => {
                        Some(RecordChange {
                            record_id,
                            kind: ChangeKind::Deleted,
                            fields: None,
                        })
                    }
                    _ => None,
                }
            });
        }

        if let Some(destroyed) = delta.get("destroyedRecordIds") {
            match destroyed.as_array() {
                Some(ids) => {
                    for id in ids {
                        match non_empty_str(Some(id)) {
                            Some(record_id) => out.changes.push(RecordChange {
                                record_id,
                                kind: ChangeKind::Deleted,
                                fields: None,
                            }),
                            None => out.skipped += 1,
                        }
                    }
                }
                None => out.skipped += 1,
            }
        }
    }
}

/// Apply `convert` to each `{recordId: entry}` pair. Non-object maps and
/// entries that fail to convert are counted as skipped.
fn for_each_record<F>(records: &Value, out: &mut NormalizedPayload, mut convert: F)
where
    F: FnMut(String, &Map<String, Value>) -> Option<RecordChange>,
{
    let Some(records) = records.as_object() else {
        out.skipped += 1;
        return;
    };
    for (record_id, entry) in records {
        let change = match entry.as_object() {
            Some(entry) if !record_id.is_empty() => convert(record_id.clone(), entry),
            _ => None,
        };
        match change {
            Some(change) => out.changes.push(change),
            None => out.skipped += 1,
        }
    }
}

/// The `cellValuesByFieldId` map of a record entry. A missing map is empty;
/// a map of the wrong type makes the entry malformed.
fn cell_values(entry: &Map<String, Value>) -> Option<Map<String, Value>> {
    match entry.get("cellValuesByFieldId") {
        Some(Value::Object(cells)) => Some(cells.clone()),
        None | Some(Value::Null) => Some(Map::new()),
        Some(_) => None,
    }
}

fn count_entries(delta: &Value) -> usize {
    let map_len = |key: &str| {
        delta
            .get(key)
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    };
    let destroyed = delta
        .get("destroyedRecordIds")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    map_len("createdRecordsById") + map_len("changedRecordsById") + destroyed
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
