//! Offline subcommands.

pub(crate) mod replay;
pub(crate) mod visibility;

use std::path::Path;

use serde::de::DeserializeOwned;

/// Read and parse a JSON file, naming the file in any error.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("error parsing '{}': {}", path.display(), e))
}
