use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::debug;

use crate::errors::AppError;

pub(crate) const RC_BASENAME: &str = ".weftrc";

/// Finds the nearest rc-file, searching `start` and every ancestor up to and
/// including the filesystem root. `.weftrc` is preferred over `.weftrc.json`
/// within a directory.
pub(crate) fn find(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        for name in [RC_BASENAME.to_owned(), format!("{RC_BASENAME}.json")] {
            let candidate = dir.join(&name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Reads and parses the nearest rc-file, if any.
///
/// # Errors
/// - [`AppError::Syntax`] when the file parses as neither form; the
///   underlying JSON error propagates verbatim.
/// - [`AppError::IllegalValue`] when the document is not a top-level object.
/// - [`AppError::General`] when the file exists but cannot be read.
pub(crate) fn load(start: &Path) -> Result<Option<BTreeMap<String, Value>>, AppError> {
    let Some(path) = find(start) else {
        debug!(start = %start.display(), "No configuration file found");
        return Ok(None);
    };
    debug!(path = %path.display(), "Loading configuration file");

    let text = fs::read_to_string(&path).map_err(|err| AppError::General(format!("failed to read {}: {err}", path.display())))?;
    parse(&text).map(Some)
}

/// Parses rc-file content: strict JSON first, then the relaxed
/// object-literal form (unquoted keys, single quotes). When both fail, the
/// JSON syntax error is the one reported.
pub(crate) fn parse(text: &str) -> Result<BTreeMap<String, Value>, AppError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => into_document(value),
        Err(json_err) => match serde_yaml::from_str::<Value>(text) {
            Ok(value) => into_document(value),
            Err(_) => Err(AppError::Syntax(json_err)),
        },
    }
}

fn into_document(value: Value) -> Result<BTreeMap<String, Value>, AppError> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(AppError::IllegalValue(format!(
            "configuration file must contain a top-level object, got {other}"
        ))),
    }
}
