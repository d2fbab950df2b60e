use serde::Serialize;

use crate::error::BioQueryError;

/// Pretty-prints any serializable value for terminal output.
pub(crate) fn to_pretty<T: Serialize>(value: &T) -> Result<String, BioQueryError> {
    Ok(serde_json::to_string_pretty(value)?)
}
