//! Output rendering for query outcomes.

pub(crate) mod csv;
pub(crate) mod json;
