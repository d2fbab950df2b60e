//! Result-shape transforms: the canonical display record, the normalization
//! layer that produces it, and the merge-rank engine for drug/target tables.

pub mod canonical;
pub mod merge;
pub mod record;
