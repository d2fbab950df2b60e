#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod classify;
pub mod cli;
pub mod error;
pub mod extract;
pub mod pipelines;
pub mod router;
pub mod transform;
pub mod workflow;

mod render;
mod sources;
