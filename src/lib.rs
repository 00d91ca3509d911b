#[macro_use]
extern crate lazy_static;

pub mod analytics;
pub mod checks;
pub mod client;
pub mod common;
pub mod config;
pub mod git;
pub mod github;
pub mod processing;
pub mod rules;

pub use processing::{MergeOrchestrator, MergeSettings, MergeTrigger};
