pub mod aggregator;
pub mod classifier;
pub mod models;
pub mod raw;

pub use aggregator::{add_workflow_conclusions, CheckSuitePager};
pub use classifier::{classify, ClassificationContext};
pub use models::{CheckConclusion, Classification, JobCheckState, JobNameToState, WorkflowCheckState};
