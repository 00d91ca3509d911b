use std::collections::HashMap;

/// One CI job instance, already flattened out of its workflow/check-suite hierarchy.
///
/// `status == None` means the job has not yet concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCheckState {
    pub name: String,
    pub url: Option<String>,
    pub status: Option<CheckConclusion>,
    pub classification: Option<Classification>,
}

impl JobCheckState {
    pub fn new(name: impl Into<String>, url: Option<String>, status: Option<CheckConclusion>) -> Self {
        Self {
            name: name.into(),
            url,
            status,
            classification: None,
        }
    }

    pub fn is_passing(&self) -> bool {
        matches!(
            self.status,
            Some(CheckConclusion::Success) | Some(CheckConclusion::Skipped) | Some(CheckConclusion::Neutral)
        )
    }
}

/// A CI workflow run. Only used as scaffolding while flattening check suites; workflows that
/// report at least one job are represented solely by their jobs in the final mapping.
#[derive(Debug, Clone)]
pub struct WorkflowCheckState {
    pub name: String,
    pub url: String,
    pub status: Option<CheckConclusion>,
    pub jobs: HashMap<String, JobCheckState>,
}

impl WorkflowCheckState {
    pub fn new(name: impl Into<String>, url: impl Into<String>, status: Option<CheckConclusion>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            status,
            jobs: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckConclusion {
    Success,
    Failure,
    Skipped,
    Neutral,
    Cancelled,
    StartupFailure,
    Pending,
    Other,
}

impl CheckConclusion {
    pub fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "SKIPPED" => Self::Skipped,
            "NEUTRAL" => Self::Neutral,
            "CANCELLED" => Self::Cancelled,
            "STARTUP_FAILURE" => Self::StartupFailure,
            "PENDING" => Self::Pending,
            _ => Self::Other,
        }
    }
}

/// Mapping of flattened job name -> state, the output of the check aggregator (C3).
pub type JobNameToState = HashMap<String, JobCheckState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Flaky,
    BrokenTrunk,
}
