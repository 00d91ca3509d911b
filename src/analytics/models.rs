use serde_derive::Deserialize;

/// One historical run of a CI job, as reported by the analytics store. Used to decide whether
/// a currently-failing job previously failed the same way on trunk (BROKEN_TRUNK) or crashed
/// early in a way that looks flaky.
#[derive(Deserialize, Debug, Clone)]
pub struct HistoricalJob {
    pub workflow_name: String,
    pub name: String,
    pub id: i64,
    pub conclusion: Option<String>,
    pub completed_at: Option<String>,
    pub head_sha: String,
    #[serde(default)]
    pub failure_captures: Vec<String>,
    #[serde(default)]
    pub steps: Vec<HistoricalStep>,
}

impl HistoricalJob {
    pub fn full_name(&self) -> String {
        format!("{} / {}", self.workflow_name, self.name)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct HistoricalStep {
    pub name: String,
    pub conclusion: Option<String>,
    pub number: i64,
}
