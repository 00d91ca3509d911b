//! Raw GraphQL response shapes for the check-suite/check-run hierarchy, shared by both the
//! PR-scope and commit-scope (land-validation) continuation queries.
use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckSuiteConnection {
    pub edges: Vec<CheckSuiteEdge>,
    pub page_info: HasNextPage,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CheckSuiteEdge {
    pub node: CheckSuiteNode,
    pub cursor: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckSuiteNode {
    pub workflow_run: Option<WorkflowRun>,
    pub check_runs: CheckRunsConnection,
    pub conclusion: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WorkflowRun {
    pub workflow: WorkflowRef,
    pub url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WorkflowRef {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckRunsConnection {
    pub nodes: Vec<CheckRunNode>,
    pub page_info: EndCursorPage,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CheckRunNode {
    pub name: String,
    pub conclusion: Option<String>,
    pub details_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct HasNextPage {
    pub has_next_page: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndCursorPage {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StatusContexts {
    pub contexts: Vec<StatusContext>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusContext {
    pub context: String,
    pub state: String,
    pub target_url: Option<String>,
}
