use super::models::{
    CommentsConnection, CommitAuthorsConnection, FilesConnection, PullRequestIdentifier, PrInfoData, RawPullRequest,
    ReviewsConnection,
};
use crate::checks::raw::{CheckRunsConnection, CheckSuiteConnection};
use crate::client::{ApiClient, Result};
use crate::github::queries;
use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};

/// Forge operations needed by the PR snapshot and the processing layer. GraphQL covers
/// everything that benefits from batched/paginated reads; plain REST covers the handful of
/// single-object writes (comments, labels).
#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn fetch_pr_info(&self, id: &PullRequestIdentifier) -> Result<RawPullRequest>;
    async fn fetch_next_files(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<FilesConnection>;
    async fn fetch_pr_next_checksuites(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<CheckSuiteConnection>;
    async fn fetch_commit_checksuites(&self, owner: &str, name: &str, commit: &str) -> Result<CheckSuiteConnection>;
    async fn fetch_commit_next_checksuites(
        &self,
        owner: &str,
        name: &str,
        commit: &str,
        cursor: &str,
    ) -> Result<CheckSuiteConnection>;
    async fn fetch_commit_next_check_runs(
        &self,
        owner: &str,
        name: &str,
        commit: &str,
        cs_cursor: Option<&str>,
        cr_cursor: &str,
    ) -> Result<CheckRunsConnection>;
    async fn fetch_pr_next_check_runs(
        &self,
        id: &PullRequestIdentifier,
        cs_cursor: Option<&str>,
        cr_cursor: &str,
    ) -> Result<CheckRunsConnection>;
    async fn fetch_prev_comments(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<CommentsConnection>;
    async fn fetch_pr_next_authors(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<CommitAuthorsConnection>;
    async fn fetch_prev_reviews(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<ReviewsConnection>;
    async fn team_members(&self, org: &str, team: &str) -> Result<Vec<String>>;

    async fn post_comment(&self, id: &PullRequestIdentifier, body: &str) -> Result<()>;
    async fn post_commit_comment(&self, owner: &str, name: &str, sha: &str, body: &str) -> Result<()>;
    async fn add_label(&self, id: &PullRequestIdentifier, label: &str) -> Result<()>;

    /// Searches open issues for a merge-blocking site-wide incident (`ci: sev` label).
    async fn search_open_issues(&self, owner: &str, name: &str, label: &str) -> Result<Vec<SearchIssue>>;

    /// Fetches `.github/merge_rules.yaml` via the contents API, for when no local checkout is
    /// available. Returns the decoded (base64) file contents.
    async fn fetch_rule_file_contents(&self, owner: &str, name: &str, path: &str) -> Result<String>;
}

#[derive(Deserialize, Debug, Clone)]
pub struct SearchIssue {
    pub body: Option<String>,
    pub html_url: String,
}

#[derive(Clone)]
pub struct DefaultGithubClient {
    client: ApiClient,
}

impl DefaultGithubClient {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self { client: ApiClient::from_credentials(username, password) }
    }

    fn issue_url(owner: &str, repo: &str, pull_number: u32) -> String {
        format!("https://api.github.com/repos/{}/{}/issues/{}", owner, repo, pull_number)
    }
}

#[derive(Serialize)]
struct PrVars<'a> {
    owner: &'a str,
    name: &'a str,
    number: u32,
}

#[derive(Serialize)]
struct PrCursorVars<'a> {
    owner: &'a str,
    name: &'a str,
    number: u32,
    cursor: &'a str,
}

#[derive(Serialize)]
struct CommitVars<'a> {
    owner: &'a str,
    name: &'a str,
    commit: &'a str,
}

#[derive(Serialize)]
struct CommitCursorVars<'a> {
    owner: &'a str,
    name: &'a str,
    commit: &'a str,
    cursor: &'a str,
}

#[derive(Serialize)]
struct CheckRunsVars<'a> {
    owner: &'a str,
    name: &'a str,
    commit: &'a str,
    cs_cursor: Option<&'a str>,
    cr_cursor: &'a str,
}

#[derive(Serialize)]
struct PrCheckRunsVars<'a> {
    owner: &'a str,
    name: &'a str,
    number: u32,
    cs_cursor: Option<&'a str>,
    cr_cursor: &'a str,
}

#[derive(Serialize)]
struct TeamVars<'a> {
    org: &'a str,
    name: &'a str,
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct RepoWrapper<T> {
    repository: T,
}

#[derive(Deserialize)]
struct PrWrapper<T> {
    #[serde(rename = "pullRequest")]
    pull_request: T,
}

#[derive(Deserialize)]
struct CommitObjectWrapper<T> {
    object: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitsWrapper {
    commits: super::models::LastCommitConnection,
}

#[derive(Deserialize)]
struct CommitRunsNodesWrapper {
    #[serde(rename = "checkSuites")]
    check_suites: CheckSuiteRunsNodes,
}

#[derive(Deserialize)]
struct CheckSuiteRunsNodes {
    nodes: Vec<CheckSuiteRunsNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckSuiteRunsNode {
    check_runs: CheckRunsConnection,
}

#[derive(Deserialize)]
struct TeamNode {
    members: TeamMembersConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamMembersConnection {
    nodes: Vec<super::models::Author>,
    page_info: crate::checks::raw::EndCursorPage,
}

#[async_trait]
impl GithubClient for DefaultGithubClient {
    async fn fetch_pr_info(&self, id: &PullRequestIdentifier) -> Result<RawPullRequest> {
        let vars = PrVars { owner: &id.owner, name: &id.repo, number: id.pull_number };
        let data: PrInfoData = self.client.graphql(&queries::pr_info_query(), &vars).await?;
        Ok(data.repository.pull_request)
    }

    async fn fetch_next_files(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<FilesConnection> {
        let vars = PrCursorVars { owner: &id.owner, name: &id.repo, number: id.pull_number, cursor };
        let data: RepoWrapper<PrWrapper<FilesConnectionWrapper>> =
            self.client.graphql(queries::PR_NEXT_FILES_QUERY, &vars).await?;
        Ok(data.repository.pull_request.files)
    }

    async fn fetch_pr_next_checksuites(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<CheckSuiteConnection> {
        let vars = PrCursorVars { owner: &id.owner, name: &id.repo, number: id.pull_number, cursor };
        let data: RepoWrapper<PrWrapper<CommitsWrapper>> =
            self.client.graphql(&queries::pr_next_checksuites_query(), &vars).await?;
        data.repository
            .pull_request
            .commits
            .nodes
            .into_iter()
            .next()
            .and_then(|n| n.commit.check_suites)
            .ok_or(crate::client::Error::GraphQlMissingData)
    }

    async fn fetch_commit_checksuites(&self, owner: &str, name: &str, commit: &str) -> Result<CheckSuiteConnection> {
        let vars = CommitVars { owner, name, commit };
        let data: RepoWrapper<CommitObjectWrapper<CheckSuiteObject>> =
            self.client.graphql(&queries::commit_checksuites_query(), &vars).await?;
        Ok(data.repository.object.check_suites)
    }

    async fn fetch_commit_next_checksuites(
        &self,
        owner: &str,
        name: &str,
        commit: &str,
        cursor: &str,
    ) -> Result<CheckSuiteConnection> {
        let vars = CommitCursorVars { owner, name, commit, cursor };
        let data: RepoWrapper<CommitObjectWrapper<CheckSuiteObject>> =
            self.client.graphql(&queries::commit_next_checksuites_query(), &vars).await?;
        Ok(data.repository.object.check_suites)
    }

    async fn fetch_commit_next_check_runs(
        &self,
        owner: &str,
        name: &str,
        commit: &str,
        cs_cursor: Option<&str>,
        cr_cursor: &str,
    ) -> Result<CheckRunsConnection> {
        let vars = CheckRunsVars { owner, name, commit, cs_cursor, cr_cursor };
        let data: RepoWrapper<CommitObjectWrapper<CommitRunsNodesWrapper>> =
            self.client.graphql(queries::COMMIT_NEXT_CHECK_RUNS_QUERY, &vars).await?;
        data.repository
            .object
            .check_suites
            .nodes
            .into_iter()
            .next()
            .map(|n| n.check_runs)
            .ok_or(crate::client::Error::GraphQlMissingData)
    }

    async fn fetch_pr_next_check_runs(
        &self,
        id: &PullRequestIdentifier,
        cs_cursor: Option<&str>,
        cr_cursor: &str,
    ) -> Result<CheckRunsConnection> {
        let vars = PrCheckRunsVars { owner: &id.owner, name: &id.repo, number: id.pull_number, cs_cursor, cr_cursor };
        let data: RepoWrapper<PrWrapper<CommitsRunsWrapper>> =
            self.client.graphql(queries::PR_NEXT_CHECK_RUNS_QUERY, &vars).await?;
        data.repository
            .pull_request
            .commits
            .nodes
            .into_iter()
            .next()
            .and_then(|n| n.commit.check_suites.nodes.into_iter().next())
            .map(|n| n.check_runs)
            .ok_or(crate::client::Error::GraphQlMissingData)
    }

    async fn fetch_prev_comments(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<CommentsConnection> {
        let vars = PrCursorVars { owner: &id.owner, name: &id.repo, number: id.pull_number, cursor };
        let data: RepoWrapper<PrWrapper<CommentsConnectionWrapper>> =
            self.client.graphql(queries::PR_PREV_COMMENTS_QUERY, &vars).await?;
        Ok(data.repository.pull_request.comments)
    }

    async fn fetch_pr_next_authors(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<CommitAuthorsConnection> {
        let vars = PrCursorVars { owner: &id.owner, name: &id.repo, number: id.pull_number, cursor };
        let data: RepoWrapper<PrWrapper<CommitsWithAuthorsWrapper>> =
            self.client.graphql(&queries::pr_next_authors_query(), &vars).await?;
        Ok(data.repository.pull_request.commits_with_authors)
    }

    async fn fetch_prev_reviews(&self, id: &PullRequestIdentifier, cursor: &str) -> Result<ReviewsConnection> {
        let vars = PrCursorVars { owner: &id.owner, name: &id.repo, number: id.pull_number, cursor };
        let data: RepoWrapper<PrWrapper<ReviewsConnectionWrapper>> =
            self.client.graphql(&queries::pr_prev_reviews_query(), &vars).await?;
        Ok(data.repository.pull_request.reviews)
    }

    async fn team_members(&self, org: &str, team: &str) -> Result<Vec<String>> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let vars = TeamVars { org, name: team, cursor: cursor.as_deref() };
            let data: OrgWrapper = self.client.graphql(queries::TEAM_MEMBERS_QUERY, &vars).await?;
            let team_node = match data.organization.team {
                Some(t) => t,
                None => break,
            };
            members.extend(team_node.members.nodes.into_iter().map(|a| a.login));
            if !team_node.members.page_info.has_next_page {
                break;
            }
            cursor = team_node.members.page_info.end_cursor;
        }
        Ok(members)
    }

    async fn post_comment(&self, id: &PullRequestIdentifier, body: &str) -> Result<()> {
        let url = format!("{}/comments", Self::issue_url(&id.owner, &id.repo, id.pull_number));
        let _: serde_json::Value = self.client.post(&url, &CommentBody { body }).await?;
        Ok(())
    }

    async fn add_label(&self, id: &PullRequestIdentifier, label: &str) -> Result<()> {
        let url = format!("{}/labels", Self::issue_url(&id.owner, &id.repo, id.pull_number));
        let _: serde_json::Value = self.client.post(&url, &LabelsBody { labels: vec![label.to_string()] }).await?;
        Ok(())
    }

    async fn post_commit_comment(&self, owner: &str, name: &str, sha: &str, body: &str) -> Result<()> {
        let url = format!("https://api.github.com/repos/{}/{}/commits/{}/comments", owner, name, sha);
        let _: serde_json::Value = self.client.post(&url, &CommentBody { body }).await?;
        Ok(())
    }

    async fn search_open_issues(&self, owner: &str, name: &str, label: &str) -> Result<Vec<SearchIssue>> {
        let query = format!(r#"repo:{}/{} is:open is:issue label:"{}""#, owner, name, label);
        let url = format!("https://api.github.com/search/issues?q={}", urlencoding(&query));
        let response: SearchIssuesResponse = self.client.get(&url).await?;
        Ok(response.items)
    }

    async fn fetch_rule_file_contents(&self, owner: &str, name: &str, path: &str) -> Result<String> {
        let url = format!("https://api.github.com/repos/{}/{}/contents/{}", owner, name, path);
        let response: ContentsResponse = self.client.get(&url).await?;
        let cleaned: String = response.content.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = decode_base64(&cleaned).ok_or(crate::client::Error::GraphQlMissingData)?;
        String::from_utf8(decoded).map_err(|_| crate::client::Error::GraphQlMissingData)
    }
}

/// Decodes the standard (non-URL-safe) base64 alphabet used by the contents API, the only
/// place this crate needs base64 at all.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    fn value(byte: u8) -> Option<u8> {
        match byte {
            b'A'..=b'Z' => Some(byte - b'A'),
            b'a'..=b'z' => Some(byte - b'a' + 26),
            b'0'..=b'9' => Some(byte - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let bytes: Vec<u8> = input.bytes().filter(|&b| b != b'=').collect();
    let mut out = Vec::with_capacity(bytes.len() * 3 / 4);
    for chunk in bytes.chunks(4) {
        let values: Vec<u8> = chunk.iter().map(|&b| value(b)).collect::<Option<Vec<_>>>()?;
        out.push((values[0] << 2) | (values.get(1).unwrap_or(&0) >> 4));
        if values.len() > 2 {
            out.push((values[1] << 4) | (values[2] >> 2));
        }
        if values.len() > 3 {
            out.push((values[2] << 6) | values[3]);
        }
    }
    Some(out)
}

fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[derive(Deserialize)]
struct SearchIssuesResponse {
    items: Vec<SearchIssue>,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct LabelsBody {
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct FilesConnectionWrapper {
    files: FilesConnection,
}

#[derive(Deserialize)]
struct CommentsConnectionWrapper {
    comments: CommentsConnection,
}

#[derive(Deserialize)]
struct CommitsWithAuthorsWrapper {
    commits_with_authors: CommitAuthorsConnection,
}

#[derive(Deserialize)]
struct ReviewsConnectionWrapper {
    reviews: ReviewsConnection,
}

#[derive(Deserialize)]
struct CheckSuiteObject {
    #[serde(rename = "checkSuites")]
    check_suites: CheckSuiteConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitsRunsWrapper {
    commits: CommitsRunsConnection,
}

#[derive(Deserialize)]
struct CommitsRunsConnection {
    nodes: Vec<CommitRunsCommitNode>,
}

#[derive(Deserialize)]
struct CommitRunsCommitNode {
    commit: CommitRunsInner,
}

#[derive(Deserialize)]
struct CommitRunsInner {
    #[serde(rename = "checkSuites")]
    check_suites: CheckSuiteRunsNodes,
}

#[derive(Deserialize)]
struct OrgWrapper {
    organization: OrgNode,
}

#[derive(Deserialize)]
struct OrgNode {
    team: Option<TeamNode>,
}
