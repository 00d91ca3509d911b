//! Site-wide incident gate, the merge orchestrator's `INIT` step. A `ci: sev` labeled issue
//! whose body flags itself as merge-blocking halts every merge attempt regardless of the
//! individual PR's own state.
use crate::client::Result;
use crate::github::GithubClient;

const SEV_LABEL: &str = "ci: sev";
const MERGE_BLOCKING_MARKER: &str = "merge blocking";

/// Returns the URL of the first open, merge-blocking SEV issue, if any.
pub async fn find_merge_blocking_incident(client: &dyn GithubClient, owner: &str, repo: &str) -> Result<Option<String>> {
    let issues = client.search_open_issues(owner, repo, SEV_LABEL).await?;
    Ok(issues
        .into_iter()
        .find(|issue| issue.body.as_deref().unwrap_or_default().to_lowercase().contains(MERGE_BLOCKING_MARKER))
        .map(|issue| issue.html_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::test_support::FakeGithubClient;

    #[tokio::test]
    async fn finds_issue_mentioning_merge_blocking() {
        let client = FakeGithubClient::default();
        client.push_search_issue("this is merge blocking for everyone", "https://github.com/acme/proj/issues/9");
        let found = find_merge_blocking_incident(&client, "acme", "proj").await.unwrap();
        assert_eq!(found, Some("https://github.com/acme/proj/issues/9".to_string()));
    }

    #[tokio::test]
    async fn ignores_sev_issues_not_marked_merge_blocking() {
        let client = FakeGithubClient::default();
        client.push_search_issue("tracking a regression, not urgent", "https://github.com/acme/proj/issues/10");
        let found = find_merge_blocking_incident(&client, "acme", "proj").await.unwrap();
        assert_eq!(found, None);
    }
}
