//! Team-member expansion for `org/team` approver principals, memoized for the process
//! lifetime (mirrors `@lru_cache` on `gh_get_team_members` in the original).
use super::model::MergeRule;
use crate::client::Result;
use crate::github::GithubClient;
use std::cell::RefCell;
use std::collections::HashMap;

/// Not `Send`-shared across threads by design: the orchestrator runs on a single logical
/// fiber (current-thread executor), so a `RefCell` is sufficient and avoids lock overhead.
#[derive(Default)]
pub struct TeamMemberCache {
    members: RefCell<HashMap<(String, String), Vec<String>>>,
}

impl TeamMemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn members_of(&self, client: &dyn GithubClient, org: &str, team: &str) -> Result<Vec<String>> {
        let key = (org.to_string(), team.to_string());
        if let Some(cached) = self.members.borrow().get(&key) {
            return Ok(cached.clone());
        }
        let members = client.team_members(org, team).await?;
        self.members.borrow_mut().insert(key, members.clone());
        Ok(members)
    }

    /// Returns `rules` with every `org/team` entry in `approved_by` replaced by its expanded
    /// member logins, so the (pure, synchronous) evaluator only ever compares plain logins.
    pub async fn expand_rule_approvers(
        &self,
        rules: &[MergeRule],
        client: &dyn GithubClient,
    ) -> Result<Vec<MergeRule>> {
        let mut expanded = Vec::with_capacity(rules.len());
        for rule in rules {
            let mut approved_by = Vec::with_capacity(rule.approved_by.len());
            for principal in &rule.approved_by {
                match principal.split_once('/') {
                    Some((org, team)) => approved_by.extend(self.members_of(client, org, team).await?),
                    None => approved_by.push(principal.clone()),
                }
            }
            expanded.push(MergeRule {
                name: rule.name.clone(),
                patterns: rule.patterns.clone(),
                approved_by,
                mandatory_checks_name: rule.mandatory_checks_name.clone(),
            });
        }
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GithubClient for FakeClient {
        async fn fetch_pr_info(
            &self,
            _id: &crate::github::PullRequestIdentifier,
        ) -> Result<crate::github::models::RawPullRequest> {
            unreachable!()
        }
        async fn fetch_next_files(
            &self,
            _id: &crate::github::PullRequestIdentifier,
            _cursor: &str,
        ) -> Result<crate::github::models::FilesConnection> {
            unreachable!()
        }
        async fn fetch_pr_next_checksuites(
            &self,
            _id: &crate::github::PullRequestIdentifier,
            _cursor: &str,
        ) -> Result<crate::checks::raw::CheckSuiteConnection> {
            unreachable!()
        }
        async fn fetch_commit_checksuites(
            &self,
            _owner: &str,
            _name: &str,
            _commit: &str,
        ) -> Result<crate::checks::raw::CheckSuiteConnection> {
            unreachable!()
        }
        async fn fetch_commit_next_checksuites(
            &self,
            _owner: &str,
            _name: &str,
            _commit: &str,
            _cursor: &str,
        ) -> Result<crate::checks::raw::CheckSuiteConnection> {
            unreachable!()
        }
        async fn fetch_commit_next_check_runs(
            &self,
            _owner: &str,
            _name: &str,
            _commit: &str,
            _cs_cursor: Option<&str>,
            _cr_cursor: &str,
        ) -> Result<crate::checks::raw::CheckRunsConnection> {
            unreachable!()
        }
        async fn fetch_pr_next_check_runs(
            &self,
            _id: &crate::github::PullRequestIdentifier,
            _cs_cursor: Option<&str>,
            _cr_cursor: &str,
        ) -> Result<crate::checks::raw::CheckRunsConnection> {
            unreachable!()
        }
        async fn fetch_prev_comments(
            &self,
            _id: &crate::github::PullRequestIdentifier,
            _cursor: &str,
        ) -> Result<crate::github::models::CommentsConnection> {
            unreachable!()
        }
        async fn fetch_pr_next_authors(
            &self,
            _id: &crate::github::PullRequestIdentifier,
            _cursor: &str,
        ) -> Result<crate::github::models::CommitAuthorsConnection> {
            unreachable!()
        }
        async fn fetch_prev_reviews(
            &self,
            _id: &crate::github::PullRequestIdentifier,
            _cursor: &str,
        ) -> Result<crate::github::models::ReviewsConnection> {
            unreachable!()
        }
        async fn team_members(&self, _org: &str, _team: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["alice".into(), "bob".into()])
        }
        async fn post_comment(&self, _id: &crate::github::PullRequestIdentifier, _body: &str) -> Result<()> {
            unreachable!()
        }
        async fn post_commit_comment(&self, _owner: &str, _name: &str, _sha: &str, _body: &str) -> Result<()> {
            unreachable!()
        }
        async fn add_label(&self, _id: &crate::github::PullRequestIdentifier, _label: &str) -> Result<()> {
            unreachable!()
        }
        async fn search_open_issues(
            &self,
            _owner: &str,
            _name: &str,
            _label: &str,
        ) -> Result<Vec<crate::github::SearchIssue>> {
            unreachable!()
        }
        async fn fetch_rule_file_contents(&self, _owner: &str, _name: &str, _path: &str) -> Result<String> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn memoizes_team_lookup_across_rules() {
        let client = FakeClient { calls: AtomicUsize::new(0) };
        let cache = TeamMemberCache::new();
        let rules = vec![
            MergeRule {
                name: "a".into(),
                patterns: vec![],
                approved_by: vec!["acme/core".into()],
                mandatory_checks_name: None,
            },
            MergeRule {
                name: "b".into(),
                patterns: vec![],
                approved_by: vec!["acme/core".into(), "carol".into()],
                mandatory_checks_name: None,
            },
        ];
        let expanded = cache.expand_rule_approvers(&rules, &client).await.unwrap();
        assert_eq!(expanded[0].approved_by, vec!["alice", "bob"]);
        assert_eq!(expanded[1].approved_by, vec!["alice", "bob", "carol"]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
