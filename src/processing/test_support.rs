#![cfg(test)]
//! Shared fakes for processing-layer tests, following the single-fake-per-trait pattern
//! established in `rules::teams`: most methods are `unreachable!()` since a given test only
//! exercises a handful of them, and the ones under test record their calls for assertions.
use crate::checks::raw::{CheckRunsConnection, CheckSuiteConnection};
use crate::client::Result;
use crate::git::{self, GitDriver};
use crate::github::models::{
    CommentsConnection, CommitAuthorsConnection, FilesConnection, RawPullRequest, ReviewsConnection,
};
use crate::github::{GithubClient, PullRequestIdentifier, SearchIssue};
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Default)]
pub struct FakeGithubClient {
    pub search_issues: RefCell<Vec<SearchIssue>>,
    pub posted_comments: RefCell<Vec<(PullRequestIdentifier, String)>>,
    pub posted_commit_comments: RefCell<Vec<(String, String, String)>>,
    pub added_labels: RefCell<Vec<(PullRequestIdentifier, String)>>,
}

impl FakeGithubClient {
    pub fn push_search_issue(&self, body: &str, html_url: &str) {
        self.search_issues.borrow_mut().push(SearchIssue { body: Some(body.to_string()), html_url: html_url.to_string() });
    }
}

#[async_trait]
impl GithubClient for FakeGithubClient {
    async fn fetch_pr_info(&self, _id: &PullRequestIdentifier) -> Result<RawPullRequest> {
        unreachable!()
    }
    async fn fetch_next_files(&self, _id: &PullRequestIdentifier, _cursor: &str) -> Result<FilesConnection> {
        unreachable!()
    }
    async fn fetch_pr_next_checksuites(&self, _id: &PullRequestIdentifier, _cursor: &str) -> Result<CheckSuiteConnection> {
        unreachable!()
    }
    async fn fetch_commit_checksuites(&self, _owner: &str, _name: &str, _commit: &str) -> Result<CheckSuiteConnection> {
        unreachable!()
    }
    async fn fetch_commit_next_checksuites(
        &self,
        _owner: &str,
        _name: &str,
        _commit: &str,
        _cursor: &str,
    ) -> Result<CheckSuiteConnection> {
        unreachable!()
    }
    async fn fetch_commit_next_check_runs(
        &self,
        _owner: &str,
        _name: &str,
        _commit: &str,
        _cs_cursor: Option<&str>,
        _cr_cursor: &str,
    ) -> Result<CheckRunsConnection> {
        unreachable!()
    }
    async fn fetch_pr_next_check_runs(
        &self,
        _id: &PullRequestIdentifier,
        _cs_cursor: Option<&str>,
        _cr_cursor: &str,
    ) -> Result<CheckRunsConnection> {
        unreachable!()
    }
    async fn fetch_prev_comments(&self, _id: &PullRequestIdentifier, _cursor: &str) -> Result<CommentsConnection> {
        unreachable!()
    }
    async fn fetch_pr_next_authors(&self, _id: &PullRequestIdentifier, _cursor: &str) -> Result<CommitAuthorsConnection> {
        unreachable!()
    }
    async fn fetch_prev_reviews(&self, _id: &PullRequestIdentifier, _cursor: &str) -> Result<ReviewsConnection> {
        unreachable!()
    }
    async fn team_members(&self, _org: &str, _team: &str) -> Result<Vec<String>> {
        unreachable!()
    }
    async fn post_comment(&self, id: &PullRequestIdentifier, body: &str) -> Result<()> {
        self.posted_comments.borrow_mut().push((id.clone(), body.to_string()));
        Ok(())
    }
    async fn post_commit_comment(&self, owner: &str, name: &str, sha: &str, body: &str) -> Result<()> {
        self.posted_commit_comments.borrow_mut().push((format!("{}/{}", owner, name), sha.to_string(), body.to_string()));
        Ok(())
    }
    async fn add_label(&self, id: &PullRequestIdentifier, label: &str) -> Result<()> {
        self.added_labels.borrow_mut().push((id.clone(), label.to_string()));
        Ok(())
    }
    async fn search_open_issues(&self, _owner: &str, _name: &str, _label: &str) -> Result<Vec<SearchIssue>> {
        Ok(self.search_issues.borrow().clone())
    }
    async fn fetch_rule_file_contents(&self, _owner: &str, _name: &str, _path: &str) -> Result<String> {
        unreachable!()
    }
}

/// Records every invocation by argument tuple, and answers `commit_message`/`tree_oid` from a
/// small lookup table keyed by the commit/reference passed in. Missing keys panic, which is
/// deliberate: a test that reaches an unconfigured git call is missing setup, not exercising a
/// legitimate default.
#[derive(Default)]
pub struct FakeGitDriver {
    pub commands: RefCell<Vec<String>>,
    pub commit_messages: HashMap<String, String>,
    pub tree_oids: HashMap<String, String>,
    pub revlist_result: Vec<String>,
    pub rev_parse_result: String,
}

impl FakeGitDriver {
    pub fn record(&self, line: impl Into<String>) {
        self.commands.borrow_mut().push(line.into());
    }
}

#[async_trait]
impl GitDriver for FakeGitDriver {
    async fn fetch(&self, remote: &str, refspec: &str) -> git::Result<()> {
        self.record(format!("fetch {} {}", remote, refspec));
        Ok(())
    }
    async fn checkout(&self, reference: &str) -> git::Result<()> {
        self.record(format!("checkout {}", reference));
        Ok(())
    }
    async fn checkout_new_branch(&self, branch: &str, start_point: &str) -> git::Result<()> {
        self.record(format!("checkout -B {} {}", branch, start_point));
        Ok(())
    }
    async fn rev_parse(&self, reference: &str) -> git::Result<String> {
        self.record(format!("rev-parse {}", reference));
        Ok(self.rev_parse_result.clone())
    }
    async fn tree_oid(&self, commit: &str) -> git::Result<String> {
        self.record(format!("tree-oid {}", commit));
        Ok(self.tree_oids.get(commit).cloned().unwrap_or_else(|| panic!("no fake tree oid for {}", commit)))
    }
    async fn revlist(&self, range: &str) -> git::Result<Vec<String>> {
        self.record(format!("rev-list {}", range));
        Ok(self.revlist_result.clone())
    }
    async fn commit_message(&self, commit: &str) -> git::Result<String> {
        self.record(format!("log {}", commit));
        Ok(self.commit_messages.get(commit).cloned().unwrap_or_else(|| panic!("no fake commit message for {}", commit)))
    }
    async fn merge_squash(&self, reference: &str) -> git::Result<()> {
        self.record(format!("merge --squash {}", reference));
        Ok(())
    }
    async fn cherry_pick(&self, commit: &str) -> git::Result<()> {
        self.record(format!("cherry-pick -x {}", commit));
        Ok(())
    }
    async fn commit(&self, message: &str, author: Option<&str>) -> git::Result<()> {
        self.record(format!("commit {:?} {:?}", message, author));
        Ok(())
    }
    async fn amend_message(&self, message: &str) -> git::Result<()> {
        self.record(format!("commit --amend {:?}", message));
        Ok(())
    }
    async fn revert_no_commit(&self, commit: &str) -> git::Result<()> {
        self.record(format!("revert --no-commit {}", commit));
        Ok(())
    }
    async fn push(&self, remote: &str, refspec: &str) -> git::Result<()> {
        self.record(format!("push {} {}", remote, refspec));
        Ok(())
    }
    async fn force_push(&self, remote: &str, refspec: &str) -> git::Result<()> {
        self.record(format!("push --force {} {}", remote, refspec));
        Ok(())
    }
    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> git::Result<()> {
        self.record(format!("push {} --delete {}", remote, branch));
        Ok(())
    }
    async fn delete_local_branch(&self, branch: &str) -> git::Result<()> {
        self.record(format!("branch -D {}", branch));
        Ok(())
    }
    async fn current_branch(&self) -> git::Result<String> {
        Ok("main".to_string())
    }
    async fn commits_resolving_gh_pr(&self, _default_branch: &str, _pr_num: u32) -> git::Result<Vec<String>> {
        Ok(self.revlist_result.clone())
    }
}
