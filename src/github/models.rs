use crate::checks::raw::{CheckRunNode, CheckRunsConnection, CheckSuiteConnection, EndCursorPage, StatusContexts};
use regex::Regex;
use serde_derive::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct PullRequestIdentifier {
    pub owner: String,
    pub repo: String,
    pub pull_number: u32,
}

impl PullRequestIdentifier {
    pub fn from_app_url(url: &str) -> Result<Self, UrlParseError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^https://github.com/([\w_-]+)/([\w_-]+)/pull/([\d]+)$").unwrap();
        }
        if let Some(capture) = RE.captures_iter(url).next() {
            Ok(Self {
                owner: capture[1].into(),
                repo: capture[2].into(),
                pull_number: capture[3].parse().unwrap(),
            })
        } else {
            Err(UrlParseError::MalformedUrl)
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum UrlParseError {
    #[error("malformed URL")]
    MalformedUrl,
}

// ---------------------------------------------------------------------------------------
// Raw GraphQL deserialization shapes. One struct tree per query root in `queries.rs`.
// ---------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
pub struct PrInfoData {
    pub repository: PrInfoRepository,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrInfoRepository {
    #[serde(rename = "pullRequest")]
    pub pull_request: RawPullRequest,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawPullRequest {
    pub closed: bool,
    pub is_cross_repository: bool,
    pub author: Option<Author>,
    pub title: String,
    pub body: Option<String>,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub base_repository: BaseRepository,
    pub merge_commit: Option<Oid>,
    #[serde(rename = "commits_with_authors")]
    pub commits_with_authors: CommitAuthorsConnection,
    pub commits: LastCommitConnection,
    pub changed_files: u32,
    pub files: FilesConnection,
    pub reviews: ReviewsConnection,
    pub comments: CommentsConnection,
    pub labels: LabelsConnection,
    pub head_ref: Option<HeadRef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Author {
    pub login: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BaseRepository {
    pub is_private: bool,
    pub default_branch_ref: Option<DefaultBranchRef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DefaultBranchRef {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Oid {
    pub oid: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthorsConnection {
    pub nodes: Vec<CommitAuthorNode>,
    pub page_info: EndCursorPage,
    #[serde(default)]
    pub total_count: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitAuthorNode {
    pub commit: CommitAuthorCommit,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitAuthorCommit {
    pub author: CommitAuthorIdentity,
    pub oid: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CommitAuthorIdentity {
    pub user: Option<Author>,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LastCommitConnection {
    pub nodes: Vec<LastCommitNode>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LastCommitNode {
    pub commit: LastCommit,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LastCommit {
    pub check_suites: Option<CheckSuiteConnection>,
    pub status: Option<StatusContexts>,
    pub pushed_date: Option<chrono::DateTime<chrono::Utc>>,
    pub oid: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FilesConnection {
    pub nodes: Vec<FileNode>,
    pub page_info: EndCursorPage,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FileNode {
    pub path: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsConnection {
    pub nodes: Vec<ReviewNode>,
    pub page_info: StartCursorPage,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReviewNode {
    pub author: Option<Author>,
    pub state: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartCursorPage {
    pub start_cursor: Option<String>,
    pub has_previous_page: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommentsConnection {
    pub nodes: Vec<CommentNode>,
    pub page_info: StartCursorPage,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub body_text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub author: Option<Author>,
    pub author_association: String,
    pub editor: Option<Author>,
    pub database_id: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LabelsConnection {
    pub edges: Vec<LabelEdge>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LabelEdge {
    pub node: LabelNode,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LabelNode {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HeadRef {
    pub compare: Compare,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Compare {
    pub commits: CompareCommitsConnection,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompareCommitsConnection {
    pub edges: Vec<CompareCommitEdge>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompareCommitEdge {
    pub node: CompareCommitNode,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompareCommitNode {
    pub parents: ParentsConnection,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ParentsConnection {
    pub edges: Vec<ParentEdge>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ParentEdge {
    pub node: Oid,
}

/// An approving/requesting review, reduced to just what merge-rule evaluation cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub author: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub database_id: i64,
    pub body: String,
    pub author: Option<String>,
    pub author_association: String,
    pub edited: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The full, lazily-paginated view of one pull request. Fields that require continuation
/// queries are fetched once and memoized for the lifetime of the snapshot: the single-fiber
/// concurrency model (no concurrent mutation) makes `RefCell` sufficient here, no locking
/// needed.
pub struct PullRequestSnapshot {
    pub id: PullRequestIdentifier,
    pub raw: RawPullRequest,
    files: RefCell<Option<Vec<String>>>,
    reviews: RefCell<Option<Vec<Review>>>,
    comments: RefCell<Option<Vec<Comment>>>,
    /// `(login, "Name <email>")` per commit, in commit order. `login` is empty when the
    /// commit's author has no linked forge account.
    authors: RefCell<Option<Vec<(String, String)>>>,
    checks: RefCell<Option<crate::checks::JobNameToState>>,
}

impl PullRequestSnapshot {
    pub fn new(id: PullRequestIdentifier, raw: RawPullRequest) -> Self {
        Self {
            id,
            raw,
            files: RefCell::new(None),
            reviews: RefCell::new(None),
            comments: RefCell::new(None),
            authors: RefCell::new(None),
            checks: RefCell::new(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.raw.closed
    }

    pub fn is_cross_repo(&self) -> bool {
        self.raw.is_cross_repository
    }

    pub fn is_base_repo_private(&self) -> bool {
        self.raw.base_repository.is_private
    }

    pub fn base_ref(&self) -> &str {
        &self.raw.base_ref_name
    }

    pub fn head_ref(&self) -> &str {
        &self.raw.head_ref_name
    }

    pub fn default_branch(&self) -> Option<&str> {
        self.raw.base_repository.default_branch_ref.as_ref().map(|r| r.name.as_str())
    }

    pub fn title(&self) -> &str {
        &self.raw.title
    }

    pub fn body(&self) -> &str {
        self.raw.body.as_deref().unwrap_or("")
    }

    pub fn creator_login(&self) -> Option<&str> {
        self.raw.author.as_ref().map(|a| a.login.as_str())
    }

    pub fn last_pushed_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.raw.commits.nodes.first().and_then(|n| n.commit.pushed_date)
    }

    pub fn head_sha(&self) -> Option<&str> {
        self.raw.commits.nodes.first().map(|n| n.commit.oid.as_str())
    }

    /// The parent of the PR's first commit against `master`, used as a cheap merge-base
    /// approximation when a local checkout isn't available to compute one exactly.
    pub fn merge_base_hint(&self) -> Option<&str> {
        self.raw
            .head_ref
            .as_ref()
            .and_then(|h| h.compare.commits.edges.first())
            .and_then(|edge| edge.node.parents.edges.first())
            .map(|edge| edge.node.oid.as_str())
    }

    pub fn merge_commit_oid(&self) -> Option<&str> {
        self.raw.merge_commit.as_ref().map(|o| o.oid.as_str())
    }

    pub fn is_ghstack_pr(&self) -> bool {
        self.raw.head_ref_name.starts_with("gh/") && self.raw.head_ref_name.ends_with("/head")
    }

    pub fn labels(&self) -> Vec<&str> {
        self.raw.labels.edges.iter().map(|e| e.node.name.as_str()).collect()
    }

    pub fn has_cached_changed_files(&self) -> Option<Vec<String>> {
        self.files.borrow().clone()
    }

    pub fn set_changed_files(&self, files: Vec<String>) {
        *self.files.borrow_mut() = Some(files);
    }

    pub fn changed_files_count(&self) -> u32 {
        self.raw.changed_files
    }

    pub fn first_page_files(&self) -> (Vec<String>, Option<String>, bool) {
        let nodes = self.raw.files.nodes.iter().map(|f| f.path.clone()).collect();
        (nodes, self.raw.files.page_info.end_cursor.clone(), self.raw.files.page_info.has_next_page)
    }

    pub fn has_cached_reviews(&self) -> Option<Vec<Review>> {
        self.reviews.borrow().clone()
    }

    pub fn set_reviews(&self, reviews: Vec<Review>) {
        *self.reviews.borrow_mut() = Some(reviews);
    }

    pub fn first_page_reviews(&self) -> (Vec<Review>, Option<String>, bool) {
        let nodes = self
            .raw
            .reviews
            .nodes
            .iter()
            .map(|n| Review {
                author: n.author.as_ref().map(|a| a.login.clone()),
                state: n.state.clone(),
            })
            .collect();
        (nodes, self.raw.reviews.page_info.start_cursor.clone(), self.raw.reviews.page_info.has_previous_page)
    }

    pub fn has_cached_comments(&self) -> Option<Vec<Comment>> {
        self.comments.borrow().clone()
    }

    pub fn set_comments(&self, comments: Vec<Comment>) {
        *self.comments.borrow_mut() = Some(comments);
    }

    pub fn first_page_comments(&self) -> (Vec<Comment>, Option<String>, bool) {
        let nodes = self.raw.comments.nodes.iter().map(comment_from_node).collect();
        (nodes, self.raw.comments.page_info.start_cursor.clone(), self.raw.comments.page_info.has_previous_page)
    }

    pub fn has_cached_authors(&self) -> Option<Vec<(String, String)>> {
        self.authors.borrow().clone()
    }

    pub fn set_authors(&self, authors: Vec<(String, String)>) {
        *self.authors.borrow_mut() = Some(authors);
    }

    pub fn commit_authors_total_count(&self) -> u32 {
        self.raw.commits_with_authors.total_count
    }

    pub fn first_page_authors(&self) -> (Vec<CommitAuthorNode>, Option<String>, bool) {
        (
            self.raw.commits_with_authors.nodes.clone(),
            self.raw.commits_with_authors.page_info.end_cursor.clone(),
            self.raw.commits_with_authors.page_info.has_next_page,
        )
    }

    pub fn has_cached_checks(&self) -> Option<crate::checks::JobNameToState> {
        self.checks.borrow().clone()
    }

    pub fn set_checks(&self, checks: crate::checks::JobNameToState) {
        *self.checks.borrow_mut() = Some(checks);
    }

    pub fn last_commit_check_suites(&self) -> Option<CheckSuiteConnection> {
        self.raw.commits.nodes.first().and_then(|n| n.commit.check_suites.clone())
    }

    pub fn legacy_status_contexts(&self) -> Vec<(&str, &str)> {
        self.raw
            .commits
            .nodes
            .first()
            .and_then(|n| n.commit.status.as_ref())
            .map(|s| s.contexts.iter().map(|c| (c.context.as_str(), c.state.as_str())).collect())
            .unwrap_or_default()
    }
}

impl CommitAuthorNode {
    /// `(login, "Name <email>")`, login empty when the commit author has no linked forge user.
    pub fn login_and_formatted(&self) -> (String, String) {
        let identity = &self.commit.author;
        let formatted = format!(
            "{} <{}>",
            identity.name.as_deref().unwrap_or(""),
            identity.email.as_deref().unwrap_or("")
        );
        let login = identity.user.as_ref().map(|u| u.login.clone()).unwrap_or_default();
        (login, formatted)
    }
}

fn comment_from_node(node: &CommentNode) -> Comment {
    Comment {
        database_id: node.database_id,
        body: node.body_text.clone(),
        author: node.author.as_ref().map(|a| a.login.clone()),
        author_association: node.author_association.clone(),
        edited: node.editor.is_some(),
        created_at: node.created_at,
    }
}

pub type CheckRunPage = CheckRunsConnection;
pub type CheckRunItem = CheckRunNode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_from_app_url() {
        let pr = PullRequestIdentifier::from_app_url("https://github.com/potato/smasher/pull/1337").unwrap();
        assert_eq!(pr.owner, "potato");
        assert_eq!(pr.repo, "smasher");
        assert_eq!(pr.pull_number, 1337);

        assert!(PullRequestIdentifier::from_app_url("https://github.com/potato/smasher/pull/").is_err());
        assert!(PullRequestIdentifier::from_app_url("https://github.com//smasher/pull/").is_err());
        assert!(PullRequestIdentifier::from_app_url("https://github.com/potato/pull/1337").is_err());
    }

    #[test]
    fn ghstack_head_ref_is_detected() {
        let snapshot = PullRequestSnapshot::new(
            PullRequestIdentifier { owner: "o".into(), repo: "r".into(), pull_number: 1 },
            sample_raw("gh/someone/12/head"),
        );
        assert!(snapshot.is_ghstack_pr());
    }

    #[test]
    fn regular_head_ref_is_not_ghstack() {
        let snapshot = PullRequestSnapshot::new(
            PullRequestIdentifier { owner: "o".into(), repo: "r".into(), pull_number: 1 },
            sample_raw("feature-branch"),
        );
        assert!(!snapshot.is_ghstack_pr());
    }

    fn sample_raw(head_ref_name: &str) -> RawPullRequest {
        RawPullRequest {
            closed: false,
            is_cross_repository: false,
            author: None,
            title: "title".into(),
            body: None,
            head_ref_name: head_ref_name.into(),
            base_ref_name: "main".into(),
            base_repository: BaseRepository { is_private: false, default_branch_ref: None },
            merge_commit: None,
            commits_with_authors: CommitAuthorsConnection { nodes: vec![], page_info: EndCursorPage::default(), total_count: 0 },
            commits: LastCommitConnection { nodes: vec![] },
            changed_files: 0,
            files: FilesConnection { nodes: vec![], page_info: EndCursorPage::default() },
            reviews: ReviewsConnection { nodes: vec![], page_info: StartCursorPage::default() },
            comments: CommentsConnection { nodes: vec![], page_info: StartCursorPage::default() },
            labels: LabelsConnection { edges: vec![] },
            head_ref: None,
        }
    }
}
