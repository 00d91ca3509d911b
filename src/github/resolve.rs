//! Derived PR operations that need more than the composite query's first page: full
//! pagination of files/reviews/comments/authors, and the check-suite flattening glue that ties
//! the aggregator (C3) to a live `GithubClient`. Lives above `checks` (which this module
//! depends on) rather than inside it, to avoid a `checks` -> `github` -> `checks` cycle.
use super::client::GithubClient;
use super::models::{PullRequestIdentifier, PullRequestSnapshot, Review};
use crate::checks::raw::{CheckRunsConnection, CheckSuiteConnection, CheckSuiteEdge};
use crate::checks::{add_workflow_conclusions, CheckSuitePager, JobNameToState};
use crate::client::Error;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;

const MAX_PAGES: usize = 100;

/// Fetches the composite PR-info query and wraps it in a fresh, unmemoized snapshot. Callers
/// that need a fresh view of a PR (e.g. each poll iteration) call this again rather than
/// mutating an existing snapshot in place, matching the "rebuild each tick" lifetime in the
/// spec's data model.
pub async fn load_snapshot(
    client: &dyn GithubClient,
    id: &PullRequestIdentifier,
) -> Result<PullRequestSnapshot, Error> {
    let raw = client.fetch_pr_info(id).await?;
    Ok(PullRequestSnapshot::new(id.clone(), raw))
}

lazy_static! {
    static ref DIFF_REV_RE: Regex = Regex::new(r"(?m)^Differential Revision:.+?(D[0-9]+)").unwrap();
}

/// Paginates the PR's changed-file list and asserts it matches the PR's reported count.
pub async fn get_changed_files(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<Vec<String>, Error> {
    if let Some(cached) = pr.has_cached_changed_files() {
        return Ok(cached);
    }
    let (mut files, mut cursor, mut has_next) = pr.first_page_files();
    for _ in 0..MAX_PAGES {
        if !has_next {
            break;
        }
        let page = client.fetch_next_files(&pr.id, cursor.as_deref().unwrap_or_default()).await?;
        files.extend(page.nodes.into_iter().map(|n| n.path));
        has_next = page.page_info.has_next_page;
        cursor = page.page_info.end_cursor;
    }
    if files.len() as u32 != pr.changed_files_count() {
        return Err(Error::GraphQlMissingData);
    }
    pr.set_changed_files(files.clone());
    Ok(files)
}

/// Paginates reviews backwards to reconstruct the full chronological history, then reduces it
/// to one final (non-`COMMENTED`) state per author, oldest state overwritten by newest.
pub async fn get_approved_by(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<Vec<String>, Error> {
    let reviews = get_reviews(pr, client).await?;
    let mut by_author: HashMap<String, String> = HashMap::new();
    for review in reviews {
        if review.state == "COMMENTED" {
            continue;
        }
        if let Some(author) = review.author {
            by_author.insert(author, review.state);
        }
    }
    Ok(by_author.into_iter().filter(|(_, state)| state == "APPROVED").map(|(login, _)| login).collect())
}

async fn get_reviews(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<Vec<Review>, Error> {
    if let Some(cached) = pr.has_cached_reviews() {
        return Ok(cached);
    }
    let (first, mut cursor, mut has_prev) = pr.first_page_reviews();
    let mut reviews = first;
    for _ in 0..MAX_PAGES {
        if !has_prev {
            break;
        }
        let page = client.fetch_prev_reviews(&pr.id, cursor.as_deref().unwrap_or_default()).await?;
        let mut earlier: Vec<Review> = page
            .nodes
            .into_iter()
            .map(|n| Review { author: n.author.map(|a| a.login), state: n.state })
            .collect();
        earlier.extend(reviews);
        reviews = earlier;
        has_prev = page.page_info.has_previous_page;
        cursor = page.page_info.start_cursor;
    }
    pr.set_reviews(reviews.clone());
    Ok(reviews)
}

/// Paginates forward over commit authors. Per-commit ordering is preserved so the "first
/// committer" fallback in `get_author` can use index 0 without a second round-trip.
async fn fetch_authors(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<Vec<(String, String)>, Error> {
    if let Some(cached) = pr.has_cached_authors() {
        return Ok(cached);
    }
    let (first, mut cursor, mut has_next) = pr.first_page_authors();
    let mut authors: Vec<(String, String)> = first.iter().map(|n| n.login_and_formatted()).collect();
    for _ in 0..MAX_PAGES {
        if !has_next {
            break;
        }
        let page = client.fetch_pr_next_authors(&pr.id, cursor.as_deref().unwrap_or_default()).await?;
        authors.extend(page.nodes.iter().map(|n| n.login_and_formatted()));
        has_next = page.page_info.has_next_page;
        cursor = page.page_info.end_cursor;
    }
    if authors.len() as u32 != pr.commit_authors_total_count() {
        return Err(Error::GraphQlMissingData);
    }
    pr.set_authors(authors.clone());
    Ok(authors)
}

/// `login -> "Name <email>"`, deduplicated so the last commit by a given author wins (matching
/// the original's plain dict-assignment accumulation).
pub async fn get_authors(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<HashMap<String, String>, Error> {
    let authors = fetch_authors(pr, client).await?;
    Ok(authors.into_iter().collect())
}

/// The single author to credit for the merge commit: the sole committer if there's only one,
/// otherwise the PR creator's commit if they have one, otherwise the very first commit's author.
pub async fn get_author(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<String, Error> {
    let authors = get_authors(pr, client).await?;
    if authors.len() == 1 {
        return Ok(authors.into_values().next().unwrap());
    }
    if let Some(creator) = pr.creator_login() {
        if let Some(author) = authors.get(creator) {
            return Ok(author.clone());
        }
    }
    let all = fetch_authors(pr, client).await?;
    Ok(all.first().map(|(_, a)| a.clone()).unwrap_or_default())
}

pub async fn get_comments(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<Vec<super::models::Comment>, Error> {
    if let Some(cached) = pr.has_cached_comments() {
        return Ok(cached);
    }
    let (first, mut cursor, mut has_prev) = pr.first_page_comments();
    let mut comments = first;
    for _ in 0..MAX_PAGES {
        if !has_prev {
            break;
        }
        let page = client.fetch_prev_comments(&pr.id, cursor.as_deref().unwrap_or_default()).await?;
        let mut earlier: Vec<_> = page
            .nodes
            .iter()
            .map(|n| super::models::Comment {
                database_id: n.database_id,
                body: n.body_text.clone(),
                author: n.author.as_ref().map(|a| a.login.clone()),
                author_association: n.author_association.clone(),
                edited: n.editor.is_some(),
                created_at: n.created_at,
            })
            .collect();
        earlier.extend(comments);
        comments = earlier;
        has_prev = page.page_info.has_previous_page;
        cursor = page.page_info.start_cursor;
    }
    pr.set_comments(comments.clone());
    Ok(comments)
}

pub fn get_last_comment(pr: &PullRequestSnapshot) -> Option<super::models::Comment> {
    pr.first_page_comments().0.into_iter().last()
}

pub async fn get_comment_by_id(
    pr: &PullRequestSnapshot,
    client: &dyn GithubClient,
    database_id: i64,
) -> Result<super::models::Comment, CommentLookupError> {
    if pr.has_cached_comments().is_none() {
        if let Some(found) = pr.first_page_comments().0.into_iter().find(|c| c.database_id == database_id) {
            return Ok(found);
        }
    }
    get_comments(pr, client)
        .await?
        .into_iter()
        .find(|c| c.database_id == database_id)
        .ok_or(CommentLookupError::NotFound(database_id))
}

#[derive(thiserror::Error, Debug)]
pub enum CommentLookupError {
    #[error("comment with id {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Client(#[from] Error),
}

/// Extracts the `D\d+` Phabricator differential-revision id from the PR body, if present.
pub fn get_diff_revision(pr: &PullRequestSnapshot) -> Option<String> {
    DIFF_REV_RE.captures(pr.body()).map(|c| c[1].to_string())
}

static INTERNAL_CHECK_NAME: &str = "Meta Internal-Only Changes Check";

/// True when this PR was authored internally (carries a Phabricator marker) and the internal
/// sync check has not yet succeeded — such PRs must land via the internal tool, not this bot.
pub async fn has_internal_changes(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<bool, Error> {
    if get_diff_revision(pr).is_none() {
        return Ok(false);
    }
    let checks = get_checkrun_conclusions(pr, client).await?;
    Ok(match checks.get(INTERNAL_CHECK_NAME) {
        Some(job) => !job.is_passing(),
        None => false,
    })
}

/// Flattens the PR's own check-suite graph, then folds in any legacy status-context entries
/// attached to the head commit (third-party status APIs, e.g. a CLA bot).
pub async fn get_checkrun_conclusions(pr: &PullRequestSnapshot, client: &dyn GithubClient) -> Result<JobNameToState, Error> {
    if let Some(cached) = pr.has_cached_checks() {
        return Ok(cached);
    }
    let checksuites = pr.last_commit_check_suites().ok_or(Error::GraphQlMissingData)?;
    let pager = PrCheckPager { id: pr.id.clone(), client };
    let mut conclusions = add_workflow_conclusions(checksuites, &pager).await?;

    for (name, state) in pr.legacy_status_contexts() {
        conclusions.insert(
            name.to_string(),
            crate::checks::JobCheckState::new(name, None, Some(crate::checks::CheckConclusion::parse(state))),
        );
    }
    pr.set_checks(conclusions.clone());
    Ok(conclusions)
}

/// Flattens the check-suite graph attached directly to a commit (used for land-validation
/// branches, which have no PR of their own).
pub async fn get_commit_checkrun_conclusions(
    owner: &str,
    repo: &str,
    commit: &str,
    client: &dyn GithubClient,
) -> Result<JobNameToState, Error> {
    let checksuites = client.fetch_commit_checksuites(owner, repo, commit).await?;
    let pager = CommitCheckPager { owner: owner.to_string(), repo: repo.to_string(), commit: commit.to_string(), client };
    add_workflow_conclusions(checksuites, &pager).await
}

struct PrCheckPager<'a> {
    id: PullRequestIdentifier,
    client: &'a dyn GithubClient,
}

#[async_trait]
impl<'a> CheckSuitePager for PrCheckPager<'a> {
    async fn next_check_runs(
        &self,
        edges: &[CheckSuiteEdge],
        edge_idx: usize,
        checkruns: &CheckRunsConnection,
    ) -> Result<CheckRunsConnection, Error> {
        let cs_cursor = if edge_idx > 0 { Some(edges[edge_idx - 1].cursor.as_str()) } else { None };
        let cr_cursor = checkruns.page_info.end_cursor.as_deref().unwrap_or_default();
        self.client.fetch_pr_next_check_runs(&self.id, cs_cursor, cr_cursor).await
    }

    async fn next_check_suites(&self, checksuites: &CheckSuiteConnection) -> Result<CheckSuiteConnection, Error> {
        let cursor = checksuites.edges.last().map(|e| e.cursor.as_str()).unwrap_or_default();
        self.client.fetch_pr_next_checksuites(&self.id, cursor).await
    }
}

struct CommitCheckPager<'a> {
    owner: String,
    repo: String,
    commit: String,
    client: &'a dyn GithubClient,
}

#[async_trait]
impl<'a> CheckSuitePager for CommitCheckPager<'a> {
    async fn next_check_runs(
        &self,
        edges: &[CheckSuiteEdge],
        edge_idx: usize,
        checkruns: &CheckRunsConnection,
    ) -> Result<CheckRunsConnection, Error> {
        let cs_cursor = if edge_idx > 0 { Some(edges[edge_idx - 1].cursor.as_str()) } else { None };
        let cr_cursor = checkruns.page_info.end_cursor.as_deref().unwrap_or_default();
        self.client.fetch_commit_next_check_runs(&self.owner, &self.repo, &self.commit, cs_cursor, cr_cursor).await
    }

    async fn next_check_suites(&self, checksuites: &CheckSuiteConnection) -> Result<CheckSuiteConnection, Error> {
        let cursor = checksuites.edges.last().map(|e| e.cursor.as_str()).unwrap_or_default();
        self.client.fetch_commit_next_checksuites(&self.owner, &self.repo, &self.commit, cursor).await
    }
}
