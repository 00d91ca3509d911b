//! Revert orchestrator (C8, spec 4.8): validates that a revert command is authorized and safe
//! to act on, then performs the git revert and communicates the outcome.
use super::error::{Error, PostCommentError};
use crate::git::GitDriver;
use crate::github::{
    get_approved_by, get_changed_files, get_checkrun_conclusions, get_comment_by_id, get_comments, get_last_comment,
    Comment, GithubClient, PullRequestSnapshot,
};
use crate::rules::{self, MergeRule, RuleOutcome};
use regex::Regex;
use thiserror::Error as ThisError;

const TRUSTED_ASSOCIATIONS: &[&str] = &["COLLABORATOR", "MEMBER", "OWNER"];

lazy_static! {
    static ref DIFFERENTIAL_REVISION_RE: Regex = Regex::new(r"Differential Revision:\s*(D\d+)").unwrap();
    static ref RESOLVED_LINE_RE: Regex = Regex::new(r"(?m)^Pull Request resolved:.*$\n?").unwrap();
}

pub struct RevertRequest {
    pub comment_id: Option<i64>,
    pub reason: Option<String>,
    pub skip_internal_checks: bool,
}

pub struct ValidatedRevert {
    pub commit_sha: String,
    pub requester: String,
}

#[derive(ThisError, Debug)]
pub enum RevertFailure {
    #[error(transparent)]
    Validation(#[from] PostCommentError),
    #[error(transparent)]
    Execution(#[from] Error),
}

/// Resolves the triggering comment, checks the requester's standing, reconfirms the PR is
/// otherwise mergeable (reverts bypass CI but not approval), and resolves the commit to
/// revert: the PR's recorded `mergeCommit.oid`, falling back to the first default-branch
/// commit whose message mentions the PR when that field is unavailable. Every refusal here is
/// a `PostCommentError`: posted as the comment body verbatim, with no "## Reason" failure
/// header, since the point is conversational, not a crash report.
pub async fn validate_revert(
    github: &dyn GithubClient,
    git: &dyn GitDriver,
    pr: &PullRequestSnapshot,
    default_branch: &str,
    rules: &[MergeRule],
    ok_failed_threshold: usize,
    request: &RevertRequest,
) -> Result<ValidatedRevert, PostCommentError> {
    let comment = resolve_comment(pr, github, request.comment_id).await.map_err(|e| PostCommentError::new(e.to_string()))?;
    if comment.edited {
        return Err(PostCommentError::new("the revert command was edited after being posted, refusing to act on it"));
    }

    let mut allowed = TRUSTED_ASSOCIATIONS.to_vec();
    if pr.is_base_repo_private() {
        allowed.push("CONTRIBUTOR");
    }
    if !allowed.contains(&comment.author_association.as_str()) {
        return Err(PostCommentError::new(format!(
            "@{} is not authorized to revert this pull request",
            comment.author.as_deref().unwrap_or("unknown")
        )));
    }

    let changed_files = get_changed_files(pr, github).await.map_err(|e| PostCommentError::new(e.to_string()))?;
    let approved_by = get_approved_by(pr, github).await.map_err(|e| PostCommentError::new(e.to_string()))?;
    let checks = get_checkrun_conclusions(pr, github).await.map_err(|e| PostCommentError::new(e.to_string()))?;
    if let RuleOutcome::Rejected(rejection) =
        rules::find_matching_merge_rule(rules, &changed_files, &approved_by, &checks, true, ok_failed_threshold)
    {
        return Err(PostCommentError::new(rejection.message));
    }

    let commit_sha = match pr.merge_commit_oid() {
        Some(oid) => oid.to_string(),
        None => git
            .commits_resolving_gh_pr(default_branch, pr.id.pull_number)
            .await
            .map_err(|e| PostCommentError::new(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| PostCommentError::new(format!("could not find a merge commit for #{}", pr.id.pull_number)))?,
    };

    Ok(ValidatedRevert { commit_sha, requester: comment.author.unwrap_or_default() })
}

async fn resolve_comment(
    pr: &PullRequestSnapshot,
    github: &dyn GithubClient,
    comment_id: Option<i64>,
) -> Result<Comment, crate::github::CommentLookupError> {
    match comment_id {
        Some(id) => get_comment_by_id(pr, github, id).await,
        None => {
            get_comments(pr, github).await?;
            get_last_comment(pr).ok_or(crate::github::CommentLookupError::NotFound(-1))
        }
    }
}

/// Performs the actual revert: checks out the default branch, reverts the commit without
/// auto-committing so the message can be rebuilt from scratch (scrubbing the old
/// "Pull Request resolved" line and appending a "Reverted ... on behalf of" trailer), and
/// commits. Refuses up front if the original commit carries a Phabricator marker and internal
/// checks cannot be skipped — such commits must be reverted via the internal tool.
pub async fn execute_revert(
    git: &dyn GitDriver,
    validated: &ValidatedRevert,
    default_branch: &str,
    skip_internal_checks: bool,
    reason: Option<&str>,
) -> Result<String, Error> {
    let original_message = git.commit_message(&validated.commit_sha).await?;
    if DIFFERENTIAL_REVISION_RE.is_match(&original_message) && !skip_internal_checks {
        return Err(Error::generic("this change was landed internally, revert it via the internal tool"));
    }

    git.checkout(default_branch).await?;
    git.revert_no_commit(&validated.commit_sha).await?;

    let mut message = RESOLVED_LINE_RE.replace_all(&original_message, "").trim().to_string();
    message.push_str(&format!("\n\nReverted {} on behalf of @{}", validated.commit_sha, validated.requester));
    if let Some(reason) = reason {
        message.push_str(&format!(" due to {}", reason));
    }
    message.push('\n');
    git.commit(&message, None).await?;
    git.rev_parse("HEAD").await.map_err(Error::from)
}

pub struct RevertOrchestrator<'a> {
    github: &'a dyn GithubClient,
    git: &'a dyn GitDriver,
    remote: String,
    default_branch: String,
    dry_run: bool,
}

impl<'a> RevertOrchestrator<'a> {
    pub fn new(github: &'a dyn GithubClient, git: &'a dyn GitDriver, remote: String, default_branch: String, dry_run: bool) -> Self {
        Self { github, git, remote, default_branch, dry_run }
    }

    pub async fn run(
        &self,
        pr: &PullRequestSnapshot,
        rules: &[MergeRule],
        ok_failed_threshold: usize,
        request: RevertRequest,
    ) -> Result<(), RevertFailure> {
        let validated =
            validate_revert(self.github, self.git, pr, &self.default_branch, rules, ok_failed_threshold, &request).await?;
        let skip_internal_checks = request.skip_internal_checks;
        let new_commit =
            execute_revert(self.git, &validated, &self.default_branch, skip_internal_checks, request.reason.as_deref()).await?;

        if self.dry_run {
            return Ok(());
        }

        self.git.push(&self.remote, &self.default_branch).await.map_err(Error::from)?;

        let existing = pr.labels();
        super::labels::add_numbered_label(self.github, &pr.id, &existing, "reverted").await.map_err(Error::from)?;

        let comment = format!("@{} has reverted this pull request in {}.", validated.requester, new_commit);
        self.github.post_comment(&pr.id, &comment).await.map_err(Error::from)?;
        self.github
            .post_commit_comment(&pr.id.owner, &pr.id.repo, &validated.commit_sha, &comment)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::models::{BaseRepository, CommentsConnection, CommentNode, Oid, RawPullRequest};
    use crate::github::{models::StartCursorPage, PullRequestIdentifier, PullRequestSnapshot};
    use crate::processing::test_support::{FakeGitDriver, FakeGithubClient};

    fn rule(mandatory: &[&str]) -> MergeRule {
        MergeRule {
            name: "core".into(),
            patterns: vec![],
            approved_by: vec![],
            mandatory_checks_name: Some(mandatory.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn snapshot_with_comment(author_association: &str, edited: bool, merge_commit: Option<&str>) -> PullRequestSnapshot {
        let comment = CommentNode {
            body_text: "@mergebro revert".into(),
            created_at: chrono::Utc::now(),
            author: Some(crate::github::models::Author { login: "alice".into() }),
            author_association: author_association.into(),
            editor: if edited { Some(crate::github::models::Author { login: "alice".into() }) } else { None },
            database_id: 1,
        };
        let raw = RawPullRequest {
            closed: true,
            is_cross_repository: false,
            author: None,
            title: "Title".into(),
            body: None,
            head_ref_name: "feature".into(),
            base_ref_name: "main".into(),
            base_repository: BaseRepository { is_private: false, default_branch_ref: None },
            merge_commit: merge_commit.map(|oid| Oid { oid: oid.to_string() }),
            commits_with_authors: crate::github::models::CommitAuthorsConnection {
                nodes: vec![],
                page_info: crate::checks::raw::EndCursorPage::default(),
                total_count: 0,
            },
            commits: crate::github::models::LastCommitConnection { nodes: vec![] },
            changed_files: 0,
            files: crate::github::models::FilesConnection { nodes: vec![], page_info: crate::checks::raw::EndCursorPage::default() },
            reviews: crate::github::models::ReviewsConnection { nodes: vec![], page_info: StartCursorPage::default() },
            comments: CommentsConnection { nodes: vec![comment], page_info: StartCursorPage::default() },
            labels: crate::github::models::LabelsConnection { edges: vec![] },
            head_ref: None,
        };
        PullRequestSnapshot::new(PullRequestIdentifier { owner: "acme".into(), repo: "proj".into(), pull_number: 1 }, raw)
    }

    #[tokio::test]
    async fn refuses_revert_from_an_unassociated_outsider() {
        let github = FakeGithubClient::default();
        let git = FakeGitDriver::default();
        let pr = snapshot_with_comment("NONE", false, Some("deadbeef"));
        let request = RevertRequest { comment_id: None, reason: None, skip_internal_checks: false };
        let result = validate_revert(&github, &git, &pr, "main", &[rule(&["EasyCLA"])], 3, &request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn refuses_an_edited_revert_comment() {
        let github = FakeGithubClient::default();
        let git = FakeGitDriver::default();
        let pr = snapshot_with_comment("OWNER", true, Some("deadbeef"));
        let request = RevertRequest { comment_id: None, reason: None, skip_internal_checks: false };
        let result = validate_revert(&github, &git, &pr, "main", &[], 3, &request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_revert_from_a_collaborator() {
        let github = FakeGithubClient::default();
        let git = FakeGitDriver::default();
        let pr = snapshot_with_comment("COLLABORATOR", false, Some("deadbeef"));
        let request = RevertRequest { comment_id: None, reason: None, skip_internal_checks: false };
        let validated = validate_revert(&github, &git, &pr, "main", &[], 3, &request).await.unwrap();
        assert_eq!(validated.commit_sha, "deadbeef");
        assert_eq!(validated.requester, "alice");
    }

    #[tokio::test]
    async fn falls_back_to_commits_resolving_gh_pr_when_merge_commit_is_missing() {
        let github = FakeGithubClient::default();
        let git = FakeGitDriver { revlist_result: vec!["fallbacksha".to_string()], ..Default::default() };
        let pr = snapshot_with_comment("COLLABORATOR", false, None);
        let request = RevertRequest { comment_id: None, reason: None, skip_internal_checks: false };
        let validated = validate_revert(&github, &git, &pr, "main", &[], 3, &request).await.unwrap();
        assert_eq!(validated.commit_sha, "fallbacksha");
    }

    #[tokio::test]
    async fn refuses_when_no_merge_commit_can_be_resolved_at_all() {
        let github = FakeGithubClient::default();
        let git = FakeGitDriver::default();
        let pr = snapshot_with_comment("COLLABORATOR", false, None);
        let request = RevertRequest { comment_id: None, reason: None, skip_internal_checks: false };
        let result = validate_revert(&github, &git, &pr, "main", &[], 3, &request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn refuses_to_execute_an_internal_landing_without_bypass() {
        let mut messages = std::collections::HashMap::new();
        messages.insert("deadbeef".to_string(), "Title\n\nDifferential Revision: D123\n".to_string());
        let git = FakeGitDriver { commit_messages: messages, ..Default::default() };
        let validated = ValidatedRevert { commit_sha: "deadbeef".into(), requester: "alice".into() };
        let result = execute_revert(&git, &validated, "main", false, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn builds_the_reverted_trailer_with_reason() {
        let mut messages = std::collections::HashMap::new();
        messages.insert("deadbeef".to_string(), "Title\n\nPull Request resolved: https://github.com/acme/proj/pull/1\n".to_string());
        let git = FakeGitDriver { commit_messages: messages, rev_parse_result: "newsha".into(), ..Default::default() };
        let validated = ValidatedRevert { commit_sha: "deadbeef".into(), requester: "alice".into() };
        let new_sha = execute_revert(&git, &validated, "main", false, Some("breaks the build")).await.unwrap();
        assert_eq!(new_sha, "newsha");
        let commands = git.commands.borrow();
        let commit_cmd = commands.iter().find(|c| c.starts_with("commit \"")).unwrap();
        assert!(commit_cmd.contains("Reverted deadbeef on behalf of @alice due to breaks the build"));
        assert!(!commit_cmd.contains("Pull Request resolved"));
    }
}
