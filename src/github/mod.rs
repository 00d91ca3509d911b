pub mod client;
pub mod models;
pub mod queries;
pub mod resolve;

pub use client::{DefaultGithubClient, GithubClient, SearchIssue};
pub use models::{Comment, PullRequestIdentifier, PullRequestSnapshot};
pub use resolve::{
    get_approved_by, get_author, get_authors, get_changed_files, get_checkrun_conclusions, get_comment_by_id,
    get_comments, get_commit_checkrun_conclusions, get_diff_revision, get_last_comment, has_internal_changes,
    load_snapshot, CommentLookupError,
};
