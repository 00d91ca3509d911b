use crate::rules::MergeRule;
use std::borrow::Cow;
use thiserror::Error;

/// The two-kind failure taxonomy from the spec, expressed as one enum: every variant except
/// `MandatoryChecksMissing` is terminal. The poll loop matches on the one retriable variant and
/// treats everything else as fatal.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] crate::client::Error),

    #[error(transparent)]
    Git(#[from] crate::git::Error),

    #[error(transparent)]
    Rules(#[from] crate::rules::loader::Error),

    #[error(transparent)]
    CommentLookup(#[from] crate::github::CommentLookupError),

    #[error("PR must be landed via the internal tool")]
    InternalChangesBlocked,

    /// Mandatory checks named by `rule` (or no rule at all, if evaluation never got that far)
    /// are still pending. The only retriable variant: the poll loop sleeps and tries again.
    #[error("mandatory checks still pending: {message}")]
    MandatoryChecksMissing {
        message: String,
        rule: Option<Box<MergeRule>>,
    },

    #[error("{0}")]
    Generic(Cow<'static, str>),
}

impl Error {
    pub fn generic<T: Into<Cow<'static, str>>>(message: T) -> Self {
        Self::Generic(message.into())
    }

    pub fn is_mandatory_checks_missing(&self) -> bool {
        matches!(self, Self::MandatoryChecksMissing { .. })
    }
}

/// Raised by the revert path's validation step; unlike every other terminal error this is
/// posted as the comment body verbatim, without a "## Reason" failure header.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct PostCommentError(pub String);

impl PostCommentError {
    pub fn new<T: Into<String>>(message: T) -> Self {
        Self(message.into())
    }
}
