//! Thin async wrapper around the local `git` binary. One suspension point per call, matching
//! the single-fiber concurrency model: nothing here runs two git subprocesses at once.
use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("git {args} failed (status {status}): {stderr}")]
    CommandFailed {
        args: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git output was not valid utf-8")]
    InvalidUtf8,
}

/// Git operations needed by the merge and revert pipelines, expressed as a trait so the
/// processing layer can be tested against a fake implementation.
#[async_trait]
pub trait GitDriver: Send + Sync {
    async fn fetch(&self, remote: &str, refspec: &str) -> Result<()>;
    async fn checkout(&self, reference: &str) -> Result<()>;
    async fn checkout_new_branch(&self, branch: &str, start_point: &str) -> Result<()>;
    async fn rev_parse(&self, reference: &str) -> Result<String>;
    /// The oid of the tree a commit points to, used by the ghstack sync-check to compare a
    /// published PR head against the local stack's reconstruction of it.
    async fn tree_oid(&self, commit: &str) -> Result<String>;
    async fn revlist(&self, range: &str) -> Result<Vec<String>>;
    async fn commit_message(&self, commit: &str) -> Result<String>;
    async fn merge_squash(&self, reference: &str) -> Result<()>;
    async fn cherry_pick(&self, commit: &str) -> Result<()>;
    async fn commit(&self, message: &str, author: Option<&str>) -> Result<()>;
    async fn amend_message(&self, message: &str) -> Result<()>;
    async fn revert_no_commit(&self, commit: &str) -> Result<()>;
    async fn push(&self, remote: &str, refspec: &str) -> Result<()>;
    async fn force_push(&self, remote: &str, refspec: &str) -> Result<()>;
    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<()>;
    async fn delete_local_branch(&self, branch: &str) -> Result<()>;
    async fn current_branch(&self) -> Result<String>;
    /// Returns the commit hashes on `default_branch` whose message carries a "Pull Request
    /// resolved" marker for `pr_num`, newest first. Used by the revert path as a fallback when
    /// the PR's `mergeCommit` field is unavailable.
    async fn commits_resolving_gh_pr(&self, default_branch: &str, pr_num: u32) -> Result<Vec<String>>;
}

pub struct LocalGitDriver {
    repo_dir: String,
}

impl LocalGitDriver {
    pub fn new(repo_dir: impl Into<String>) -> Self {
        Self { repo_dir: repo_dir.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git").current_dir(&self.repo_dir).args(args).output().await?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                args: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| Error::InvalidUtf8)
    }
}

#[async_trait]
impl GitDriver for LocalGitDriver {
    async fn fetch(&self, remote: &str, refspec: &str) -> Result<()> {
        self.run(&["fetch", remote, refspec]).await.map(|_| ())
    }

    async fn checkout(&self, reference: &str) -> Result<()> {
        self.run(&["checkout", reference]).await.map(|_| ())
    }

    async fn checkout_new_branch(&self, branch: &str, start_point: &str) -> Result<()> {
        self.run(&["checkout", "-B", branch, start_point]).await.map(|_| ())
    }

    async fn rev_parse(&self, reference: &str) -> Result<String> {
        Ok(self.run(&["rev-parse", reference]).await?.trim().to_string())
    }

    async fn tree_oid(&self, commit: &str) -> Result<String> {
        let reference = format!("{}^{{tree}}", commit);
        Ok(self.run(&["rev-parse", &reference]).await?.trim().to_string())
    }

    async fn revlist(&self, range: &str) -> Result<Vec<String>> {
        let out = self.run(&["rev-list", "--reverse", range]).await?;
        Ok(out.lines().map(String::from).collect())
    }

    async fn commit_message(&self, commit: &str) -> Result<String> {
        self.run(&["log", "-1", "--format=%B", commit]).await
    }

    async fn merge_squash(&self, reference: &str) -> Result<()> {
        self.run(&["merge", "--squash", reference]).await.map(|_| ())
    }

    async fn cherry_pick(&self, commit: &str) -> Result<()> {
        self.run(&["cherry-pick", "-x", commit]).await.map(|_| ())
    }

    async fn commit(&self, message: &str, author: Option<&str>) -> Result<()> {
        match author {
            Some(author) => {
                let author_flag = format!("--author={}", author);
                self.run(&["commit", &author_flag, "-m", message]).await.map(|_| ())
            }
            None => self.run(&["commit", "-m", message]).await.map(|_| ()),
        }
    }

    async fn amend_message(&self, message: &str) -> Result<()> {
        self.run(&["commit", "--amend", "-m", message]).await.map(|_| ())
    }

    async fn revert_no_commit(&self, commit: &str) -> Result<()> {
        self.run(&["revert", "--no-commit", commit]).await.map(|_| ())
    }

    async fn push(&self, remote: &str, refspec: &str) -> Result<()> {
        self.run(&["push", remote, refspec]).await.map(|_| ())
    }

    async fn force_push(&self, remote: &str, refspec: &str) -> Result<()> {
        self.run(&["push", "--force", remote, refspec]).await.map(|_| ())
    }

    async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<()> {
        self.run(&["push", remote, "--delete", branch]).await.map(|_| ())
    }

    async fn delete_local_branch(&self, branch: &str) -> Result<()> {
        // Best-effort: the branch may not exist yet, which is not an error here.
        let _ = self.run(&["branch", "-D", branch]).await;
        Ok(())
    }

    async fn current_branch(&self) -> Result<String> {
        Ok(self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await?.trim().to_string())
    }

    async fn commits_resolving_gh_pr(&self, default_branch: &str, pr_num: u32) -> Result<Vec<String>> {
        let grep = format!("Pull Request resolved: .*/pull/{}$", pr_num);
        let out = self
            .run(&["log", default_branch, "--format=%H", "-E", &format!("--grep={}", grep)])
            .await?;
        Ok(out.lines().map(String::from).collect())
    }
}
