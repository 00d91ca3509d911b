//! `DO_MERGE` (spec 4.7): the actual git operation that produces the merge commit, for both
//! the non-stacked (plain squash) and ghstack (per-commit cherry-pick) cases.
use super::ghstack::GhstackEntry;
use super::Error;
use crate::git::GitDriver;
use std::collections::HashMap;

/// Squash-merges a plain (non-stacked) PR: fetches its head as a throwaway local branch,
/// squash-merges that onto the already-checked-out default branch, and commits with the
/// composed message and an overridden author. `dry_run` short-circuits the push to a no-op.
pub async fn merge_non_stacked(
    git: &dyn GitDriver,
    remote: &str,
    default_branch: &str,
    pr_number: u32,
    message: &str,
    author: Option<&str>,
    dry_run: bool,
) -> Result<(), Error> {
    git.fetch(remote, &format!("pull/{}/head", pr_number)).await?;
    let throwaway = format!("mergebro/pr-{}", pr_number);
    git.checkout_new_branch(&throwaway, "FETCH_HEAD").await?;
    git.checkout(default_branch).await?;
    git.merge_squash(&throwaway).await?;
    git.commit(message, author).await?;
    git.delete_local_branch(&throwaway).await?;
    if !dry_run {
        git.push(remote, default_branch).await?;
    }
    Ok(())
}

/// Cherry-picks every entry of a reconstructed ghstack stack onto the default branch, in
/// order, amending each with that PR's own composed message. `messages` is keyed by PR
/// number; an entry with no message (should not happen for a fully built stack) is left with
/// the commit message `cherry-pick -x` produced.
pub async fn merge_stacked(
    git: &dyn GitDriver,
    remote: &str,
    default_branch: &str,
    entries: &[GhstackEntry],
    messages: &HashMap<u32, String>,
    dry_run: bool,
) -> Result<(), Error> {
    for entry in entries {
        git.cherry_pick(&entry.revision).await?;
        if let Some(message) = messages.get(&entry.pr.pull_number) {
            git.amend_message(message).await?;
        }
    }
    if !dry_run {
        git.push(remote, default_branch).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::PullRequestIdentifier;
    use crate::processing::test_support::FakeGitDriver;

    #[tokio::test]
    async fn non_stacked_merge_skips_push_on_dry_run() {
        let git = FakeGitDriver::default();
        merge_non_stacked(&git, "origin", "main", 1001, "Title (#1001)\n", None, true).await.unwrap();
        let commands = git.commands.borrow();
        assert!(commands.iter().any(|c| c.starts_with("commit")));
        assert!(!commands.iter().any(|c| c.starts_with("push ")));
    }

    #[tokio::test]
    async fn non_stacked_merge_pushes_when_not_dry_run() {
        let git = FakeGitDriver::default();
        merge_non_stacked(&git, "origin", "main", 1001, "Title (#1001)\n", None, false).await.unwrap();
        assert!(git.commands.borrow().iter().any(|c| c == "push origin main"));
    }

    #[tokio::test]
    async fn stacked_merge_cherry_picks_every_entry_in_order() {
        let git = FakeGitDriver::default();
        let entries = vec![
            GhstackEntry { pr: PullRequestIdentifier { owner: "acme".into(), repo: "proj".into(), pull_number: 10 }, revision: "rev1".into() },
            GhstackEntry { pr: PullRequestIdentifier { owner: "acme".into(), repo: "proj".into(), pull_number: 11 }, revision: "rev2".into() },
        ];
        let mut messages = HashMap::new();
        messages.insert(11, "Title (#11)\n".to_string());
        merge_stacked(&git, "origin", "main", &entries, &messages, false).await.unwrap();
        let commands = git.commands.borrow();
        let cherry_pick_1 = commands.iter().position(|c| c == "cherry-pick -x rev1").unwrap();
        let cherry_pick_2 = commands.iter().position(|c| c == "cherry-pick -x rev2").unwrap();
        assert!(cherry_pick_1 < cherry_pick_2);
        assert!(commands.iter().any(|c| c.contains("Title (#11)")));
    }
}
