//! Ghstack stack enumeration and sync-check (spec 4.7.3). Ghstack publishes every commit of a
//! local stack as its own PR: `gh/<user>/<n>/head` is the pushed head, `gh/<user>/<n>/orig` is
//! the rebased commit that actually gets merged. Landing PR #N means landing every
//! not-yet-closed predecessor below it on the stack too.
use super::Error;
use crate::git::GitDriver;
use crate::github::{load_snapshot, GithubClient, PullRequestIdentifier};
use regex::Regex;

/// One entry of the reconstructed stack: the PR it corresponds to and the local commit
/// (from the `orig` branch) that will be cherry-picked onto the default branch for it.
pub struct GhstackEntry {
    pub pr: PullRequestIdentifier,
    pub revision: String,
}

lazy_static! {
    static ref RESOLVED_RE: Regex =
        Regex::new(r"Pull Request resolved: https://github\.com/([\w.-]+)/([\w.-]+)/pull/(\d+)").unwrap();
}

fn parse_resolved_pr(message: &str, owner: &str, repo: &str) -> Option<u32> {
    let caps = RESOLVED_RE.captures(message)?;
    if &caps[1] != owner || &caps[2] != repo {
        return None;
    }
    caps[3].parse().ok()
}

/// Enumerates the stack below (and including) `target_pr`, then verifies every entry's local
/// reconstruction matches what was actually published. The sync-check compares the remote
/// head's tree oid against the local `orig` commit's message, since ghstack embeds it there.
#[allow(clippy::too_many_arguments)]
pub async fn get_ghstack_prs(
    git: &dyn GitDriver,
    github: &dyn GithubClient,
    remote: &str,
    default_branch: &str,
    owner: &str,
    repo: &str,
    user: &str,
    target_pr: u32,
) -> Result<Vec<GhstackEntry>, Error> {
    git.fetch(remote, &format!("gh/{}/{}/orig", user, target_pr)).await?;
    let range = format!("{}..FETCH_HEAD", default_branch);
    let revisions = git.revlist(&range).await?;

    let mut entries = Vec::new();
    for revision in revisions {
        let message = git.commit_message(&revision).await?;
        let pr_number = parse_resolved_pr(&message, owner, repo).ok_or_else(|| {
            Error::generic(format!("commit {} in the stack has no 'Pull Request resolved' marker for {}/{}", revision, owner, repo))
        })?;

        let id = PullRequestIdentifier { owner: owner.to_string(), repo: repo.to_string(), pull_number: pr_number };
        if pr_number != target_pr {
            let snapshot = load_snapshot(github, &id).await?;
            if snapshot.is_closed() {
                continue;
            }
        }
        entries.push(GhstackEntry { pr: id, revision });
    }

    for entry in &entries {
        verify_in_sync(git, remote, user, entry).await?;
    }
    Ok(entries)
}

async fn verify_in_sync(git: &dyn GitDriver, remote: &str, user: &str, entry: &GhstackEntry) -> Result<(), Error> {
    git.fetch(remote, &format!("gh/{}/{}/head", user, entry.pr.pull_number)).await?;
    let head_commit = git.rev_parse("FETCH_HEAD").await?;
    let tree_oid = git.tree_oid(&head_commit).await?;
    let local_message = git.commit_message(&entry.revision).await?;
    if !local_message.contains(&tree_oid) {
        return Err(Error::generic(format!(
            "ghstack entry for #{} is out of sync with its published head (tree {} not found in local revision)",
            entry.pr.pull_number, tree_oid
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matching_owner_and_repo() {
        let message = "Some title.\n\nPull Request resolved: https://github.com/acme/proj/pull/42\n";
        assert_eq!(parse_resolved_pr(message, "acme", "proj"), Some(42));
    }

    #[test]
    fn rejects_marker_from_a_different_repo() {
        let message = "Pull Request resolved: https://github.com/other/proj/pull/42\n";
        assert_eq!(parse_resolved_pr(message, "acme", "proj"), None);
    }

    #[test]
    fn rejects_message_with_no_marker() {
        assert_eq!(parse_resolved_pr("just a commit message", "acme", "proj"), None);
    }
}
