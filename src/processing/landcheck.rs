//! Land-validation branch lifecycle (glossary: "land validation"). An ephemeral remote branch
//! combining the integration branch with the PR's changes, so CI runs against the PR's actual
//! post-merge state rather than its (possibly stale) merge base.
use super::Error;
use crate::git::GitDriver;

pub fn branch_name(pr_number: u32) -> String {
    format!("landchecks/{}", pr_number)
}

/// State of an in-flight land-validation attempt: just the oid its CI state is queried by.
pub struct LandCheckState {
    pub oid: String,
}

/// Builds `landchecks/<n>` off `integration_branch`, squashes the PR's head onto it, and
/// force-pushes. The returned oid is used both to detect a fresh push landing mid-poll and to
/// query the branch's own CI state each iteration.
pub async fn create(git: &dyn GitDriver, remote: &str, integration_branch: &str, pr_number: u32) -> Result<LandCheckState, Error> {
    let branch = branch_name(pr_number);
    git.fetch(remote, integration_branch).await?;
    git.checkout_new_branch(&branch, "FETCH_HEAD").await?;
    git.fetch(remote, &format!("pull/{}/head", pr_number)).await?;
    git.merge_squash("FETCH_HEAD").await?;
    git.commit(&format!("land validation for #{}", pr_number), None).await?;
    git.force_push(remote, &branch).await?;
    let oid = git.rev_parse("HEAD").await?;
    Ok(LandCheckState { oid })
}

/// Best-effort: cleanup is not guaranteed on every path (cooperative cancellation may skip it
/// entirely), so a delete failure here is swallowed rather than propagated.
pub async fn delete(git: &dyn GitDriver, remote: &str, pr_number: u32) {
    let _ = git.delete_remote_branch(remote, &branch_name(pr_number)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::test_support::FakeGitDriver;

    #[tokio::test]
    async fn create_fetches_integration_branch_then_the_pr_head() {
        let git = FakeGitDriver { rev_parse_result: "deadbeef".into(), ..Default::default() };
        let state = create(&git, "origin", "viable/strict", 1001).await.unwrap();
        assert_eq!(state.oid, "deadbeef");
        let commands = git.commands.borrow();
        assert!(commands.iter().any(|c| c == "fetch origin viable/strict"));
        assert!(commands.iter().any(|c| c == "fetch origin pull/1001/head"));
        assert!(commands.iter().any(|c| c.starts_with("push --force origin landchecks/1001")));
    }
}
