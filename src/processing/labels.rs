//! Numbered-label assignment (spec 4.7.2). Re-running the bot against a PR that already
//! carries e.g. `merged` (a retry, or a stacked predecessor touched twice) must not silently
//! skip labeling or attach a duplicate — so collisions are resolved by suffixing.
use crate::client::Result;
use crate::github::{GithubClient, PullRequestIdentifier};

/// Adds the first unused name among `base`, `baseX2`, `baseX3`, ... (checked against
/// `existing`) to the pull request, and returns the name that was actually applied.
pub async fn add_numbered_label(
    client: &dyn GithubClient,
    id: &PullRequestIdentifier,
    existing: &[&str],
    base: &str,
) -> Result<String> {
    let name = numbered_label_name(existing, base);
    client.add_label(id, &name).await?;
    Ok(name)
}

fn numbered_label_name(existing: &[&str], base: &str) -> String {
    if !existing.contains(&base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}X{}", base, n);
        if !existing.contains(&candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_base_name_when_unused() {
        assert_eq!(numbered_label_name(&["open", "needs-review"], "merged"), "merged");
    }

    #[test]
    fn suffixes_on_collision() {
        assert_eq!(numbered_label_name(&["merged"], "merged"), "mergedX2");
        assert_eq!(numbered_label_name(&["merged", "mergedX2"], "merged"), "mergedX3");
    }

    #[test]
    fn never_produces_a_name_already_present() {
        let existing = ["merged", "mergedX2", "mergedX3", "mergedX4"];
        let name = numbered_label_name(&existing, "merged");
        assert!(!existing.contains(&name.as_str()));
    }
}
