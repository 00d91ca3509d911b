use super::model::{FlakyRule, MergeRule};
use crate::github::GithubClient;
use log::warn;
use reqwest::Client;
use std::fs;
use std::path::Path;
use thiserror::Error;

static FLAKY_RULES_URL: &str =
    "https://raw.githubusercontent.com/pytorch/test-infra/generated-stats/stats/flaky-rules.json";

static MERGE_RULES_PATH: &str = ".github/merge_rules.yaml";

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read merge rules file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse merge rules file {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },

    #[error("failed to fetch merge rules via contents API for {owner}/{repo}: {source}")]
    Fetch {
        owner: String,
        repo: String,
        source: crate::client::Error,
    },
}

pub fn load_merge_rules(path: impl AsRef<Path>) -> Result<Vec<MergeRule>, Error> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_merge_rules(&contents, path.display().to_string())
}

fn parse_merge_rules(contents: &str, path: String) -> Result<Vec<MergeRule>, Error> {
    serde_yaml::from_str(contents).map_err(|source| Error::Parse { path, source })
}

/// Loads `.github/merge_rules.yaml` from a local checkout when one is available, falling back
/// to the contents API otherwise (e.g. when the bot runs without a clone of the repository).
pub async fn load_merge_rules_for_repo(
    local_checkout_dir: Option<&Path>,
    client: &dyn GithubClient,
    owner: &str,
    repo: &str,
) -> Result<Vec<MergeRule>, Error> {
    if let Some(dir) = local_checkout_dir {
        let path = dir.join(MERGE_RULES_PATH);
        if path.exists() {
            return load_merge_rules(path);
        }
    }
    let contents = client
        .fetch_rule_file_contents(owner, repo, MERGE_RULES_PATH)
        .await
        .map_err(|source| Error::Fetch { owner: owner.to_string(), repo: repo.to_string(), source })?;
    parse_merge_rules(&contents, format!("{}/{} (contents API)", owner, repo))
}

/// Fetches the shared flaky-rules feed. A failure here is not fatal to merge processing: three
/// attempts are made, and an empty list is returned rather than propagating an error, matching
/// the original's best-effort treatment of this feed.
pub async fn fetch_flaky_rules(client: &Client) -> Vec<FlakyRule> {
    for attempt in 1..=3 {
        match client.get(FLAKY_RULES_URL).send().await {
            Ok(response) => match response.json::<Vec<FlakyRule>>().await {
                Ok(rules) => return rules,
                Err(e) => warn!("failed to parse flaky rules feed (attempt {}): {}", attempt, e),
            },
            Err(e) => warn!("failed to fetch flaky rules feed (attempt {}): {}", attempt, e),
        }
    }
    warn!("giving up on flaky rules feed after 3 attempts, proceeding with none");
    Vec::new()
}
