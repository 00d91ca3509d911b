use crate::common::{RepoIdentifier, RepoMap};
use config::{Config, ConfigError, Environment, File};
use serde_derive::Deserialize;

#[derive(Deserialize, Debug)]
pub struct MergebroConfig {
    pub github: GithubConfig,
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub analytics: Option<AnalyticsConfig>,
    #[serde(default)]
    pub merge: MergeConfig,
    /// Per-repo overrides of `merge`, keyed by `owner/repo` (or `owner/*` for an
    /// owner-wide default). Lets one mergebro deployment watch several repositories with
    /// different staleness/timeout tolerances.
    #[serde(default)]
    pub repo_overrides: Vec<RepoOverride>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RepoOverride {
    pub repo: String,
    #[serde(flatten)]
    pub merge: MergeConfig,
}

impl MergebroConfig {
    /// Builds the effective merge settings for one repo, falling back to the global
    /// `merge` section and then to `owner/*` overrides when no exact match exists.
    pub fn merge_config_for(&self, owner: &str, repo: &str) -> MergeConfig {
        let mut map = RepoMap::new(self.merge.clone());
        for entry in &self.repo_overrides {
            if let Ok(id) = entry.repo.parse::<RepoIdentifier>() {
                let _ = map.insert(id, entry.merge.clone());
            }
        }
        map.get(owner, repo).clone()
    }
}

#[derive(Deserialize, Debug)]
pub struct GithubConfig {
    pub username: String,
    pub token: String,
}

/// The org/project this invocation operates against, plus where to find the
/// repo-local merge rules when no local checkout is available.
#[derive(Deserialize, Debug)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    /// Path to a local clone the git driver operates on.
    pub git_dir: String,
    /// Remote name within that clone that points at the forge (almost always `origin`).
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Local checkout path to look for `.github/merge_rules.yaml` in before falling back to
    /// the contents API. `None` always uses the contents API.
    #[serde(default)]
    pub local_checkout_dir: Option<String>,
}

fn default_remote() -> String {
    "origin".to_string()
}

/// Credentials for the historical-job analytics store (C4).
#[derive(Deserialize, Debug)]
pub struct AnalyticsConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MergeConfig {
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_stale_pr_days")]
    pub stale_pr_days: i64,
    #[serde(default = "default_ok_failed_threshold")]
    pub ok_failed_threshold: usize,
    /// The integration branch land-validation merges the PR onto (e.g. `viable/strict`).
    /// `None` disables land-validation regardless of `--land-checks`.
    #[serde(default)]
    pub land_validation_branch: Option<String>,
    /// How many seconds to sleep between poll iterations while mandatory checks are pending.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            stale_pr_days: default_stale_pr_days(),
            ok_failed_threshold: default_ok_failed_threshold(),
            land_validation_branch: None,
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_timeout_minutes() -> u64 {
    400
}

fn default_stale_pr_days() -> i64 {
    3
}

fn default_ok_failed_threshold() -> usize {
    3
}

impl MergebroConfig {
    pub fn new(config_file_path: &str) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        let config_file_path = shellexpand::tilde(config_file_path);
        config.merge(File::with_name(&config_file_path).required(false))?;
        config.merge(Environment::with_prefix("mergebro").separator("_"))?;
        config.try_into()
    }
}
