//! Merge orchestrator (C7, spec 4.7): the top-level polling state machine. Wires the rule
//! evaluator (C6), check aggregation/classification (C3/C5), land-validation lifecycle,
//! ghstack enumeration, commit-message composition, and numbered labels into the
//! `INIT -> POLL -> DO_MERGE` flow described in the spec.
use super::error::Error;
use super::ghstack::{get_ghstack_prs, GhstackEntry};
use super::labels::add_numbered_label;
use super::landcheck::{self, LandCheckState};
use super::merge::{merge_non_stacked, merge_stacked};
use super::message::{compose_commit_message, merging_now_comment, timeout_comment};
use super::sev::find_merge_blocking_incident;
use crate::analytics::AnalyticsClient;
use crate::checks::{CheckConclusion, JobNameToState};
use crate::git::GitDriver;
use crate::github::{
    get_approved_by, get_author, get_changed_files, get_checkrun_conclusions, get_commit_checkrun_conclusions,
    has_internal_changes, load_snapshot, GithubClient, PullRequestIdentifier, PullRequestSnapshot,
};
use crate::processing::classify::annotate_classifications;
use crate::rules::{categorize_checks, find_matching_merge_rule, FlakyRule, MergeRule, RuleOutcome, TeamMemberCache};
use chrono::Utc;
use log::{info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Everything the orchestrator needs beyond the forge/git collaborators: a mix of CLI flags
/// (`--dry-run`, `--force`, `--land-checks`) and the repo's configured merge settings.
pub struct MergeSettings {
    pub remote: String,
    pub timeout_minutes: u64,
    pub stale_pr_days: i64,
    pub ok_failed_threshold: usize,
    pub poll_interval_secs: u64,
    pub land_validation_branch: Option<String>,
    pub land_checks_requested: bool,
    pub dry_run: bool,
    pub force: bool,
}

/// The chat command that triggered this invocation, needed to decide whether this is a
/// trusted-bot bypass (`can_skip_internal_checks` in the spec).
#[derive(Default)]
pub struct MergeTrigger {
    pub comment_author: Option<String>,
    pub comment_edited: bool,
}

const TRUSTED_BOT_ACCOUNT: &str = "facebook-github-bot";

impl MergeTrigger {
    fn is_trusted_bot(&self) -> bool {
        self.comment_author.as_deref() == Some(TRUSTED_BOT_ACCOUNT) && !self.comment_edited
    }
}

lazy_static! {
    static ref GHSTACK_HEAD_RE: Regex = Regex::new(r"^gh/([^/]+)/[0-9]+/head$").unwrap();
}

pub struct MergeOrchestrator<'a> {
    github: &'a dyn GithubClient,
    git: &'a dyn GitDriver,
    analytics: &'a dyn AnalyticsClient,
    teams: TeamMemberCache,
    settings: MergeSettings,
}

impl<'a> MergeOrchestrator<'a> {
    pub fn new(
        github: &'a dyn GithubClient,
        git: &'a dyn GitDriver,
        analytics: &'a dyn AnalyticsClient,
        settings: MergeSettings,
    ) -> Self {
        Self { github, git, analytics, teams: TeamMemberCache::new(), settings }
    }

    /// Drives one PR from `INIT` through either an early bypass or the full `POLL` loop to
    /// `DO_MERGE`. Returns once the merge has landed (or been pushed, in dry-run mode).
    pub async fn run(
        &self,
        id: &PullRequestIdentifier,
        rules: &[MergeRule],
        flaky_rules: &[FlakyRule],
        trigger: MergeTrigger,
    ) -> Result<(), Error> {
        if !self.settings.force {
            if let Some(url) = find_merge_blocking_incident(self.github, &id.owner, &id.repo).await? {
                return Err(Error::generic(format!("a merge-blocking site incident is open: {}", url)));
            }
        }

        let expanded_rules = self.teams.expand_rule_approvers(rules, self.github).await?;

        if self.settings.force || trigger.is_trusted_bot() {
            let snapshot = load_snapshot(self.github, id).await?;
            self.github.post_comment(id, merging_now_comment()).await?;
            return self.do_merge(id, &snapshot, &expanded_rules).await;
        }

        let gate_snapshot = load_snapshot(self.github, id).await?;
        self.approval_gate(&gate_snapshot, &expanded_rules).await?;

        let land_enabled = self.settings.land_checks_requested && self.settings.land_validation_branch.is_some();
        let mut land_state: Option<LandCheckState> = None;
        if land_enabled {
            let branch = self.settings.land_validation_branch.as_deref().unwrap();
            land_state = Some(landcheck::create(self.git, &self.settings.remote, branch, id.pull_number).await?);
        }

        if let Some(pushed_at) = gate_snapshot.last_pushed_at() {
            if Utc::now().signed_duration_since(pushed_at).num_days() > self.settings.stale_pr_days {
                if land_enabled {
                    landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
                }
                return Err(Error::generic(format!(
                    "pull request has had no pushes in over {} days, treating it as stale",
                    self.settings.stale_pr_days
                )));
            }
        }

        let initial_head = gate_snapshot.head_sha().map(str::to_string);
        let deadline = Instant::now() + Duration::from_secs(self.settings.timeout_minutes * 60);

        loop {
            if Instant::now() >= deadline {
                if land_enabled {
                    landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
                }
                let _ = self.github.add_label(id, "land-failed").await;
                let _ = self.github.post_comment(id, &timeout_comment(self.settings.timeout_minutes)).await;
                return Err(Error::generic("timed out waiting for mandatory checks to converge"));
            }

            if let Some(url) = find_merge_blocking_incident(self.github, &id.owner, &id.repo).await? {
                if land_enabled {
                    landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
                }
                return Err(Error::generic(format!("a merge-blocking site incident is open: {}", url)));
            }

            let snapshot = load_snapshot(self.github, id).await?;
            if snapshot.head_sha().map(str::to_string) != initial_head {
                if land_enabled {
                    landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
                }
                return Err(Error::generic("new commits were pushed to this pull request while merging was in progress"));
            }

            if has_internal_changes(&snapshot, self.github).await? {
                if land_enabled {
                    landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
                }
                return Err(Error::InternalChangesBlocked);
            }

            match self.poll_once(id, &snapshot, &expanded_rules, flaky_rules, land_state.as_ref(), land_enabled).await {
                Ok(PollOutcome::Ready) => return self.do_merge(id, &snapshot, &expanded_rules).await,
                Ok(PollOutcome::Pending) => {
                    info!("mandatory checks still pending for #{}, sleeping", id.pull_number);
                    sleep(Duration::from_secs(self.settings.poll_interval_secs)).await;
                    continue;
                }
                Err(e) => {
                    if land_enabled {
                        landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Evaluates rules once with mandatory-check enforcement disabled, purely to confirm the PR
    /// is approved before land-validation CI cycles are spent on it.
    async fn approval_gate(&self, snapshot: &PullRequestSnapshot, rules: &[MergeRule]) -> Result<(), Error> {
        let changed_files = get_changed_files(snapshot, self.github).await?;
        let approved_by = get_approved_by(snapshot, self.github).await?;
        let checks = JobNameToState::new();
        match find_matching_merge_rule(rules, &changed_files, &approved_by, &checks, true, self.settings.ok_failed_threshold) {
            RuleOutcome::Matched(_) => Ok(()),
            RuleOutcome::Rejected(rejection) if rejection.mandatory_checks_pending => Ok(()),
            RuleOutcome::Rejected(rejection) => Err(Error::generic(rejection.message)),
        }
    }

    async fn poll_once(
        &self,
        id: &PullRequestIdentifier,
        snapshot: &PullRequestSnapshot,
        rules: &[MergeRule],
        flaky_rules: &[FlakyRule],
        land_state: Option<&LandCheckState>,
        land_enabled: bool,
    ) -> Result<PollOutcome, Error> {
        let changed_files = get_changed_files(snapshot, self.github).await?;
        let approved_by = get_approved_by(snapshot, self.github).await?;
        let mut pr_checks = get_checkrun_conclusions(snapshot, self.github).await?;
        annotate_classifications(
            &mut pr_checks,
            self.analytics,
            snapshot.head_sha().unwrap_or_default(),
            snapshot.merge_base_hint(),
            flaky_rules,
        )
        .await?;

        let outcome = find_matching_merge_rule(
            rules,
            &changed_files,
            &approved_by,
            &pr_checks,
            self.settings.force,
            self.settings.ok_failed_threshold,
        );
        let mandatory_rule = match outcome {
            RuleOutcome::Matched(rule) => Some(rule),
            RuleOutcome::Rejected(rejection) if rejection.mandatory_checks_pending => rejection.rule,
            RuleOutcome::Rejected(rejection) => return Err(Error::generic(rejection.message)),
        };

        let mut land_checks = JobNameToState::new();
        if let Some(state) = land_state {
            land_checks = get_commit_checkrun_conclusions(&id.owner, &id.repo, &state.oid, self.github).await?;
            annotate_classifications(&mut land_checks, self.analytics, &state.oid, snapshot.merge_base_hint(), flaky_rules)
                .await?;
        }

        let mut combined_checks = pr_checks.clone();
        for (name, job) in land_checks.clone() {
            combined_checks.insert(name, job);
        }

        if combined_checks.values().any(|job| job.status == Some(CheckConclusion::StartupFailure)) {
            return Err(Error::generic("a workflow's syntax is broken (STARTUP_FAILURE)"));
        }

        let mandatory_patterns = mandatory_rule.as_ref().and_then(|r| r.mandatory_checks_name.clone()).unwrap_or_default();
        let categories = categorize_checks(&combined_checks, &mandatory_patterns, self.settings.ok_failed_threshold);

        if !categories.failed.is_empty() {
            let sample: Vec<&String> = categories.failed.iter().take(5).collect();
            let names: Vec<String> = sample.into_iter().cloned().collect();
            return Err(Error::generic(format!("the following checks are failing: {}", names.join(", "))));
        }

        if !categories.pending.is_empty() {
            return Ok(PollOutcome::Pending);
        }

        if land_enabled {
            let land_green = !land_checks.is_empty() && land_checks.values().all(|job| job.is_passing());
            if !land_green {
                return Ok(PollOutcome::Pending);
            }
        }

        Ok(PollOutcome::Ready)
    }

    async fn do_merge(&self, id: &PullRequestIdentifier, snapshot: &PullRequestSnapshot, rules: &[MergeRule]) -> Result<(), Error> {
        let default_branch = snapshot.default_branch().unwrap_or("main").to_string();
        self.git.checkout(&default_branch).await?;

        if snapshot.is_ghstack_pr() {
            self.do_merge_stacked(id, snapshot, rules, &default_branch).await
        } else {
            self.do_merge_single(id, snapshot, &default_branch).await
        }
    }

    async fn do_merge_single(&self, id: &PullRequestIdentifier, snapshot: &PullRequestSnapshot, default_branch: &str) -> Result<(), Error> {
        let approved_by = get_approved_by(snapshot, self.github).await?;
        let author = get_author(snapshot, self.github).await?;
        let pr_url = format!("https://github.com/{}/{}/pull/{}", id.owner, id.repo, id.pull_number);
        let message = compose_commit_message(snapshot.title(), id.pull_number, snapshot.body(), &pr_url, &approved_by, false);

        merge_non_stacked(
            self.git,
            &self.settings.remote,
            default_branch,
            id.pull_number,
            &message,
            Some(&author),
            self.settings.dry_run,
        )
        .await?;

        if self.settings.dry_run {
            return Ok(());
        }
        landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
        let existing = snapshot.labels();
        add_numbered_label(self.github, id, &existing, "merged").await?;
        Ok(())
    }

    async fn do_merge_stacked(
        &self,
        id: &PullRequestIdentifier,
        snapshot: &PullRequestSnapshot,
        rules: &[MergeRule],
        default_branch: &str,
    ) -> Result<(), Error> {
        let user = GHSTACK_HEAD_RE
            .captures(snapshot.head_ref())
            .map(|c| c[1].to_string())
            .ok_or_else(|| Error::generic("ghstack head ref did not match the expected gh/<user>/<n>/head shape"))?;

        let entries = get_ghstack_prs(self.git, self.github, &self.settings.remote, default_branch, &id.owner, &id.repo, &user, id.pull_number)
            .await?;

        let mut messages = HashMap::new();
        let mut entry_snapshots: Vec<(GhstackEntry, PullRequestSnapshot)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry_snapshot = if entry.pr.pull_number == id.pull_number {
                load_snapshot(self.github, &entry.pr).await?
            } else {
                let predecessor = load_snapshot(self.github, &entry.pr).await?;
                self.approval_gate(&predecessor, rules).await?;
                predecessor
            };

            let approved_by = get_approved_by(&entry_snapshot, self.github).await?;
            let pr_url = format!("https://github.com/{}/{}/pull/{}", entry.pr.owner, entry.pr.repo, entry.pr.pull_number);
            let message =
                compose_commit_message(entry_snapshot.title(), entry.pr.pull_number, entry_snapshot.body(), &pr_url, &approved_by, true);
            messages.insert(entry.pr.pull_number, message);
            entry_snapshots.push((entry, entry_snapshot));
        }

        let entries: Vec<GhstackEntry> = entry_snapshots.iter().map(|(e, _)| GhstackEntry { pr: e.pr.clone(), revision: e.revision.clone() }).collect();
        merge_stacked(self.git, &self.settings.remote, default_branch, &entries, &messages, self.settings.dry_run).await?;

        if self.settings.dry_run {
            return Ok(());
        }
        landcheck::delete(self.git, &self.settings.remote, id.pull_number).await;
        for (entry, entry_snapshot) in &entry_snapshots {
            let existing = entry_snapshot.labels();
            add_numbered_label(self.github, &entry.pr, &existing, "merged").await?;
        }
        warn!("landed {} pull request(s) as part of stack rooted at #{}", entry_snapshots.len(), id.pull_number);
        Ok(())
    }
}

enum PollOutcome {
    Ready,
    Pending,
}
