use env_logger::Env;
use log::error;
use mergebro::analytics::{AnalyticsClient, HttpAnalyticsClient};
use mergebro::config::MergebroConfig;
use mergebro::git::LocalGitDriver;
use mergebro::github::{DefaultGithubClient, GithubClient, PullRequestIdentifier};
use mergebro::processing::{MergeOrchestrator, MergeSettings, MergeTrigger, RevertOrchestrator, RevertRequest};
use mergebro::rules::{fetch_flaky_rules, load_merge_rules_for_repo};
use std::env;
use std::path::Path;
use std::process::exit;
use structopt::StructOpt;

/// CLI surface (spec §6), owned entirely by this module: everything downstream operates on
/// the parsed `Opt`, never on raw `std::env::args`.
#[derive(StructOpt, Debug)]
#[structopt(name = "mergebro")]
struct Opt {
    /// Suppress pushes, comments and label writes; print what would have happened.
    #[structopt(long)]
    dry_run: bool,

    /// Cosmetic per spec 4.7/9: the core polling loop's observable behavior does not depend
    /// on this flag, only the (out of scope) explainer's wording would.
    #[structopt(long)]
    on_green: bool,

    /// See `on_green`.
    #[structopt(long)]
    on_mandatory: bool,

    /// Stand up a land-validation branch and require it green before merging.
    #[structopt(long)]
    land_checks: bool,

    /// Switch to the revert orchestrator (C8) instead of the merge orchestrator (C7).
    #[structopt(long)]
    revert: bool,

    /// Skip mandatory-check enforcement (EasyCLA excepted) and jump straight to DO_MERGE.
    #[structopt(long)]
    force: bool,

    /// Database id of the triggering comment; defaults to the PR's most recent comment.
    #[structopt(long)]
    comment_id: Option<i64>,

    /// Free-text reason appended to a revert's trailer.
    #[structopt(long)]
    reason: Option<String>,

    /// Path to the bot's own configuration file (distinct from the repo's merge_rules.yaml).
    #[structopt(long, default_value = "~/.config/mergebro.yaml")]
    config: String,

    pull_number: u32,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();
    let config = match MergebroConfig::new(&opt.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration from {}: {}", opt.config, e);
            exit(1);
        }
    };

    let id = PullRequestIdentifier {
        owner: config.repository.owner.clone(),
        repo: config.repository.name.clone(),
        pull_number: opt.pull_number,
    };

    let github = DefaultGithubClient::new(config.github.username.clone(), config.github.token.clone());
    let git = LocalGitDriver::new(config.repository.git_dir.clone());

    let result = if opt.revert {
        run_revert(&github, &git, &config, &id, &opt).await
    } else {
        run_merge(&github, &git, &config, &id, &opt).await.map_err(TerminalOutcome::Formatted)
    };

    if let Err(outcome) = result {
        let body = match outcome {
            TerminalOutcome::Verbatim(message) => {
                error!("{}", message);
                message
            }
            TerminalOutcome::Formatted(message) => {
                error!("{}", message);
                format_terminal_error(&message)
            }
        };
        let _ = github.post_comment(&id, &body).await;
        exit(1);
    }
}

/// Distinguishes a revert's `PostCommentError` (posted verbatim, spec §7) from every other
/// terminal failure (wrapped in the `## Merge failed` header).
enum TerminalOutcome {
    Verbatim(String),
    Formatted(String),
}

async fn run_merge(
    github: &DefaultGithubClient,
    git: &LocalGitDriver,
    config: &MergebroConfig,
    id: &PullRequestIdentifier,
    opt: &Opt,
) -> Result<(), String> {
    let merge_config = config.merge_config_for(&id.owner, &id.repo);
    let rules = load_rules(github, config, id).await?;
    let flaky_rules = fetch_flaky_rules(&reqwest::Client::new()).await;

    let analytics: Box<dyn AnalyticsClient> = match &config.analytics {
        Some(cfg) => Box::new(HttpAnalyticsClient::new(cfg.base_url.clone(), cfg.api_key.clone())),
        None => Box::new(NullAnalyticsClient),
    };

    let settings = MergeSettings {
        remote: config.repository.remote.clone(),
        timeout_minutes: merge_config.timeout_minutes,
        stale_pr_days: merge_config.stale_pr_days,
        ok_failed_threshold: merge_config.ok_failed_threshold,
        poll_interval_secs: merge_config.poll_interval_secs,
        land_validation_branch: merge_config.land_validation_branch.clone(),
        land_checks_requested: opt.land_checks,
        dry_run: opt.dry_run,
        force: opt.force,
    };

    let trigger = resolve_trigger(github, id, opt.comment_id).await?;
    let orchestrator = MergeOrchestrator::new(github, git, analytics.as_ref(), settings);
    orchestrator.run(id, &rules, &flaky_rules, trigger).await.map_err(|e| e.to_string())
}

async fn run_revert(
    github: &DefaultGithubClient,
    git: &LocalGitDriver,
    config: &MergebroConfig,
    id: &PullRequestIdentifier,
    opt: &Opt,
) -> Result<(), TerminalOutcome> {
    let merge_config = config.merge_config_for(&id.owner, &id.repo);
    let rules = load_rules(github, config, id).await.map_err(TerminalOutcome::Formatted)?;

    let snapshot = mergebro::github::load_snapshot(github, id).await.map_err(|e| TerminalOutcome::Formatted(e.to_string()))?;
    let request = RevertRequest { comment_id: opt.comment_id, reason: opt.reason.clone(), skip_internal_checks: opt.force };

    let orchestrator = RevertOrchestrator::new(
        github,
        git,
        config.repository.remote.clone(),
        snapshot.default_branch().unwrap_or("main").to_string(),
        opt.dry_run,
    );
    orchestrator.run(&snapshot, &rules, merge_config.ok_failed_threshold, request).await.map_err(|failure| match failure {
        mergebro::processing::RevertFailure::Validation(post_comment) => TerminalOutcome::Verbatim(post_comment.to_string()),
        mergebro::processing::RevertFailure::Execution(e) => TerminalOutcome::Formatted(e.to_string()),
    })
}

async fn load_rules(
    github: &DefaultGithubClient,
    config: &MergebroConfig,
    id: &PullRequestIdentifier,
) -> Result<Vec<mergebro::rules::MergeRule>, String> {
    let local_checkout = config.repository.local_checkout_dir.as_ref().map(Path::new);
    load_merge_rules_for_repo(local_checkout, github, &id.owner, &id.repo).await.map_err(|e| e.to_string())
}

/// Resolves the comment that triggered this invocation, used to decide whether this is an
/// unedited command from the trusted bot account (spec 4.7's `can_skip_internal_checks`). A
/// comment lookup failure degrades to an untrusted, unattributed trigger rather than aborting
/// the whole run — the merge orchestrator still enforces every other gate normally.
async fn resolve_trigger(
    github: &dyn GithubClient,
    id: &PullRequestIdentifier,
    comment_id: Option<i64>,
) -> Result<MergeTrigger, String> {
    let snapshot = mergebro::github::load_snapshot(github, id).await.map_err(|e| e.to_string())?;
    let comment = match comment_id {
        Some(comment_id) => mergebro::github::get_comment_by_id(&snapshot, github, comment_id).await.ok(),
        None => {
            let _ = mergebro::github::get_comments(&snapshot, github).await;
            mergebro::github::get_last_comment(&snapshot)
        }
    };
    Ok(match comment {
        Some(comment) => MergeTrigger { comment_author: comment.author, comment_edited: comment.edited },
        None => MergeTrigger::default(),
    })
}

/// Terminal-error formatting (spec §7): `## <title>` with a `**Reason**` line, plus a
/// collapsed `<details>` block pointing at the triggering workflow run when `GH_RUN_URL` is
/// set. Posted verbatim as the PR comment body.
fn format_terminal_error(message: &str) -> String {
    let mut body = format!("## Merge failed\n**Reason**: {}\n", message);
    if let Ok(run_url) = env::var("GH_RUN_URL") {
        body.push_str(&format!("\n<details><summary>Details</summary>\n\n{}\n\n</details>\n", run_url));
    }
    body
}

struct NullAnalyticsClient;

#[async_trait::async_trait]
impl AnalyticsClient for NullAnalyticsClient {
    async fn recent_jobs(&self, _shas: &[&str]) -> mergebro::client::Result<Vec<mergebro::analytics::HistoricalJob>> {
        Ok(Vec::new())
    }
}
