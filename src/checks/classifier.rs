use super::models::{Classification, JobCheckState};
use crate::analytics::HistoricalJob;
use crate::rules::FlakyRule;

/// Everything the classifier needs to judge one failing job, gathered up front so the
/// classification itself stays a pure function.
pub struct ClassificationContext<'a> {
    pub head_sha_jobs: &'a [HistoricalJob],
    pub merge_base_sha_jobs: &'a [HistoricalJob],
    pub flaky_rules: &'a [FlakyRule],
}

/// Decides whether a failing job is a pre-existing trunk failure or a flake, so it can be
/// excluded from blocking the merge. Returns `None` when the job is not classifiable as
/// either (i.e. it is a genuine, PR-caused failure).
pub fn classify(job: &JobCheckState, ctx: &ClassificationContext) -> Option<Classification> {
    if is_broken_trunk(job, ctx) {
        return Some(Classification::BrokenTrunk);
    }
    if is_flaky(job, ctx) {
        return Some(Classification::Flaky);
    }
    None
}

fn find_by_name<'a>(jobs: &'a [HistoricalJob], name: &str) -> Option<&'a HistoricalJob> {
    jobs.iter().find(|j| j.full_name() == name)
}

/// A job is a broken-trunk failure when the same job, on the merge-base commit, concluded
/// with the same result and the same failure captures — the PR did not introduce the
/// breakage, trunk was already broken.
fn is_broken_trunk(job: &JobCheckState, ctx: &ClassificationContext) -> bool {
    let head = match find_by_name(ctx.head_sha_jobs, &job.name) {
        Some(h) => h,
        None => return false,
    };
    let base = match find_by_name(ctx.merge_base_sha_jobs, &job.name) {
        Some(b) => b,
        None => return false,
    };
    head.conclusion == base.conclusion && head.failure_captures == base.failure_captures
}

/// A job is flaky when it crashed in at most one step (an early infrastructure hiccup rather
/// than an actual test failure), or when its name and failure captures match a known-flaky
/// rule from the shared feed.
fn is_flaky(job: &JobCheckState, ctx: &ClassificationContext) -> bool {
    let head = match find_by_name(ctx.head_sha_jobs, &job.name) {
        Some(h) => h,
        None => return false,
    };
    if head.steps.len() <= 1 {
        return true;
    }
    ctx.flaky_rules.iter().any(|rule| rule.matches(&job.name, &head.failure_captures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::HistoricalStep;
    use crate::checks::models::CheckConclusion;

    fn historical(name: &str, conclusion: &str, captures: Vec<&str>, steps: Vec<(&str, &str)>) -> HistoricalJob {
        HistoricalJob {
            workflow_name: "pull".into(),
            name: name.into(),
            id: 1,
            conclusion: Some(conclusion.into()),
            completed_at: None,
            head_sha: "deadbeef".into(),
            failure_captures: captures.into_iter().map(String::from).collect(),
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(i, (name, conclusion))| HistoricalStep {
                    name: name.into(),
                    conclusion: Some(conclusion.into()),
                    number: i as i64,
                })
                .collect(),
        }
    }

    #[test]
    fn classifies_broken_trunk_when_head_and_base_match() {
        let job = JobCheckState::new("pull / linux-test", None, Some(CheckConclusion::Failure));
        let head = vec![historical("pull / linux-test", "FAILURE", vec!["OOM"], vec![
            ("setup", "SUCCESS"),
            ("test", "FAILURE"),
            ("teardown", "FAILURE"),
        ])];
        let base = vec![historical("pull / linux-test", "FAILURE", vec!["OOM"], vec![])];
        let ctx = ClassificationContext {
            head_sha_jobs: &head,
            merge_base_sha_jobs: &base,
            flaky_rules: &[],
        };
        assert_eq!(classify(&job, &ctx), Some(Classification::BrokenTrunk));
    }

    #[test]
    fn classifies_flaky_when_job_crashed_in_at_most_one_step() {
        let job = JobCheckState::new("pull / linux-test", None, Some(CheckConclusion::Failure));
        let head = vec![historical("pull / linux-test", "FAILURE", vec![], vec![("setup", "FAILURE")])];
        let ctx = ClassificationContext {
            head_sha_jobs: &head,
            merge_base_sha_jobs: &[],
            flaky_rules: &[],
        };
        assert_eq!(classify(&job, &ctx), Some(Classification::Flaky));
    }

    #[test]
    fn not_classifiable_when_no_history_and_no_matching_rule() {
        let job = JobCheckState::new("pull / linux-test", None, Some(CheckConclusion::Failure));
        let ctx = ClassificationContext {
            head_sha_jobs: &[],
            merge_base_sha_jobs: &[],
            flaky_rules: &[],
        };
        assert_eq!(classify(&job, &ctx), None);
    }
}
