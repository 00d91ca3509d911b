//! Wires the classifier (C5) to a live analytics client: fetches recent jobs for the PR's head
//! and merge-base commits, then annotates every currently-failing check in place so
//! `categorize_checks` can fold benign failures into its `ok_failed` bucket.
use crate::analytics::{merge_reruns, AnalyticsClient, HistoricalJob};
use crate::checks::{classify, ClassificationContext, JobNameToState};
use crate::client::Result;
use crate::rules::FlakyRule;

pub async fn annotate_classifications(
    checks: &mut JobNameToState,
    analytics: &dyn AnalyticsClient,
    head_sha: &str,
    merge_base_sha: Option<&str>,
    flaky_rules: &[FlakyRule],
) -> Result<()> {
    let failing: Vec<String> =
        checks.iter().filter(|(_, job)| job.status.is_some() && !job.is_passing()).map(|(name, _)| name.clone()).collect();
    if failing.is_empty() {
        return Ok(());
    }

    let mut shas = vec![head_sha];
    if let Some(base) = merge_base_sha {
        shas.push(base);
    }
    let recent = analytics.recent_jobs(&shas).await?;
    let merged = merge_reruns(recent);

    let head_jobs: Vec<HistoricalJob> = merged.values().filter(|j| j.head_sha == head_sha).cloned().collect();
    let base_jobs: Vec<HistoricalJob> = match merge_base_sha {
        Some(base) => merged.values().filter(|j| j.head_sha == base).cloned().collect(),
        None => Vec::new(),
    };
    let ctx = ClassificationContext { head_sha_jobs: &head_jobs, merge_base_sha_jobs: &base_jobs, flaky_rules };

    for name in failing {
        if let Some(job) = checks.get_mut(&name) {
            job.classification = classify(job, &ctx);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::HistoricalStep;
    use crate::checks::{CheckConclusion, JobCheckState};
    use async_trait::async_trait;

    struct FakeAnalytics(Vec<HistoricalJob>);

    #[async_trait]
    impl AnalyticsClient for FakeAnalytics {
        async fn recent_jobs(&self, _shas: &[&str]) -> Result<Vec<HistoricalJob>> {
            Ok(self.0.clone())
        }
    }

    fn historical(head_sha: &str, name: &str, conclusion: &str, captures: Vec<&str>) -> HistoricalJob {
        HistoricalJob {
            workflow_name: "pull".into(),
            name: name.into(),
            id: 1,
            conclusion: Some(conclusion.into()),
            completed_at: None,
            head_sha: head_sha.into(),
            failure_captures: captures.into_iter().map(String::from).collect(),
            steps: vec![HistoricalStep { name: "test".into(), conclusion: Some(conclusion.into()), number: 0 }],
        }
    }

    #[tokio::test]
    async fn annotates_broken_trunk_when_head_and_base_agree() {
        let analytics = FakeAnalytics(vec![
            historical("headsha", "pull / linux-test", "FAILURE", vec!["OOM"]),
            historical("basesha", "pull / linux-test", "FAILURE", vec!["OOM"]),
        ]);
        let mut checks = JobNameToState::new();
        checks.insert(
            "pull / linux-test".to_string(),
            JobCheckState::new("pull / linux-test", None, Some(CheckConclusion::Failure)),
        );
        annotate_classifications(&mut checks, &analytics, "headsha", Some("basesha"), &[]).await.unwrap();
        assert_eq!(checks["pull / linux-test"].classification, Some(crate::checks::Classification::BrokenTrunk));
    }

    #[tokio::test]
    async fn leaves_passing_checks_unclassified() {
        let analytics = FakeAnalytics(vec![]);
        let mut checks = JobNameToState::new();
        checks.insert("pull / linux-test".to_string(), JobCheckState::new("pull / linux-test", None, Some(CheckConclusion::Success)));
        annotate_classifications(&mut checks, &analytics, "headsha", None, &[]).await.unwrap();
        assert_eq!(checks["pull / linux-test"].classification, None);
    }
}
