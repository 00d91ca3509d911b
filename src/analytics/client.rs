use super::models::HistoricalJob;
use crate::client::{ApiClient, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Historical-job lookup (C4). The original implementation queries Rockset directly; here it
/// is generalized to a small HTTP contract so the analytics backend is swappable without
/// touching the classifier.
#[async_trait]
pub trait AnalyticsClient: Send + Sync {
    async fn recent_jobs(&self, shas: &[&str]) -> Result<Vec<HistoricalJob>>;
}

pub struct HttpAnalyticsClient {
    client: ApiClient,
    base_url: String,
}

impl HttpAnalyticsClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: ApiClient::from_credentials("api-key", api_key),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AnalyticsClient for HttpAnalyticsClient {
    async fn recent_jobs(&self, shas: &[&str]) -> Result<Vec<HistoricalJob>> {
        let endpoint = format!("{}/jobs?shas={}", self.base_url, shas.join(","));
        self.client.get(&endpoint).await
    }
}

/// Collapses a run of historical jobs with repeated names (reruns) into one entry per job
/// name: a `SUCCESS` conclusion is sticky and is never overwritten by a later non-passing
/// rerun, otherwise the entry with the highest id (the most recent run) wins.
pub fn merge_reruns(jobs: Vec<HistoricalJob>) -> HashMap<String, HistoricalJob> {
    let mut merged: HashMap<String, HistoricalJob> = HashMap::new();
    for job in jobs {
        let key = job.full_name();
        match merged.get(&key) {
            Some(existing) if existing.conclusion.as_deref() == Some("SUCCESS") => {}
            Some(existing) if existing.id > job.id => {}
            _ => {
                merged.insert(key, job);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, id: i64, conclusion: &str) -> HistoricalJob {
        HistoricalJob {
            workflow_name: "pull".into(),
            name: name.into(),
            id,
            conclusion: Some(conclusion.into()),
            completed_at: None,
            head_sha: "deadbeef".into(),
            failure_captures: vec![],
            steps: vec![],
        }
    }

    #[test]
    fn success_is_sticky_against_later_failure() {
        let merged = merge_reruns(vec![job("linux-test", 1, "SUCCESS"), job("linux-test", 2, "FAILURE")]);
        assert_eq!(merged["pull / linux-test"].id, 1);
    }

    #[test]
    fn highest_id_wins_when_neither_is_success() {
        let merged = merge_reruns(vec![job("linux-test", 1, "FAILURE"), job("linux-test", 2, "FAILURE")]);
        assert_eq!(merged["pull / linux-test"].id, 2);
    }
}
