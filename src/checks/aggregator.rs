use super::models::{CheckConclusion, JobCheckState, JobNameToState, WorkflowCheckState};
use super::raw::{CheckRunsConnection, CheckSuiteConnection, CheckSuiteEdge};
use crate::client::Error;
use async_trait::async_trait;
use std::collections::HashMap;

/// Supplies the two continuation queries the aggregator needs while walking a check-suite
/// graph: the next page of check-runs within one suite, and the next page of check-suites
/// themselves. PR-scope and commit-scope (land-validation) callers each provide their own
/// implementation; the flattening algorithm below is identical either way.
#[async_trait]
pub trait CheckSuitePager: Send + Sync {
    async fn next_check_runs(
        &self,
        edges: &[CheckSuiteEdge],
        edge_idx: usize,
        checkruns: &CheckRunsConnection,
    ) -> Result<CheckRunsConnection, Error>;

    async fn next_check_suites(&self, checksuites: &CheckSuiteConnection) -> Result<CheckSuiteConnection, Error>;
}

fn check_run_name_prefix(workflow_run: &Option<super::raw::WorkflowRun>) -> String {
    match workflow_run {
        Some(run) => format!("{} / ", run.workflow.name),
        None => String::new(),
    }
}

/// Flattens a paginated check-suite/check-run graph into a single name -> state mapping.
///
/// A check suite whose conclusion is `CANCELLED` is skipped once a non-cancelled workflow of
/// the same name has already been recorded (rerun precedence: first non-cancelled wins). A
/// workflow that reports at least one job contributes only its jobs to the result; a workflow
/// with no jobs at all contributes a single entry under its own name.
pub async fn add_workflow_conclusions(
    mut checksuites: CheckSuiteConnection,
    pager: &dyn CheckSuitePager,
) -> Result<JobNameToState, Error> {
    let mut workflows: HashMap<String, WorkflowCheckState> = HashMap::new();
    let mut no_workflow_jobs: HashMap<String, JobCheckState> = HashMap::new();

    loop {
        add_conclusions(&checksuites.edges, pager, &mut workflows, &mut no_workflow_jobs).await?;
        if !checksuites.page_info.has_next_page {
            break;
        }
        checksuites = pager.next_check_suites(&checksuites).await?;
    }

    let mut result = JobNameToState::new();
    for (_, workflow) in workflows {
        if !workflow.jobs.is_empty() {
            for (job_name, job) in workflow.jobs {
                result.insert(job_name, job);
            }
        } else {
            result.insert(
                workflow.name.clone(),
                JobCheckState::new(workflow.name, Some(workflow.url), workflow.status),
            );
        }
    }
    for (name, job) in no_workflow_jobs {
        result.insert(name, job);
    }
    Ok(result)
}

async fn add_conclusions(
    edges: &[CheckSuiteEdge],
    pager: &dyn CheckSuitePager,
    workflows: &mut HashMap<String, WorkflowCheckState>,
    no_workflow_jobs: &mut HashMap<String, JobCheckState>,
) -> Result<(), Error> {
    for (edge_idx, edge) in edges.iter().enumerate() {
        let node = &edge.node;
        let prefix = check_run_name_prefix(&node.workflow_run);

        let workflow_name = node.workflow_run.as_ref().map(|run| run.workflow.name.clone());
        if let Some(name) = &workflow_name {
            let conclusion = node.conclusion.as_deref().map(CheckConclusion::parse);
            if conclusion == Some(CheckConclusion::Cancelled) && workflows.contains_key(name) {
                continue;
            }
            workflows.entry(name.clone()).or_insert_with(|| {
                WorkflowCheckState::new(name.clone(), node.workflow_run.as_ref().unwrap().url.clone(), conclusion)
            });
        }

        let mut checkruns = Some(node.check_runs.clone());
        while let Some(page) = checkruns {
            for run in &page.nodes {
                let name = format!("{}{}", prefix, run.name);
                let status = run.conclusion.as_deref().map(CheckConclusion::parse);
                let jobs = match &workflow_name {
                    Some(wf_name) => &mut workflows.get_mut(wf_name).unwrap().jobs,
                    None => no_workflow_jobs,
                };
                let existing_passes = jobs.get(&name).map(|job| job.is_passing()).unwrap_or(false);
                if !existing_passes {
                    jobs.insert(name.clone(), JobCheckState::new(name, run.details_url.clone(), status));
                }
            }
            checkruns = if page.page_info.has_next_page {
                Some(pager.next_check_runs(edges, edge_idx, &page).await?)
            } else {
                None
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::raw::{CheckRunNode, CheckSuiteNode, EndCursorPage, HasNextPage, WorkflowRef, WorkflowRun};

    struct NoMorePages;

    #[async_trait]
    impl CheckSuitePager for NoMorePages {
        async fn next_check_runs(
            &self,
            _edges: &[CheckSuiteEdge],
            _edge_idx: usize,
            _checkruns: &CheckRunsConnection,
        ) -> Result<CheckRunsConnection, Error> {
            unreachable!("no pagination expected in this test")
        }

        async fn next_check_suites(&self, _checksuites: &CheckSuiteConnection) -> Result<CheckSuiteConnection, Error> {
            unreachable!("no pagination expected in this test")
        }
    }

    fn check_run(name: &str, conclusion: Option<&str>) -> CheckRunNode {
        CheckRunNode {
            name: name.into(),
            conclusion: conclusion.map(String::from),
            details_url: Some(format!("https://ci.example/{}", name)),
        }
    }

    fn suite(workflow: Option<&str>, conclusion: Option<&str>, runs: Vec<CheckRunNode>) -> CheckSuiteEdge {
        CheckSuiteEdge {
            node: CheckSuiteNode {
                workflow_run: workflow.map(|w| WorkflowRun {
                    workflow: WorkflowRef { name: w.into() },
                    url: format!("https://ci.example/workflows/{}", w),
                }),
                check_runs: CheckRunsConnection {
                    nodes: runs,
                    page_info: EndCursorPage::default(),
                },
                conclusion: conclusion.map(String::from),
            },
            cursor: "cursor".into(),
        }
    }

    #[tokio::test]
    async fn flattens_jobs_under_workflow_prefix() {
        let checksuites = CheckSuiteConnection {
            edges: vec![suite(
                Some("pull"),
                Some("SUCCESS"),
                vec![check_run("linux-test", Some("SUCCESS"))],
            )],
            page_info: HasNextPage::default(),
        };
        let result = add_workflow_conclusions(checksuites, &NoMorePages).await.unwrap();
        assert!(result.contains_key("pull / linux-test"));
        assert!(!result.contains_key("pull"));
    }

    #[tokio::test]
    async fn workflow_with_no_jobs_keeps_its_own_name() {
        let checksuites = CheckSuiteConnection {
            edges: vec![suite(Some("EasyCLA"), Some("SUCCESS"), vec![])],
            page_info: HasNextPage::default(),
        };
        let result = add_workflow_conclusions(checksuites, &NoMorePages).await.unwrap();
        assert!(result.contains_key("EasyCLA"));
    }

    #[tokio::test]
    async fn cancelled_rerun_does_not_override_existing_workflow() {
        let checksuites = CheckSuiteConnection {
            edges: vec![
                suite(Some("pull"), Some("SUCCESS"), vec![check_run("linux-test", Some("SUCCESS"))]),
                suite(Some("pull"), Some("CANCELLED"), vec![check_run("linux-test", Some("CANCELLED"))]),
            ],
            page_info: HasNextPage::default(),
        };
        let result = add_workflow_conclusions(checksuites, &NoMorePages).await.unwrap();
        let job = &result["pull / linux-test"];
        assert_eq!(job.status, Some(CheckConclusion::Success));
    }

    #[tokio::test]
    async fn passing_status_is_sticky_against_later_non_passing_entries() {
        let checksuites = CheckSuiteConnection {
            edges: vec![
                suite(Some("pull"), Some("SUCCESS"), vec![check_run("linux-test", Some("SUCCESS"))]),
                suite(Some("pull"), Some("FAILURE"), vec![check_run("linux-test", Some("FAILURE"))]),
            ],
            page_info: HasNextPage::default(),
        };
        let result = add_workflow_conclusions(checksuites, &NoMorePages).await.unwrap();
        assert_eq!(result["pull / linux-test"].status, Some(CheckConclusion::Success));
    }
}
