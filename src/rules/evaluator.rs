use super::model::MergeRule;
use crate::checks::models::{Classification, JobNameToState};
use regex::Regex;
use thiserror::Error;

/// Score bands used when no rule matches cleanly. Rejections are ranked by score and the
/// highest-scoring rejection's message is surfaced, since it represents the rule that came
/// closest to matching.
const NO_APPROVAL_SCORE: u32 = 10_000;
const MANDATORY_CHECKS_PENDING_SCORE: u32 = 20_000;
const MANDATORY_CHECKS_FAILED_SCORE: u32 = 30_000;

/// Substring always kept in a rule's mandatory checks even when the caller asked to skip
/// mandatory-check enforcement (`--force`): the CLA check is never bypassable.
const ALWAYS_REQUIRED_CHECK: &str = "EasyCLA";

pub enum RuleOutcome {
    Matched(MergeRule),
    Rejected(ScoredRejection),
}

/// A PR carrying an internal (Phabricator-originated) change with an unsatisfied internal-only
/// sync check must be landed via the internal tool. Unlike a `ScoredRejection` this is not
/// ranked against other rules: it short-circuits evaluation entirely.
#[derive(Error, Debug)]
#[error("PR must be landed via the internal tool")]
pub struct InternalChangesError;

/// Entry point combining the internal-changes short-circuit (spec 4.6 step 5) with the scored
/// rule evaluation (steps 1-4). `has_internal_changes` is resolved by the caller since it
/// requires an async forge round-trip that this otherwise-pure module doesn't perform itself.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    rules: &[MergeRule],
    changed_files: &[String],
    approved_by: &[String],
    checks: &JobNameToState,
    skip_mandatory_checks: bool,
    skip_internal_checks: bool,
    has_internal_changes: bool,
    ok_failed_threshold: usize,
) -> Result<RuleOutcome, InternalChangesError> {
    if has_internal_changes && !skip_internal_checks {
        return Err(InternalChangesError);
    }
    Ok(find_matching_merge_rule(
        rules,
        changed_files,
        approved_by,
        checks,
        skip_mandatory_checks,
        ok_failed_threshold,
    ))
}

pub struct ScoredRejection {
    pub score: u32,
    pub message: String,
    pub rule: Option<MergeRule>,
    pub mandatory_checks_pending: bool,
}

/// Translates a shell glob (`*`, `?`) into an anchored regex, the same matching semantics the
/// original applies to merge-rule file patterns via `fnmatch`.
fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap()
}

fn file_matches_any_pattern(file: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| glob_to_regex(p).is_match(file))
}

/// Counts how many of `changed_files` fail to match any of the rule's patterns. A rule with
/// zero non-matching files covers the whole diff.
fn non_matching_file_count(rule: &MergeRule, changed_files: &[String]) -> usize {
    if rule.patterns.is_empty() {
        return 0;
    }
    changed_files.iter().filter(|f| !file_matches_any_pattern(f, &rule.patterns)).count()
}

fn is_approved(rule: &MergeRule, approved_by: &[String]) -> bool {
    if rule.approved_by.is_empty() {
        return true;
    }
    rule.approved_by.iter().any(|required| approved_by.iter().any(|actual| actual == required))
}

/// Finds the merge rule that best matches the current PR. Rules are evaluated in file order;
/// the first rule whose file patterns cover the full diff, whose approvals are satisfied, and
/// whose mandatory checks are all passing wins outright. Otherwise the highest-scored
/// rejection across all rules is returned, mirroring the original's ranked-rejection design so
/// the reported reason is the most specific one available.
pub fn find_matching_merge_rule(
    rules: &[MergeRule],
    changed_files: &[String],
    approved_by: &[String],
    checks: &JobNameToState,
    skip_mandatory_checks: bool,
    ok_failed_threshold: usize,
) -> RuleOutcome {
    let mut best_rejection: Option<ScoredRejection> = None;

    for rule in rules {
        let non_matching = non_matching_file_count(rule, changed_files);
        if non_matching > 0 {
            let num_matching = changed_files.len() - non_matching;
            consider(
                &mut best_rejection,
                ScoredRejection {
                    score: num_matching.min(NO_APPROVAL_SCORE as usize - 1) as u32,
                    message: format!(
                        "{} of the changed files do not match any pattern in rule '{}'",
                        non_matching, rule.name
                    ),
                    rule: Some(rule.clone()),
                    mandatory_checks_pending: false,
                },
            );
            continue;
        }

        if !is_approved(rule, approved_by) {
            consider(
                &mut best_rejection,
                ScoredRejection {
                    score: NO_APPROVAL_SCORE,
                    message: format!("this PR needs approval from one of: {}", rule.approved_by.join(", ")),
                    rule: Some(rule.clone()),
                    mandatory_checks_pending: false,
                },
            );
            continue;
        }

        let effective_mandatory = rule.mandatory_checks_name.as_ref().map(|names| {
            if skip_mandatory_checks {
                names.iter().filter(|n| n.contains(ALWAYS_REQUIRED_CHECK)).cloned().collect::<Vec<_>>()
            } else {
                names.clone()
            }
        });

        if let Some(mandatory) = &effective_mandatory {
            let categories = categorize_checks(checks, mandatory, ok_failed_threshold);
            if !categories.failed.is_empty() {
                consider(
                    &mut best_rejection,
                    ScoredRejection {
                        score: MANDATORY_CHECKS_FAILED_SCORE,
                        message: format!(
                            "{} mandatory check(s) failed for rule '{}': {}",
                            categories.failed.len(),
                            rule.name,
                            categories.failed.join(", ")
                        ),
                        rule: Some(rule.clone()),
                        mandatory_checks_pending: false,
                    },
                );
                continue;
            }
            if !categories.pending.is_empty() {
                consider(
                    &mut best_rejection,
                    ScoredRejection {
                        score: MANDATORY_CHECKS_PENDING_SCORE,
                        message: format!(
                            "{} mandatory check(s) still pending for rule '{}': {}",
                            categories.pending.len(),
                            rule.name,
                            categories.pending.join(", ")
                        ),
                        rule: Some(rule.clone()),
                        mandatory_checks_pending: true,
                    },
                );
                continue;
            }
        }

        return RuleOutcome::Matched(rule.clone());
    }

    match best_rejection {
        Some(rejection) => RuleOutcome::Rejected(rejection),
        None => RuleOutcome::Rejected(ScoredRejection {
            score: 0,
            message: "no merge rule is defined for this repository".to_string(),
            rule: None,
            mandatory_checks_pending: false,
        }),
    }
}

fn consider(best: &mut Option<ScoredRejection>, candidate: ScoredRejection) {
    let replace = match best {
        Some(current) => candidate.score > current.score,
        None => true,
    };
    if replace {
        *best = Some(candidate);
    }
}

pub struct CheckCategories {
    pub pending: Vec<String>,
    pub failed: Vec<String>,
    pub ok_failed: Vec<String>,
}

/// Partitions the checks matching `required_patterns` (substring match against the flattened
/// job names) into pending, hard-failed, and benign-failed (flaky or broken-trunk) buckets. If
/// more than `ok_failed_threshold` checks land in the benign bucket, they are folded back into
/// `failed` — too many "benign" failures at once is itself a signal something is wrong.
pub fn categorize_checks(
    checks: &JobNameToState,
    required_patterns: &[String],
    ok_failed_threshold: usize,
) -> CheckCategories {
    let mut pending = Vec::new();
    let mut failed = Vec::new();
    let mut ok_failed = Vec::new();

    for pattern in required_patterns {
        let matches: Vec<_> = checks.iter().filter(|(name, _)| name.contains(pattern.as_str())).collect();
        if matches.is_empty() {
            pending.push(pattern.clone());
            continue;
        }
        for (name, job) in matches {
            if job.status.is_none() {
                pending.push(name.clone());
            } else if job.is_passing() {
                continue;
            } else if matches!(job.classification, Some(Classification::Flaky) | Some(Classification::BrokenTrunk)) {
                ok_failed.push(name.clone());
            } else {
                failed.push(name.clone());
            }
        }
    }

    if ok_failed.len() > ok_failed_threshold {
        failed.append(&mut ok_failed);
    }

    CheckCategories { pending, failed, ok_failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::models::JobCheckState;
    use rstest::rstest;
    use std::collections::HashMap;

    fn rule(name: &str, patterns: &[&str], approved_by: &[&str]) -> MergeRule {
        MergeRule {
            name: name.into(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            approved_by: approved_by.iter().map(|s| s.to_string()).collect(),
            mandatory_checks_name: None,
        }
    }

    #[test]
    fn matches_when_patterns_cover_all_files_and_approvals_satisfied() {
        let rules = vec![rule("docs", &["docs/*"], &["docs-team"])];
        let outcome = find_matching_merge_rule(
            &rules,
            &["docs/readme.md".to_string()],
            &["docs-team".to_string()],
            &HashMap::new(),
            false,
            3,
        );
        assert!(matches!(outcome, RuleOutcome::Matched(_)));
    }

    #[test]
    fn rejects_with_highest_score_across_candidate_rules() {
        let rules = vec![
            rule("docs", &["docs/*"], &["docs-team"]),
            rule("core", &["src/*"], &["core-team"]),
        ];
        let outcome = find_matching_merge_rule(
            &rules,
            &["src/lib.rs".to_string()],
            &[],
            &HashMap::new(),
            false,
            3,
        );
        match outcome {
            RuleOutcome::Rejected(rejection) => assert_eq!(rejection.rule.unwrap().name, "core"),
            RuleOutcome::Matched(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn categorize_checks_buckets_by_classification() {
        let mut checks = HashMap::new();
        checks.insert(
            "pull / linux-test".to_string(),
            JobCheckState::new("pull / linux-test", None, Some(crate::checks::models::CheckConclusion::Failure)),
        );
        let categories = categorize_checks(&checks, &["linux-test".to_string()], 3);
        assert_eq!(categories.failed, vec!["pull / linux-test".to_string()]);
    }

    fn rule_with_checks(name: &str, mandatory: &[&str]) -> MergeRule {
        MergeRule {
            name: name.into(),
            patterns: vec![],
            approved_by: vec![],
            mandatory_checks_name: Some(mandatory.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn skip_mandatory_checks_keeps_only_easycla() {
        let rules = vec![rule_with_checks("core", &["pull / linux-test", "EasyCLA"])];
        let mut checks = HashMap::new();
        checks.insert(
            "EasyCLA".to_string(),
            JobCheckState::new("EasyCLA", None, Some(crate::checks::models::CheckConclusion::Success)),
        );
        // linux-test is missing entirely, which would normally mean "pending" -- but with
        // skip_mandatory_checks it's filtered out before categorization even runs.
        let outcome = find_matching_merge_rule(&rules, &[], &[], &checks, true, 3);
        assert!(matches!(outcome, RuleOutcome::Matched(_)));
    }

    #[test]
    fn skip_mandatory_checks_still_blocks_on_failing_easycla() {
        let rules = vec![rule_with_checks("core", &["EasyCLA"])];
        let mut checks = HashMap::new();
        checks.insert(
            "EasyCLA".to_string(),
            JobCheckState::new("EasyCLA", None, Some(crate::checks::models::CheckConclusion::Failure)),
        );
        let outcome = find_matching_merge_rule(&rules, &[], &[], &checks, true, 3);
        match outcome {
            RuleOutcome::Rejected(rejection) => assert!(!rejection.mandatory_checks_pending),
            RuleOutcome::Matched(_) => panic!("expected rejection"),
        }
    }

    #[rstest]
    fn benign_classifications_land_in_ok_failed(
        #[values(crate::checks::models::Classification::Flaky, crate::checks::models::Classification::BrokenTrunk)]
        classification: crate::checks::models::Classification,
    ) {
        let mut checks = HashMap::new();
        checks.insert(
            "pull / linux-test".to_string(),
            JobCheckState {
                classification: Some(classification),
                ..JobCheckState::new("pull / linux-test", None, Some(crate::checks::models::CheckConclusion::Failure))
            },
        );
        let categories = categorize_checks(&checks, &["linux-test".to_string()], 3);
        assert_eq!(categories.ok_failed, vec!["pull / linux-test".to_string()]);
        assert!(categories.failed.is_empty());
    }

    #[test]
    fn internal_changes_short_circuits_before_rule_matching() {
        let rules = vec![rule("core", &[], &[])];
        let result = evaluate(&rules, &[], &[], &HashMap::new(), false, false, true, 3);
        assert!(result.is_err());
    }

    #[test]
    fn internal_changes_bypassed_when_skip_internal_checks() {
        let rules = vec![rule("core", &[], &[])];
        let result = evaluate(&rules, &[], &[], &HashMap::new(), false, true, true, 3);
        assert!(matches!(result, Ok(RuleOutcome::Matched(_))));
    }
}
