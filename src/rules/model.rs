use serde_derive::Deserialize;

/// One entry of `.github/merge_rules.yaml`. Unknown fields are rejected so a typo in the rule
/// file fails loudly instead of silently matching nothing.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct MergeRule {
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub approved_by: Vec<String>,
    #[serde(default)]
    pub mandatory_checks_name: Option<Vec<String>>,
}

/// A known-flaky job signature, fetched from the shared flaky-rules feed. A job matches when
/// its name contains `name` as a substring and every entry in `captures` appears somewhere in
/// one of the job's failure captures.
#[derive(Deserialize, Debug, Clone)]
pub struct FlakyRule {
    pub name: String,
    #[serde(default)]
    pub captures: Vec<String>,
}

impl FlakyRule {
    pub fn matches(&self, job_name: &str, failure_captures: &[String]) -> bool {
        if !job_name.contains(&self.name) {
            return false;
        }
        self.captures
            .iter()
            .all(|capture| failure_captures.iter().any(|actual| actual.contains(capture.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flaky_rule_matches_name_substring_and_all_captures() {
        let rule = FlakyRule {
            name: "linux-test".into(),
            captures: vec!["Connection reset".into()],
        };
        assert!(rule.matches("pull / linux-test (default, 1, 3)", &["Connection reset by peer".into()]));
        assert!(!rule.matches("pull / linux-test (default, 1, 3)", &["OOM killed".into()]));
        assert!(!rule.matches("pull / linux-build", &["Connection reset".into()]));
    }
}
