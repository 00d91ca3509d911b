//! Commit message composition (spec 4.7.1): strips `cc:` lines and, for stacked merges, the
//! ghstack "Stack" bullet block, then appends the resolved-PR and approved-by trailers.
use regex::Regex;

lazy_static! {
    static ref CC_LINE_RE: Regex = Regex::new(r"(?m)^cc:?\s*@\w+.*$\n?").unwrap();
    static ref STACK_HEADER_RE: Regex = Regex::new(r"(?m)^Stack\b.*$").unwrap();
}

/// Removes every line matching `^cc:? @\w+.*$`. Idempotent: a body with no such lines is
/// returned unchanged.
pub fn strip_cc_lines(body: &str) -> String {
    CC_LINE_RE.replace_all(body, "").into_owned()
}

/// Removes the contiguous ghstack "Stack:\n* #123\n* #124" block, if present. The block starts
/// at a line beginning with `Stack` and consumes every immediately-following bullet line
/// (`*` or `-`). Idempotent: once the block is gone, re-running this is a no-op.
pub fn strip_ghstack_block(body: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let Some(start) = lines.iter().position(|l| STACK_HEADER_RE.is_match(l)) else {
        return body.to_string();
    };
    let mut end = start + 1;
    while end < lines.len() {
        let trimmed = lines[end].trim_start();
        if trimmed.starts_with('*') || trimmed.starts_with('-') {
            end += 1;
        } else {
            break;
        }
    }
    let mut remaining = Vec::with_capacity(lines.len() - (end - start));
    remaining.extend_from_slice(&lines[..start]);
    remaining.extend_from_slice(&lines[end..]);
    remaining.join("\n")
}

/// Builds the full squash/cherry-pick commit message: title with PR number, body with `cc:`
/// lines (and, for stacked merges, the ghstack block) stripped, a "Pull Request resolved"
/// trailer, and an "Approved by" trailer listing profile URLs.
pub fn compose_commit_message(
    title: &str,
    pr_number: u32,
    body: &str,
    pr_url: &str,
    approved_by: &[String],
    strip_ghstack: bool,
) -> String {
    let mut cleaned = strip_cc_lines(body);
    if strip_ghstack {
        cleaned = strip_ghstack_block(&cleaned);
    }
    let cleaned = cleaned.trim().to_string();
    let approvers: Vec<String> = approved_by.iter().map(|login| format!("https://github.com/{}", login)).collect();

    let mut message = format!("{} (#{})\n\n", title, pr_number);
    if !cleaned.is_empty() {
        message.push_str(&cleaned);
        message.push('\n');
    }
    message.push_str(&format!("Pull Request resolved: {}\n", pr_url));
    message.push_str(&format!("Approved by: {}\n", approvers.join(", ")));
    message
}

/// Minimal stand-in for the original's `TryMergeExplainer` (out of scope per spec 4.7): the
/// orchestrator still needs *some* text to post at the "merging now" and timeout points, just
/// not the full on-green/on-mandatory cosmetic variants the original produces.
pub fn merging_now_comment() -> &'static str {
    "@mergebro started a merge job that will land this pull request once its checks are green."
}

pub fn timeout_comment(timeout_minutes: u64) -> String {
    format!("Merge failed: mandatory checks did not converge within {} minutes, giving up.", timeout_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_cc_lines() {
        let body = "Fixes the thing.\ncc: @alice @bob\nMore text.";
        assert_eq!(strip_cc_lines(body), "Fixes the thing.\nMore text.");
    }

    #[test]
    fn strip_cc_lines_is_idempotent() {
        let body = "Fixes the thing.\ncc @alice\nMore text.";
        let once = strip_cc_lines(body);
        let twice = strip_cc_lines(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strips_ghstack_stack_block() {
        let body = "Summary here.\n\nStack:\n* #123\n* #124 (this PR)\n\nTest plan here.";
        let stripped = strip_ghstack_block(body);
        assert!(!stripped.contains("Stack:"));
        assert!(stripped.contains("Summary here."));
        assert!(stripped.contains("Test plan here."));
    }

    #[test]
    fn strip_ghstack_block_is_idempotent() {
        let body = "Summary.\n\nStack:\n* #123\n\nMore.";
        let once = strip_ghstack_block(body);
        let twice = strip_ghstack_block(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn compose_commit_message_matches_expected_shape() {
        let message = compose_commit_message(
            "Title",
            1001,
            "Body",
            "https://github.com/acme/proj/pull/1001",
            &["alice".to_string()],
            false,
        );
        assert_eq!(
            message,
            "Title (#1001)\n\nBody\nPull Request resolved: https://github.com/acme/proj/pull/1001\nApproved by: https://github.com/alice\n"
        );
    }
}
