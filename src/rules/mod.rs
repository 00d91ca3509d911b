pub mod evaluator;
pub mod loader;
pub mod model;
pub mod teams;

pub use evaluator::{
    categorize_checks, evaluate, find_matching_merge_rule, CheckCategories, InternalChangesError, RuleOutcome,
    ScoredRejection,
};
pub use loader::{fetch_flaky_rules, load_merge_rules, load_merge_rules_for_repo};
pub use model::{FlakyRule, MergeRule};
pub use teams::TeamMemberCache;
