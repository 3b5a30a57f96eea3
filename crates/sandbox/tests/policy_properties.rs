// Property tests for the statement policy filter
// Any deny-listed keyword, in any casing or spacing, must be rejected

use proptest::prelude::*;
use querybox_config::DEFAULT_DENY_LIST;
use querybox_sandbox::{PolicyDecision, StatementPolicy};

/// Re-case a keyword according to `mask` and widen its inner spaces
fn disguise(keyword: &str, mask: &[bool], gap: &str) -> String {
    keyword
        .chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| {
            if c == ' ' {
                gap.to_string()
            } else if *upper {
                c.to_ascii_uppercase().to_string()
            } else {
                c.to_ascii_lowercase().to_string()
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn deny_listed_keywords_are_forbidden(
        keyword in prop::sample::select(DEFAULT_DENY_LIST.to_vec()),
        mask in prop::collection::vec(any::<bool>(), 1..16),
        gap in "[ \t\n]{1,4}",
        before in "[a-zA-Z0-9_ (),*]{0,30}",
        after in "[a-zA-Z0-9_ (),*]{0,30}",
    ) {
        let policy = StatementPolicy::default();
        let sql = format!("{} {} {}", before, disguise(keyword, &mask, &gap), after);
        let decision = policy.classify(&sql);
        prop_assert!(!decision.is_permitted(), "{:?} was permitted", sql);
        prop_assert!(decision.reason().is_some());
    }

    #[test]
    fn plain_selects_are_permitted(
        table in "[a-z][a-z_]{0,10}",
        limit in 1u32..1000,
    ) {
        // Deny-list keywords can't be spelled from these generators
        prop_assume!(!table.to_uppercase().contains("DROP"));
        prop_assume!(!table.to_uppercase().contains("ALTER"));
        prop_assume!(!table.to_uppercase().contains("GRANT"));
        prop_assume!(!table.to_uppercase().contains("REVOKE"));
        prop_assume!(!table.to_uppercase().contains("TRUNCATE"));

        let policy = StatementPolicy::default();
        let sql = format!("SELECT * FROM {} LIMIT {}", table, limit);
        prop_assert_eq!(policy.classify(&sql), PolicyDecision::Permitted);
    }

    #[test]
    fn classify_never_panics(sql in "\\PC{0,200}") {
        let _ = StatementPolicy::default().classify(&sql);
    }
}
