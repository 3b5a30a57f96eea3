// Property tests for namespace validation
// The grammar must accept exactly [a-z][a-z0-9_]{0,62}

use proptest::prelude::*;
use querybox_sandbox::identifier::{search_path, MAX_NAMESPACE_LEN};
use querybox_sandbox::{validate_namespace, InvalidIdentifier, Namespace};

fn matches_grammar(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= MAX_NAMESPACE_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

proptest! {
    #[test]
    fn valid_names_are_accepted(name in "[a-z][a-z0-9_]{0,62}") {
        let namespace = validate_namespace(&name).unwrap();
        prop_assert_eq!(namespace.as_str(), name.as_str());
    }

    #[test]
    fn acceptance_matches_grammar(name in "\\PC{0,80}") {
        prop_assert_eq!(validate_namespace(&name).is_ok(), matches_grammar(&name));
    }

    #[test]
    fn statement_breaking_chars_are_rejected(
        prefix in "[a-z][a-z0-9_]{0,20}",
        bad in prop::sample::select(vec![';', '\'', '"', ' ', '\t', '\n', '.', '-', '/', '*', '$', '\\']),
        suffix in "[a-z0-9_]{0,20}",
    ) {
        let name = format!("{}{}{}", prefix, bad, suffix);
        let is_bad_char = matches!(
            validate_namespace(&name),
            Err(InvalidIdentifier::BadChar { found, .. }) if found == bad
        );
        prop_assert!(is_bad_char);
    }

    #[test]
    fn bad_first_char_is_rejected(
        first in "[0-9_A-Z]",
        rest in "[a-z0-9_]{0,20}",
    ) {
        let name = format!("{}{}", first, rest);
        let is_bad_first = matches!(
            validate_namespace(&name),
            Err(InvalidIdentifier::BadFirstChar { .. })
        );
        prop_assert!(is_bad_first);
    }

    #[test]
    fn search_path_has_no_statement_syntax(name in "[a-z][a-z0-9_]{0,62}") {
        let namespace = validate_namespace(&name).unwrap();
        let path = search_path(&namespace, &Namespace::public());
        prop_assert_eq!(path, format!("{}, public", name));
    }
}
