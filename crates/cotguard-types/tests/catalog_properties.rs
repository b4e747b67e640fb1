//! Property tests for the type code grammar and catalog writes.

use cotguard_core::TypeError;
use cotguard_types::{validate_type_in, Catalog, Type, TypePattern};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_]{1,4}"
}

fn affiliation() -> impl Strategy<Value = char> {
    prop::sample::select(vec!['p', 'u', 'a', 'f', 'n', 's', 'h', 'j', 'k', 'o'])
}

/// A syntactically valid atom code with a literal affiliation.
fn atom_code() -> impl Strategy<Value = String> {
    (affiliation(), prop::collection::vec(segment(), 1..5)).prop_map(|(aff, rest)| {
        format!("a-{}-{}", aff, rest.join("-"))
    })
}

proptest! {
    #[test]
    fn trailing_star_always_validates(code in atom_code()) {
        let catalog = Catalog::new();
        let wildcard = format!("{}-*", code);
        prop_assert!(validate_type_in(&catalog, &wildcard).is_ok());
    }

    #[test]
    fn non_final_star_is_rejected(code in atom_code(), tail in segment()) {
        let catalog = Catalog::new();
        let embedded = format!("{}-*-{}", code, tail);
        prop_assert!(
            matches!(
                validate_type_in(&catalog, &embedded),
                Err(TypeError::InvalidWildcard { .. })
            ),
            "accepted {}",
            embedded
        );
    }

    #[test]
    fn double_star_is_rejected(code in atom_code()) {
        let catalog = Catalog::new();
        let doubled = format!("{}-*-*", code);
        let result = validate_type_in(&catalog, &doubled);
        prop_assert!(matches!(result, Err(TypeError::InvalidWildcard { .. })), "accepted {}", doubled);
    }

    #[test]
    fn trailing_star_matches_every_extension(code in atom_code(), tail in segment()) {
        let wildcard = format!("{}-*", code);
        let pattern = TypePattern::parse(&wildcard).unwrap();
        let extended = format!("{}-{}", code, tail);
        prop_assert!(pattern.matches(&extended));
        prop_assert!(!pattern.matches(&code));
    }

    #[test]
    fn upsert_is_idempotent(code in atom_code(), full in "[a-zA-Z/ ]{0,20}", desc in "[a-zA-Z ]{0,20}") {
        let once = Catalog::new();
        let twice = Catalog::new();
        let entry = Type::new(code.clone(), full, desc);

        once.upsert(code.clone(), entry.clone());
        twice.upsert(code.clone(), entry.clone());
        twice.upsert(code.clone(), entry);

        prop_assert_eq!(once.len(), twice.len());
        prop_assert_eq!(once.get(&code), twice.get(&code));
        prop_assert_eq!(once.find_by_description(""), twice.find_by_description(""));
    }
}
