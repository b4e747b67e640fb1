//! Type, how and relation validators.

use crate::catalog::Catalog;
use crate::pattern::TypePattern;
use cotguard_core::TypeError;

/// Validates a type code against the global catalog.
///
/// Trailing wildcards (`a-f-*`) are checked for syntax only. An affiliation
/// wildcard (`a-.-G`) is accepted when the catalog holds at least one of its
/// expansions. Concrete codes must be registered.
pub fn validate_type(code: &str) -> Result<(), TypeError> {
    validate_type_in(Catalog::global(), code)
}

/// Validates a type code against a specific catalog.
pub fn validate_type_in(catalog: &Catalog, code: &str) -> Result<(), TypeError> {
    let pattern = TypePattern::parse(code)?;

    if pattern.is_trailing() {
        return Ok(());
    }
    if pattern.has_affiliation_wildcard() {
        return if pattern
            .expand_affiliations()
            .iter()
            .any(|expanded| catalog.contains(expanded))
        {
            Ok(())
        } else {
            Err(TypeError::Unknown(code.to_string()))
        };
    }
    if catalog.contains(code) {
        Ok(())
    } else {
        Err(TypeError::Unknown(code.to_string()))
    }
}

/// Validates a how code against the global catalog. Empty means unspecified
/// and is accepted.
pub fn validate_how(code: &str) -> Result<(), TypeError> {
    validate_how_in(Catalog::global(), code)
}

pub fn validate_how_in(catalog: &Catalog, code: &str) -> Result<(), TypeError> {
    if code.is_empty() || catalog.how(code).is_some() {
        Ok(())
    } else {
        Err(TypeError::UnknownHow(code.to_string()))
    }
}

/// Validates a link relation code against the global catalog.
pub fn validate_relation(code: &str) -> Result<(), TypeError> {
    validate_relation_in(Catalog::global(), code)
}

pub fn validate_relation_in(catalog: &Catalog, code: &str) -> Result<(), TypeError> {
    if code.is_empty() {
        return Err(TypeError::EmptyRelation);
    }
    if catalog.relation(code).is_some() {
        Ok(())
    } else {
        Err(TypeError::UnknownRelation(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_type_global() {
        assert!(validate_type("a-f-G-E-V-C").is_ok());
        assert!(validate_type("a-.-G").is_ok());
        assert!(validate_type("a-f-*").is_ok());
        assert_eq!(
            validate_type("a-f-G-Q-Q-Q"),
            Err(TypeError::Unknown("a-f-G-Q-Q-Q".into()))
        );
        assert!(matches!(
            validate_type("a-*-G"),
            Err(TypeError::InvalidWildcard { .. })
        ));
        assert_eq!(validate_type(""), Err(TypeError::Empty));
    }

    #[test]
    fn test_affiliation_wildcard_needs_expansion() {
        let catalog = Catalog::new();
        assert!(validate_type_in(&catalog, "a-.-G").unwrap_err().is_unknown());
        catalog.register_custom("a-n-G", "Gnd", "").unwrap();
        assert!(validate_type_in(&catalog, "a-.-G").is_ok());
    }

    #[test]
    fn test_trailing_wildcard_is_syntax_only() {
        let catalog = Catalog::new();
        assert!(validate_type_in(&catalog, "x-y-*").is_err());
        assert!(validate_type_in(&catalog, "b-q-*").is_ok());
    }

    #[test]
    fn test_validate_how() {
        assert!(validate_how("").is_ok());
        assert!(validate_how("m-g").is_ok());
        assert!(validate_how("h-g-i-g-o").is_ok());
        assert_eq!(validate_how("z-z"), Err(TypeError::UnknownHow("z-z".into())));
    }

    #[test]
    fn test_validate_relation() {
        assert_eq!(validate_relation(""), Err(TypeError::EmptyRelation));
        assert!(validate_relation("p-p").is_ok());
        assert!(validate_relation("c").is_ok());
        assert_eq!(
            validate_relation("q"),
            Err(TypeError::UnknownRelation("q".into()))
        );
    }
}
