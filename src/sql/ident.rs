//! Identifier gate: table and column names must pass before they reach SQL text.

use crate::error::AppError;
use regex::Regex;
use std::sync::OnceLock;

/// PostgreSQL truncates longer identifiers; reject instead of silently aliasing.
pub const MAX_IDENTIFIER_LEN: usize = 63;

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

pub fn is_valid_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && identifier_re().is_match(name)
}

/// Returns the name unchanged if it matches `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn validate_identifier(name: &str) -> Result<&str, AppError> {
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(AppError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate every name, failing on the first bad one.
pub fn validate_all<'a, I>(names: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = &'a str>,
{
    for n in names {
        validate_identifier(n)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["widgets", "_tmp", "Order_Items2", "a", "sys_user_role"] {
            assert!(validate_identifier(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_anything_outside_the_grammar() {
        for bad in [
            "",
            "1table",
            "widgets;DROP TABLE x",
            "a b",
            "name--",
            "\"quoted\"",
            "schema.table",
            "caf\u{e9}",
            "t)",
        ] {
            assert!(
                matches!(validate_identifier(bad), Err(AppError::InvalidIdentifier(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_identifier(&long).is_err());
        assert!(validate_identifier(&long[..MAX_IDENTIFIER_LEN]).is_ok());
    }

    #[test]
    fn validate_all_stops_at_first_failure() {
        let err = validate_all(["name", "qty", "bad col", "also bad"]).unwrap_err();
        assert!(matches!(err, AppError::InvalidIdentifier(ref n) if n == "bad col"));
    }
}
