//! Version constraint floors.
//!
//! Only the lower bound of a constraint matters for runtime checks. Syntax
//! accepted per alternative (alternatives separated by `||` or `|`):
//! comparators separated by whitespace or commas (`>=8.1 <9`), caret/tilde
//! (`^8.1`, `~8.1`), wildcards (`8.1.*`), hyphen ranges (`8.1 - 8.3`).
//! Stability flags (`@dev`) and `v` prefixes are ignored.

use semver::{Op, Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("empty version constraint")]
    Empty,

    #[error("invalid version constraint '{constraint}': {reason}")]
    Invalid { constraint: String, reason: String },
}

const OPERATORS: &[&str] = &[">=", "<=", "==", "!=", ">", "<", "=", "^", "~"];

/// Lowest version admitted by `constraint`.
///
/// `Ok(None)` means the constraint is unbounded below (e.g. `*`, `<9`).
pub fn constraint_floor(constraint: &str) -> Result<Option<Version>, ConstraintError> {
    let alternatives: Vec<&str> = constraint
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if alternatives.is_empty() {
        return Err(ConstraintError::Empty);
    }

    let mut floor: Option<Version> = None;
    for alternative in alternatives {
        match alternative_floor(constraint, alternative)? {
            None => return Ok(None),
            Some(v) => {
                floor = Some(match floor {
                    Some(current) if current <= v => current,
                    _ => v,
                })
            }
        }
    }
    Ok(floor)
}

fn alternative_floor(constraint: &str, alternative: &str) -> Result<Option<Version>, ConstraintError> {
    let raw: Vec<&str> = alternative
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();

    if raw.len() == 3 && raw[1] == "-" {
        return comparator_floor(constraint, raw[0]);
    }

    let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
    let mut pending_op: Option<&str> = None;
    for token in raw {
        if OPERATORS.contains(&token) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{token}")),
            None => tokens.push(token.to_string()),
        }
    }
    if let Some(op) = pending_op {
        return Err(invalid(constraint, format!("operator '{op}' without version")));
    }

    let mut floor: Option<Version> = None;
    for token in &tokens {
        if let Some(bound) = comparator_floor(constraint, token)? {
            floor = Some(match floor {
                Some(current) if current >= bound => current,
                _ => bound,
            });
        }
    }
    Ok(floor)
}

fn comparator_floor(constraint: &str, token: &str) -> Result<Option<Version>, ConstraintError> {
    let token = token.split('@').next().unwrap_or_default();
    if token.is_empty() {
        // Bare stability flag such as "@dev".
        return Ok(None);
    }
    let split = token
        .find(|c: char| !matches!(c, '>' | '<' | '=' | '!' | '^' | '~'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = version.trim_start_matches(['v', 'V']);
    if version.is_empty() {
        return Err(invalid(constraint, format!("operator '{op}' without version")));
    }
    if op == "!=" {
        return Ok(None);
    }
    let op = if op == "==" { "=" } else { op };

    let req = VersionReq::parse(&format!("{op}{version}"))
        .map_err(|e| invalid(constraint, e.to_string()))?;

    let mut floor: Option<Version> = None;
    for cmp in &req.comparators {
        let bound = match cmp.op {
            Op::Less | Op::LessEq => continue,
            _ => Version::new(cmp.major, cmp.minor.unwrap_or(0), cmp.patch.unwrap_or(0)),
        };
        floor = Some(match floor {
            Some(current) if current >= bound => current,
            _ => bound,
        });
    }
    Ok(floor)
}

fn invalid(constraint: &str, reason: impl Into<String>) -> ConstraintError {
    ConstraintError::Invalid {
        constraint: constraint.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor(c: &str) -> Option<String> {
        constraint_floor(c).unwrap().map(|v| v.to_string())
    }

    #[test]
    fn simple_comparators() {
        assert_eq!(floor(">=8.1").as_deref(), Some("8.1.0"));
        assert_eq!(floor(">= 7.4.3").as_deref(), Some("7.4.3"));
        assert_eq!(floor("^8.2").as_deref(), Some("8.2.0"));
        assert_eq!(floor("~7.4").as_deref(), Some("7.4.0"));
        assert_eq!(floor("8.1.*").as_deref(), Some("8.1.0"));
        assert_eq!(floor("=8.0.5").as_deref(), Some("8.0.5"));
        assert_eq!(floor("v8.3").as_deref(), Some("8.3.0"));
    }

    #[test]
    fn alternatives_take_the_lowest_floor() {
        assert_eq!(floor("^7.4 || ^8.0").as_deref(), Some("7.4.0"));
        assert_eq!(floor("^8.0 | ^7.3").as_deref(), Some("7.3.0"));
    }

    #[test]
    fn conjunctions_take_the_highest_floor() {
        assert_eq!(floor(">=7.2 <9.0").as_deref(), Some("7.2.0"));
        assert_eq!(floor(">=7.2, >=7.4").as_deref(), Some("7.4.0"));
        assert_eq!(floor("8.1 - 8.3").as_deref(), Some("8.1.0"));
    }

    #[test]
    fn unbounded_constraints() {
        assert_eq!(floor("*"), None);
        assert_eq!(floor("<9"), None);
        assert_eq!(floor("^8.0 || *"), None);
        assert_eq!(floor("!=8.0.1"), None);
    }

    #[test]
    fn stability_flags_are_ignored() {
        assert_eq!(floor("^8.1@dev").as_deref(), Some("8.1.0"));
    }

    #[test]
    fn invalid_constraints() {
        assert_eq!(constraint_floor("  "), Err(ConstraintError::Empty));
        assert!(constraint_floor("dev-master").is_err());
        assert!(constraint_floor(">=").is_err());
        assert!(constraint_floor("8.1.0.0").is_err());
    }
}
