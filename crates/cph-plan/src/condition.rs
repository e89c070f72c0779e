//! `when` condition evaluation. Deliberately narrow: a
//! four-form string-prefix matcher, not a boolean-expression parser — the
//! engine supports exactly those forms and rejects anything
//! else as `PlanInvalidCondition`.

use std::path::Path;

use cph_core::CphError;

/// Evaluate `condition` against the filesystem rooted wherever `PATH` in
/// the condition string resolves to (already template-expanded by the
/// caller). Returns `Ok(false)` to mean "skip the step", never an error,
/// for well-formed-but-false conditions.
pub fn evaluate(condition: &str) -> Result<bool, CphError> {
    let trimmed = condition.trim();

    if let Some(path) = trimmed.strip_prefix("test -d ") {
        return Ok(Path::new(path.trim()).is_dir());
    }
    if let Some(path) = trimmed.strip_prefix("test -f ") {
        return Ok(Path::new(path.trim()).is_file());
    }
    if let Some(path) = trimmed.strip_prefix("test ! -d ") {
        return Ok(!Path::new(path.trim()).is_dir());
    }
    if let Some(path) = trimmed.strip_prefix("test ! -f ") {
        return Ok(!Path::new(path.trim()).is_file());
    }

    Err(CphError::PlanInvalidCondition(condition.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dash_d_true_for_existing_dir() {
        let tmp = tempdir().unwrap();
        let cond = format!("test -d {}", tmp.path().display());
        assert!(evaluate(&cond).unwrap());
    }

    #[test]
    fn test_dash_d_false_for_missing_dir() {
        let cond = "test -d /definitely/does/not/exist-cph";
        assert!(!evaluate(cond).unwrap());
    }

    #[test]
    fn test_dash_f_true_for_existing_file() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let cond = format!("test -f {}", file.display());
        assert!(evaluate(&cond).unwrap());
    }

    #[test]
    fn negated_dash_d_inverts_result() {
        let tmp = tempdir().unwrap();
        let cond = format!("test ! -d {}", tmp.path().display());
        assert!(!evaluate(&cond).unwrap());

        let cond = "test ! -d /definitely/does/not/exist-cph";
        assert!(evaluate(cond).unwrap());
    }

    #[test]
    fn negated_dash_f_inverts_result() {
        let cond = "test ! -f /definitely/does/not/exist-cph.txt";
        assert!(evaluate(cond).unwrap());
    }

    #[test]
    fn unknown_syntax_is_invalid_condition() {
        let err = evaluate("exists /tmp/x").unwrap_err();
        assert_eq!(err.code(), "PLAN_INVALID_CONDITION");
    }

    #[test]
    fn empty_condition_is_invalid() {
        assert!(evaluate("").is_err());
    }
}
