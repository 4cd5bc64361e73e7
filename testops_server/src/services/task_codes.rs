//! Identifier allocation and input checks for new tasks.

use std::collections::HashSet;

use crate::error::ApiError;
use crate::models::task::TaskKind;

/// Smallest positive id not present in `existing`.
pub fn smallest_free_id(existing: &[i32]) -> i32 {
    let taken: HashSet<i32> = existing.iter().copied().collect();
    (1..).find(|id| !taken.contains(id)).unwrap_or(1)
}

/// Smallest unused `{PREFIX}-{NNN}` code for `kind`.
///
/// Codes that do not follow the pattern are ignored, and numbers freed by a
/// deletion are handed out again.
pub fn next_code<S: AsRef<str>>(kind: TaskKind, existing: &[S]) -> String {
    let prefix = kind.prefix();
    let taken: HashSet<u32> = existing
        .iter()
        .filter_map(|code| {
            let (head, number) = code.as_ref().split_once('-')?;
            (head == prefix).then(|| number.parse::<u32>().ok()).flatten()
        })
        .collect();
    let number = (1..).find(|n| !taken.contains(n)).unwrap_or(1);
    format!("{prefix}-{number:03}")
}

/// Plans carry a five-field cron spec (`minute hour day month weekday`).
pub fn validate_schedule(schedule: &str) -> Result<(), ApiError> {
    let fields = schedule.split_whitespace().count();
    if fields != 5 {
        return Err(ApiError::Validation(format!(
            "schedule_time must have 5 cron fields, got {fields}: '{schedule}'"
        )));
    }
    Ok(())
}

/// Only test pipelines can be wired to push events.
pub fn validate_cicd_type(cicd_type: &str) -> Result<(), ApiError> {
    if cicd_type != "Test" {
        return Err(ApiError::UnsupportedOperation(format!(
            "CI/CD type '{cicd_type}' is not supported, only 'Test' can be configured"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn freed_code_is_reused() {
        let existing = ["TASK-001", "TASK-003"];
        assert_eq!(next_code(TaskKind::Execution, &existing), "TASK-002");
    }

    #[test]
    fn first_code_of_each_kind() {
        let none: [&str; 0] = [];
        assert_eq!(next_code(TaskKind::Plan, &none), "PLAN-001");
        assert_eq!(next_code(TaskKind::Cicd, &none), "CICD-001");
    }

    #[test]
    fn foreign_and_malformed_codes_are_ignored() {
        let existing = vec![
            "PLAN-001".to_string(),
            "TASK-abc".to_string(),
            "TASK-001".to_string(),
            "legacy".to_string(),
        ];
        assert_eq!(next_code(TaskKind::Execution, &existing), "TASK-002");
    }

    #[rstest]
    #[case(&[], 1)]
    #[case(&[1, 2, 3], 4)]
    #[case(&[2, 3], 1)]
    #[case(&[1, 3, 4], 2)]
    fn picks_smallest_free_id(#[case] existing: &[i32], #[case] expected: i32) {
        assert_eq!(smallest_free_id(existing), expected);
    }

    #[rstest]
    #[case("0 2 * * *", true)]
    #[case("H/15  *  * * 1-5", true)]
    #[case("0 2 * *", false)]
    #[case("0 2 * * * *", false)]
    #[case("", false)]
    fn schedule_needs_five_fields(#[case] schedule: &str, #[case] ok: bool) {
        assert_eq!(validate_schedule(schedule).is_ok(), ok);
    }

    #[test]
    fn only_test_pipelines_are_supported() {
        assert!(validate_cicd_type("Test").is_ok());
        assert!(matches!(
            validate_cicd_type("Deploy"),
            Err(ApiError::UnsupportedOperation(_))
        ));
    }
}
