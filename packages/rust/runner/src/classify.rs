//! Outcome classification for supervised commands.

use geoasset_shared::ChangeLogStatus;

/// Substring that marks captured output as failed even on a zero exit code.
const FAILURE_MARKER: &str = "error";

/// Result of classifying one supervised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Status reported in the change log.
    pub fn status(self) -> ChangeLogStatus {
        match self {
            Self::Success => ChangeLogStatus::Success,
            Self::Failure => ChangeLogStatus::Failed,
        }
    }
}

/// Classify a finished command.
///
/// Success requires a zero exit code and output that does not contain
/// "error" in any letter case. Some wrapped tools exit 0 after printing a
/// fatal diagnostic, so benign text mentioning "error" is a failure too.
/// A missing exit code (terminated by a signal) is a failure.
pub fn classify(exit_code: Option<i32>, output: &str) -> Outcome {
    match exit_code {
        Some(0) if !output.to_lowercase().contains(FAILURE_MARKER) => Outcome::Success,
        _ => Outcome::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_zero_exit_is_success() {
        assert_eq!(classify(Some(0), "All good"), Outcome::Success);
        assert_eq!(classify(Some(0), ""), Outcome::Success);
    }

    #[test]
    fn error_text_fails_zero_exit() {
        assert_eq!(classify(Some(0), "warning: error rate high"), Outcome::Failure);
        assert_eq!(classify(Some(0), "FATAL ERROR: no tiles"), Outcome::Failure);
        assert_eq!(classify(Some(0), "3 Errors found"), Outcome::Failure);
    }

    #[test]
    fn nonzero_exit_fails() {
        assert_eq!(classify(Some(1), ""), Outcome::Failure);
        assert_eq!(classify(Some(2), "All good"), Outcome::Failure);
    }

    #[test]
    fn signal_termination_fails() {
        assert_eq!(classify(None, "All good"), Outcome::Failure);
    }

    #[test]
    fn outcome_maps_to_status() {
        assert_eq!(Outcome::Success.status(), ChangeLogStatus::Success);
        assert_eq!(Outcome::Failure.status(), ChangeLogStatus::Failed);
        assert!(!Outcome::Failure.is_success());
    }
}
