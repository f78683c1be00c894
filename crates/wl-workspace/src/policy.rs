// policy.rs — Abort or warn: what a failure means for the running command.
//
// Primary operations (validation, authorization, the local write itself)
// abort. Steps that run around an already-committed local mutation (sync,
// push, review refresh, approval lookup, closing a review) only warn, and the
// warning tells the user how to retry.

use std::fmt;

use wl_store::StoreError;

use crate::error::{Result, WorkspaceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    InputValidation,
    StateConflict,
    ToolingUnavailable,
    Sync,
    Push,
    ReviewRefresh,
    ApprovalLookup,
    ReviewClose,
    /// A notice about the clone or the item, never a failed step.
    Advisory,
    Other,
}

impl ErrorClass {
    /// Class of an error raised by a primary operation.
    pub fn of(err: &WorkspaceError) -> Self {
        match err {
            WorkspaceError::Board(e) if e.is_validation() => ErrorClass::InputValidation,
            WorkspaceError::Board(_) => ErrorClass::StateConflict,
            WorkspaceError::InvalidConfig { .. } => ErrorClass::InputValidation,
            WorkspaceError::Store(e) if e.is_tool_missing() => ErrorClass::ToolingUnavailable,
            WorkspaceError::Review(e) if e.is_tool_missing() => ErrorClass::ToolingUnavailable,
            WorkspaceError::Store(StoreError::MergeConflict(_)) => ErrorClass::StateConflict,
            _ => ErrorClass::Other,
        }
    }

    fn retry_hint(self) -> Option<&'static str> {
        match self {
            ErrorClass::Sync => Some("continuing with local state; run `wl sync` later"),
            ErrorClass::Push => {
                Some("changes are committed locally; run `wl sync --push` to retry")
            }
            ErrorClass::ReviewRefresh => Some("run `wl review <id>` to refresh the review"),
            ErrorClass::ReviewClose => {
                Some("the merge itself succeeded; finish the cleanup by hand")
            }
            _ => None,
        }
    }
}

/// What to do when an operation of a given class fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Abort,
    Warn,
}

pub fn policy_for(class: ErrorClass) -> Policy {
    match class {
        ErrorClass::InputValidation
        | ErrorClass::StateConflict
        | ErrorClass::ToolingUnavailable
        | ErrorClass::Other => Policy::Abort,
        ErrorClass::Sync
        | ErrorClass::Push
        | ErrorClass::ReviewRefresh
        | ErrorClass::ApprovalLookup
        | ErrorClass::ReviewClose
        | ErrorClass::Advisory => Policy::Warn,
    }
}

/// A failure that did not stop the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub class: ErrorClass,
    pub message: String,
}

impl Warning {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(hint) = self.class.retry_hint() {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

/// Apply the policy for `class` to the outcome of one step.
///
/// `Ok(Some(v))` on success, `Ok(None)` after recording a warning, or the
/// error itself when the class aborts.
pub fn settle<T, E>(
    class: ErrorClass,
    what: &str,
    result: std::result::Result<T, E>,
    warnings: &mut Vec<Warning>,
) -> Result<Option<T>>
where
    E: Into<WorkspaceError>,
{
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            let err: WorkspaceError = e.into();
            match policy_for(class) {
                Policy::Abort => Err(err),
                Policy::Warn => {
                    tracing::warn!("{} failed: {}", what, err);
                    warnings.push(Warning::new(class, format!("{} failed: {}", what, err)));
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wl_board::{BoardError, ItemStatus, TransitionKind};

    #[test]
    fn only_best_effort_steps_warn() {
        for class in [
            ErrorClass::Sync,
            ErrorClass::Push,
            ErrorClass::ReviewRefresh,
            ErrorClass::ApprovalLookup,
            ErrorClass::ReviewClose,
            ErrorClass::Advisory,
        ] {
            assert_eq!(policy_for(class), Policy::Warn);
        }
        for class in [
            ErrorClass::InputValidation,
            ErrorClass::StateConflict,
            ErrorClass::ToolingUnavailable,
            ErrorClass::Other,
        ] {
            assert_eq!(policy_for(class), Policy::Abort);
        }
    }

    #[test]
    fn errors_are_classified_by_kind() {
        let conflict: WorkspaceError = BoardError::Conflict {
            kind: TransitionKind::Claim,
            status: ItemStatus::Claimed,
        }
        .into();
        assert_eq!(ErrorClass::of(&conflict), ErrorClass::StateConflict);

        let invalid: WorkspaceError = BoardError::Missing("title").into();
        assert_eq!(ErrorClass::of(&invalid), ErrorClass::InputValidation);

        let missing: WorkspaceError = StoreError::ToolMissing {
            tool: "dolt".into(),
            hint: "install dolt".into(),
        }
        .into();
        assert_eq!(ErrorClass::of(&missing), ErrorClass::ToolingUnavailable);
    }

    #[test]
    fn settle_records_warnings_with_retry_hint() {
        let mut warnings = Vec::new();
        let out = settle(
            ErrorClass::Push,
            "push to upstream",
            Err::<(), _>(StoreError::RemoteUnreachable("upstream".into())),
            &mut warnings,
        )
        .unwrap();
        assert!(out.is_none());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("wl sync --push"));

        let err = settle(
            ErrorClass::Other,
            "commit",
            Err::<(), _>(StoreError::RowNotFound("w-1".into())),
            &mut warnings,
        );
        assert!(err.is_err());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn advisories_carry_no_retry_hint() {
        let warning = Warning::new(ErrorClass::Advisory, "item w-1 looks stale");
        assert_eq!(warning.to_string(), "item w-1 looks stale");
    }
}
