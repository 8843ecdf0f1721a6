use std::fmt;

use crate::model::ItemId;

/// Machine-readable error codes for operators and support tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AuthRequired,
    ValidationFailed,
    EmptySelection,
    StaleReference,
    CategoryLimitReached,
    CategoryConflict,
    CategoryNotFound,
    MalformedRecord,
    FeedUnavailable,
    BackendUnavailable,
    ExportFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AuthRequired => "E1001",
            Self::ValidationFailed => "E2001",
            Self::EmptySelection => "E2002",
            Self::StaleReference => "E2003",
            Self::CategoryLimitReached => "E2004",
            Self::CategoryConflict => "E2005",
            Self::CategoryNotFound => "E2006",
            Self::MalformedRecord => "E3001",
            Self::FeedUnavailable => "E5001",
            Self::BackendUnavailable => "E5002",
            Self::ExportFailed => "E5003",
        }
    }

    /// Short human-facing summary for logs and notices.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::AuthRequired => "Sign-in required",
            Self::ValidationFailed => "Invalid input",
            Self::EmptySelection => "No items selected",
            Self::StaleReference => "Item no longer exists",
            Self::CategoryLimitReached => "Category limit reached",
            Self::CategoryConflict => "Category change not allowed",
            Self::CategoryNotFound => "Category not found",
            Self::MalformedRecord => "Malformed feed record",
            Self::FeedUnavailable => "Live feed unavailable",
            Self::BackendUnavailable => "Backend unavailable",
            Self::ExportFailed => "Export failed",
        }
    }

    /// Optional remediation hint that can be surfaced next to a notice.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::AuthRequired => Some("Sign in and retry."),
            Self::ValidationFailed => Some("Check the highlighted fields and resubmit."),
            Self::EmptySelection => Some("Select at least one item first."),
            Self::StaleReference => Some("The item was removed elsewhere; refresh the list."),
            Self::CategoryLimitReached => Some("Remove an unused category before adding another."),
            Self::CategoryConflict => None,
            Self::CategoryNotFound => None,
            Self::MalformedRecord => None,
            Self::FeedUnavailable | Self::BackendUnavailable => {
                Some("Check the network connection; your selection was kept for retry.")
            }
            Self::ExportFailed => Some("Retry the export with a different format."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the inventory view-model to its caller.
///
/// Local-precondition variants (`AuthRequired`, `Validation`,
/// `EmptySelection`, `StaleReference`, `NothingToExport`) are raised before
/// any backend call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewModelError {
    #[error("you must be signed in to change inventory")]
    AuthRequired,

    #[error("{0}")]
    Validation(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("no items selected")]
    EmptySelection,

    #[error("item '{0}' no longer exists")]
    StaleReference(ItemId),

    #[error("no data available for export")]
    NothingToExport,

    #[error("export failed: {0}")]
    Export(String),
}

impl ViewModelError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AuthRequired => ErrorCode::AuthRequired,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::BackendUnavailable(_) => ErrorCode::BackendUnavailable,
            Self::EmptySelection => ErrorCode::EmptySelection,
            Self::StaleReference(_) | Self::NothingToExport => ErrorCode::StaleReference,
            Self::Export(_) => ErrorCode::ExportFailed,
        }
    }

    /// Whether the error was raised locally without contacting the backend.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        !matches!(self, Self::BackendUnavailable(_) | Self::Export(_))
    }

    /// Optional remediation hint for the notice area.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, ViewModelError};
    use crate::model::ItemId;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::AuthRequired,
            ErrorCode::ValidationFailed,
            ErrorCode::EmptySelection,
            ErrorCode::StaleReference,
            ErrorCode::CategoryLimitReached,
            ErrorCode::CategoryConflict,
            ErrorCode::CategoryNotFound,
            ErrorCode::MalformedRecord,
            ErrorCode::FeedUnavailable,
            ErrorCode::BackendUnavailable,
            ErrorCode::ExportFailed,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::StaleReference.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn local_errors_are_flagged() {
        assert!(ViewModelError::AuthRequired.is_local());
        assert!(ViewModelError::EmptySelection.is_local());
        assert!(ViewModelError::StaleReference(ItemId::new("a")).is_local());
        assert!(!ViewModelError::BackendUnavailable("offline".into()).is_local());
    }

    #[test]
    fn stale_reference_message_names_item() {
        let err = ViewModelError::StaleReference(ItemId::new("flour"));
        assert_eq!(err.to_string(), "item 'flour' no longer exists");
        assert_eq!(err.code(), ErrorCode::StaleReference);
    }
}
