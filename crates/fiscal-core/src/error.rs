//! # Error Types
//!
//! Domain-specific error types for fiscal-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fiscal-core errors (this file)                                        │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  fiscal-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  fiscal-sync errors (separate crate)                                   │
//! │  ├── ClientError      - Commerce / fiscal HTTP failures                │
//! │  └── SyncError        - Pipeline failure with retry classification     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → EventRecord.failed    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::DocumentType;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule errors.
///
/// Every variant is deterministic: replaying the same input produces the
/// same error, so none of these are worth retrying.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The document type needs a valid tax ID and the order carries none.
    ///
    /// ## When This Occurs
    /// - Invoice issuance for an order whose tax ID is missing
    /// - Invoice issuance for an order whose tax ID fails the check digit
    #[error("A valid tax ID is required for {document_type}")]
    TaxIdRequired { document_type: DocumentType },

    /// A credit note was requested without a reference document.
    #[error("Credit note requires a reference to the original document")]
    MissingReference,

    /// The document type cannot be issued through the requested path.
    ///
    /// ## When This Occurs
    /// - Asking the order pipeline to issue a credit note directly
    #[error("Document type {0} cannot be issued for an order")]
    UnsupportedDocumentType(DocumentType),

    /// An amount calculation left the representable range.
    #[error("Amount overflow in {operation}")]
    AmountOverflow { operation: &'static str },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., malformed amount, malformed tax ID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Decimal value has more fractional digits than the currency scale.
    ///
    /// ## When This Occurs
    /// - `"10.999"` for a two-decimal currency. We never round silently.
    #[error("{field} value '{value}' exceeds {scale} decimal places")]
    TooPrecise {
        field: String,
        value: String,
        scale: u32,
    },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidFormat`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::TaxIdRequired {
            document_type: DocumentType::Invoice,
        };
        assert_eq!(err.to_string(), "A valid tax ID is required for invoice");

        let err = ValidationError::TooPrecise {
            field: "total_price".to_string(),
            value: "1.005".to_string(),
            scale: 2,
        };
        assert_eq!(
            err.to_string(),
            "total_price value '1.005' exceeds 2 decimal places"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::Required {
            field: "order.id".to_string(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
