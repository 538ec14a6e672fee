// =============================================================================
// Error Types
// =============================================================================
//
// Every fallible operation in the library returns `Result<T>` with a
// `FormularyError`. All variants belong to the same "invalid argument" class:
// the caller handed us something we cannot build a design from. The variants
// only exist so the message says *which* kind of mismatch happened.
//
// Rank deficiency in contrast derivation is not an error; see
// `contrast::derive_contrast`.
//
// =============================================================================

use thiserror::Error;

/// Errors raised while building formulae, design matrices or contrasts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormularyError {
    /// A field required by a schema is absent from the supplied input.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Array or matrix shapes that cannot be reconciled.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A value that cannot be interpreted (bad level, bad name, lookup miss).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The requested result would have no well-defined shape.
    #[error("undefined shape: {0}")]
    UndefinedShape(String),

    /// A decomposition failed inside nalgebra.
    #[error("linear algebra error: {0}")]
    LinearAlgebra(String),

    /// A compiled expression program could not be run.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FormularyError>;
