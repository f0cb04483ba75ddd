use crate::host::HostTypeId;

/// Error returned by enum registration and map conversion.
///
/// Per-element conversion failures are not errors: they surface as
/// [`ConversionOutcome::Absent`](crate::ConversionOutcome::Absent) or as an opaque
/// placeholder inside a permissive conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The input does not have the shape the operation requires.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        /// What the operation needed (e.g. "enum class").
        expected: &'static str,
        /// Description of what it got instead.
        actual: String,
    },
    /// A metatype name is already registered with an incompatible definition.
    #[error("metatype name '{name}' is already registered as {existing}")]
    NameCollision {
        /// The requested name.
        name: String,
        /// Summary of the existing registration.
        existing: String,
    },
    /// A map conversion encountered a key that is not a string.
    #[error("map keys must be str, got {key_type}")]
    KeyTypeMismatch {
        /// Host type name of the offending key.
        key_type: String,
    },
    /// `EnumBridge::init` has not been called yet.
    #[error("enum bridge used before init()")]
    NotInitialized,
    /// The class id is not present in the host class table.
    #[error("unknown host class #{0}")]
    UnknownType(HostTypeId),
    /// A registry snapshot could not be written or read.
    #[error("registry snapshot failed: {0}")]
    Snapshot(String),
}

impl BridgeError {
    /// Creates a `TypeMismatch` error.
    #[must_use]
    pub fn type_mismatch(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.into(),
        }
    }
}
