//! Mapping of bridge errors onto Python exceptions.

use pyo3::{
    exceptions::{PyKeyError, PyRuntimeError, PyTypeError, PyValueError},
    prelude::*,
};
use varbridge::BridgeError;

/// Converts a [`BridgeError`] into the closest builtin Python exception.
///
/// This is a free function rather than a `From` impl because the orphan rule
/// forbids implementing `From<BridgeError>` for `PyErr` in this crate.
pub fn bridge_err_to_py(err: BridgeError) -> PyErr {
    match err {
        BridgeError::TypeMismatch { .. } => PyTypeError::new_err(err.to_string()),
        BridgeError::KeyTypeMismatch { .. } => PyKeyError::new_err(err.to_string()),
        BridgeError::NameCollision { .. } | BridgeError::Snapshot(_) => PyValueError::new_err(err.to_string()),
        BridgeError::NotInitialized | BridgeError::UnknownType(_) => PyRuntimeError::new_err(err.to_string()),
    }
}
