//! Python bindings for varbridge.
//!
//! Exposes a `Bridge` class that registers Python enums with a metatype
//! registry and converts Python lists and dicts into generic values.

mod bridge;
mod classes;
mod convert;
mod exceptions;

use std::sync::OnceLock;

pub use bridge::PyBridge;
pub use convert::PyOpaque;
use pyo3::prelude::*;

/// Returns the package version, converting Cargo's format to Python's PEP 440.
fn get_version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();

    VERSION.get_or_init(|| {
        let version = env!("CARGO_PKG_VERSION");
        // "1.0-alpha1" -> "1.0a1"; not full PEP 440 coverage
        version.replace("-alpha", "a").replace("-beta", "b")
    })
}

/// varbridge - enum registration and value conversion for a metatype registry.
#[pymodule]
mod _varbridge {
    use pyo3::prelude::*;

    #[pymodule_export]
    use super::PyBridge as Bridge;
    #[pymodule_export]
    use super::PyOpaque as Opaque;
    use super::get_version;

    #[pymodule_init]
    fn init(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add("__version__", get_version())?;
        Ok(())
    }
}
