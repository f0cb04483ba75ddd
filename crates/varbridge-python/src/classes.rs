//! Table of the Python classes seen by a bridge.
//!
//! Every class that crosses the boundary gets a [`HostTypeId`]. A class object
//! only exists once its body has run, so every class seen here is complete.
//! Owners are the exception: an enum decorated inside a class body names its
//! owner through `__qualname__` before the owner object exists, so the owner is
//! entered as a placeholder keyed by module and qualified name. It stays under
//! construction until the real class object is seen, which binds and finishes it.

use ahash::AHashMap;
use num_bigint::BigInt;
use pyo3::{prelude::*, sync::PyOnceLock, types::PyType};
use varbridge::{ClassShape, EnumShape, HostTypeId, HostTypes};

use crate::exceptions::bridge_err_to_py;

#[derive(Debug, Default)]
pub struct ClassIndex {
    types: HostTypes,
    by_ptr: AHashMap<usize, HostTypeId>,
    classes: AHashMap<HostTypeId, Py<PyType>>,
    /// `module:qualname` -> id, for owner lookups
    scopes: AHashMap<String, HostTypeId>,
    /// scopes entered before their class object was seen
    placeholders: AHashMap<String, HostTypeId>,
}

impl ClassIndex {
    pub fn types(&self) -> &HostTypes {
        &self.types
    }

    pub fn class(&self, id: HostTypeId) -> Option<&Py<PyType>> {
        self.classes.get(&id)
    }

    /// Returns the id of `cls`, entering it on first sight.
    ///
    /// Binding a placeholder to its class object marks the owner complete.
    pub fn intern(&mut self, cls: &Bound<'_, PyType>) -> PyResult<HostTypeId> {
        let ptr = cls.as_ptr() as usize;
        if let Some(id) = self.by_ptr.get(&ptr) {
            return Ok(*id);
        }
        let module: String = cls.module()?.extract()?;
        let qualname: String = cls.qualname()?.extract()?;
        let key = scope_key(&module, &qualname);

        let id = if let Some(id) = self.placeholders.remove(&key) {
            self.types.finish(id).map_err(bridge_err_to_py)?;
            id
        } else {
            let owner = scope_of(&qualname)
                .map(|scope| self.scope(&module, scope))
                .transpose()?;
            let name: String = cls.name()?.extract()?;
            let id = self
                .types
                .define(name, owner, class_shape(cls)?)
                .map_err(bridge_err_to_py)?;
            self.types.finish(id).map_err(bridge_err_to_py)?;
            self.scopes.insert(key, id);
            id
        };
        self.by_ptr.insert(ptr, id);
        self.classes.insert(id, cls.clone().unbind());
        Ok(id)
    }

    fn scope(&mut self, module: &str, scope: &str) -> PyResult<HostTypeId> {
        let key = scope_key(module, scope);
        if let Some(id) = self.scopes.get(&key) {
            return Ok(*id);
        }
        let owner = scope_of(scope).map(|outer| self.scope(module, outer)).transpose()?;
        let name = scope.rsplit_once('.').map_or(scope, |(_, name)| name);
        let id = self
            .types
            .define(name, owner, ClassShape::Plain)
            .map_err(bridge_err_to_py)?;
        self.scopes.insert(key.clone(), id);
        self.placeholders.insert(key, id);
        Ok(id)
    }
}

fn scope_key(module: &str, qualname: &str) -> String {
    format!("{module}:{qualname}")
}

/// The enclosing class path of a qualified name, if it is nested in a class.
///
/// Classes local to a function have no owner.
fn scope_of(qualname: &str) -> Option<&str> {
    let (scope, _) = qualname.rsplit_once('.')?;
    if scope.ends_with("<locals>") { None } else { Some(scope) }
}

/// Enum classes with integer members become enum-shaped, everything else is plain.
fn class_shape(cls: &Bound<'_, PyType>) -> PyResult<ClassShape> {
    let py = cls.py();
    if !cls.is_subclass(get_enum_base(py)?)? {
        return Ok(ClassShape::Plain);
    }
    let members = cls.getattr("__members__")?;
    let mut values = Vec::new();
    for name in members.try_iter()? {
        let name = name?;
        let value = members.get_item(&name)?.getattr("value")?;
        let Ok(value) = value.extract::<BigInt>() else {
            return Ok(ClassShape::Plain);
        };
        values.push((name.extract::<String>()?, value));
    }
    let shape = EnumShape::new(values);
    if cls.is_subclass(get_flag_base(py)?)? {
        Ok(ClassShape::Enum(shape.flag_like()))
    } else {
        Ok(ClassShape::Enum(shape))
    }
}

/// Cached import of `enum.Enum`.
pub fn get_enum_base(py: Python<'_>) -> PyResult<&Bound<'_, PyAny>> {
    static ENUM: PyOnceLock<Py<PyAny>> = PyOnceLock::new();

    ENUM.import(py, "enum", "Enum")
}

/// Cached import of `enum.Flag`.
fn get_flag_base(py: Python<'_>) -> PyResult<&Bound<'_, PyAny>> {
    static FLAG: PyOnceLock<Py<PyAny>> = PyOnceLock::new();

    FLAG.import(py, "enum", "Flag")
}
