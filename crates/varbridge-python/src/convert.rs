//! Type conversion between Python objects and the bridge value types.
//!
//! - `py_to_host`: Python objects to [`HostValue`]s for input
//! - `generic_to_py`: [`GenericValue`]s back to Python objects for output

use ahash::AHashMap;
use num_bigint::BigInt;
use pyo3::{
    prelude::*,
    types::{PyBool, PyBytes, PyDict, PyFloat, PyInt, PyList, PyString, PyTuple, PyType},
};
use varbridge::{BuiltinType, EnumValue, GenericValue, HostType, HostValue, MetaTypeRegistry, MetaTypeSystem};

use crate::classes::{ClassIndex, get_enum_base};

/// Objects converted to [`HostValue::Instance`] during one call, by identity.
///
/// Keeps them alive so handles in the result can be turned back into the
/// original objects.
pub type Handles = AHashMap<u64, Py<PyAny>>;

/// Converts a Python object to a [`HostValue`].
///
/// Never fails on unsupported types: anything that is not a builtin value, an
/// enum member or a class becomes an `Instance` carrying its `repr()`.
///
/// # Important
/// Checks enum members before `int` since `IntEnum` members are ints, and `bool`
/// before `int` since `bool` is a subclass of `int`.
pub fn py_to_host(obj: &Bound<'_, PyAny>, index: &mut ClassIndex, handles: &mut Handles) -> PyResult<HostValue> {
    let py = obj.py();
    if obj.is_none() {
        Ok(HostValue::None)
    } else if obj.is_instance(get_enum_base(py)?)?
        && let Ok(value) = obj.getattr("value")?.extract::<BigInt>()
    {
        let cls = obj.get_type();
        Ok(HostValue::EnumMember {
            class: index.intern(&cls)?,
            type_name: cls.name()?.to_string(),
            name: obj.getattr("name")?.extract()?,
            value,
        })
    } else if let Ok(bool) = obj.cast::<PyBool>() {
        Ok(HostValue::Bool(bool.is_true()))
    } else if let Ok(int) = obj.cast::<PyInt>() {
        if let Ok(i) = int.extract::<i64>() {
            Ok(HostValue::Int(i))
        } else {
            Ok(HostValue::BigInt(int.extract()?))
        }
    } else if let Ok(float) = obj.cast::<PyFloat>() {
        Ok(HostValue::Float(float.extract()?))
    } else if let Ok(string) = obj.cast::<PyString>() {
        Ok(HostValue::String(string.extract()?))
    } else if let Ok(bytes) = obj.cast::<PyBytes>() {
        Ok(HostValue::Bytes(bytes.extract()?))
    } else if let Ok(list) = obj.cast::<PyList>() {
        let items: PyResult<Vec<HostValue>> = list.iter().map(|item| py_to_host(&item, index, handles)).collect();
        Ok(HostValue::List(items?))
    } else if let Ok(tuple) = obj.cast::<PyTuple>() {
        let items: PyResult<Vec<HostValue>> = tuple.iter().map(|item| py_to_host(&item, index, handles)).collect();
        Ok(HostValue::Tuple(items?))
    } else if let Ok(dict) = obj.cast::<PyDict>() {
        Ok(HostValue::dict(
            dict.iter()
                .map(|(k, v)| Ok((py_to_host(&k, index, handles)?, py_to_host(&v, index, handles)?)))
                .collect::<PyResult<Vec<(HostValue, HostValue)>>>()?,
        ))
    } else if let Ok(cls) = obj.cast::<PyType>() {
        Ok(HostValue::Type(host_type_of(cls, index)?))
    } else {
        let cls = obj.get_type();
        let id = obj.as_ptr() as u64;
        handles.insert(id, obj.clone().unbind());
        Ok(HostValue::Instance {
            class: index.intern(&cls)?,
            type_name: cls.name()?.to_string(),
            id,
            repr: obj.repr()?.to_string(),
        })
    }
}

/// Maps a Python class to a [`HostType`], entering non-builtin classes in the index.
pub fn host_type_of(cls: &Bound<'_, PyType>, index: &mut ClassIndex) -> PyResult<HostType> {
    match builtin_type(cls)? {
        Some(builtin) => Ok(HostType::Builtin(builtin)),
        None => Ok(HostType::Class(index.intern(cls)?)),
    }
}

fn builtin_type(cls: &Bound<'_, PyType>) -> PyResult<Option<BuiltinType>> {
    let py = cls.py();
    if cls.as_ptr() == py.None().bind(py).get_type().as_ptr() {
        return Ok(Some(BuiltinType::NoneType));
    }
    // `IntEnum` and `IntFlag` classes are enums, not ints
    if cls.is_subclass(get_enum_base(py)?)? {
        return Ok(None);
    }
    // bool before int, as for values
    let builtin = if cls.is_subclass_of::<PyBool>()? {
        BuiltinType::Bool
    } else if cls.is_subclass_of::<PyInt>()? {
        BuiltinType::Int
    } else if cls.is_subclass_of::<PyFloat>()? {
        BuiltinType::Float
    } else if cls.is_subclass_of::<PyString>()? {
        BuiltinType::Str
    } else if cls.is_subclass_of::<PyBytes>()? {
        BuiltinType::Bytes
    } else if cls.is_subclass_of::<PyList>()? {
        BuiltinType::List
    } else if cls.is_subclass_of::<PyTuple>()? {
        BuiltinType::Tuple
    } else if cls.is_subclass_of::<PyDict>()? {
        BuiltinType::Dict
    } else if cls.is_subclass_of::<PyType>()? {
        BuiltinType::Type
    } else {
        return Ok(None);
    };
    Ok(Some(builtin))
}

/// Converts a [`GenericValue`] to a native Python object.
///
/// Enum values become members of their registered Python enum class and handles
/// become the objects they were taken from, when those are known. Otherwise enum
/// values fall back to their integer and handles to `None`. Placeholders become
/// [`PyOpaque`] instances.
pub fn generic_to_py(
    py: Python<'_>,
    value: &GenericValue,
    index: &ClassIndex,
    meta: &MetaTypeRegistry,
    handles: &Handles,
) -> PyResult<Py<PyAny>> {
    match value {
        GenericValue::Null => Ok(py.None()),
        GenericValue::Bool(b) => Ok(PyBool::new(py, *b).to_owned().into_any().unbind()),
        GenericValue::Int(i) => Ok(i.into_pyobject(py)?.into_any().unbind()),
        GenericValue::UInt(u) => Ok(u.into_pyobject(py)?.into_any().unbind()),
        GenericValue::Float(f) => Ok(f.into_pyobject(py)?.into_any().unbind()),
        GenericValue::String(s) => Ok(PyString::new(py, s).into_any().unbind()),
        GenericValue::Bytes(b) => Ok(PyBytes::new(py, b).into_any().unbind()),
        GenericValue::Enum { type_name, value } => {
            let raw = match value {
                EnumValue::Int(v) => v.into_pyobject(py)?.into_any(),
                EnumValue::UInt64(v) => v.into_pyobject(py)?.into_any(),
            };
            let class = meta
                .by_name(type_name)
                .and_then(|m| m.host_type())
                .and_then(|host_type| match host_type {
                    HostType::Class(id) => index.class(id),
                    HostType::Builtin(_) => None,
                });
            match class {
                Some(class) => Ok(class.bind(py).call1((raw,))?.unbind()),
                None => Ok(raw.unbind()),
            }
        }
        GenericValue::Handle { id, .. } => Ok(handles.get(id).map_or_else(|| py.None(), |obj| obj.clone_ref(py))),
        GenericValue::StringList(items) => Ok(PyList::new(py, items)?.into_any().unbind()),
        GenericValue::TypedList { items, .. } | GenericValue::List(items) => {
            let py_items: PyResult<Vec<Py<PyAny>>> = items
                .iter()
                .map(|item| generic_to_py(py, item, index, meta, handles))
                .collect();
            Ok(PyList::new(py, py_items?)?.into_any().unbind())
        }
        GenericValue::Map(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, generic_to_py(py, v, index, meta, handles)?)?;
            }
            Ok(dict.into_any().unbind())
        }
        GenericValue::Opaque { type_name, repr } => {
            let opaque = PyOpaque {
                type_name: type_name.clone(),
                repr: repr.clone(),
            };
            Ok(Py::new(py, opaque)?.into_any())
        }
    }
}

/// Placeholder for a value the bridge could not convert.
#[pyclass(name = "Opaque", module = "varbridge", frozen, get_all)]
#[derive(Debug, Clone)]
pub struct PyOpaque {
    /// Python type name of the original value.
    type_name: String,
    /// `repr()` of the original value.
    repr: String,
}

#[pymethods]
impl PyOpaque {
    fn __repr__(&self) -> String {
        format!("<Opaque {}: {}>", self.type_name, self.repr)
    }
}
