//! PyO3 bindings for the enum and value bridges.
//!
//! A `Bridge` owns one metatype registry and the two bridges sharing it, plus
//! the table of Python classes it has seen. Bridges are independent of each
//! other: nothing is registered process-wide.

use std::sync::Arc;

use pyo3::{
    prelude::*,
    types::{PyBytes, PyList, PyTuple, PyType},
};
use varbridge::{
    BridgeConfig, BridgeError, ConversionOutcome, DictPairs, EnumBridge, HostType, HostValue, MetaTypeRegistry,
    MetaTypeSystem, ValueBridge,
};

use crate::{
    classes::ClassIndex,
    convert::{Handles, generic_to_py, host_type_of, py_to_host},
    exceptions::bridge_err_to_py,
};

/// Registers Python enums with a metatype registry and converts Python
/// containers into generic values.
///
/// Marked `unsendable`: conversions call back into Python (`repr()`, attribute
/// lookups) while the class table is borrowed, so a bridge stays on the thread
/// that created it and re-entrant calls fail with a borrow error.
#[pyclass(name = "Bridge", module = "varbridge", unsendable)]
pub struct PyBridge {
    meta: Arc<MetaTypeRegistry>,
    enums: EnumBridge,
    values: ValueBridge,
    index: ClassIndex,
}

#[pymethods]
impl PyBridge {
    /// Creates a bridge with a fresh registry. The enum bridge is initialized.
    ///
    /// # Arguments
    /// * `scope_separator` - Joins owner and enum names into registered type names.
    /// * `max_depth` - Container nesting limit for conversions.
    #[new]
    #[pyo3(signature = (*, scope_separator=None, max_depth=None))]
    fn new(scope_separator: Option<String>, max_depth: Option<usize>) -> Self {
        let mut config = BridgeConfig::default();
        if let Some(separator) = scope_separator {
            config = config.scope_separator(separator);
        }
        if let Some(depth) = max_depth {
            config = config.max_depth(depth);
        }
        let meta = Arc::new(MetaTypeRegistry::new());
        let enums = EnumBridge::with_config(Arc::clone(&meta), config.clone());
        enums.init();
        Self {
            values: ValueBridge::with_config(Arc::clone(&meta), config),
            enums,
            meta,
            index: ClassIndex::default(),
        }
    }

    /// Initializes the enum bridge. Calling it again is a no-op.
    fn init(&self) {
        self.enums.init();
    }

    // -------------------------------------------------------------------------
    // Enums
    // -------------------------------------------------------------------------

    /// Class decorator declaring a plain enum. Returns the class unchanged.
    fn qenum<'py>(&mut self, cls: Bound<'py, PyType>) -> PyResult<Bound<'py, PyType>> {
        self.declare(&cls, false)?;
        Ok(cls)
    }

    /// Class decorator declaring a flag enum. Returns the class unchanged.
    fn qflag<'py>(&mut self, cls: Bound<'py, PyType>) -> PyResult<Bound<'py, PyType>> {
        self.declare(&cls, true)?;
        Ok(cls)
    }

    /// Returns `1` for a flag enum, `0` for a plain enum and `-1` for anything
    /// not declared, given a member or an enum class.
    fn is_flag(&mut self, value: &Bound<'_, PyAny>) -> PyResult<i32> {
        let mut handles = Handles::default();
        let value = py_to_host(value, &mut self.index, &mut handles)?;
        Ok(self.enums.is_flag(&value).as_int())
    }

    /// Registers the enums waiting for `owner`. The owner class object exists, so
    /// it is complete.
    ///
    /// Returns the registered type names in declaration order.
    fn resolve_delayed(&mut self, owner: &Bound<'_, PyType>) -> PyResult<Vec<String>> {
        let owner = self.index.intern(owner)?;
        let resolved = self
            .enums
            .resolve_delayed_enums(self.index.types(), owner)
            .map_err(bridge_err_to_py)?;
        Ok(resolved.into_iter().map(|r| r.type_name).collect())
    }

    /// Class decorator for owners: registers the enums waiting for `owner` and
    /// returns the class unchanged.
    fn finish_class<'py>(&mut self, owner: Bound<'py, PyType>) -> PyResult<Bound<'py, PyType>> {
        self.resolve_delayed(&owner)?;
        Ok(owner)
    }

    /// Registered type name of an enum class, or `""` if it is not registered yet.
    fn type_name(&mut self, cls: &Bound<'_, PyType>) -> PyResult<String> {
        let class = self.index.intern(cls)?;
        Ok(self.enums.type_name(class))
    }

    /// Registers an `int`-backed enum metatype for a declared enum and returns its id.
    fn create_enum_meta_type(&mut self, name: &str, cls: &Bound<'_, PyType>) -> PyResult<u32> {
        let class = self.index.intern(cls)?;
        let meta = self
            .enums
            .create_generic_enum_meta_type(name, class)
            .map_err(bridge_err_to_py)?;
        Ok(meta.id().raw())
    }

    /// Registers a `uint64`-backed enum metatype for a declared enum and returns its id.
    fn create_enum64_meta_type(&mut self, name: &str, cls: &Bound<'_, PyType>) -> PyResult<u32> {
        let class = self.index.intern(cls)?;
        let meta = self
            .enums
            .create_generic_enum64_meta_type(name, class)
            .map_err(bridge_err_to_py)?;
        Ok(meta.id().raw())
    }

    // -------------------------------------------------------------------------
    // Values
    // -------------------------------------------------------------------------

    /// Registers a class so its instances convert to handles.
    #[pyo3(signature = (cls, name=None))]
    fn register_class(&mut self, cls: &Bound<'_, PyType>, name: Option<String>) -> PyResult<String> {
        let class = self.index.intern(cls)?;
        let name = match name {
            Some(name) => name,
            None => cls.qualname()?.extract()?,
        };
        let meta = self.values.register_class(&name, class).map_err(bridge_err_to_py)?;
        Ok(meta.name().to_owned())
    }

    /// Name of the metatype instances of `tp` convert through, or `None`.
    fn resolve_meta_type(&mut self, tp: &Bound<'_, PyType>) -> PyResult<Option<String>> {
        let host_type: HostType = host_type_of(tp, &mut self.index)?;
        Ok(self.values.resolve_meta_type(host_type).map(|m| m.name().to_owned()))
    }

    /// Permissive conversion of a sequence.
    ///
    /// Returns `(tag, element_tag, value)` where `tag` is `"string_list"`,
    /// `"typed_list"` or `"list"`, `element_tag` is the shared element tag or
    /// `None`, and `value` is the converted list.
    fn convert_list<'py>(&mut self, py: Python<'py>, items: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyTuple>> {
        let mut handles = Handles::default();
        let items = sequence_items(items, &mut self.index, &mut handles)?;
        let value = self.values.convert_list_to_generic_value(&items);
        let tag = value.tag().to_string();
        let element_tag = value.element_tag().map(|t| t.to_string());
        let value = generic_to_py(py, &value, &self.index, &self.meta, &handles)?;
        PyTuple::new(py, [tag.into_pyobject(py)?.into_any(), element_tag.into_pyobject(py)?, value.into_bound(py)])
    }

    /// Strict conversion of a sequence: a list, or `None` if any element fails.
    fn convert_list_strict<'py>(
        &mut self,
        py: Python<'py>,
        items: &Bound<'py, PyAny>,
    ) -> PyResult<Option<Bound<'py, PyList>>> {
        let mut handles = Handles::default();
        let items = sequence_items(items, &mut self.index, &mut handles)?;
        let ConversionOutcome::Present(values) = self.values.convert_list_to_sequence(&items) else {
            return Ok(None);
        };
        let py_items: PyResult<Vec<Py<PyAny>>> = values
            .iter()
            .map(|value| generic_to_py(py, value, &self.index, &self.meta, &handles))
            .collect();
        Ok(Some(PyList::new(py, py_items?)?))
    }

    /// Converts a `str`-keyed mapping. Raises `KeyError` on any other key type.
    fn convert_map(&mut self, py: Python<'_>, mapping: &Bound<'_, PyAny>) -> PyResult<Py<PyAny>> {
        let mut handles = Handles::default();
        let pairs: DictPairs = match py_to_host(mapping, &mut self.index, &mut handles)? {
            HostValue::Dict(pairs) => pairs,
            other => return Err(bridge_err_to_py(BridgeError::type_mismatch("dict", other.type_name()))),
        };
        let value = self
            .values
            .convert_map_to_generic_value(&pairs)
            .map_err(bridge_err_to_py)?;
        generic_to_py(py, &value, &self.index, &self.meta, &handles)
    }

    // -------------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------------

    /// Names of all registered metatypes in registration order.
    fn metatype_names(&self) -> Vec<String> {
        self.meta.metatypes().iter().map(|m| m.name().to_owned()).collect()
    }

    /// Id of the metatype registered as `name`, or `None`.
    fn metatype_id(&self, name: &str) -> Option<u32> {
        self.meta.by_name(name).map(|m| m.id().raw())
    }

    /// Serializes the registry to bytes.
    fn dump_registry<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyBytes>> {
        let bytes = self.meta.dump().map_err(bridge_err_to_py)?;
        Ok(PyBytes::new(py, &bytes))
    }

    fn __repr__(&self) -> String {
        format!("<Bridge metatypes={}>", self.meta.len())
    }
}

impl PyBridge {
    fn declare(&mut self, cls: &Bound<'_, PyType>, is_flag: bool) -> PyResult<()> {
        let class = self.index.intern(cls)?;
        self.enums
            .declare_enum(self.index.types(), class, is_flag)
            .map_err(bridge_err_to_py)
    }
}

/// Converts the elements of a list or tuple.
fn sequence_items(items: &Bound<'_, PyAny>, index: &mut ClassIndex, handles: &mut Handles) -> PyResult<Vec<HostValue>> {
    match py_to_host(items, index, handles)? {
        HostValue::List(items) | HostValue::Tuple(items) => Ok(items),
        other => Err(bridge_err_to_py(BridgeError::type_mismatch("list or tuple", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use pretty_assertions::assert_eq;
    use pyo3::types::PyDict;

    use super::*;
    use crate::convert::PyOpaque;

    /// Runs `code` as a module with a fresh bridge bound to `b` and returns its globals.
    fn run<'py>(py: Python<'py>, code: &CStr) -> PyResult<Bound<'py, PyDict>> {
        let globals = PyDict::new(py);
        globals.set_item("__name__", "bridge_tests")?;
        globals.set_item("b", Py::new(py, PyBridge::new(None, None))?)?;
        py.run(code, Some(&globals), None)?;
        Ok(globals)
    }

    fn get<'py>(globals: &Bound<'py, PyDict>, name: &str) -> Bound<'py, PyAny> {
        globals.get_item(name).unwrap().unwrap()
    }

    #[test]
    fn nested_enum_waits_for_its_owner() {
        Python::attach(|py| -> PyResult<()> {
            let globals = run(
                py,
                c"
from enum import Enum

class Window:
    @b.qenum
    class State(Enum):
        SHOWN = 0
        HIDDEN = 1

pending = b.type_name(Window.State)
resolved = b.resolve_delayed(Window)
registered = b.type_name(Window.State)
again = b.resolve_delayed(Window)
",
            )?;
            assert_eq!(get(&globals, "pending").extract::<String>()?, "");
            assert_eq!(get(&globals, "resolved").extract::<Vec<String>>()?, vec!["Window::State"]);
            assert_eq!(get(&globals, "registered").extract::<String>()?, "Window::State");
            assert_eq!(get(&globals, "again").extract::<Vec<String>>()?, Vec::<String>::new());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn finish_class_decorates_the_owner() {
        Python::attach(|py| -> PyResult<()> {
            let globals = run(
                py,
                c"
from enum import Flag

@b.finish_class
class Dialog:
    @b.qflag
    class Options(Flag):
        MODAL = 1
        SHEET = 2

name = b.type_name(Dialog.Options)
flag = b.is_flag(Dialog.Options.MODAL)
",
            )?;
            assert_eq!(get(&globals, "name").extract::<String>()?, "Dialog::Options");
            assert_eq!(get(&globals, "flag").extract::<i32>()?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn top_level_enums_register_immediately() {
        Python::attach(|py| -> PyResult<()> {
            let globals = run(
                py,
                c"
from enum import Enum, IntEnum

@b.qenum
class Color(Enum):
    RED = 1
    GREEN = 2

@b.qenum
class Level(IntEnum):
    LOW = 1

name = b.type_name(Color)
member = b.is_flag(Color.RED)
cls = b.is_flag(Color)
int_enum_cls = b.is_flag(Level)
unknown = b.is_flag(3)

try:
    @b.qflag
    class Mode(Enum):
        A = 1
    error = None
except TypeError as e:
    error = str(e)

wide = b.create_enum64_meta_type('ColorWide', Color)
",
            )?;
            assert_eq!(get(&globals, "name").extract::<String>()?, "Color");
            assert_eq!(get(&globals, "member").extract::<i32>()?, 0);
            assert_eq!(get(&globals, "cls").extract::<i32>()?, 0);
            assert_eq!(get(&globals, "int_enum_cls").extract::<i32>()?, 0);
            assert_eq!(get(&globals, "unknown").extract::<i32>()?, -1);
            assert_eq!(
                get(&globals, "error").extract::<String>()?,
                "expected flag enum class, got 'Mode'"
            );

            let bridge = get(&globals, "b");
            let bridge = bridge.cast::<PyBridge>()?.borrow();
            let wide = get(&globals, "wide").extract::<u32>()?;
            assert_eq!(bridge.metatype_id("ColorWide"), Some(wide));
            assert!(bridge.metatype_names().contains(&"Level".to_owned()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn lists_narrow_and_convert_back() {
        Python::attach(|py| -> PyResult<()> {
            let globals = run(
                py,
                c"
from enum import Enum, IntEnum

@b.qenum
class Level(IntEnum):
    LOW = 1
    HIGH = 2

@b.qenum
class Color(Enum):
    RED = 1

class Widget:
    pass

widget_name = b.register_class(Widget)
w1, w2 = Widget(), Widget()

ints = b.convert_list([1, 2, 3])
strings = b.convert_list(('a', 'b'))
bools = b.convert_list([True, 1])
bool_types = [type(v).__name__ for v in bools[2]]
levels = b.convert_list([Level.HIGH, Level.LOW])
levels_back = levels[2][0] is Level.HIGH and levels[2][1] is Level.LOW
mixed_enums = b.convert_list([Level.LOW, Color.RED])
widgets = b.convert_list([w1, w2])
widgets_back = widgets[2][0] is w1 and widgets[2][1] is w2
opaque = b.convert_list([1, object()])
opaque_item = opaque[2][1]
",
            )?;
            assert_eq!(get(&globals, "widget_name").extract::<String>()?, "Widget");
            assert_eq!(
                get(&globals, "ints").extract::<(String, Option<String>, Vec<i64>)>()?,
                ("typed_list".to_owned(), Some("int".to_owned()), vec![1, 2, 3])
            );
            assert_eq!(
                get(&globals, "strings").extract::<(String, Option<String>, Vec<String>)>()?,
                ("string_list".to_owned(), Some("string".to_owned()), vec!["a".to_owned(), "b".to_owned()])
            );

            let bools = get(&globals, "bools");
            assert_eq!(bools.get_item(0)?.extract::<String>()?, "list");
            assert!(bools.get_item(1)?.is_none());
            assert_eq!(get(&globals, "bool_types").extract::<Vec<String>>()?, vec!["bool", "int"]);

            let levels = get(&globals, "levels");
            assert_eq!(levels.get_item(1)?.extract::<Option<String>>()?, Some("enum".to_owned()));
            assert!(get(&globals, "levels_back").extract::<bool>()?);
            assert_eq!(get(&globals, "mixed_enums").get_item(0)?.extract::<String>()?, "list");

            let widgets = get(&globals, "widgets");
            assert_eq!(widgets.get_item(1)?.extract::<Option<String>>()?, Some("handle".to_owned()));
            assert!(get(&globals, "widgets_back").extract::<bool>()?);

            assert_eq!(get(&globals, "opaque").get_item(0)?.extract::<String>()?, "list");
            let opaque = get(&globals, "opaque_item");
            assert!(opaque.cast::<PyOpaque>().is_ok());
            assert_eq!(opaque.getattr("type_name")?.extract::<String>()?, "object");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn maps_and_strict_lists() {
        Python::attach(|py| -> PyResult<()> {
            let globals = run(
                py,
                c"
mapped = b.convert_map({'b': 1, 'a': [1.5, 2.5]})
keys = list(mapped)

try:
    b.convert_map({'a': 1, 2: 'x'})
    key_error = None
except KeyError as e:
    key_error = e.args[0]

strict = b.convert_list_strict([1, 'a'])
strict_failed = b.convert_list_strict([1, object()])
tuple_meta = b.resolve_meta_type(tuple)
type_meta = b.resolve_meta_type(type)
",
            )?;
            assert_eq!(get(&globals, "keys").extract::<Vec<String>>()?, vec!["b", "a"]);
            let mapped = get(&globals, "mapped");
            assert_eq!(mapped.get_item("a")?.extract::<Vec<f64>>()?, vec![1.5, 2.5]);
            assert_eq!(get(&globals, "key_error").extract::<String>()?, "map keys must be str, got int");
            assert_eq!(get(&globals, "strict").len()?, 2);
            assert!(get(&globals, "strict_failed").is_none());
            assert_eq!(get(&globals, "tuple_meta").extract::<Option<String>>()?, Some("list".to_owned()));
            assert_eq!(get(&globals, "type_meta").extract::<Option<String>>()?, None);
            Ok(())
        })
        .unwrap();
    }
}
