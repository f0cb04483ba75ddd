use std::fmt::{self, Write};

use ahash::AHashMap;
use num_bigint::BigInt;

use crate::error::BridgeError;

/// Nesting depth past which `HostValue::py_repr` prints `...` instead of descending.
const MAX_REPR_DEPTH: usize = 100;

/// Opaque identity of a host class.
///
/// Ids are handed out by [`HostTypes::define`] and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct HostTypeId(u64);

impl HostTypeId {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host types that exist without being declared, named as `type(x).__name__` would name them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinType {
    #[strum(serialize = "NoneType")]
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Tuple,
    Dict,
    Type,
}

/// The type of a host value: a builtin or a declared class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HostType {
    Builtin(BuiltinType),
    Class(HostTypeId),
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(b) => write!(f, "{b}"),
            Self::Class(id) => write!(f, "class #{id}"),
        }
    }
}

impl From<BuiltinType> for HostType {
    fn from(builtin: BuiltinType) -> Self {
        Self::Builtin(builtin)
    }
}

impl From<HostTypeId> for HostType {
    fn from(id: HostTypeId) -> Self {
        Self::Class(id)
    }
}

/// A host value crossing the boundary.
///
/// This owns all its data and can be freely cloned or serialized. It carries no
/// reference back into the host runtime: custom objects are represented by their
/// class, identity and `repr()` only.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum HostValue {
    /// `None`.
    None,
    /// `True` or `False`.
    Bool(bool),
    /// Integer that fits in 64 bits signed.
    Int(i64),
    /// Integer outside the `i64` range.
    BigInt(BigInt),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Mutable sequence.
    List(Vec<Self>),
    /// Immutable sequence.
    Tuple(Vec<Self>),
    /// Insertion-ordered mapping. Keys may be of any host type.
    Dict(DictPairs),
    /// A member of a host enum class.
    EnumMember {
        /// The enum class.
        class: HostTypeId,
        /// Class name, used for repr (e.g. "Color").
        type_name: String,
        /// Member name (e.g. "RED").
        name: String,
        /// Integer value of the member.
        value: BigInt,
    },
    /// An instance of some other host class.
    Instance {
        /// The instance's class.
        class: HostTypeId,
        /// Class name, used for repr and placeholders.
        type_name: String,
        /// Host identity of the object (`id(obj)` in Python).
        id: u64,
        /// `repr()` of the object as produced by the host.
        repr: String,
    },
    /// A type object.
    Type(HostType),
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            _ => self.repr_fmt(f, 0),
        }
    }
}

impl HostValue {
    /// Creates a `Dict` from anything convertible into `DictPairs`.
    pub fn dict(pairs: impl Into<DictPairs>) -> Self {
        Self::Dict(pairs.into())
    }

    /// Creates a `String` value.
    pub fn str(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Returns the type of this value.
    #[must_use]
    pub fn host_type(&self) -> HostType {
        match self {
            Self::None => BuiltinType::NoneType.into(),
            Self::Bool(_) => BuiltinType::Bool.into(),
            Self::Int(_) | Self::BigInt(_) => BuiltinType::Int.into(),
            Self::Float(_) => BuiltinType::Float.into(),
            Self::String(_) => BuiltinType::Str.into(),
            Self::Bytes(_) => BuiltinType::Bytes.into(),
            Self::List(_) => BuiltinType::List.into(),
            Self::Tuple(_) => BuiltinType::Tuple.into(),
            Self::Dict(_) => BuiltinType::Dict.into(),
            Self::EnumMember { class, .. } | Self::Instance { class, .. } => HostType::Class(*class),
            Self::Type(_) => BuiltinType::Type.into(),
        }
    }

    /// Returns the host type name of this value (e.g. `"int"`, `"list"`, `"Color"`).
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::BigInt(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::EnumMember { type_name, .. } | Self::Instance { type_name, .. } => type_name,
            Self::Type(_) => "type",
        }
    }

    /// Returns the host `repr()` of this value.
    ///
    /// Containers nested deeper than an internal limit are printed as `...`.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut s = String::new();
        // writing to a String cannot fail
        let _ = self.repr_fmt(&mut s, 0);
        s
    }

    /// Converts a JSON value into a host value.
    ///
    /// - `null` → `None`
    /// - `true`/`false` → `Bool`
    /// - integer → `Int`, or `BigInt` when it does not fit `i64`
    /// - float → `Float`
    /// - string → `String`
    /// - array → `List`
    /// - object → `Dict` with string keys, in document order
    #[must_use]
    pub fn from_json_value(value: serde_json::Value) -> Self {
        use serde_json::Value as JV;
        match value {
            JV::Null => Self::None,
            JV::Bool(b) => Self::Bool(b),
            JV::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::BigInt(BigInt::from(u))
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JV::String(s) => Self::String(s),
            JV::Array(arr) => Self::List(arr.into_iter().map(Self::from_json_value).collect()),
            JV::Object(map) => Self::Dict(
                map.into_iter()
                    .map(|(k, v)| (Self::String(k), Self::from_json_value(v)))
                    .collect(),
            ),
        }
    }

    fn repr_fmt(&self, f: &mut impl Write, depth: usize) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Float(v) => {
                if v.is_nan() {
                    return f.write_str("nan");
                }
                if v.is_infinite() {
                    return f.write_str(if *v > 0.0 { "inf" } else { "-inf" });
                }
                let s = v.to_string();
                f.write_str(&s)?;
                if !s.contains('.') {
                    f.write_str(".0")?;
                }
                Ok(())
            }
            Self::String(s) => string_repr_fmt(s, f),
            Self::Bytes(b) => bytes_repr_fmt(b, f),
            Self::List(items) => sequence_repr_fmt(items, f, depth, '[', ']'),
            Self::Tuple(items) => {
                if items.len() == 1 && depth < MAX_REPR_DEPTH {
                    f.write_char('(')?;
                    items[0].repr_fmt(f, depth + 1)?;
                    return f.write_str(",)");
                }
                sequence_repr_fmt(items, f, depth, '(', ')')
            }
            Self::Dict(pairs) => {
                if depth >= MAX_REPR_DEPTH {
                    return f.write_str("{...}");
                }
                f.write_char('{')?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.repr_fmt(f, depth + 1)?;
                    f.write_str(": ")?;
                    v.repr_fmt(f, depth + 1)?;
                }
                f.write_char('}')
            }
            Self::EnumMember {
                type_name, name, value, ..
            } => write!(f, "<{type_name}.{name}: {value}>"),
            Self::Instance { repr, .. } => f.write_str(repr),
            Self::Type(t) => write!(f, "<class '{t}'>"),
        }
    }
}

fn sequence_repr_fmt(items: &[HostValue], f: &mut impl Write, depth: usize, open: char, close: char) -> fmt::Result {
    f.write_char(open)?;
    if depth >= MAX_REPR_DEPTH {
        f.write_str("...")?;
        return f.write_char(close);
    }
    let mut iter = items.iter();
    if let Some(first) = iter.next() {
        first.repr_fmt(f, depth + 1)?;
        for item in iter {
            f.write_str(", ")?;
            item.repr_fmt(f, depth + 1)?;
        }
    }
    f.write_char(close)
}

/// Writes a Python-style repr of a string, choosing the quote the way CPython does.
fn string_repr_fmt(s: &str, f: &mut impl Write) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    f.write_char(quote)?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => {
                f.write_char('\\')?;
                f.write_char(c)?;
            }
            c => f.write_char(c)?,
        }
    }
    f.write_char(quote)
}

fn bytes_repr_fmt(bytes: &[u8], f: &mut impl Write) -> fmt::Result {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        '"'
    } else {
        '\''
    };
    f.write_char('b')?;
    f.write_char(quote)?;
    for &byte in bytes {
        match byte {
            b'\\' => f.write_str("\\\\")?,
            b'\t' => f.write_str("\\t")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\'' if quote == '\'' => f.write_str("\\'")?,
            b'"' if quote == '"' => f.write_str("\\\"")?,
            0x20..=0x7e => f.write_char(char::from(byte))?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    f.write_char(quote)
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::Int(a), Self::BigInt(b)) | (Self::BigInt(b), Self::Int(a)) => BigInt::from(*a) == *b,
            // to_bits() so that NaN == NaN, matching identity semantics for round trips
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (
                Self::EnumMember {
                    class: a_class,
                    name: a_name,
                    ..
                },
                Self::EnumMember {
                    class: b_class,
                    name: b_name,
                    ..
                },
            ) => a_class == b_class && a_name == b_name,
            (Self::Instance { id: a, .. }, Self::Instance { id: b, .. }) => a == b,
            (Self::Type(a), Self::Type(b)) => a == b,
            _ => false,
        }
    }
}

/// Key/value pairs of a host dict, in insertion order.
///
/// Keys are arbitrary host values: whether they are all strings is a question the
/// value bridge asks, not an invariant of this type.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DictPairs(Vec<(HostValue, HostValue)>);

impl From<Vec<(HostValue, HostValue)>> for DictPairs {
    fn from(pairs: Vec<(HostValue, HostValue)>) -> Self {
        Self(pairs)
    }
}

impl FromIterator<(HostValue, HostValue)> for DictPairs {
    fn from_iter<T: IntoIterator<Item = (HostValue, HostValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for DictPairs {
    type Item = (HostValue, HostValue);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DictPairs {
    type Item = &'a (HostValue, HostValue);
    type IntoIter = std::slice::Iter<'a, (HostValue, HostValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl DictPairs {
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HostValue, HostValue)> {
        self.0.iter()
    }

    /// First key that is not a host string, if any.
    #[must_use]
    pub fn first_non_string_key(&self) -> Option<&HostValue> {
        self.0.iter().map(|(k, _)| k).find(|k| !matches!(k, HostValue::String(_)))
    }
}

/// Members of an enum-shaped host class, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumShape {
    members: Vec<(String, BigInt)>,
    flag_like: bool,
}

impl EnumShape {
    pub fn new<N, V>(members: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<BigInt>,
    {
        Self {
            members: members.into_iter().map(|(n, v)| (n.into(), v.into())).collect(),
            flag_like: false,
        }
    }

    /// Marks the class as deriving from the host's flag base (`enum.Flag`).
    #[must_use]
    pub fn flag_like(mut self) -> Self {
        self.flag_like = true;
        self
    }

    #[must_use]
    pub fn members(&self) -> &[(String, BigInt)] {
        &self.members
    }

    #[must_use]
    pub fn is_flag_like(&self) -> bool {
        self.flag_like
    }

    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<&BigInt> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// What a host class looks like, as far as the bridges care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassShape {
    Plain,
    Enum(EnumShape),
}

/// A class in the host runtime.
#[derive(Debug, Clone)]
pub struct HostClass {
    id: HostTypeId,
    name: String,
    owner: Option<HostTypeId>,
    shape: ClassShape,
    complete: bool,
}

impl HostClass {
    #[must_use]
    pub fn id(&self) -> HostTypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class in whose body this class was declared, if any.
    #[must_use]
    pub fn owner(&self) -> Option<HostTypeId> {
        self.owner
    }

    #[must_use]
    pub fn shape(&self) -> &ClassShape {
        &self.shape
    }

    #[must_use]
    pub fn is_enum_shaped(&self) -> bool {
        matches!(self.shape, ClassShape::Enum(_))
    }

    #[must_use]
    pub fn enum_shape(&self) -> Option<&EnumShape> {
        match &self.shape {
            ClassShape::Enum(shape) => Some(shape),
            ClassShape::Plain => None,
        }
    }

    /// Whether the host has finished constructing this class.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// The host runtime's class table.
///
/// Classes start out under construction; [`HostTypes::finish`] marks them complete,
/// which is what deferred enum registrations wait for.
#[derive(Debug, Default)]
pub struct HostTypes {
    classes: AHashMap<HostTypeId, HostClass>,
    next_id: u64,
}

impl HostTypes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class that is still under construction and returns its id.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        owner: Option<HostTypeId>,
        shape: ClassShape,
    ) -> Result<HostTypeId, BridgeError> {
        if let Some(owner) = owner
            && !self.classes.contains_key(&owner)
        {
            return Err(BridgeError::UnknownType(owner));
        }
        self.next_id += 1;
        let id = HostTypeId(self.next_id);
        self.classes.insert(
            id,
            HostClass {
                id,
                name: name.into(),
                owner,
                shape,
                complete: false,
            },
        );
        Ok(id)
    }

    /// Marks a class as fully constructed. Finishing twice is a no-op.
    pub fn finish(&mut self, id: HostTypeId) -> Result<(), BridgeError> {
        let class = self.classes.get_mut(&id).ok_or(BridgeError::UnknownType(id))?;
        class.complete = true;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: HostTypeId) -> Option<&HostClass> {
        self.classes.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Joins the names of the owner chain, outermost first (`Outer::Inner::Color`).
    #[must_use]
    pub fn qualified_name(&self, id: HostTypeId, separator: &str) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(class_id) = current {
            let class = self.classes.get(&class_id)?;
            parts.push(class.name.as_str());
            current = class.owner;
        }
        parts.reverse();
        Some(parts.join(separator))
    }

    /// Builds the host value of an enum member by name.
    #[must_use]
    pub fn enum_member(&self, id: HostTypeId, member: &str) -> Option<HostValue> {
        let class = self.classes.get(&id)?;
        let value = class.enum_shape()?.value_of(member)?;
        Some(HostValue::EnumMember {
            class: id,
            type_name: class.name.clone(),
            name: member.to_owned(),
            value: value.clone(),
        })
    }
}
