use std::fmt;

use indexmap::IndexMap;

/// Discriminant of a [`GenericValue`], also used to name builtin metatypes.
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
#[strum(serialize_all = "snake_case")]
pub enum ValueTag {
    Null,
    Bool,
    Int,
    #[strum(serialize = "uint64")]
    UInt,
    Float,
    String,
    Bytes,
    Enum,
    Handle,
    StringList,
    TypedList,
    List,
    Map,
    Opaque,
}

impl ValueTag {
    /// Whether the tag describes a real payload, as opposed to an unconvertible placeholder.
    #[must_use]
    pub fn is_concrete(self) -> bool {
        self != Self::Opaque
    }
}

/// Payload of an enum value, sized by the storage width of its metatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EnumValue {
    Int(i32),
    UInt64(u64),
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
        }
    }
}

/// A value on the foreign side of the boundary.
///
/// Values are built by the value bridge and never mutated afterwards: there are no
/// `&mut self` methods. The bridge builds `TypedList` only through
/// [`GenericValue::typed_list`], which checks that all items share one element type;
/// a `TypedList` constructed or deserialized by hand is not checked.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum GenericValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    /// A member of a registered enum metatype.
    Enum { type_name: String, value: EnumValue },
    /// A reference to an instance of a registered custom class.
    Handle { type_name: String, id: u64 },
    /// Sequence where every element was a string.
    StringList(Vec<String>),
    /// Non-empty sequence where every element has the same concrete element type.
    TypedList { tag: ValueTag, items: Vec<Self> },
    /// Sequence of independently tagged elements.
    List(Vec<Self>),
    /// String-keyed mapping in insertion order.
    Map(IndexMap<String, Self>),
    /// Placeholder for a host value that could not be converted.
    Opaque { type_name: String, repr: String },
}

impl GenericValue {
    #[must_use]
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Null => ValueTag::Null,
            Self::Bool(_) => ValueTag::Bool,
            Self::Int(_) => ValueTag::Int,
            Self::UInt(_) => ValueTag::UInt,
            Self::Float(_) => ValueTag::Float,
            Self::String(_) => ValueTag::String,
            Self::Bytes(_) => ValueTag::Bytes,
            Self::Enum { .. } => ValueTag::Enum,
            Self::Handle { .. } => ValueTag::Handle,
            Self::StringList(_) => ValueTag::StringList,
            Self::TypedList { .. } => ValueTag::TypedList,
            Self::List(_) => ValueTag::List,
            Self::Map(_) => ValueTag::Map,
            Self::Opaque { .. } => ValueTag::Opaque,
        }
    }

    pub fn opaque(type_name: impl Into<String>, repr: impl Into<String>) -> Self {
        Self::Opaque {
            type_name: type_name.into(),
            repr: repr.into(),
        }
    }

    /// Builds a homogeneous list, or returns the items back if they are empty,
    /// mixed, or share only the `Opaque` tag.
    ///
    /// Enum values and handles must also name the same metatype, and nested typed
    /// lists the same element type.
    pub fn typed_list(items: Vec<Self>) -> Result<Self, Vec<Self>> {
        let Some(first) = items.first() else {
            return Err(items);
        };
        let tag = first.tag();
        if tag.is_concrete() && items.iter().all(|item| item.same_element_type(first)) {
            Ok(Self::TypedList { tag, items })
        } else {
            Err(items)
        }
    }

    /// Whether `self` and `other` can sit in the same typed list.
    fn same_element_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Enum { type_name: a, .. }, Self::Enum { type_name: b, .. })
            | (Self::Handle { type_name: a, .. }, Self::Handle { type_name: b, .. }) => a == b,
            (Self::TypedList { tag: a, items: x }, Self::TypedList { tag: b, items: y }) => {
                a == b
                    && match (x.first(), y.first()) {
                        (Some(x), Some(y)) => x.same_element_type(y),
                        _ => false,
                    }
            }
            _ => self.tag() == other.tag(),
        }
    }

    /// Element tag of a sequence value: `String` for string lists, the shared tag
    /// for typed lists, `None` for generic lists and non-sequences.
    #[must_use]
    pub fn element_tag(&self) -> Option<ValueTag> {
        match self {
            Self::StringList(_) => Some(ValueTag::String),
            Self::TypedList { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Items of a `TypedList` or `List`.
    #[must_use]
    pub fn as_items(&self) -> Option<&[Self]> {
        match self {
            Self::TypedList { items, .. } | Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Self>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque { .. })
    }

    /// Converts this value to natural JSON.
    ///
    /// - `Null` → `null`, scalars and strings → their JSON counterparts
    /// - non-finite floats → `null`
    /// - `Bytes` → `{"$bytes": [...]}`
    /// - `Enum` → `{"$enum": {"type": "...", "value": n}}`
    /// - `Handle` → `{"$handle": {"type": "...", "id": n}}`
    /// - all list variants → JSON array
    /// - `Map` → JSON object
    /// - `Opaque` → `{"$opaque": {"type": "...", "repr": "..."}}`
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::{Value as JV, json};
        match self {
            Self::Null => JV::Null,
            Self::Bool(b) => JV::Bool(*b),
            Self::Int(i) => json!(i),
            Self::UInt(u) => json!(u),
            Self::Float(f) => {
                if f.is_finite() {
                    json!(f)
                } else {
                    JV::Null
                }
            }
            Self::String(s) => JV::String(s.clone()),
            Self::Bytes(b) => json!({"$bytes": b}),
            Self::Enum { type_name, value } => {
                let value = match value {
                    EnumValue::Int(v) => json!(v),
                    EnumValue::UInt64(v) => json!(v),
                };
                json!({"$enum": {"type": type_name, "value": value}})
            }
            Self::Handle { type_name, id } => json!({"$handle": {"type": type_name, "id": id}}),
            Self::StringList(items) => JV::Array(items.iter().cloned().map(JV::String).collect()),
            Self::TypedList { items, .. } | Self::List(items) => {
                JV::Array(items.iter().map(Self::to_json_value).collect())
            }
            Self::Map(map) => JV::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json_value())).collect()),
            Self::Opaque { type_name, repr } => json!({"$opaque": {"type": type_name, "repr": repr}}),
        }
    }
}
