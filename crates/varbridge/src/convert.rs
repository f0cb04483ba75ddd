//! Conversion of host values into [`GenericValue`]s.
//!
//! Two flavours exist on purpose:
//! - strict ([`ValueBridge::convert_list_to_sequence`]): any element failing makes the
//!   whole result absent;
//! - permissive ([`ValueBridge::convert_list_to_generic_value`],
//!   [`ValueBridge::convert_map_to_generic_value`]): failing elements become
//!   [`GenericValue::Opaque`] placeholders and the rest is kept.

use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    config::BridgeConfig,
    error::BridgeError,
    generic::{EnumValue, GenericValue},
    host::{DictPairs, HostType, HostTypeId, HostValue},
    meta_type::{EnumWidth, MetaType, MetaTypeKind, MetaTypeRegistry, MetaTypeSystem},
};

/// Result of a conversion that may not produce a value. Never holds a partial value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome<T> {
    Present(T),
    Absent,
}

impl<T> ConversionOutcome<T> {
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for ConversionOutcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }
}

/// Converts host lists and maps into generic values.
///
/// Metatype lookups are cached per host type. Only hits are cached: the registry
/// never removes or rebinds a registration, so a cached hit stays valid, while a
/// miss may turn into a hit once the type gets registered.
#[derive(Debug)]
pub struct ValueBridge<M: MetaTypeSystem = MetaTypeRegistry> {
    meta: Arc<M>,
    config: BridgeConfig,
    cache: RwLock<AHashMap<HostType, MetaType>>,
}

impl<M: MetaTypeSystem> ValueBridge<M> {
    pub fn new(meta: Arc<M>) -> Self {
        Self::with_config(meta, BridgeConfig::default())
    }

    pub fn with_config(meta: Arc<M>, config: BridgeConfig) -> Self {
        Self {
            meta,
            config,
            cache: RwLock::new(AHashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Metatype to use when converting instances of `host_type`, if there is one.
    #[must_use]
    pub fn resolve_meta_type(&self, host_type: HostType) -> Option<MetaType> {
        if let Some(meta) = self.cache.read().get(&host_type) {
            return Some(meta.clone());
        }
        let meta = self.meta.for_host_type(host_type)?;
        self.cache.write().insert(host_type, meta.clone());
        Some(meta)
    }

    /// Registers a custom host class so its instances convert to handles.
    pub fn register_class(&self, name: &str, class: HostTypeId) -> Result<MetaType, BridgeError> {
        let meta = self.meta.register(name, MetaTypeKind::Custom, Some(HostType::Class(class)))?;
        debug!(name, class = %class, "registered custom class");
        Ok(meta)
    }

    /// Converts a single host value.
    #[must_use]
    pub fn convert_value(&self, value: &HostValue) -> ConversionOutcome<GenericValue> {
        self.value_at(value, 0).into()
    }

    /// Strict list conversion: every element must convert, or the result is absent.
    #[must_use]
    pub fn convert_list_to_sequence(&self, items: &[HostValue]) -> ConversionOutcome<Vec<GenericValue>> {
        items
            .iter()
            .map(|item| self.value_at(item, 1))
            .collect::<Option<Vec<_>>>()
            .into()
    }

    /// Permissive list conversion with type narrowing. Never fails.
    ///
    /// 1. a non-empty list of strings becomes `StringList`;
    /// 2. a non-empty list whose elements all convert to the same tag becomes `TypedList`;
    /// 3. anything else becomes `List`, with unconvertible elements as `Opaque`.
    #[must_use]
    pub fn convert_list_to_generic_value(&self, items: &[HostValue]) -> GenericValue {
        self.list_at(items, 0)
    }

    /// Converts a string-keyed host map.
    ///
    /// Any non-string key fails the whole map with `KeyTypeMismatch`. Values are
    /// converted permissively. Key order follows insertion order; a repeated key keeps
    /// its first position and its last value.
    pub fn convert_map_to_generic_value(&self, pairs: &DictPairs) -> Result<GenericValue, BridgeError> {
        self.map_at(pairs, 0)
    }

    fn value_at(&self, value: &HostValue, depth: usize) -> Option<GenericValue> {
        if depth > self.config.max_depth {
            return None;
        }
        match value {
            HostValue::None => Some(GenericValue::Null),
            HostValue::Bool(b) => Some(GenericValue::Bool(*b)),
            HostValue::Int(i) => Some(GenericValue::Int(*i)),
            HostValue::BigInt(bi) => narrow_big_int(bi),
            HostValue::Float(f) => Some(GenericValue::Float(*f)),
            HostValue::String(s) => Some(GenericValue::String(s.clone())),
            HostValue::Bytes(b) => Some(GenericValue::Bytes(b.clone())),
            HostValue::List(items) | HostValue::Tuple(items) => Some(self.list_at(items, depth)),
            HostValue::Dict(pairs) => self.map_at(pairs, depth).ok(),
            HostValue::EnumMember { class, value, .. } => {
                let meta = self.resolve_meta_type(HostType::Class(*class))?;
                let MetaTypeKind::Enum { width, .. } = meta.kind() else {
                    return None;
                };
                let value = match width {
                    EnumWidth::Int => EnumValue::Int(value.to_i32()?),
                    EnumWidth::UInt64 => EnumValue::UInt64(value.to_u64()?),
                };
                Some(GenericValue::Enum {
                    type_name: meta.name().to_owned(),
                    value,
                })
            }
            HostValue::Instance { class, id, .. } => {
                let meta = self.resolve_meta_type(HostType::Class(*class))?;
                (meta.kind() == MetaTypeKind::Custom).then(|| GenericValue::Handle {
                    type_name: meta.name().to_owned(),
                    id: *id,
                })
            }
            HostValue::Type(_) => None,
        }
    }

    fn list_at(&self, items: &[HostValue], depth: usize) -> GenericValue {
        if !items.is_empty() && items.iter().all(|item| matches!(item, HostValue::String(_))) {
            return GenericValue::StringList(
                items
                    .iter()
                    .filter_map(|item| match item {
                        HostValue::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            );
        }
        let converted: Vec<GenericValue> = items.iter().map(|item| self.value_or_opaque(item, depth + 1)).collect();
        GenericValue::typed_list(converted).unwrap_or_else(GenericValue::List)
    }

    fn map_at(&self, pairs: &DictPairs, depth: usize) -> Result<GenericValue, BridgeError> {
        if let Some(key) = pairs.first_non_string_key() {
            return Err(BridgeError::KeyTypeMismatch {
                key_type: key.type_name().to_owned(),
            });
        }
        let mut map = IndexMap::with_capacity(pairs.len());
        for (key, value) in pairs {
            if let HostValue::String(key) = key {
                map.insert(key.clone(), self.value_or_opaque(value, depth + 1));
            }
        }
        Ok(GenericValue::Map(map))
    }

    fn value_or_opaque(&self, value: &HostValue, depth: usize) -> GenericValue {
        self.value_at(value, depth)
            .unwrap_or_else(|| GenericValue::opaque(value.type_name(), value.py_repr()))
    }
}

/// Narrows an out-of-`i64` integer to `UInt` when it fits 64 bits unsigned.
fn narrow_big_int(value: &BigInt) -> Option<GenericValue> {
    if let Some(i) = value.to_i64() {
        Some(GenericValue::Int(i))
    } else {
        value.to_u64().map(GenericValue::UInt)
    }
}
