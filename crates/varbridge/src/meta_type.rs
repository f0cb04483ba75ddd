//! Metatype registry: the foreign reflection system's table of named types.
//!
//! The bridges only talk to the registry through [`MetaTypeSystem`], so a binding
//! runtime can plug in its own reflection backend. [`MetaTypeRegistry`] is the
//! in-process implementation used by default.

use std::fmt;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    error::BridgeError,
    generic::ValueTag,
    host::{BuiltinType, HostType},
};

/// Handle the registry assigns to a metatype. Owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MetaTypeId(u32);

impl MetaTypeId {
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MetaTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Underlying storage of an enum metatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum EnumWidth {
    /// Ordinary 32-bit signed integer.
    #[strum(serialize = "int")]
    Int,
    /// 64-bit unsigned integer.
    #[strum(serialize = "uint64")]
    UInt64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MetaTypeKind {
    /// One of the value tags the registry knows from construction.
    Builtin(ValueTag),
    /// A host enum registered by the enum bridge.
    Enum { width: EnumWidth, flag: bool },
    /// A host class registered for handle conversion.
    Custom,
}

impl fmt::Display for MetaTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(tag) => write!(f, "builtin {tag}"),
            Self::Enum { width, flag: false } => write!(f, "enum ({width})"),
            Self::Enum { width, flag: true } => write!(f, "flag enum ({width})"),
            Self::Custom => f.write_str("custom type"),
        }
    }
}

/// Runtime descriptor for a registered type.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetaType {
    id: MetaTypeId,
    name: String,
    kind: MetaTypeKind,
    host_type: Option<HostType>,
}

impl MetaType {
    #[must_use]
    pub fn id(&self) -> MetaTypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> MetaTypeKind {
        self.kind
    }

    /// The host type this metatype was registered for, if any.
    #[must_use]
    pub fn host_type(&self) -> Option<HostType> {
        self.host_type
    }

    /// A registration is compatible with an existing one when it describes the same thing.
    fn is_compatible(&self, kind: MetaTypeKind, host_type: Option<HostType>) -> bool {
        self.kind == kind && self.host_type == host_type
    }
}

/// The reflection system the bridges register into and query.
pub trait MetaTypeSystem: Send + Sync {
    /// Registers `name`, or returns the existing metatype if an identical one exists.
    ///
    /// Registering a name that exists with a different kind or host type fails with
    /// `NameCollision`. A host type binds to the first metatype registered for it.
    fn register(&self, name: &str, kind: MetaTypeKind, host_type: Option<HostType>) -> Result<MetaType, BridgeError>;

    fn by_name(&self, name: &str) -> Option<MetaType>;

    fn by_id(&self, id: MetaTypeId) -> Option<MetaType>;

    /// Returns the metatype bound to a host type.
    fn for_host_type(&self, host_type: HostType) -> Option<MetaType>;
}

/// Builtin metatypes every registry starts with, with the host types bound to them.
const BUILTINS: &[(ValueTag, &[BuiltinType])] = &[
    (ValueTag::Null, &[BuiltinType::NoneType]),
    (ValueTag::Bool, &[BuiltinType::Bool]),
    (ValueTag::Int, &[BuiltinType::Int]),
    (ValueTag::UInt, &[]),
    (ValueTag::Float, &[BuiltinType::Float]),
    (ValueTag::String, &[BuiltinType::Str]),
    (ValueTag::Bytes, &[BuiltinType::Bytes]),
    (ValueTag::StringList, &[]),
    (ValueTag::List, &[BuiltinType::List, BuiltinType::Tuple]),
    (ValueTag::Map, &[BuiltinType::Dict]),
];

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct RegistryState {
    types: Vec<MetaType>,
    by_name: AHashMap<String, MetaTypeId>,
    by_host: AHashMap<HostType, MetaTypeId>,
}

impl RegistryState {
    fn get(&self, id: MetaTypeId) -> Option<&MetaType> {
        self.types.get(id.0 as usize)
    }

    /// Checks that ids are dense and every index points at a matching entry.
    fn validate(&self) -> Result<(), String> {
        for (index, meta) in self.types.iter().enumerate() {
            if meta.id.0 as usize != index {
                return Err(format!("metatype '{}' has id {} at position {index}", meta.name, meta.id.0));
            }
        }
        for (name, id) in &self.by_name {
            if self.get(*id).is_none_or(|meta| meta.name != *name) {
                return Err(format!("name '{name}' points at unknown id {}", id.0));
            }
        }
        if self.by_name.len() != self.types.len() {
            return Err(format!("{} names for {} metatypes", self.by_name.len(), self.types.len()));
        }
        for (host_type, id) in &self.by_host {
            if self.get(*id).is_none() {
                return Err(format!("host type {host_type} points at unknown id {}", id.0));
            }
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, kind: MetaTypeKind, host_type: Option<HostType>) -> Result<MetaType, BridgeError> {
        if let Some(existing) = self.by_name.get(name).and_then(|id| self.get(*id)) {
            return if existing.is_compatible(kind, host_type) {
                Ok(existing.clone())
            } else {
                Err(BridgeError::NameCollision {
                    name: name.to_owned(),
                    existing: existing.kind.to_string(),
                })
            };
        }
        let raw = u32::try_from(self.types.len())
            .map_err(|_| BridgeError::type_mismatch("registry with free ids", "exhausted metatype ids"))?;
        let meta = MetaType {
            id: MetaTypeId(raw),
            name: name.to_owned(),
            kind,
            host_type,
        };
        self.by_name.insert(meta.name.clone(), meta.id);
        if let Some(host_type) = host_type {
            self.by_host.entry(host_type).or_insert(meta.id);
        }
        self.types.push(meta.clone());
        Ok(meta)
    }
}

/// In-memory metatype registry.
///
/// Lookups take a shared lock; registrations take the write lock, so there is one
/// writer per name at a time. Registrations are never removed.
#[derive(Debug)]
pub struct MetaTypeRegistry {
    state: RwLock<RegistryState>,
}

impl Default for MetaTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaTypeRegistry {
    /// Creates a registry holding the builtin metatypes.
    #[must_use]
    pub fn new() -> Self {
        let mut state = RegistryState::default();
        for (tag, host_types) in BUILTINS {
            let kind = MetaTypeKind::Builtin(*tag);
            let primary = host_types.first().map(|b| HostType::Builtin(*b));
            let meta = state
                .insert(&tag.to_string(), kind, primary)
                .expect("builtin metatype names are unique");
            for extra in host_types.iter().skip(1) {
                state.by_host.insert(HostType::Builtin(*extra), meta.id());
            }
        }
        Self {
            state: RwLock::new(state),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().types.is_empty()
    }

    /// All registered metatypes in registration order.
    #[must_use]
    pub fn metatypes(&self) -> Vec<MetaType> {
        self.state.read().types.clone()
    }

    /// Serializes the registry to a binary snapshot.
    pub fn dump(&self) -> Result<Vec<u8>, BridgeError> {
        let state = self.state.read();
        postcard::to_allocvec(&*state).map_err(|e| BridgeError::Snapshot(e.to_string()))
    }

    /// Restores a registry from a snapshot produced by [`MetaTypeRegistry::dump`].
    ///
    /// Fails with `Snapshot` if the bytes do not decode or the decoded ids are
    /// inconsistent.
    pub fn load(bytes: &[u8]) -> Result<Self, BridgeError> {
        let state: RegistryState = postcard::from_bytes(bytes).map_err(|e| BridgeError::Snapshot(e.to_string()))?;
        state.validate().map_err(BridgeError::Snapshot)?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl MetaTypeSystem for MetaTypeRegistry {
    fn register(&self, name: &str, kind: MetaTypeKind, host_type: Option<HostType>) -> Result<MetaType, BridgeError> {
        let meta = self.state.write().insert(name, kind, host_type)?;
        debug!(name, id = meta.id().raw(), kind = %meta.kind(), "registered metatype");
        Ok(meta)
    }

    fn by_name(&self, name: &str) -> Option<MetaType> {
        let state = self.state.read();
        state.by_name.get(name).and_then(|id| state.get(*id)).cloned()
    }

    fn by_id(&self, id: MetaTypeId) -> Option<MetaType> {
        self.state.read().get(id).cloned()
    }

    fn for_host_type(&self, host_type: HostType) -> Option<MetaType> {
        let state = self.state.read();
        state.by_host.get(&host_type).and_then(|id| state.get(*id)).cloned()
    }
}
