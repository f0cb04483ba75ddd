//! Registration of host enum classes with the metatype registry.
//!
//! A host enum is declared when its decorator runs, which is usually inside the
//! body of an owner class that does not exist yet. Such declarations are queued
//! on the owner and resolved by [`EnumBridge::resolve_delayed_enums`] once the host
//! has finished constructing it. Per enum the lifecycle is
//! `Undeclared -> Declared(pending) -> Resolved`, with no way back.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use ahash::AHashMap;
use indexmap::IndexMap;
use num_traits::ToPrimitive;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    config::BridgeConfig,
    error::BridgeError,
    host::{EnumShape, HostType, HostTypeId, HostTypes, HostValue},
    meta_type::{EnumWidth, MetaType, MetaTypeId, MetaTypeKind, MetaTypeRegistry, MetaTypeSystem},
};

/// Answer of [`EnumBridge::is_flag`].
///
/// Kept distinct from `bool` so "not an enum we know" is not confused with "not a flag".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagState {
    Flag,
    NotFlag,
    Unknown,
}

impl FlagState {
    /// Integer form: `1`, `0`, or `-1` for unknown.
    #[must_use]
    pub fn as_int(self) -> i32 {
        match self {
            Self::Flag => 1,
            Self::NotFlag => 0,
            Self::Unknown => -1,
        }
    }
}

impl From<FlagState> for Option<bool> {
    fn from(state: FlagState) -> Self {
        match state {
            FlagState::Flag => Some(true),
            FlagState::NotFlag => Some(false),
            FlagState::Unknown => None,
        }
    }
}

/// Lifecycle position of one host enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumState {
    Undeclared,
    /// Declared; `pending` is true while it waits in its owner's queue.
    Declared { pending: bool },
    Resolved(MetaTypeId),
}

/// One enum class crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    class: HostTypeId,
    name: String,
    width: EnumWidth,
    flag: bool,
    owner: Option<HostTypeId>,
    state: EnumState,
}

impl EnumDescriptor {
    #[must_use]
    pub fn class(&self) -> HostTypeId {
        self.class
    }

    /// Qualified name the enum registers under (`Owner::Color`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte form of [`EnumDescriptor::name`].
    #[must_use]
    pub fn name_bytes(&self) -> &[u8] {
        self.name.as_bytes()
    }

    #[must_use]
    pub fn width(&self) -> EnumWidth {
        self.width
    }

    #[must_use]
    pub fn is_flag(&self) -> bool {
        self.flag
    }

    #[must_use]
    pub fn owner(&self) -> Option<HostTypeId> {
        self.owner
    }

    #[must_use]
    pub fn state(&self) -> EnumState {
        self.state
    }
}

/// An enum registered by [`EnumBridge::resolve_delayed_enums`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnum {
    pub class: HostTypeId,
    pub type_name: String,
    pub meta_type: MetaTypeId,
}

#[derive(Debug, Default)]
struct EnumTables {
    descriptors: AHashMap<HostTypeId, EnumDescriptor>,
    /// owner -> enums waiting for it, in declaration order
    pending: IndexMap<HostTypeId, Vec<HostTypeId>>,
}

/// Registers host enum classes with a [`MetaTypeSystem`].
#[derive(Debug)]
pub struct EnumBridge<M: MetaTypeSystem = MetaTypeRegistry> {
    meta: Arc<M>,
    config: BridgeConfig,
    initialized: AtomicBool,
    tables: RwLock<EnumTables>,
}

impl<M: MetaTypeSystem> EnumBridge<M> {
    /// Creates an uninitialized bridge; call [`EnumBridge::init`] before use.
    pub fn new(meta: Arc<M>) -> Self {
        Self::with_config(meta, BridgeConfig::default())
    }

    pub fn with_config(meta: Arc<M>, config: BridgeConfig) -> Self {
        Self {
            meta,
            config,
            initialized: AtomicBool::new(false),
            tables: RwLock::new(EnumTables::default()),
        }
    }

    /// Establishes the bridge's tables. Calling it again is a no-op.
    pub fn init(&self) {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            debug!("enum bridge initialized");
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_init(&self) -> Result<(), BridgeError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BridgeError::NotInitialized)
        }
    }

    /// Declares `class` as an enum (or flag enum when `is_flag`).
    ///
    /// If the class is nested in an owner that is still under construction, the
    /// registration is queued on the owner; otherwise it happens immediately.
    /// `is_flag` must match whether the class derives from the host's flag base.
    /// Declaring again is a no-op.
    pub fn declare_enum(&self, types: &HostTypes, class: HostTypeId, is_flag: bool) -> Result<(), BridgeError> {
        self.ensure_init()?;
        let host_class = types.get(class).ok_or(BridgeError::UnknownType(class))?;
        let Some(shape) = host_class.enum_shape() else {
            return Err(BridgeError::type_mismatch(
                "enum class",
                format!("plain class '{}'", host_class.name()),
            ));
        };
        if shape.is_flag_like() != is_flag {
            return Err(BridgeError::type_mismatch(
                if is_flag { "flag enum class" } else { "non-flag enum class" },
                format!("'{}'", host_class.name()),
            ));
        }

        let mut tables = self.tables.write();
        if tables.descriptors.contains_key(&class) {
            return Ok(());
        }

        let width = storage_width(host_class.name(), shape)?;
        let name = types
            .qualified_name(class, &self.config.scope_separator)
            .ok_or(BridgeError::UnknownType(class))?;
        let owner = host_class.owner();
        let defer = match owner {
            Some(owner_id) => !types.get(owner_id).is_some_and(|o| o.is_complete()),
            None => false,
        };

        let mut descriptor = EnumDescriptor {
            class,
            name,
            width,
            flag: is_flag,
            owner,
            state: EnumState::Declared { pending: defer },
        };

        if let (true, Some(owner_id)) = (defer, owner) {
            debug!(name = %descriptor.name, owner = %owner_id, "deferring enum registration");
            tables.pending.entry(owner_id).or_default().push(class);
        } else {
            let meta = self.register_descriptor(&descriptor)?;
            descriptor.state = EnumState::Resolved(meta.id());
        }
        tables.descriptors.insert(class, descriptor);
        Ok(())
    }

    /// Tri-state flag query for an enum member or enum type.
    #[must_use]
    pub fn is_flag(&self, value: &HostValue) -> FlagState {
        let class = match value {
            HostValue::EnumMember { class, .. } | HostValue::Type(HostType::Class(class)) => *class,
            _ => return FlagState::Unknown,
        };
        match self.tables.read().descriptors.get(&class) {
            Some(descriptor) if descriptor.flag => FlagState::Flag,
            Some(_) => FlagState::NotFlag,
            None => FlagState::Unknown,
        }
    }

    /// Registers every enum queued on `owner`, if the owner is complete.
    ///
    /// Returns the enums registered by this call in declaration order. While the
    /// owner is under construction nothing happens and the queue is kept. A queued
    /// enum whose registration fails is logged and dropped.
    pub fn resolve_delayed_enums(&self, types: &HostTypes, owner: HostTypeId) -> Result<Vec<ResolvedEnum>, BridgeError> {
        self.ensure_init()?;
        let owner_class = types.get(owner).ok_or(BridgeError::UnknownType(owner))?;
        if !owner_class.is_complete() {
            debug!(owner = %owner, "owner still under construction, keeping queued enums");
            return Ok(Vec::new());
        }

        let mut tables = self.tables.write();
        let Some(queued) = tables.pending.shift_remove(&owner) else {
            return Ok(Vec::new());
        };

        let mut resolved = Vec::with_capacity(queued.len());
        for class in queued {
            let Some(descriptor) = tables.descriptors.get(&class).cloned() else {
                continue;
            };
            if descriptor.state != (EnumState::Declared { pending: true }) {
                continue;
            }
            let state = match self.register_descriptor(&descriptor) {
                Ok(meta) => {
                    resolved.push(ResolvedEnum {
                        class,
                        type_name: meta.name().to_owned(),
                        meta_type: meta.id(),
                    });
                    EnumState::Resolved(meta.id())
                }
                Err(err) => {
                    warn!(name = %descriptor.name, error = %err, "dropping deferred enum registration");
                    EnumState::Declared { pending: false }
                }
            };
            if let Some(entry) = tables.descriptors.get_mut(&class) {
                entry.state = state;
            }
        }
        debug!(owner = %owner, count = resolved.len(), "resolved deferred enums");
        Ok(resolved)
    }

    /// Registered metatype name for a resolved enum, or an empty string.
    #[must_use]
    pub fn type_name(&self, class: HostTypeId) -> String {
        let tables = self.tables.read();
        match tables.descriptors.get(&class).map(EnumDescriptor::state) {
            Some(EnumState::Resolved(id)) => self.meta.by_id(id).map(|m| m.name().to_owned()).unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Registers an `int`-backed enum metatype named `name` for a declared enum.
    pub fn create_generic_enum_meta_type(&self, name: &str, class: HostTypeId) -> Result<MetaType, BridgeError> {
        self.create_meta_type(name, class, EnumWidth::Int)
    }

    /// Registers a `uint64`-backed enum metatype named `name` for a declared enum.
    pub fn create_generic_enum64_meta_type(&self, name: &str, class: HostTypeId) -> Result<MetaType, BridgeError> {
        self.create_meta_type(name, class, EnumWidth::UInt64)
    }

    fn create_meta_type(&self, name: &str, class: HostTypeId, width: EnumWidth) -> Result<MetaType, BridgeError> {
        self.ensure_init()?;
        let mut tables = self.tables.write();
        let Some(descriptor) = tables.descriptors.get_mut(&class) else {
            return Err(BridgeError::type_mismatch("declared enum", format!("undeclared class #{class}")));
        };
        if width == EnumWidth::Int && descriptor.width == EnumWidth::UInt64 {
            return Err(BridgeError::type_mismatch(
                "enum with values that fit int",
                format!("'{}' needs uint64 storage", descriptor.name),
            ));
        }
        let meta = self.meta.register(
            name,
            MetaTypeKind::Enum {
                width,
                flag: descriptor.flag,
            },
            Some(HostType::Class(class)),
        )?;
        let was_pending = descriptor.state == EnumState::Declared { pending: true };
        descriptor.state = EnumState::Resolved(meta.id());
        let owner = descriptor.owner;
        if was_pending
            && let Some(owner) = owner
            && let Some(queue) = tables.pending.get_mut(&owner)
        {
            queue.retain(|c| *c != class);
        }
        Ok(meta)
    }

    fn register_descriptor(&self, descriptor: &EnumDescriptor) -> Result<MetaType, BridgeError> {
        let kind = MetaTypeKind::Enum {
            width: descriptor.width,
            flag: descriptor.flag,
        };
        let meta = self
            .meta
            .register(&descriptor.name, kind, Some(HostType::Class(descriptor.class)))?;
        debug!(name = %descriptor.name, width = %descriptor.width, flag = descriptor.flag, "registered enum");
        Ok(meta)
    }

    /// Lifecycle position of `class`.
    #[must_use]
    pub fn state(&self, class: HostTypeId) -> EnumState {
        self.tables
            .read()
            .descriptors
            .get(&class)
            .map_or(EnumState::Undeclared, EnumDescriptor::state)
    }

    #[must_use]
    pub fn descriptor(&self, class: HostTypeId) -> Option<EnumDescriptor> {
        self.tables.read().descriptors.get(&class).cloned()
    }

    /// Number of enums queued on `owner`.
    #[must_use]
    pub fn pending_count(&self, owner: HostTypeId) -> usize {
        self.tables.read().pending.get(&owner).map_or(0, Vec::len)
    }
}

/// Picks the narrowest storage that holds every member value.
fn storage_width(class_name: &str, shape: &EnumShape) -> Result<EnumWidth, BridgeError> {
    let values = shape.members().iter().map(|(_, v)| v);
    if values.clone().all(|v| v.to_i32().is_some()) {
        return Ok(EnumWidth::Int);
    }
    if values.clone().all(|v| v.to_u64().is_some()) {
        return Ok(EnumWidth::UInt64);
    }
    let (member, value) = shape
        .members()
        .iter()
        .find(|(_, v)| v.to_i32().is_none() && v.to_u64().is_none())
        .map_or(("?", String::new()), |(n, v)| (n.as_str(), v.to_string()));
    Err(BridgeError::type_mismatch(
        "enum values that fit int or uint64",
        format!("{class_name}.{member} = {value}"),
    ))
}
