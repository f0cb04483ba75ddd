#![doc = include_str!("../../../README.md")]

mod config;
mod convert;
mod enums;
mod error;
mod generic;
mod host;
pub mod meta_type;

pub use crate::{
    config::{BridgeConfig, DEFAULT_MAX_DEPTH, DEFAULT_SCOPE_SEPARATOR},
    convert::{ConversionOutcome, ValueBridge},
    enums::{EnumBridge, EnumDescriptor, EnumState, FlagState, ResolvedEnum},
    error::BridgeError,
    generic::{EnumValue, GenericValue, ValueTag},
    host::{BuiltinType, ClassShape, DictPairs, EnumShape, HostClass, HostType, HostTypeId, HostTypes, HostValue},
    meta_type::{EnumWidth, MetaType, MetaTypeId, MetaTypeKind, MetaTypeRegistry, MetaTypeSystem},
};
