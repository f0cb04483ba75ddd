//! Tests for list and map conversion through `ValueBridge`.

use std::sync::Arc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use varbridge::{
    BridgeConfig, BridgeError, BuiltinType, ClassShape, ConversionOutcome, EnumBridge, EnumShape, EnumValue,
    GenericValue, HostType, HostTypeId, HostTypes, HostValue, MetaTypeKind, MetaTypeRegistry, ValueBridge, ValueTag,
};

fn bridge() -> ValueBridge {
    ValueBridge::new(Arc::new(MetaTypeRegistry::new()))
}

/// An instance of a class nobody registered: the converter cannot represent it.
fn unconvertible() -> HostValue {
    HostValue::Instance {
        class: HostTypeId::new(1000),
        type_name: "Widget".to_owned(),
        id: 0xdead,
        repr: "<Widget object at 0xdead>".to_owned(),
    }
}

fn s(value: &str) -> HostValue {
    HostValue::str(value)
}

// === convert_list_to_generic_value ===

#[test]
fn all_strings_become_string_list() {
    let result = bridge().convert_list_to_generic_value(&[s("b"), s("a"), s("b")]);
    assert_eq!(
        result,
        GenericValue::StringList(vec!["b".to_owned(), "a".to_owned(), "b".to_owned()])
    );
    assert_eq!(result.tag(), ValueTag::StringList);
}

#[test]
fn all_ints_become_typed_list() {
    let result = bridge().convert_list_to_generic_value(&[HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]);
    assert_eq!(result.element_tag(), Some(ValueTag::Int));
    assert_eq!(
        result,
        GenericValue::TypedList {
            tag: ValueTag::Int,
            items: vec![GenericValue::Int(1), GenericValue::Int(2), GenericValue::Int(3)],
        }
    );
}

#[test]
fn all_floats_become_typed_list() {
    let result = bridge().convert_list_to_generic_value(&[HostValue::Float(0.5), HostValue::Float(1.5)]);
    assert_eq!(result.element_tag(), Some(ValueTag::Float));
}

#[test]
fn mixed_list_keeps_element_tags() {
    let result = bridge().convert_list_to_generic_value(&[s("a"), HostValue::Int(1), HostValue::Float(3.5)]);
    assert_eq!(result.tag(), ValueTag::List);
    let tags: Vec<ValueTag> = result.as_items().unwrap().iter().map(GenericValue::tag).collect();
    assert_eq!(tags, vec![ValueTag::String, ValueTag::Int, ValueTag::Float]);
}

#[test]
fn unconvertible_element_becomes_placeholder() {
    let result = bridge().convert_list_to_generic_value(&[HostValue::Int(1), unconvertible()]);
    assert_eq!(
        result,
        GenericValue::List(vec![
            GenericValue::Int(1),
            GenericValue::opaque("Widget", "<Widget object at 0xdead>"),
        ])
    );
}

#[test]
fn list_of_only_placeholders_is_generic() {
    let result = bridge().convert_list_to_generic_value(&[unconvertible(), unconvertible()]);
    assert_eq!(result.tag(), ValueTag::List);
    assert!(result.as_items().unwrap().iter().all(GenericValue::is_opaque));
}

#[test]
fn empty_list_is_generic() {
    assert_eq!(bridge().convert_list_to_generic_value(&[]), GenericValue::List(vec![]));
}

#[test]
fn nested_lists_share_the_list_tags() {
    let inner_a = HostValue::List(vec![HostValue::Int(1)]);
    let inner_b = HostValue::List(vec![s("x"), HostValue::Int(2)]);
    let result = bridge().convert_list_to_generic_value(&[inner_a, inner_b]);
    // [1] narrows to a typed list while ["x", 2] stays generic, so the outer list is mixed
    assert_eq!(result.tag(), ValueTag::List);
    let items = result.as_items().unwrap();
    assert_eq!(items[0].tag(), ValueTag::TypedList);
    assert_eq!(items[1].tag(), ValueTag::List);
}

#[test]
fn tuple_elements_convert_like_lists() {
    let tuple = HostValue::Tuple(vec![s("a"), s("b")]);
    let result = bridge().convert_value(&tuple);
    assert_eq!(
        result,
        ConversionOutcome::Present(GenericValue::StringList(vec!["a".to_owned(), "b".to_owned()]))
    );
}

#[test]
fn big_ints_narrow_to_uint() {
    let result = bridge().convert_list_to_generic_value(&[
        HostValue::BigInt(BigInt::from(u64::MAX)),
        HostValue::BigInt(BigInt::from(1u64 << 63)),
    ]);
    assert_eq!(result.element_tag(), Some(ValueTag::UInt));

    let too_big = HostValue::BigInt(BigInt::from(u64::MAX) * 4);
    assert!(bridge().convert_value(&too_big).is_absent());
}

// === convert_list_to_sequence ===

#[test]
fn strict_sequence_preserves_order_and_length() {
    let result = bridge().convert_list_to_sequence(&[s("a"), HostValue::Int(1), HostValue::None]);
    assert_eq!(
        result,
        ConversionOutcome::Present(vec![
            GenericValue::String("a".to_owned()),
            GenericValue::Int(1),
            GenericValue::Null,
        ])
    );
}

#[test]
fn strict_sequence_is_absent_when_any_element_fails() {
    let result = bridge().convert_list_to_sequence(&[s("a"), unconvertible()]);
    assert_eq!(result, ConversionOutcome::Absent);
}

#[test]
fn strict_and_permissive_differ_on_the_same_input() {
    let bridge = bridge();
    let items = [s("a"), unconvertible()];
    assert!(bridge.convert_list_to_sequence(&items).is_absent());
    assert_eq!(bridge.convert_list_to_generic_value(&items).as_items().unwrap().len(), 2);
}

#[test]
fn strict_sequence_of_empty_list_is_present() {
    assert_eq!(bridge().convert_list_to_sequence(&[]), ConversionOutcome::Present(vec![]));
}

// === convert_map_to_generic_value ===

#[test]
fn non_string_key_fails_whole_map() {
    let pairs = vec![(s("a"), HostValue::Int(1)), (HostValue::Int(2), s("x"))].into();
    let result = bridge().convert_map_to_generic_value(&pairs);
    assert_eq!(
        result,
        Err(BridgeError::KeyTypeMismatch {
            key_type: "int".to_owned()
        })
    );
}

#[test]
fn unconvertible_value_becomes_placeholder_in_map() {
    let pairs = vec![(s("a"), HostValue::Int(1)), (s("b"), unconvertible())].into();
    let result = bridge().convert_map_to_generic_value(&pairs).unwrap();
    let map = result.as_map().unwrap();
    assert_eq!(map["a"], GenericValue::Int(1));
    assert!(map["b"].is_opaque());
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn map_preserves_insertion_order_and_last_duplicate_wins() {
    let pairs = vec![
        (s("z"), HostValue::Int(1)),
        (s("a"), HostValue::Int(2)),
        (s("z"), HostValue::Int(3)),
    ]
    .into();
    let result = bridge().convert_map_to_generic_value(&pairs).unwrap();
    let mut expected = IndexMap::new();
    expected.insert("z".to_owned(), GenericValue::Int(3));
    expected.insert("a".to_owned(), GenericValue::Int(2));
    assert_eq!(result, GenericValue::Map(expected));
}

#[test]
fn nested_map_with_bad_key_is_a_placeholder() {
    let inner = HostValue::dict(vec![(HostValue::Int(1), s("x"))]);
    let pairs = vec![(s("inner"), inner)].into();
    let result = bridge().convert_map_to_generic_value(&pairs).unwrap();
    assert_eq!(result.as_map().unwrap()["inner"].tag(), ValueTag::Opaque);
}

// === metatypes ===

#[test]
fn builtin_types_resolve() {
    let bridge = bridge();
    let int = bridge.resolve_meta_type(BuiltinType::Int.into()).unwrap();
    assert_eq!(int.kind(), MetaTypeKind::Builtin(ValueTag::Int));
    let tuple = bridge.resolve_meta_type(BuiltinType::Tuple.into()).unwrap();
    assert_eq!(tuple.name(), "list");
    assert!(bridge.resolve_meta_type(BuiltinType::Type.into()).is_none());
}

#[test]
fn unregistered_class_resolves_to_none_until_registered() {
    let bridge = bridge();
    let class = HostTypeId::new(1000);
    assert!(bridge.resolve_meta_type(HostType::Class(class)).is_none());
    assert!(bridge.convert_value(&unconvertible()).is_absent());

    bridge.register_class("Widget", class).unwrap();
    assert_eq!(bridge.resolve_meta_type(HostType::Class(class)).unwrap().name(), "Widget");
    assert_eq!(
        bridge.convert_value(&unconvertible()),
        ConversionOutcome::Present(GenericValue::Handle {
            type_name: "Widget".to_owned(),
            id: 0xdead,
        })
    );
}

#[test]
fn enum_members_convert_once_registered() {
    let meta = Arc::new(MetaTypeRegistry::new());
    let enums = EnumBridge::new(Arc::clone(&meta));
    enums.init();
    let values = ValueBridge::new(meta);

    let mut types = HostTypes::new();
    let color = types
        .define("Color", None, ClassShape::Enum(EnumShape::new([("RED", 1), ("GREEN", 2)])))
        .unwrap();
    let green = types.enum_member(color, "GREEN").unwrap();
    assert!(values.convert_value(&green).is_absent());

    enums.declare_enum(&types, color, false).unwrap();
    assert_eq!(
        values.convert_value(&green),
        ConversionOutcome::Present(GenericValue::Enum {
            type_name: "Color".to_owned(),
            value: EnumValue::Int(2),
        })
    );
}

#[test]
fn wide_enum_members_convert_to_uint64() {
    let meta = Arc::new(MetaTypeRegistry::new());
    let enums = EnumBridge::new(Arc::clone(&meta));
    enums.init();
    let values = ValueBridge::new(meta);

    let mut types = HostTypes::new();
    let mask = types
        .define(
            "Mask",
            None,
            ClassShape::Enum(EnumShape::new([("HIGH", BigInt::from(1u64 << 63))]).flag_like()),
        )
        .unwrap();
    enums.declare_enum(&types, mask, true).unwrap();
    let high = types.enum_member(mask, "HIGH").unwrap();
    assert_eq!(
        values.convert_value(&high).into_option(),
        Some(GenericValue::Enum {
            type_name: "Mask".to_owned(),
            value: EnumValue::UInt64(1 << 63),
        })
    );
}

#[test]
fn members_of_different_enums_stay_generic() {
    let meta = Arc::new(MetaTypeRegistry::new());
    let enums = EnumBridge::new(Arc::clone(&meta));
    enums.init();
    let values = ValueBridge::new(meta);

    let mut types = HostTypes::new();
    let color = types
        .define("Color", None, ClassShape::Enum(EnumShape::new([("RED", 1), ("GREEN", 2)])))
        .unwrap();
    let shape = types
        .define("Shape", None, ClassShape::Enum(EnumShape::new([("CIRCLE", 1)])))
        .unwrap();
    enums.declare_enum(&types, color, false).unwrap();
    enums.declare_enum(&types, shape, false).unwrap();
    let red = types.enum_member(color, "RED").unwrap();
    let green = types.enum_member(color, "GREEN").unwrap();
    let circle = types.enum_member(shape, "CIRCLE").unwrap();

    let same = values.convert_list_to_generic_value(&[red.clone(), green]);
    assert_eq!(same.element_tag(), Some(ValueTag::Enum));

    let mixed = values.convert_list_to_generic_value(&[red, circle]);
    assert_eq!(mixed.tag(), ValueTag::List);
    assert_eq!(
        mixed,
        GenericValue::List(vec![
            GenericValue::Enum {
                type_name: "Color".to_owned(),
                value: EnumValue::Int(1),
            },
            GenericValue::Enum {
                type_name: "Shape".to_owned(),
                value: EnumValue::Int(1),
            },
        ])
    );
}

#[test]
fn instances_of_different_classes_stay_generic() {
    let bridge = bridge();
    let widget = HostTypeId::new(1000);
    let gadget = HostTypeId::new(1001);
    bridge.register_class("Widget", widget).unwrap();
    bridge.register_class("Gadget", gadget).unwrap();
    let instance = |class: HostTypeId, type_name: &str, id: u64| HostValue::Instance {
        class,
        type_name: type_name.to_owned(),
        id,
        repr: format!("<{type_name} object>"),
    };

    let same = bridge.convert_list_to_generic_value(&[instance(widget, "Widget", 1), instance(widget, "Widget", 2)]);
    assert_eq!(same.element_tag(), Some(ValueTag::Handle));

    let mixed = bridge.convert_list_to_generic_value(&[instance(widget, "Widget", 1), instance(gadget, "Gadget", 2)]);
    assert_eq!(mixed.tag(), ValueTag::List);
    assert_eq!(mixed.element_tag(), None);
}

// === depth limit ===

#[test]
fn nesting_past_max_depth_becomes_placeholder() {
    let bridge = ValueBridge::with_config(Arc::new(MetaTypeRegistry::new()), BridgeConfig::new().max_depth(3));
    let mut value = HostValue::Int(1);
    for _ in 0..5 {
        value = HostValue::List(vec![value]);
    }
    let HostValue::List(items) = value else {
        unreachable!()
    };
    let result = bridge.convert_list_to_generic_value(&items);
    let mut current = &result;
    let mut depth = 0;
    while let Some(items) = current.as_items() {
        current = &items[0];
        depth += 1;
    }
    // the top-level list plus three nested levels, then the cut
    assert!(current.is_opaque());
    assert_eq!(depth, 4);
}

#[test]
fn json_output_is_natural() {
    let pairs = vec![
        (s("names"), HostValue::List(vec![s("a"), s("b")])),
        (s("n"), HostValue::Int(3)),
        (s("bad"), unconvertible()),
    ]
    .into();
    let result = bridge().convert_map_to_generic_value(&pairs).unwrap();
    assert_eq!(
        result.to_json_value(),
        serde_json::json!({
            "names": ["a", "b"],
            "n": 3,
            "bad": {"$opaque": {"type": "Widget", "repr": "<Widget object at 0xdead>"}},
        })
    );
}
