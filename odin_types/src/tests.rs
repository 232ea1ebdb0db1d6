use proptest::prelude::*;

use crate::{
    ty::{Field, Record, RecordKind},
    BasicKind, BuildContext, EntityId, TypeId, Types,
};

/// A small recipe for building a type, so that proptest can shrink it.
#[derive(Clone, Debug)]
enum Shape {
    Basic(u32),
    Pointer(Box<Shape>),
    Slice(Box<Shape>),
    Array(Box<Shape>, i64),
    Struct(Vec<Shape>),
    Tuple(Vec<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = (1..BasicKind::COUNT as u32 - 6).prop_map(Shape::Basic);
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Pointer(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Slice(Box::new(s))),
            (inner.clone(), 0..8i64).prop_map(|(s, n)| Shape::Array(Box::new(s), n)),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::Struct),
            prop::collection::vec(inner, 1..4).prop_map(Shape::Tuple),
        ]
    })
}

fn build(types: &mut Types, shape: &Shape) -> TypeId {
    match shape {
        Shape::Basic(i) => TypeId::basic(num_traits::FromPrimitive::from_u32(*i).unwrap_or(BasicKind::Int)),
        Shape::Pointer(s) => {
            let elem = build(types, s);
            types.make_pointer(elem)
        },
        Shape::Slice(s) => {
            let elem = build(types, s);
            types.make_slice(elem)
        },
        Shape::Array(s, n) => {
            let elem = build(types, s);
            types.make_array(elem, *n)
        },
        Shape::Struct(fields) => {
            let fields = fields
                .iter()
                .enumerate()
                .map(|(i, s)| Field::new(format!("f{}", i), build(types, s)))
                .collect();
            types.make_record(Record::new(RecordKind::Struct, fields))
        },
        Shape::Tuple(fields) => {
            let fields = fields.iter().map(|s| Field::new("", build(types, s))).collect();
            types.make_tuple(fields)
        },
    }
}

proptest! {
    #[test]
    fn identity_is_reflexive(shape in shape()) {
        let mut types = Types::new();
        let a = build(&mut types, &shape);
        prop_assert!(types.are_types_identical(a, a));
    }

    #[test]
    fn structurally_equal_types_are_identical(shape in shape()) {
        let mut types = Types::new();
        let a = build(&mut types, &shape);
        let b = build(&mut types, &shape);
        prop_assert!(types.are_types_identical(a, b));
        prop_assert!(types.are_types_identical(b, a));
    }

    #[test]
    fn identity_is_symmetric(x in shape(), y in shape()) {
        let mut types = Types::new();
        let a = build(&mut types, &x);
        let b = build(&mut types, &y);
        prop_assert_eq!(types.are_types_identical(a, b), types.are_types_identical(b, a));
    }

    #[test]
    fn size_is_a_multiple_of_alignment(shape in shape()) {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let ty = build(&mut types, &shape);
        let size = types.size_of(&ctx, ty);
        let align = types.align_of(&ctx, ty);
        prop_assert!(align > 0);
        prop_assert_eq!(size % align, 0);
    }
}

#[test]
fn self_referential_through_pointer() {
    let mut types = Types::new();
    let list = types.make_named("List", None, Some(EntityId::new(7)));
    let next = types.make_pointer(list);
    let body = types.make_record(Record::new(
        RecordKind::Struct,
        vec![Field::new("next", next), Field::new("value", TypeId::INT)],
    ));
    types.set_named_base(list, body);

    assert!(types.are_types_identical(list, list));
    let again = types.make_pointer(list);
    assert_eq!(next, again);
    assert!(types.are_types_identical(next, again));
    assert_eq!(types.type_to_string(next), "^List");
    assert!(types.lookup_field(next, "value", false).unwrap().indirect);
}
