use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};

bitflags! {
    pub struct BasicFlags: u32 {
        const BOOLEAN = 1 << 0;
        const INTEGER = 1 << 1;
        const UNSIGNED = 1 << 2;
        const FLOAT = 1 << 3;
        const POINTER = 1 << 4;
        const STRING = 1 << 5;
        const RUNE = 1 << 6;
        const UNTYPED = 1 << 7;

        const NUMERIC = Self::INTEGER.bits | Self::FLOAT.bits;
        const ORDERED = Self::NUMERIC.bits | Self::STRING.bits | Self::POINTER.bits;
        const CONSTANT_TYPE = Self::BOOLEAN.bits | Self::NUMERIC.bits | Self::POINTER.bits | Self::STRING.bits;
    }
}

/// The basic type kinds. The discriminant doubles as the kind's
/// [`TypeId`](crate::TypeId) in every [`Types`](crate::Types) arena.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, PartialEq, ToPrimitive)]
pub enum BasicKind {
    Invalid,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Int,
    Uint,
    Rawptr,
    String,
    Any,
    UntypedBool,
    UntypedInteger,
    UntypedFloat,
    UntypedString,
    UntypedRune,
    UntypedNil,
}

/// Size of a basic type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BasicSize {
    Fixed(i64),
    /// Multiple of the target word size.
    Words(i64),
    /// Untyped kinds and `invalid` have no size.
    None,
}

#[derive(Clone, Copy, Debug)]
pub struct BasicInfo {
    pub kind: BasicKind,
    pub flags: BasicFlags,
    pub size: BasicSize,
    pub name: &'static str,
}

const fn basic(kind: BasicKind, flags: BasicFlags, size: BasicSize, name: &'static str) -> BasicInfo {
    BasicInfo {
        kind,
        flags,
        size,
        name,
    }
}

const INT: BasicFlags = BasicFlags::INTEGER;
const UINT: BasicFlags = BasicFlags::from_bits_truncate(BasicFlags::INTEGER.bits() | BasicFlags::UNSIGNED.bits());
const UNTYPED: BasicFlags = BasicFlags::UNTYPED;

pub static BASIC_TYPES: [BasicInfo; BasicKind::COUNT] = [
    basic(BasicKind::Invalid, BasicFlags::empty(), BasicSize::None, "invalid type"),
    basic(BasicKind::Bool, BasicFlags::BOOLEAN, BasicSize::Fixed(1), "bool"),
    basic(BasicKind::I8, INT, BasicSize::Fixed(1), "i8"),
    basic(BasicKind::U8, UINT, BasicSize::Fixed(1), "u8"),
    basic(BasicKind::I16, INT, BasicSize::Fixed(2), "i16"),
    basic(BasicKind::U16, UINT, BasicSize::Fixed(2), "u16"),
    basic(BasicKind::I32, INT, BasicSize::Fixed(4), "i32"),
    basic(BasicKind::U32, UINT, BasicSize::Fixed(4), "u32"),
    basic(BasicKind::I64, INT, BasicSize::Fixed(8), "i64"),
    basic(BasicKind::U64, UINT, BasicSize::Fixed(8), "u64"),
    basic(BasicKind::F32, BasicFlags::FLOAT, BasicSize::Fixed(4), "f32"),
    basic(BasicKind::F64, BasicFlags::FLOAT, BasicSize::Fixed(8), "f64"),
    basic(BasicKind::Int, INT, BasicSize::Words(1), "int"),
    basic(BasicKind::Uint, UINT, BasicSize::Words(1), "uint"),
    basic(BasicKind::Rawptr, BasicFlags::POINTER, BasicSize::Words(1), "rawptr"),
    basic(BasicKind::String, BasicFlags::STRING, BasicSize::Words(2), "string"),
    basic(BasicKind::Any, BasicFlags::empty(), BasicSize::Words(2), "any"),
    basic(
        BasicKind::UntypedBool,
        BasicFlags::from_bits_truncate(BasicFlags::BOOLEAN.bits() | UNTYPED.bits()),
        BasicSize::None,
        "untyped bool",
    ),
    basic(
        BasicKind::UntypedInteger,
        BasicFlags::from_bits_truncate(BasicFlags::INTEGER.bits() | UNTYPED.bits()),
        BasicSize::None,
        "untyped integer",
    ),
    basic(
        BasicKind::UntypedFloat,
        BasicFlags::from_bits_truncate(BasicFlags::FLOAT.bits() | UNTYPED.bits()),
        BasicSize::None,
        "untyped float",
    ),
    basic(
        BasicKind::UntypedString,
        BasicFlags::from_bits_truncate(BasicFlags::STRING.bits() | UNTYPED.bits()),
        BasicSize::None,
        "untyped string",
    ),
    basic(
        BasicKind::UntypedRune,
        BasicFlags::from_bits_truncate(
            BasicFlags::INTEGER.bits() | BasicFlags::RUNE.bits() | UNTYPED.bits(),
        ),
        BasicSize::None,
        "untyped rune",
    ),
    basic(BasicKind::UntypedNil, UNTYPED, BasicSize::None, "untyped nil"),
];

/// Names in the universal scope that denote an existing basic kind.
pub const BASIC_ALIASES: [(&str, BasicKind); 2] = [("byte", BasicKind::U8), ("rune", BasicKind::I32)];

impl BasicKind {
    pub const COUNT: usize = BasicKind::UntypedNil as usize + 1;

    pub fn info(self) -> &'static BasicInfo {
        &BASIC_TYPES[self as usize]
    }

    pub fn flags(self) -> BasicFlags {
        self.info().flags
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn iter() -> impl Iterator<Item = BasicKind> {
        (0..Self::COUNT as u32).filter_map(num_traits::FromPrimitive::from_u32)
    }

    pub fn is_untyped(self) -> bool {
        self.flags().contains(BasicFlags::UNTYPED)
    }

    /// The kind an untyped constant takes when it is forced into a
    /// typed context without any other type information.
    pub fn default_kind(self) -> BasicKind {
        match self {
            BasicKind::UntypedBool => BasicKind::Bool,
            BasicKind::UntypedInteger => BasicKind::Int,
            BasicKind::UntypedFloat => BasicKind::F64,
            BasicKind::UntypedString => BasicKind::String,
            BasicKind::UntypedRune => BasicKind::I32,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_discriminants() {
        for kind in BasicKind::iter() {
            assert_eq!(kind.info().kind, kind);
        }
        assert_eq!(BasicKind::iter().count(), BasicKind::COUNT);
    }

    #[test]
    fn combined_flags() {
        assert!(BasicKind::F32.flags().intersects(BasicFlags::NUMERIC));
        assert!(BasicKind::String.flags().intersects(BasicFlags::ORDERED));
        assert!(!BasicKind::Any.flags().intersects(BasicFlags::CONSTANT_TYPE));
        assert!(BasicKind::UntypedRune.flags().contains(BasicFlags::RUNE));
    }

    #[test]
    fn defaults() {
        assert_eq!(BasicKind::UntypedInteger.default_kind(), BasicKind::Int);
        assert_eq!(BasicKind::UntypedFloat.default_kind(), BasicKind::F64);
        assert_eq!(BasicKind::UntypedRune.default_kind(), BasicKind::I32);
        assert_eq!(BasicKind::UntypedNil.default_kind(), BasicKind::UntypedNil);
        assert_eq!(BasicKind::U16.default_kind(), BasicKind::U16);
    }
}
