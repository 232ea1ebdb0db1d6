//! Sizes, alignments and field offsets.
//!
//! Named types are tracked on a path while their size is computed; meeting
//! the same named type again means it contains itself by value, which is
//! an illegal declaration cycle. Indirections (pointers, slices, dynamic
//! arrays, procedures) have a fixed size and end the walk.

use thiserror::Error;

use crate::{
    basic::BasicSize,
    ty::{Field, RecordKind, Type},
    BuildContext, TypeId, Types,
};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum LayoutError {
    /// The named types on the cycle, starting and ending with the same one.
    #[error("illegal declaration cycle")]
    Cycle(Vec<TypeId>),
}

pub const fn align_formula(size: i64, align: i64) -> i64 {
    if align > 0 {
        (size + align - 1) / align * align
    } else {
        size
    }
}

struct Layout<'t> {
    types: &'t Types,
    ctx: &'t BuildContext,
    path: Vec<TypeId>,
}

impl<'t> Layout<'t> {
    fn new(types: &'t Types, ctx: &'t BuildContext) -> Self {
        Self {
            types,
            ctx,
            path: Vec::new(),
        }
    }

    fn enter(&mut self, ty: TypeId) -> Result<(), LayoutError> {
        if let Some(pos) = self.path.iter().position(|&t| t == ty) {
            let mut cycle = self.path[pos..].to_vec();
            cycle.push(ty);
            odin_log::trace!("layout cycle: {:?}", cycle);
            return Err(LayoutError::Cycle(cycle));
        }

        self.path.push(ty);
        Ok(())
    }

    fn allocator_size(&mut self) -> Result<i64, LayoutError> {
        match self.types.well_known.allocator {
            Some(allocator) => self.size_of(allocator),
            // procedure + data pointer
            None => Ok(2 * self.ctx.word_size),
        }
    }

    fn align_of(&mut self, ty: TypeId) -> Result<i64, LayoutError> {
        let word = self.ctx.word_size;

        let res = match self.types.get(ty) {
            Type::Basic(kind) => match kind.info().size {
                BasicSize::Fixed(size) => size.min(self.ctx.max_align),
                BasicSize::Words(_) => word,
                BasicSize::None => 1,
            },

            Type::Named(named) => match named.base {
                Some(base) => {
                    self.enter(ty)?;
                    let res = self.align_of(base);
                    self.path.pop();
                    res?
                },
                None => 1,
            },

            Type::Pointer(_) | Type::Proc(_) | Type::Slice(_) | Type::DynamicArray(_) => word,

            Type::Array { elem, .. } => self.align_of(*elem)?,

            Type::Vector { elem, count } => {
                let elem_size = self.size_of(*elem)?;
                let elem_align = self.align_of(*elem)?;
                let total = (elem_size * count).max(1) as u64;
                (total.next_power_of_two() as i64).clamp(elem_align, self.ctx.max_align.max(elem_align))
            },

            Type::Tuple(fields) => self.max_field_align(fields)?,

            Type::Record(record) => match record.kind {
                RecordKind::Enum => match record.enum_base {
                    Some(base) => self.align_of(base)?,
                    None => word,
                },
                RecordKind::Struct if record.is_packed => 1,
                RecordKind::Struct | RecordKind::RawUnion => self.max_field_align(&record.fields)?,
                RecordKind::Union => self.max_field_align(&record.fields)?.max(word),
            },
        };

        Ok(res)
    }

    fn max_field_align(&mut self, fields: &[Field]) -> Result<i64, LayoutError> {
        let mut max = 1;
        for field in fields {
            max = max.max(self.align_of(field.ty)?);
        }
        Ok(max)
    }

    fn size_of(&mut self, ty: TypeId) -> Result<i64, LayoutError> {
        let word = self.ctx.word_size;

        let res = match self.types.get(ty) {
            Type::Basic(kind) => match kind.info().size {
                BasicSize::Fixed(size) => size,
                BasicSize::Words(n) => n * word,
                BasicSize::None => 0,
            },

            Type::Named(named) => match named.base {
                Some(base) => {
                    self.enter(ty)?;
                    let res = self.size_of(base);
                    self.path.pop();
                    res?
                },
                None => 0,
            },

            Type::Pointer(_) | Type::Proc(_) => word,
            Type::Slice(_) => 3 * word,
            Type::DynamicArray(_) => 3 * word + self.allocator_size()?,

            Type::Array { elem, count } => {
                let stride = align_formula(self.size_of(*elem)?, self.align_of(*elem)?);
                stride * count
            },

            Type::Vector { elem, count } => {
                let total = self.size_of(*elem)? * count;
                align_formula(total, self.align_of(ty)?)
            },

            Type::Tuple(fields) => self.struct_size(fields, false)?,

            Type::Record(record) => match record.kind {
                RecordKind::Enum => match record.enum_base {
                    Some(base) => self.size_of(base)?,
                    None => word,
                },
                RecordKind::Struct => self.struct_size(&record.fields, record.is_packed)?,
                RecordKind::RawUnion => {
                    let mut max = 0;
                    for field in &record.fields {
                        max = max.max(self.size_of(field.ty)?);
                    }
                    align_formula(max, self.max_field_align(&record.fields)?)
                },
                RecordKind::Union => self.union_tag_offset(&record.fields)? + word,
            },
        };

        Ok(res)
    }

    /// Variants share the storage at offset 0; the tag follows it.
    fn union_tag_offset(&mut self, variants: &[Field]) -> Result<i64, LayoutError> {
        let mut max = 0;
        for variant in variants {
            max = max.max(self.size_of(variant.ty)?);
        }
        Ok(align_formula(max, self.ctx.word_size))
    }

    fn offsets(&mut self, fields: &[Field], is_packed: bool) -> Result<Vec<i64>, LayoutError> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut curr = 0;
        for field in fields {
            if !is_packed {
                curr = align_formula(curr, self.align_of(field.ty)?);
            }
            offsets.push(curr);
            curr += self.size_of(field.ty)?;
        }
        Ok(offsets)
    }

    fn struct_size(&mut self, fields: &[Field], is_packed: bool) -> Result<i64, LayoutError> {
        let (last_offset, last) = match fields.last() {
            Some(last) => (*self.offsets(fields, is_packed)?.last().unwrap_or(&0), last),
            None => return Ok(0),
        };

        let end = last_offset + self.size_of(last.ty)?;
        let align = if is_packed { 1 } else { self.max_field_align(fields)? };
        Ok(align_formula(end, align))
    }
}

impl Types {
    /// Checks that `ty` has a finite layout.
    pub fn check_layout(&self, ctx: &BuildContext, ty: TypeId) -> Result<(), LayoutError> {
        let mut layout = Layout::new(self, ctx);
        layout.align_of(ty)?;
        layout.size_of(ty)?;
        Ok(())
    }

    /// Size in bytes. Types with an illegal cycle report size 0; the
    /// checker has already diagnosed them through [`check_layout`].
    ///
    /// [`check_layout`]: Types::check_layout
    pub fn size_of(&self, ctx: &BuildContext, ty: TypeId) -> i64 {
        Layout::new(self, ctx).size_of(ty).unwrap_or(0)
    }

    pub fn align_of(&self, ctx: &BuildContext, ty: TypeId) -> i64 {
        Layout::new(self, ctx).align_of(ty).unwrap_or(1)
    }

    /// Byte offsets of every field of a struct, raw union, union or tuple.
    pub fn offsets_of(&self, ctx: &BuildContext, ty: TypeId) -> Vec<i64> {
        let mut layout = Layout::new(self, ctx);
        let base = self.base_type(ty);

        let res = match self.get(base) {
            Type::Tuple(fields) => layout.offsets(fields, false),
            Type::Record(record) => match record.kind {
                RecordKind::Struct => layout.offsets(&record.fields, record.is_packed),
                RecordKind::RawUnion | RecordKind::Union | RecordKind::Enum => Ok(vec![0; record.fields.len()]),
            },
            _ => Ok(Vec::new()),
        };

        res.unwrap_or_default()
    }

    pub fn offset_of(&self, ctx: &BuildContext, ty: TypeId, index: usize) -> i64 {
        let base = self.base_type(ty);
        match self.get(base) {
            Type::Basic(_) | Type::Slice(_) | Type::DynamicArray(_) => index as i64 * ctx.word_size,
            Type::Array { elem, .. } | Type::Vector { elem, .. } => {
                index as i64 * align_formula(self.size_of(ctx, *elem), self.align_of(ctx, *elem))
            },
            _ => self.offsets_of(ctx, ty).get(index).copied().unwrap_or(0),
        }
    }

    /// Offset of the field a selection path reaches, relative to the start
    /// of `ty`. Paths that go through a pointer have no static offset.
    pub fn offset_of_selection(&self, ctx: &BuildContext, ty: TypeId, index: &[usize]) -> Option<i64> {
        let mut curr = ty;
        let mut offset = 0;

        for &i in index {
            if self.is_pointer(curr) {
                return None;
            }

            offset += self.offset_of(ctx, curr, i);
            curr = match self.get(self.base_type(curr)) {
                Type::Record(record) => record.fields.get(i)?.ty,
                Type::Tuple(fields) => fields.get(i)?.ty,
                Type::Array { elem, .. } | Type::Vector { elem, .. } => *elem,
                _ => TypeId::INT,
            };
        }

        Some(offset)
    }

    /// Offset of the tag within a union value.
    pub fn union_tag_offset(&self, ctx: &BuildContext, ty: TypeId) -> i64 {
        match self.record(ty) {
            Some(record) if record.kind == RecordKind::Union => Layout::new(self, ctx)
                .union_tag_offset(&record.fields)
                .unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ty::Record, EntityId};

    #[test]
    fn word_sized_basics() {
        let types = Types::new();
        let ctx = BuildContext::default();
        assert_eq!(types.size_of(&ctx, TypeId::STRING), 16);
        assert_eq!(types.size_of(&ctx, TypeId::ANY), 16);
        assert_eq!(types.align_of(&ctx, TypeId::STRING), 8);

        let ctx32 = BuildContext::for_target("linux", "386").unwrap();
        assert_eq!(types.size_of(&ctx32, TypeId::INT), 4);
    }

    #[test]
    fn slices_are_three_words() {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let slice = types.make_slice(TypeId::U8);
        assert_eq!(types.size_of(&ctx, slice), 24);
    }

    #[test]
    fn struct_padding() {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let s = types.make_record(Record::new(
            RecordKind::Struct,
            vec![
                Field::new("a", TypeId::U8),
                Field::new("b", TypeId::I64),
                Field::new("c", TypeId::U8),
            ],
        ));
        assert_eq!(types.offsets_of(&ctx, s), vec![0, 8, 16]);
        assert_eq!(types.size_of(&ctx, s), 24);

        let mut packed = Record::new(
            RecordKind::Struct,
            vec![Field::new("a", TypeId::U8), Field::new("b", TypeId::I64)],
        );
        packed.is_packed = true;
        let packed = types.make_record(packed);
        assert_eq!(types.offsets_of(&ctx, packed), vec![0, 1]);
        assert_eq!(types.size_of(&ctx, packed), 9);
    }

    #[test]
    fn union_tag_follows_largest_variant() {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let u = types.make_record(Record::new(
            RecordKind::Union,
            vec![Field::new("A", TypeId::U8), Field::new("B", TypeId::STRING)],
        ));
        assert_eq!(types.union_tag_offset(&ctx, u), 16);
        assert_eq!(types.size_of(&ctx, u), 24);
    }

    #[test]
    fn cycle_by_value_is_detected() {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let a = types.make_named("A", None, Some(EntityId::new(0)));
        let b = types.make_named("B", None, Some(EntityId::new(1)));
        let a_body = types.make_record(Record::new(RecordKind::Struct, vec![Field::new("x", b)]));
        let b_body = types.make_record(Record::new(RecordKind::Struct, vec![Field::new("y", a)]));
        types.set_named_base(a, a_body);
        types.set_named_base(b, b_body);

        assert_eq!(types.check_layout(&ctx, a), Err(LayoutError::Cycle(vec![a, b, a])));
    }

    #[test]
    fn cycle_through_pointer_is_fine() {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let node = types.make_named("Node", None, Some(EntityId::new(0)));
        let next = types.make_pointer(node);
        let body = types.make_record(Record::new(
            RecordKind::Struct,
            vec![Field::new("value", TypeId::INT), Field::new("next", next)],
        ));
        types.set_named_base(node, body);

        assert_eq!(types.check_layout(&ctx, node), Ok(()));
        assert_eq!(types.size_of(&ctx, node), 16);
    }

    #[test]
    fn selection_offsets() {
        let mut types = Types::new();
        let ctx = BuildContext::default();
        let inner = types.make_record(Record::new(
            RecordKind::Struct,
            vec![Field::new("a", TypeId::I32), Field::new("b", TypeId::I32)],
        ));
        let outer = types.make_record(Record::new(
            RecordKind::Struct,
            vec![Field::new("x", TypeId::I64), Field::new("in", inner).anonymous()],
        ));
        assert_eq!(types.offset_of_selection(&ctx, outer, &[1, 1]), Some(12));
    }
}
