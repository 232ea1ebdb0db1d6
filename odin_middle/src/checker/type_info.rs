//! The `type_info` table: one slot per distinct type the program can ask
//! about at run time.

use odin_types::{BasicKind, RecordKind, Type, TypeId};

use super::{Checker, CheckerInfo};

impl<'a> CheckerInfo<'a> {
    /// The table slot of `ty`. Types that were never registered under
    /// their own id share the slot of an identical registered type.
    pub fn type_info_index(&self, ty: TypeId) -> Option<usize> {
        if let Some(&index) = self.type_info_map.get(&ty) {
            return Some(index);
        }

        let types = &self.arena.types;
        self.type_info_map
            .iter()
            .find(|(&other, _)| types.are_types_identical(other, ty))
            .map(|(_, &index)| index)
    }
}

impl<'a> Checker<'a> {
    /// Registers `ty` and every type its table entry points at.
    pub(super) fn add_type_info_type(&mut self, ty: TypeId) {
        let ty = self.types().default_type(ty);
        if ty == TypeId::INVALID || self.types().is_untyped(ty) {
            return;
        }
        if self.info.type_info_map.contains_key(&ty) {
            return;
        }

        let index = match self.info.type_info_index(ty) {
            Some(index) => index,
            None => {
                let index = self.info.type_info_count;
                self.info.type_info_count += 1;
                index
            },
        };
        self.info.type_info_map.insert(ty, index);

        let base = self.types().base_type(ty);
        let mut deps = Vec::new();
        let mut pointees = Vec::new();

        if base != ty {
            deps.push(base);
        }

        match self.types().get(base) {
            Type::Basic(BasicKind::String) => {
                pointees.push(TypeId::U8);
                deps.push(TypeId::INT);
            },
            Type::Basic(BasicKind::Any) => {
                pointees.extend(self.types().well_known.type_info);
                deps.push(TypeId::RAWPTR);
            },
            Type::Basic(_) | Type::Named(_) => {},
            Type::Pointer(elem) => deps.push(*elem),
            Type::Array { elem, .. } | Type::Slice(elem) | Type::DynamicArray(elem) => {
                deps.push(*elem);
                pointees.push(*elem);
                deps.push(TypeId::INT);
            },
            Type::Vector { elem, .. } => deps.push(*elem),
            Type::Record(record) => {
                deps.extend(record.enum_base);
                if record.kind == RecordKind::Union {
                    deps.push(TypeId::INT);
                }
                deps.extend(record.fields.iter().map(|f| f.ty));
            },
            Type::Tuple(fields) => deps.extend(fields.iter().map(|f| f.ty)),
            Type::Proc(proc_type) => {
                deps.push(proc_type.params);
                deps.push(proc_type.results);
            },
        }

        for elem in pointees {
            let ptr = self.types_mut().make_pointer(elem);
            deps.push(ptr);
        }
        for dep in deps {
            self.add_type_info_type(dep);
        }
    }
}
