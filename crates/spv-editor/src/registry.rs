//! # Operation registry
//!
//! Derived side tables over the module: where each id is defined, which entry point declares
//! which function, resource bindings, debug names and imported instruction sets. All of them are
//! updated exclusively through [Registry::register] and [Registry::unregister], which are exact
//! inverses of each other.

use std::collections::BTreeMap;

use ahash::AHashMap;
use rspirv::spirv::{Decoration, Op, Word};
use smallvec::SmallVec;

use crate::{
    operation::{Id, Location, OperationRef},
    types::{TypeKey, TypeTables},
};

///Descriptor set and binding slot of a resource variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binding {
    pub set: u32,
    pub binding: u32,
}

impl Binding {
    ///Slot value of a resource without binding decoration.
    pub const UNBOUND: u32 = !0;

    pub fn new(set: u32, binding: u32) -> Self {
        Binding { set, binding }
    }

    pub fn is_bound(&self) -> bool {
        self.binding != Self::UNBOUND
    }
}

impl Default for Binding {
    fn default() -> Self {
        Binding {
            set: 0,
            binding: Self::UNBOUND,
        }
    }
}

///Key of a debug name: the named id, and the member index for `OpMemberName`.
pub type NameKey = (Id, Option<u32>);

///What an instruction contributes to the side tables.
enum OpCategory {
    ///`OpDecorate` with `DescriptorSet` or `Binding`.
    Binding {
        target: Id,
        decoration: Decoration,
        value: u32,
    },
    Name {
        key: NameKey,
        name: String,
    },
    ExtInstImport {
        id: Id,
        name: String,
    },
    EntryPoint {
        function: Id,
    },
    Struct {
        id: Id,
        members: SmallVec<[Id; 4]>,
    },
    Type {
        id: Id,
        key: TypeKey,
    },
    Other,
}

impl OpCategory {
    fn of(inst: &OperationRef, types: &TypeTables) -> Self {
        let Some(op) = inst.op() else {
            return OpCategory::Other;
        };

        match op {
            Op::Decorate => {
                let decoration = inst.operand(1).and_then(Decoration::from_u32);
                match (
                    inst.operand(0).and_then(Id::new),
                    decoration,
                    inst.operand(2),
                ) {
                    (
                        Some(target),
                        Some(decoration @ (Decoration::DescriptorSet | Decoration::Binding)),
                        Some(value),
                    ) => OpCategory::Binding {
                        target,
                        decoration,
                        value,
                    },
                    _ => OpCategory::Other,
                }
            }
            Op::Name => match (inst.operand(0).and_then(Id::new), inst.string_operand(1)) {
                (Some(id), Some(name)) => OpCategory::Name {
                    key: (id, None),
                    name,
                },
                _ => OpCategory::Other,
            },
            Op::MemberName => match (
                inst.operand(0).and_then(Id::new),
                inst.operand(1),
                inst.string_operand(2),
            ) {
                (Some(id), Some(member), Some(name)) => OpCategory::Name {
                    key: (id, Some(member)),
                    name,
                },
                _ => OpCategory::Other,
            },
            Op::ExtInstImport => match (inst.result_id(), inst.string_operand(1)) {
                (Some(id), Some(name)) => OpCategory::ExtInstImport { id, name },
                _ => OpCategory::Other,
            },
            Op::EntryPoint => match inst.operand(1).and_then(Id::new) {
                Some(function) => OpCategory::EntryPoint { function },
                None => OpCategory::Other,
            },
            Op::TypeStruct => match inst.result_id() {
                Some(id) => OpCategory::Struct {
                    id,
                    members: inst.operands()[1..]
                        .iter()
                        .filter_map(|w| Id::new(*w))
                        .collect(),
                },
                None => OpCategory::Other,
            },
            _ => match (inst.result_id(), types.decode(inst)) {
                (Some(id), Some(key)) => OpCategory::Type { id, key },
                _ => OpCategory::Other,
            },
        }
    }
}

///Every live registration of one key, ordered by word offset. Lookups use the first one, so the
/// answer does not depend on the order instructions were registered in.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Declarations<T>(SmallVec<[(usize, T); 1]>);

impl<T> Default for Declarations<T> {
    fn default() -> Self {
        Declarations(SmallVec::new())
    }
}

impl<T> Declarations<T> {
    fn insert(&mut self, offset: usize, value: T) {
        match self.0.binary_search_by_key(&offset, |(at, _)| *at) {
            Ok(index) => {
                log::warn!("Offset {} was registered twice", offset);
                self.0[index].1 = value;
            }
            Err(index) => self.0.insert(index, (offset, value)),
        }
    }

    fn remove(&mut self, offset: usize) {
        self.0.retain(|(at, _)| *at != offset);
    }

    fn first(&self) -> Option<&(usize, T)> {
        self.0.first()
    }

    fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.0.iter().map(|(_, value)| value)
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    ///Applies a splice of `delta` words at `offset`. Registrations inside a removed range are
    /// dropped. Shifting keeps the offsets ordered.
    fn relocate(&mut self, offset: usize, removed_end: usize, delta: isize) {
        self.0.retain(|(at, _)| {
            if *at < offset {
                true
            } else if *at < removed_end {
                log::warn!("Registration at {} was inside a removed range", at);
                false
            } else {
                *at = at.wrapping_add_signed(delta);
                true
            }
        });
    }
}

///`DescriptorSet` and `Binding` decorations of one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BindingDecorations {
    sets: Declarations<u32>,
    slots: Declarations<u32>,
}

impl BindingDecorations {
    fn binding(&self) -> Binding {
        let default = Binding::default();
        Binding {
            set: self.sets.first().map_or(default.set, |(_, v)| *v),
            binding: self.slots.first().map_or(default.binding, |(_, v)| *v),
        }
    }

    fn is_empty(&self) -> bool {
        self.sets.is_empty() && self.slots.is_empty()
    }
}

///Id and binding bookkeeping of a module. Type tables live next to it in [TypeTables].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    ///Word offset of each id's defining instruction.
    definitions: AHashMap<Id, usize>,
    ///`OpEntryPoint`s declaring each entry function. A function can be the entry point of
    /// several execution models.
    entries: AHashMap<Id, Declarations<()>>,
    bindings: BTreeMap<Id, BindingDecorations>,
    names: AHashMap<NameKey, Declarations<String>>,
    ext_inst_imports: AHashMap<String, Declarations<Id>>,
}

impl Registry {
    ///Adds `inst` to all tables it belongs to. `dedup_structs` controls whether struct
    /// declarations are recorded by member sequence.
    pub(crate) fn register(
        &mut self,
        inst: &OperationRef,
        types: &mut TypeTables,
        dedup_structs: bool,
    ) {
        let offset = inst.location().offset();
        if let Some(id) = inst.result_id() {
            if let Some(old) = self.definitions.insert(id, offset) {
                log::warn!("{} was defined twice, at {} and {}", id, old, offset);
            }
        }

        match OpCategory::of(inst, types) {
            OpCategory::Binding {
                target,
                decoration,
                value,
            } => {
                let decorations = self.bindings.entry(target).or_default();
                if decoration == Decoration::DescriptorSet {
                    decorations.sets.insert(offset, value);
                } else {
                    decorations.slots.insert(offset, value);
                }
            }
            OpCategory::Name { key, name } => {
                self.names.entry(key).or_default().insert(offset, name);
            }
            OpCategory::ExtInstImport { id, name } => {
                self.ext_inst_imports.entry(name).or_default().insert(offset, id);
            }
            OpCategory::EntryPoint { function } => {
                self.entries.entry(function).or_default().insert(offset, ());
            }
            OpCategory::Struct { id, members } => {
                if dedup_structs && !types.insert_struct(members, id) {
                    log::debug!("Struct {} duplicates an earlier struct", id);
                }
            }
            OpCategory::Type { id, key } => {
                if !types.insert(key, id) {
                    log::warn!("Type {} duplicates an earlier declaration", id);
                }
            }
            OpCategory::Other => {}
        }

        log::trace!("registered {:?} at {}", inst.op(), offset);
    }

    ///Removes `inst` from all tables it was added to by [Self::register].
    pub(crate) fn unregister(&mut self, inst: &OperationRef, types: &mut TypeTables) {
        let offset = inst.location().offset();
        if let Some(id) = inst.result_id() {
            if self.definitions.get(&id) == Some(&offset) {
                self.definitions.remove(&id);
            }
        }

        match OpCategory::of(inst, types) {
            OpCategory::Binding {
                target,
                decoration,
                ..
            } => {
                if let Some(decorations) = self.bindings.get_mut(&target) {
                    if decoration == Decoration::DescriptorSet {
                        decorations.sets.remove(offset);
                    } else {
                        decorations.slots.remove(offset);
                    }
                    if decorations.is_empty() {
                        self.bindings.remove(&target);
                    }
                }
            }
            OpCategory::Name { key, .. } => forget(&mut self.names, &key, offset),
            OpCategory::ExtInstImport { name, .. } => {
                forget(&mut self.ext_inst_imports, &name, offset)
            }
            OpCategory::EntryPoint { function } => forget(&mut self.entries, &function, offset),
            OpCategory::Struct { id, members } => {
                types.remove_struct(&members, id);
            }
            OpCategory::Type { id, .. } => {
                types.remove(id);
            }
            OpCategory::Other => {
                //the key of a type can only be decoded while its constituents are known
                if let Some(id) = inst.result_id() {
                    types.remove(id);
                }
            }
        }

        log::trace!("unregistered {:?} at {}", inst.op(), offset);
    }

    ///Moves every recorded offset at or after `offset` by `delta` words. Offsets within a removed
    /// range are dropped.
    pub(crate) fn relocate(&mut self, offset: usize, delta: isize) {
        let removed_end = if delta < 0 {
            offset + delta.unsigned_abs()
        } else {
            offset
        };

        self.definitions.retain(|id, at| {
            if *at < offset {
                true
            } else if *at < removed_end {
                log::warn!("{} was still registered inside a removed range", id);
                false
            } else {
                *at = at.wrapping_add_signed(delta);
                true
            }
        });

        fn shift_all<K, T>(
            map: &mut AHashMap<K, Declarations<T>>,
            offset: usize,
            removed_end: usize,
            delta: isize,
        ) {
            map.retain(|_, declarations| {
                declarations.relocate(offset, removed_end, delta);
                !declarations.is_empty()
            });
        }
        shift_all(&mut self.entries, offset, removed_end, delta);
        shift_all(&mut self.names, offset, removed_end, delta);
        shift_all(&mut self.ext_inst_imports, offset, removed_end, delta);
        self.bindings.retain(|_, decorations| {
            decorations.sets.relocate(offset, removed_end, delta);
            decorations.slots.relocate(offset, removed_end, delta);
            !decorations.is_empty()
        });
    }

    pub fn definition(&self, id: Id) -> Option<Location> {
        self.definitions.get(&id).map(|o| Location::new(*o))
    }

    ///First `OpEntryPoint` declaring `id`.
    pub fn entry(&self, id: Id) -> Option<Location> {
        self.entries
            .get(&id)
            .and_then(Declarations::first)
            .map(|(at, _)| Location::new(*at))
    }

    ///Binding of `id`. Repeated decorations resolve to the first one in the module.
    pub fn binding(&self, id: Id) -> Binding {
        self.bindings
            .get(&id)
            .map(BindingDecorations::binding)
            .unwrap_or_default()
    }

    ///Every resource decorated with both a descriptor set and a binding slot.
    pub fn bindings(&self) -> impl Iterator<Item = (Id, Binding)> + '_ {
        self.bindings
            .iter()
            .filter(|(_, d)| !d.sets.is_empty() && !d.slots.is_empty())
            .map(|(id, d)| (*id, d.binding()))
    }

    pub fn name(&self, key: NameKey) -> Option<&str> {
        self.names
            .get(&key)
            .and_then(Declarations::first)
            .map(|(_, name)| name.as_str())
    }

    ///Lowest id with any `OpName` equal to `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Id> {
        self.names
            .iter()
            .filter(|((_, member), names)| {
                member.is_none() && names.values().any(|n| n.as_str() == name)
            })
            .map(|((id, _), _)| *id)
            .min()
    }

    pub fn ext_inst_import(&self, name: &str) -> Option<Id> {
        self.ext_inst_imports
            .get(name)
            .and_then(Declarations::first)
            .map(|(_, id)| *id)
    }

    pub(crate) fn highest_id(&self) -> Option<Word> {
        self.definitions.keys().map(|id| id.value()).max()
    }
}

///Drops the registration at `offset` of `key`, and the key once nothing is left.
fn forget<K, Q, T>(map: &mut AHashMap<K, Declarations<T>>, key: &Q, offset: usize)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    if let Some(declarations) = map.get_mut(key) {
        declarations.remove(offset);
        if declarations.is_empty() {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use rspirv::spirv::{ExecutionModel, StorageClass};

    fn id(v: u32) -> Id {
        Id::new(v).unwrap()
    }

    fn as_ref<'a>(words: &'a [Word], offset: usize) -> OperationRef<'a> {
        OperationRef::new(Location::new(offset), words)
    }

    #[test]
    fn bindings_need_both_decorations_to_be_bound() {
        let mut registry = Registry::default();
        let mut types = TypeTables::default();

        let set = Operation::decorate(id(9), Decoration::DescriptorSet, [1]).to_words();
        let binding = Operation::decorate(id(9), Decoration::Binding, [4]).to_words();

        registry.register(&as_ref(&set, 10), &mut types, false);
        assert!(!registry.binding(id(9)).is_bound());
        registry.register(&as_ref(&binding, 14), &mut types, false);
        assert_eq!(registry.binding(id(9)), Binding::new(1, 4));

        let before = registry.clone();
        registry.unregister(&as_ref(&binding, 14), &mut types);
        assert_eq!(registry.binding(id(9)), Binding::new(1, Binding::UNBOUND));
        registry.register(&as_ref(&binding, 14), &mut types, false);
        assert_eq!(registry, before);

        registry.unregister(&as_ref(&binding, 14), &mut types);
        registry.unregister(&as_ref(&set, 10), &mut types);
        assert_eq!(registry, Registry::default());
    }

    #[test]
    fn relocation_moves_later_definitions() {
        let mut registry = Registry::default();
        let mut types = TypeTables::default();

        let a = Operation::variable(id(1), id(2), StorageClass::Private, None).to_words();
        let b = Operation::variable(id(1), id(3), StorageClass::Private, None).to_words();
        registry.register(&as_ref(&a, 20), &mut types, false);
        registry.register(&as_ref(&b, 24), &mut types, false);

        registry.relocate(24, 3);
        assert_eq!(registry.definition(id(2)), Some(Location::new(20)));
        assert_eq!(registry.definition(id(3)), Some(Location::new(27)));

        registry.relocate(20, -4);
        assert_eq!(registry.definition(id(2)), None);
        assert_eq!(registry.definition(id(3)), Some(Location::new(23)));
    }

    #[test]
    fn names_and_members() {
        let mut registry = Registry::default();
        let mut types = TypeTables::default();
        let name = Operation::name(id(5), "Globals").to_words();
        let member = Operation::member_name(id(5), 1, "time").to_words();
        registry.register(&as_ref(&name, 30), &mut types, false);
        registry.register(&as_ref(&member, 35), &mut types, false);

        assert_eq!(registry.name((id(5), None)), Some("Globals"));
        assert_eq!(registry.name((id(5), Some(1))), Some("time"));
        assert_eq!(registry.find_by_name("Globals"), Some(id(5)));
        assert_eq!(registry.find_by_name("time"), None);
    }

    ///Unregisters and re-registers each instruction, checking the tables are unchanged.
    fn assert_round_trips(
        registry: &mut Registry,
        types: &mut TypeTables,
        insts: &[(&[Word], usize)],
    ) {
        let before = registry.clone();
        for (words, offset) in insts {
            registry.unregister(&as_ref(words, *offset), types);
            registry.register(&as_ref(words, *offset), types, false);
            assert_eq!(*registry, before, "tables changed at {}", offset);
        }
    }

    #[test]
    fn repeated_names_and_entry_points() {
        let mut registry = Registry::default();
        let mut types = TypeTables::default();
        let first = Operation::name(id(5), "first").to_words();
        let second = Operation::name(id(5), "second").to_words();
        let compute =
            Operation::entry_point(ExecutionModel::GLCompute, id(7), "main", []).to_words();
        let fragment =
            Operation::entry_point(ExecutionModel::Fragment, id(7), "main", []).to_words();

        //registration order must not matter
        registry.register(&as_ref(&second, 40), &mut types, false);
        registry.register(&as_ref(&first, 36), &mut types, false);
        registry.register(&as_ref(&fragment, 20), &mut types, false);
        registry.register(&as_ref(&compute, 10), &mut types, false);
        assert_eq!(registry.name((id(5), None)), Some("first"));
        assert_eq!(registry.find_by_name("second"), Some(id(5)));
        assert_eq!(registry.entry(id(7)), Some(Location::new(10)));

        assert_round_trips(
            &mut registry,
            &mut types,
            &[
                (first.as_slice(), 36),
                (second.as_slice(), 40),
                (compute.as_slice(), 10),
                (fragment.as_slice(), 20),
            ],
        );

        //the remaining declaration takes over
        registry.unregister(&as_ref(&compute, 10), &mut types);
        assert_eq!(registry.entry(id(7)), Some(Location::new(20)));
        registry.unregister(&as_ref(&first, 36), &mut types);
        assert_eq!(registry.name((id(5), None)), Some("second"));

        registry.relocate(15, 2);
        assert_eq!(registry.entry(id(7)), Some(Location::new(22)));
        registry.unregister(&as_ref(&fragment, 22), &mut types);
        registry.unregister(&as_ref(&second, 42), &mut types);
        assert_eq!(registry, Registry::default());
    }

    #[test]
    fn repeated_binding_decorations() {
        let mut registry = Registry::default();
        let mut types = TypeTables::default();
        let set_a = Operation::decorate(id(9), Decoration::DescriptorSet, [1]).to_words();
        let set_b = Operation::decorate(id(9), Decoration::DescriptorSet, [2]).to_words();
        let slot = Operation::decorate(id(9), Decoration::Binding, [4]).to_words();

        registry.register(&as_ref(&set_b, 14), &mut types, false);
        registry.register(&as_ref(&set_a, 10), &mut types, false);
        registry.register(&as_ref(&slot, 18), &mut types, false);
        assert_eq!(registry.binding(id(9)), Binding::new(1, 4));

        assert_round_trips(
            &mut registry,
            &mut types,
            &[
                (set_a.as_slice(), 10),
                (set_b.as_slice(), 14),
                (slot.as_slice(), 18),
            ],
        );

        registry.unregister(&as_ref(&set_a, 10), &mut types);
        assert_eq!(registry.binding(id(9)), Binding::new(2, 4));
    }

    #[test]
    fn half_bound_resources_are_not_enumerated() {
        let mut registry = Registry::default();
        let mut types = TypeTables::default();
        let set_only = Operation::decorate(id(3), Decoration::DescriptorSet, [0]).to_words();
        let slot_only = Operation::decorate(id(4), Decoration::Binding, [1]).to_words();
        let set = Operation::decorate(id(5), Decoration::DescriptorSet, [2]).to_words();
        let slot = Operation::decorate(id(5), Decoration::Binding, [3]).to_words();
        for (words, offset) in [(&set_only, 10), (&slot_only, 14), (&set, 18), (&slot, 22)] {
            registry.register(&as_ref(words, offset), &mut types, false);
        }

        let bound: Vec<_> = registry.bindings().collect();
        assert_eq!(bound, vec![(id(5), Binding::new(2, 3))]);
        assert_eq!(registry.binding(id(4)), Binding::new(0, 1));
    }
}
