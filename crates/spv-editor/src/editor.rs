//! # In-place module editor
//!
//! The [Editor] borrows a module's word buffer for the duration of one editing session and keeps
//! every derived table (section ranges, id locations, type tables, bindings, names) consistent
//! with the words while instructions are inserted, modified and removed.
//!
//! All edits go through four primitives:
//!
//! - [Editor::insert]: splices a new instruction into the buffer and registers it.
//! - [Editor::begin_modify] / [Editor::end_modify]: bracket an in-place operand edit.
//! - [Editor::remove]: unregisters an instruction and overwrites it with `OpNop`s.
//! - [Editor::create_empty]: starts a module from nothing.
//!
//! Every word-count change is routed through one relocation routine which moves section
//! boundaries and recorded locations. Nothing else adjusts offsets.
//!
//! Misusing the editor (declaring a type before its constituents, touching operands outside a
//! modify bracket, removing an instruction twice ...) is a contract violation. The violating call
//! returns an error and the session is aborted: every later edit fails with
//! [EditorError::Aborted].

use rspirv::spirv::{Capability, Decoration, Op, StorageClass, Word, MAGIC_NUMBER};
use smallvec::SmallVec;

use crate::{
    operation::{instruction_header, Id, Location, Operation, OperationList, OperationRef},
    processor::{InstructionIter, Processor, BOUND_WORD, HEADER_WORDS},
    registry::{Binding, Registry},
    section::{Section, SectionTable},
    types::{ImmediateValue, MissingType, TypeCategory, TypeKey, TypeTables},
    EditorError,
};

///Extension that allows the `StorageBuffer` storage class before SPIR-V 1.3.
const STORAGE_BUFFER_EXTENSION: &str = "SPV_KHR_storage_buffer_storage_class";

///Word an instruction removed by [Editor::remove] is overwritten with.
const NOP_WORD: Word = instruction_header(1, Op::Nop as u16);

///Whether structurally identical struct declarations share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructDedup {
    ///Every [Editor::declare_struct_type] call declares a new struct. Identical member lists can
    /// still carry different meaning (names, layout decorations) in the source.
    #[default]
    Never,
    ///Structs with the same member id sequence are declared once.
    ByMembers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorConfig {
    ///Generator magic written into modules created by [Editor::create_empty].
    pub generator: Word,
    pub struct_dedup: StructDedup,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            generator: 0,
            struct_dedup: StructDedup::Never,
        }
    }
}

///Editing session over one SPIR-V module.
pub struct Editor<'a> {
    spirv: &'a mut Vec<Word>,
    config: EditorConfig,
    version: (u8, u8),
    bound: Word,
    sections: SectionTable,
    registry: Registry,
    types: TypeTables,
    storage_buffer_class: StorageClass,
    ///Location and word count of the instruction inside an open modify bracket.
    modifying: Option<(Location, usize)>,
    aborted: bool,
}

impl<'a> Editor<'a> {
    ///Opens an editing session on an existing module. Parses the module and registers every
    /// instruction that is already present, so declarations made later reuse existing types.
    pub fn prepare(spirv: &'a mut Vec<Word>, config: EditorConfig) -> Result<Self, EditorError> {
        let layout = Processor::parse(spirv)?;

        let mut editor = Editor {
            spirv,
            config,
            version: layout.version,
            bound: layout.bound.max(1),
            sections: layout.sections,
            registry: Registry::default(),
            types: TypeTables::default(),
            storage_buffer_class: StorageClass::Uniform,
            modifying: None,
            aborted: false,
        };

        let dedup_structs = editor.dedup_structs();
        for section in Section::ALL {
            let range = editor.sections.range(section);
            for inst in InstructionIter::new(editor.spirv.as_slice(), range) {
                editor
                    .registry
                    .register(&inst, &mut editor.types, dedup_structs);
            }
        }

        if let Some(highest) = editor.registry.highest_id() {
            if highest >= editor.bound {
                log::warn!(
                    "Module bound {} is lower than its highest id {}, raising",
                    editor.bound,
                    highest
                );
                editor.bound = highest.checked_add(1).ok_or(EditorError::IdsExhausted)?;
            }
        }
        editor.spirv[BOUND_WORD] = editor.bound;

        if editor.version >= (1, 3) || editor.has_extension(STORAGE_BUFFER_EXTENSION) {
            editor.storage_buffer_class = StorageClass::StorageBuffer;
        }

        log::debug!(
            "Prepared SPIR-V {}.{} module with {} words, bound {}",
            editor.version.0,
            editor.version.1,
            editor.spirv.len(),
            editor.bound
        );
        Ok(editor)
    }

    ///Starts a new module in `spirv`, replacing whatever it contained. The module consists of
    /// only a header; all sections are empty.
    pub fn create_empty(
        spirv: &'a mut Vec<Word>,
        major: u8,
        minor: u8,
        config: EditorConfig,
    ) -> Self {
        if !spirv.is_empty() {
            log::info!("Discarding {} words to create an empty module", spirv.len());
        }
        spirv.clear();
        spirv.extend_from_slice(&[
            MAGIC_NUMBER,
            ((major as u32) << 16) | ((minor as u32) << 8),
            config.generator,
            1,
            0,
        ]);

        Editor {
            spirv,
            config,
            version: (major, minor),
            bound: 1,
            sections: SectionTable::empty(HEADER_WORDS),
            registry: Registry::default(),
            types: TypeTables::default(),
            storage_buffer_class: if (major, minor) >= (1, 3) {
                StorageClass::StorageBuffer
            } else {
                StorageClass::Uniform
            },
            modifying: None,
            aborted: false,
        }
    }

    fn dedup_structs(&self) -> bool {
        self.config.struct_dedup == StructDedup::ByMembers
    }

    fn ensure_live(&self) -> Result<(), EditorError> {
        if self.aborted {
            Err(EditorError::Aborted)
        } else {
            Ok(())
        }
    }

    ///Records a contract violation and aborts the session.
    fn violation(&mut self, err: EditorError) -> EditorError {
        log::error!("Aborting edit session: {}", err);
        self.aborted = true;
        err
    }

    ///Fails if an edit that moves words is attempted while a modify bracket is open.
    fn ensure_no_pending_modify(&mut self) -> Result<(), EditorError> {
        self.ensure_live()?;
        if let Some((at, _)) = self.modifying {
            return Err(self.violation(EditorError::ModifyPending(at.offset())));
        }
        Ok(())
    }

    pub fn words(&self) -> &[Word] {
        self.spirv.as_slice()
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    ///Current identifier bound. Every id in the module is smaller.
    pub fn bound(&self) -> Word {
        self.bound
    }

    pub fn sections(&self) -> &SectionTable {
        &self.sections
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    ///Storage class to use for storage buffers in this module.
    pub fn storage_buffer_class(&self) -> StorageClass {
        self.storage_buffer_class
    }

    ///Allocates a fresh identifier and raises the module's bound.
    pub fn new_id(&mut self) -> Result<Id, EditorError> {
        self.ensure_live()?;
        let id = Id(self.bound);
        self.raise_bound(id)?;
        Ok(id)
    }

    ///Raises the bound above `id`. Fails once the id space is used up.
    fn raise_bound(&mut self, id: Id) -> Result<(), EditorError> {
        match id.value().checked_add(1) {
            Some(bound) => {
                self.bound = self.bound.max(bound);
                self.spirv[BOUND_WORD] = self.bound;
                Ok(())
            }
            None => Err(self.violation(EditorError::IdsExhausted)),
        }
    }

    ///Inserts `delta` zero words at `offset` (or removes `-delta` words there), growing `section`.
    /// This is the only place that moves words, section boundaries and recorded locations.
    fn splice(&mut self, section: Section, offset: usize, delta: isize) {
        if delta >= 0 {
            let tail = self.spirv.split_off(offset);
            self.spirv.resize(offset + delta as usize, 0);
            self.spirv.extend(tail);
        } else {
            self.spirv.drain(offset..offset + delta.unsigned_abs());
        }
        self.sections.shift(section, delta);
        self.registry.relocate(offset, delta);
        log::trace!(
            "spliced {} words at {} into {:?}",
            delta,
            offset,
            section
        );
    }

    fn read(words: &[Word], at: Location) -> Result<OperationRef<'_>, EditorError> {
        let offset = at.offset();
        if offset < HEADER_WORDS || offset >= words.len() {
            return Err(EditorError::InvalidLocation(offset));
        }
        let word_count = (words[offset] >> 16) as usize;
        if word_count == 0 || offset + word_count > words.len() {
            return Err(EditorError::InvalidLocation(offset));
        }
        Ok(OperationRef::new(at, &words[offset..offset + word_count]))
    }

    ///Reads the instruction at `at`.
    pub fn operation(&self, at: Location) -> Result<OperationRef<'_>, EditorError> {
        Self::read(self.spirv.as_slice(), at)
    }

    ///Looks `at` up and reports invalid locations as contract violations.
    fn checked_read(&mut self, at: Location) -> Result<(), EditorError> {
        match Self::read(self.spirv.as_slice(), at) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.violation(e)),
        }
    }

    fn register(&mut self, at: Location) -> Result<(), EditorError> {
        let dedup_structs = self.dedup_structs();
        let inst = Self::read(self.spirv.as_slice(), at)?;
        self.registry
            .register(&inst, &mut self.types, dedup_structs);
        Ok(())
    }

    fn unregister(&mut self, at: Location) -> Result<(), EditorError> {
        let inst = Self::read(self.spirv.as_slice(), at)?;
        self.registry.unregister(&inst, &mut self.types);
        Ok(())
    }

    ///Iterates the instructions of one section.
    pub fn iter(&self, section: Section) -> InstructionIter<'_> {
        InstructionIter::new(self.spirv.as_slice(), self.sections.range(section))
    }

    pub fn section_begin(&self, section: Section) -> Location {
        Location::new(self.sections.range(section).start)
    }

    pub fn section_end(&self, section: Section) -> Location {
        Location::new(self.sections.range(section).end)
    }

    ///Location of the instruction defining `id`. For entry points this is the `OpFunction`, see
    /// [Self::locate_entry_declaration] for the `OpEntryPoint`.
    pub fn locate(&self, id: Id) -> Option<Location> {
        self.registry.definition(id)
    }

    ///Location of the `OpEntryPoint` declaring the function `id` as entry point.
    pub fn locate_entry_declaration(&self, id: Id) -> Option<Location> {
        self.registry.entry(id)
    }

    ///Decides the section `op` inserted at `offset` belongs to.
    fn placement(&self, op: Op, offset: usize) -> Option<Section> {
        match Section::of(op) {
            Some(section) => Some(section).filter(|s| self.sections.range(*s).accepts(offset)),
            None => {
                if matches!(op, Op::Variable | Op::Undef)
                    && self.sections.range(Section::Types).accepts(offset)
                {
                    return Some(Section::Types);
                }

                self.sections.containing(offset).or_else(|| {
                    Section::ALL
                        .iter()
                        .rev()
                        .copied()
                        .find(|s| self.sections.range(*s).accepts(offset))
                })
            }
        }
    }

    ///Inserts `op` in front of the instruction at `at` (or at the end of a section when `at` is a
    /// section end). Returns the id `op` defines, if any.
    pub fn insert(&mut self, at: Location, op: Operation) -> Result<Option<Id>, EditorError> {
        self.ensure_no_pending_modify()?;
        match self.placement(op.op(), at.offset()) {
            Some(section) => self.insert_into(section, at.offset(), op),
            None => Err(self.violation(EditorError::Misplaced {
                op: op.op(),
                offset: at.offset(),
            })),
        }
    }

    fn insert_into(
        &mut self,
        section: Section,
        offset: usize,
        op: Operation,
    ) -> Result<Option<Id>, EditorError> {
        self.ensure_no_pending_modify()?;
        let word_count = op.word_count();
        if word_count > u16::MAX as usize {
            return Err(self.violation(EditorError::OperationTooLong(word_count)));
        }

        if let Some(id) = op.result_id() {
            if id.value() >= self.bound {
                log::warn!("{} was not allocated by this editor, raising bound", id);
                self.raise_bound(id)?;
            }
        }

        self.splice(section, offset, word_count as isize);
        op.encode_into(&mut self.spirv[offset..offset + word_count]);
        self.register(Location::new(offset))?;

        Ok(op.result_id())
    }

    fn append(&mut self, section: Section, op: Operation) -> Result<Option<Id>, EditorError> {
        let end = self.sections.range(section).end;
        self.insert_into(section, end, op)
    }

    ///Opens a modify bracket: the instruction at `at` is removed from all side tables until
    /// [Self::end_modify] is called. Its word count must not change in between.
    pub fn begin_modify(&mut self, at: Location) -> Result<(), EditorError> {
        self.ensure_no_pending_modify()?;
        self.checked_read(at)?;
        let word_count = Self::read(self.spirv.as_slice(), at)?.word_count();
        self.unregister(at)?;
        self.modifying = Some((at, word_count));
        Ok(())
    }

    ///Operand words of the instruction inside the currently open modify bracket.
    pub fn operands_mut(&mut self, at: Location) -> Result<&mut [Word], EditorError> {
        self.ensure_live()?;
        match self.modifying {
            Some((open, word_count)) if open == at => {
                let offset = at.offset();
                Ok(&mut self.spirv[offset + 1..offset + word_count])
            }
            _ => Err(self.violation(EditorError::UnbracketedModify(at.offset()))),
        }
    }

    ///Closes the modify bracket opened at `at` and registers the updated instruction.
    pub fn end_modify(&mut self, at: Location) -> Result<(), EditorError> {
        self.ensure_live()?;
        match self.modifying {
            Some((open, _)) if open == at => {
                self.modifying = None;
                self.register(at)
            }
            _ => Err(self.violation(EditorError::UnbracketedModify(at.offset()))),
        }
    }

    ///Runs `f` on the operands of the instruction at `at` inside a modify bracket.
    pub fn modify(
        &mut self,
        at: Location,
        f: impl FnOnce(&mut [Word]),
    ) -> Result<(), EditorError> {
        self.begin_modify(at)?;
        f(self.operands_mut(at)?);
        self.end_modify(at)
    }

    ///Removes the instruction at `at` by overwriting it with `OpNop`s. No other instruction moves.
    pub fn remove(&mut self, at: Location) -> Result<(), EditorError> {
        self.ensure_no_pending_modify()?;
        self.checked_read(at)?;
        let word_count = Self::read(self.spirv.as_slice(), at)?.word_count();
        if self.spirv[at.offset()] == NOP_WORD {
            return Err(self.violation(EditorError::AlreadyRemoved(at.offset())));
        }

        self.unregister(at)?;
        for word in &mut self.spirv[at.offset()..at.offset() + word_count] {
            *word = NOP_WORD;
        }
        log::trace!("removed {} words at {}", word_count, at.offset());
        Ok(())
    }

    ///Replaces the instruction at `at` with `op`, which may have a different length. Locations
    /// after `at` move by the length difference.
    pub fn replace(&mut self, at: Location, op: Operation) -> Result<Option<Id>, EditorError> {
        self.ensure_no_pending_modify()?;
        self.checked_read(at)?;
        let offset = at.offset();
        let section = match self.sections.containing(offset) {
            Some(section) if Section::of(op.op()).map_or(true, |s| s == section) => section,
            _ => {
                return Err(self.violation(EditorError::Misplaced {
                    op: op.op(),
                    offset,
                }))
            }
        };
        let new_count = op.word_count();
        if new_count > u16::MAX as usize {
            return Err(self.violation(EditorError::OperationTooLong(new_count)));
        }

        let old_count = Self::read(self.spirv.as_slice(), at)?.word_count();
        self.unregister(at)?;
        if new_count > old_count {
            self.splice(
                section,
                offset + old_count,
                (new_count - old_count) as isize,
            );
        } else if new_count < old_count {
            self.splice(
                section,
                offset + new_count,
                -((old_count - new_count) as isize),
            );
        }
        op.encode_into(&mut self.spirv[offset..offset + new_count]);
        self.register(at)?;
        Ok(op.result_id())
    }

    ///Returns the id of the type described by `key`, declaring it at the end of the types
    /// section if it does not exist yet. Constituent types must be declared beforehand.
    pub fn declare_type(&mut self, key: impl Into<TypeKey>) -> Result<Id, EditorError> {
        let key = key.into();
        if let Some(id) = self.types.get(&key) {
            return Ok(id);
        }
        self.ensure_no_pending_modify()?;

        let referenced: SmallVec<[Id; 4]> = match &key {
            TypeKey::Pointer(p) => smallvec::smallvec![p.base],
            TypeKey::SampledImage(s) => smallvec::smallvec![s.image],
            TypeKey::Function(f) => std::iter::once(f.return_type)
                .chain(f.arguments.iter().copied())
                .collect(),
            _ => SmallVec::new(),
        };
        if let Some(missing) = referenced.iter().find(|id| self.locate(**id).is_none()) {
            let missing = MissingType::Id(*missing);
            return Err(self.violation(EditorError::MissingDependency { key, missing }));
        }

        let mut declaration = match self.types.declaration(&key, Id(self.bound)) {
            Ok(declaration) => declaration,
            Err(missing) => {
                return Err(self.violation(EditorError::MissingDependency { key, missing }))
            }
        };
        let id = self.new_id()?;
        declaration.set_result_id(id);
        self.append(Section::Types, declaration)?;
        debug_assert_eq!(self.types.get(&key), Some(id));

        log::debug!("Declared {:?} as {}", key, id);
        Ok(id)
    }

    ///Id of the type described by `key`, if it was declared.
    pub fn get_type(&self, key: impl Into<TypeKey>) -> Option<Id> {
        self.types.get(&key.into())
    }

    ///Key a type id was declared with.
    pub fn type_key(&self, id: Id) -> Option<&TypeKey> {
        self.types.key_of(id)
    }

    ///All declared types of one category, in key order.
    pub fn declared_types(&self, category: TypeCategory) -> Vec<(TypeKey, Id)> {
        self.types.entries(category)
    }

    ///Declares a struct of the given members. Depending on [EditorConfig::struct_dedup] this
    /// always creates a new struct, or reuses one with the same members.
    pub fn declare_struct_type(&mut self, members: &[Id]) -> Result<Id, EditorError> {
        if self.dedup_structs() {
            if let Some(id) = self.types.get_struct(members) {
                return Ok(id);
            }
        }
        self.ensure_no_pending_modify()?;
        if let Some(missing) = members.iter().find(|id| self.locate(**id).is_none()) {
            return Err(self.violation(EditorError::UndeclaredMember(*missing)));
        }

        let id = self.new_id()?;
        let mut op = Operation::new(Op::TypeStruct, [id.value()]);
        op.operands_mut()
            .extend(members.iter().map(|m| m.value()));
        self.append(Section::Types, op)?;

        log::debug!("Declared struct {} with {} members", id, members.len());
        Ok(id)
    }

    ///Declares a new constant holding `value`. Its scalar type is declared if needed, but the
    /// constant itself is never deduplicated.
    pub fn add_constant_immediate<T: ImmediateValue>(&mut self, value: T) -> Result<Id, EditorError> {
        let type_id = self.declare_type(T::scalar())?;
        let id = self.new_id()?;
        self.add_constant(Operation::constant(type_id, id, value.to_words()))
    }

    ///Declares a specialization constant with default `value`, decorated with `spec_id` so it can
    /// be overridden when the pipeline is built.
    pub fn add_spec_constant_immediate<T: ImmediateValue>(
        &mut self,
        value: T,
        spec_id: u32,
    ) -> Result<Id, EditorError> {
        let type_id = self.declare_type(T::scalar())?;
        let id = self.new_id()?;
        let mut op = Operation::new(Op::SpecConstant, [type_id.value(), id.value()]);
        op.operands_mut().extend(value.to_words());

        let id = self.add_constant(op)?;
        self.add_decoration(Operation::decorate(id, Decoration::SpecId, [spec_id]))?;
        Ok(id)
    }

    ///Appends an operation to the types section and returns the id it defines.
    fn append_defining(&mut self, section: Section, op: Operation) -> Result<Id, EditorError> {
        let opcode = op.op();
        match self.append(section, op)? {
            Some(id) => Ok(id),
            None => Err(self.violation(EditorError::NoResultId(opcode))),
        }
    }

    fn check_section(&mut self, op: &Operation, section: Section) -> Result<(), EditorError> {
        if Section::of(op.op()).map_or(true, |s| s == section) {
            Ok(())
        } else {
            let end = self.sections.range(section).end;
            Err(self.violation(EditorError::Misplaced {
                op: op.op(),
                offset: end,
            }))
        }
    }

    pub fn add_type(&mut self, op: Operation) -> Result<Id, EditorError> {
        self.check_section(&op, Section::Types)?;
        self.append_defining(Section::Types, op)
    }

    pub fn add_constant(&mut self, op: Operation) -> Result<Id, EditorError> {
        self.check_section(&op, Section::Types)?;
        self.append_defining(Section::Types, op)
    }

    ///Adds a global variable.
    pub fn add_variable(&mut self, op: Operation) -> Result<Id, EditorError> {
        if op.op() != Op::Variable {
            let end = self.sections.range(Section::Types).end;
            return Err(self.violation(EditorError::Misplaced {
                op: op.op(),
                offset: end,
            }));
        }
        self.append_defining(Section::Types, op)
    }

    pub fn add_capability(&mut self, capability: Capability) -> Result<(), EditorError> {
        self.append(Section::Capabilities, Operation::capability(capability))?;
        Ok(())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.iter(Section::Capabilities)
            .any(|inst| inst.op() == Some(Op::Capability) && inst.operand(0) == Some(capability as Word))
    }

    pub fn add_extension(&mut self, name: &str) -> Result<(), EditorError> {
        self.append(Section::Extensions, Operation::extension(name))?;
        Ok(())
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.iter(Section::Extensions).any(|inst| {
            inst.op() == Some(Op::Extension) && inst.string_operand(0).as_deref() == Some(name)
        })
    }

    ///Imports an extended instruction set. Importing the same set twice yields the same id.
    pub fn import_ext_inst(&mut self, name: &str) -> Result<Id, EditorError> {
        if let Some(id) = self.registry.ext_inst_import(name) {
            return Ok(id);
        }
        self.ensure_no_pending_modify()?;
        let id = self.new_id()?;
        self.append_defining(Section::ExtInstImports, Operation::ext_inst_import(id, name))
    }

    pub fn add_execution_mode(&mut self, op: Operation) -> Result<(), EditorError> {
        self.check_section(&op, Section::ExecutionModes)?;
        self.append(Section::ExecutionModes, op)?;
        Ok(())
    }

    pub fn add_decoration(&mut self, op: Operation) -> Result<(), EditorError> {
        self.check_section(&op, Section::Annotations)?;
        self.append(Section::Annotations, op)?;
        Ok(())
    }

    ///Decorates a struct as storage buffer block, `Block` when the module has the `StorageBuffer`
    /// class and `BufferBlock` otherwise.
    pub fn decorate_storage_buffer_struct(&mut self, id: Id) -> Result<(), EditorError> {
        let decoration = if self.storage_buffer_class == StorageClass::StorageBuffer {
            Decoration::Block
        } else {
            Decoration::BufferBlock
        };
        self.add_decoration(Operation::decorate(id, decoration, []))
    }

    pub fn set_name(&mut self, id: Id, name: &str) -> Result<(), EditorError> {
        self.append(Section::DebugNames, Operation::name(id, name))?;
        Ok(())
    }

    pub fn set_member_name(&mut self, id: Id, member: u32, name: &str) -> Result<(), EditorError> {
        self.append(Section::DebugNames, Operation::member_name(id, member, name))?;
        Ok(())
    }

    ///Appends a whole function (`OpFunction` to `OpFunctionEnd`) to the module.
    pub fn add_function(&mut self, ops: &OperationList) -> Result<(), EditorError> {
        for op in ops {
            self.check_section(op, Section::Functions)?;
        }
        for op in ops {
            self.append(Section::Functions, op.clone())?;
        }
        Ok(())
    }

    ///Descriptor set and binding of `id`. Unbound resources report [Binding::UNBOUND].
    pub fn binding(&self, id: Id) -> Binding {
        self.registry.binding(id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (Id, Binding)> + '_ {
        self.registry.bindings()
    }

    pub fn name(&self, id: Id) -> Option<&str> {
        self.registry.name((id, None))
    }

    pub fn member_name(&self, id: Id, member: u32) -> Option<&str> {
        self.registry.name((id, Some(member)))
    }

    ///Lowest id carrying the debug name `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Id> {
        self.registry.find_by_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pointer, Scalar, Vector};
    use rspirv::spirv::ExecutionModel;

    fn empty(words: &mut Vec<Word>) -> Editor<'_> {
        Editor::create_empty(words, 1, 3, EditorConfig::default())
    }

    #[test]
    fn register_unregister_restores_tables() {
        let mut words = Vec::new();
        let mut editor = empty(&mut words);
        let f32_id = editor.declare_type(Scalar::float(32)).unwrap();
        let vec_id = editor.declare_type(Vector::new(Scalar::float(32), 4)).unwrap();
        let ptr_id = editor
            .declare_type(Pointer::new(vec_id, StorageClass::Uniform))
            .unwrap();
        let var_id = editor.new_id().unwrap();
        let var = editor
            .add_variable(Operation::variable(
                ptr_id,
                var_id,
                StorageClass::Uniform,
                None,
            ))
            .unwrap();
        editor
            .add_decoration(Operation::decorate(var, Decoration::Binding, [3]))
            .unwrap();
        editor.set_name(var, "ubo").unwrap();

        let registry = editor.registry.clone();
        let types = editor.types.clone();

        let all: Vec<Location> = Section::ALL
            .iter()
            .flat_map(|s| editor.iter(*s).map(|i| i.location()).collect::<Vec<_>>())
            .collect();
        for at in all {
            editor.unregister(at).unwrap();
            editor.register(at).unwrap();
            assert_eq!(editor.registry, registry, "registry differs after {:?}", at);
            assert_eq!(editor.types, types, "types differ after {:?}", at);
        }
        assert_eq!(editor.get_type(Scalar::float(32)), Some(f32_id));
    }

    #[test]
    fn repeated_declarations_survive_edits() {
        let mut words = Vec::new();
        let mut editor = empty(&mut words);
        let target = editor.new_id().unwrap();
        let main = editor.new_id().unwrap();
        editor.set_name(target, "first").unwrap();
        editor.set_name(target, "second").unwrap();
        for (decoration, value) in [
            (Decoration::DescriptorSet, 1),
            (Decoration::DescriptorSet, 2),
            (Decoration::Binding, 0),
            (Decoration::Binding, 5),
        ] {
            editor
                .add_decoration(Operation::decorate(target, decoration, [value]))
                .unwrap();
        }
        for model in [ExecutionModel::GLCompute, ExecutionModel::Fragment] {
            let end = editor.section_end(Section::EntryPoints);
            editor
                .insert(end, Operation::entry_point(model, main, "main", []))
                .unwrap();
        }

        let first_entry = editor.section_begin(Section::EntryPoints);
        assert_eq!(editor.locate_entry_declaration(main), Some(first_entry));
        assert_eq!(editor.name(target), Some("first"));
        assert_eq!(editor.binding(target), Binding::new(1, 0));

        let registry = editor.registry.clone();
        let all: Vec<Location> = Section::ALL
            .iter()
            .flat_map(|s| editor.iter(*s).map(|i| i.location()).collect::<Vec<_>>())
            .collect();
        for at in all {
            editor.modify(at, |_| {}).unwrap();
            assert_eq!(editor.registry, registry, "registry differs after {:?}", at);
        }

        let second_entry = editor
            .iter(Section::EntryPoints)
            .nth(1)
            .map(|i| i.location())
            .unwrap();
        editor.remove(second_entry).unwrap();
        assert_eq!(editor.locate_entry_declaration(main), Some(first_entry));
        editor.remove(first_entry).unwrap();
        assert_eq!(editor.locate_entry_declaration(main), None);

        let first_name = editor.section_begin(Section::DebugNames);
        editor.remove(first_name).unwrap();
        assert_eq!(editor.name(target), Some("second"));
        assert_eq!(editor.find_by_name("first"), None);
        assert_eq!(editor.find_by_name("second"), Some(target));
    }

    #[test]
    fn id_space_exhaustion_aborts() {
        let mut words = Vec::new();
        let mut editor = empty(&mut words);
        let last = Id::new(Word::MAX - 1).unwrap();
        let end = editor.section_end(Section::ExtInstImports);
        editor
            .insert(end, Operation::ext_inst_import(last, "GLSL.std.450"))
            .unwrap();
        assert_eq!(editor.bound(), Word::MAX);
        assert_eq!(editor.words()[BOUND_WORD], Word::MAX);

        assert!(matches!(editor.new_id(), Err(EditorError::IdsExhausted)));
        assert!(editor.is_aborted());
        assert_eq!(editor.bound(), Word::MAX);

        let mut words = Vec::new();
        let mut editor = empty(&mut words);
        let end = editor.section_end(Section::ExtInstImports);
        let overflowing = Operation::ext_inst_import(Id::new(Word::MAX).unwrap(), "GLSL.std.450");
        assert!(matches!(
            editor.insert(end, overflowing),
            Err(EditorError::IdsExhausted)
        ));
    }

    #[test]
    fn modify_bracket_is_enforced() {
        let mut words = Vec::new();
        let mut editor = empty(&mut words);
        editor.add_capability(Capability::Shader).unwrap();
        let at = editor.section_begin(Section::Capabilities);

        assert!(matches!(
            editor.operands_mut(at),
            Err(EditorError::UnbracketedModify(_))
        ));
        assert!(editor.is_aborted());
        assert!(matches!(
            editor.add_capability(Capability::Int64),
            Err(EditorError::Aborted)
        ));
    }

    #[test]
    fn replace_changes_length() {
        let mut words = Vec::new();
        let mut editor = empty(&mut words);
        let u32_id = editor.declare_type(Scalar::int(32, false)).unwrap();
        let var_ptr = editor
            .declare_type(Pointer::new(u32_id, StorageClass::Private))
            .unwrap();
        let var_id = editor.new_id().unwrap();
        let var = editor
            .add_variable(Operation::variable(var_ptr, var_id, StorageClass::Private, None))
            .unwrap();
        editor.set_name(var, "a").unwrap();

        let name_at = editor.section_begin(Section::DebugNames);
        let var_before = editor.locate(var).unwrap();
        let name_len = editor.operation(name_at).unwrap().word_count();
        let replacement = Operation::name(var, "a_much_longer_name");
        let grow = replacement.word_count() - name_len;
        editor.replace(name_at, replacement).unwrap();

        assert_eq!(editor.name(var), Some("a_much_longer_name"));
        assert_eq!(
            editor.locate(var).unwrap().offset(),
            var_before.offset() + grow
        );
        assert!(editor.sections().is_contiguous(editor.words().len()));

        editor.replace(name_at, Operation::name(var, "b")).unwrap();
        assert_eq!(editor.name(var), Some("b"));
        assert_eq!(editor.locate(var), Some(var_before));
        assert!(editor.sections().is_contiguous(editor.words().len()));
    }
}
