//! # Operations
//!
//! An [Operation] is one owned, not-yet-placed instruction: an opcode and its operand words.
//! Once it lives inside a module it is addressed by a [Location] and read through an
//! [OperationRef].
//!
//! Encoding follows the binary layout: the first word packs `(word_count << 16) | opcode`,
//! followed by `word_count - 1` operand words.

use std::fmt::Display;

use rspirv::{
    grammar::{CoreInstructionTable, OperandKind},
    spirv::{
        Capability, Decoration, ExecutionMode, ExecutionModel, FunctionControl, GLOp, Op,
        StorageClass, Word,
    },
};
use smallvec::SmallVec;

///Identifier of a type, constant, variable, function or label within a module. Zero is never a
/// valid identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub(crate) Word);

impl Id {
    pub fn new(value: Word) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Id(value))
        }
    }

    pub fn value(&self) -> Word {
        self.0
    }
}

impl From<Id> for Word {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

///Word offset of one instruction within the module.
///
/// A location is only valid until the next edit that inserts or removes words at or before it.
/// Re-resolve it via [Editor::locate](crate::Editor::locate) afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(usize);

impl Location {
    pub(crate) fn new(offset: usize) -> Self {
        Location(offset)
    }

    pub fn offset(&self) -> usize {
        self.0
    }
}

///Packs the first word of an instruction.
pub const fn instruction_header(word_count: u16, opcode: u16) -> Word {
    ((word_count as u32) << 16) | opcode as u32
}

///Splits the first word of an instruction into `(word_count, opcode)`.
pub fn split_header(word: Word) -> (u16, u16) {
    ((word >> 16) as u16, (word & 0xffff) as u16)
}

///Word index (within the operand words) of an opcode's result id, if it has one.
pub(crate) fn result_index(op: Op) -> Option<usize> {
    let mut operands = CoreInstructionTable::get(op).operands.iter();
    match operands.next().map(|o| &o.kind) {
        Some(OperandKind::IdResult) => Some(0),
        Some(OperandKind::IdResultType) => match operands.next().map(|o| &o.kind) {
            Some(OperandKind::IdResult) => Some(1),
            _ => None,
        },
        _ => None,
    }
}

fn has_result_type(op: Op) -> bool {
    matches!(
        CoreInstructionTable::get(op).operands.first().map(|o| &o.kind),
        Some(OperandKind::IdResultType)
    )
}

///Packs a literal string: UTF-8 bytes, NUL terminated, four bytes per word (first byte in the
/// lowest byte of the word), zero padded to a whole word.
pub fn pack_string(s: &str) -> SmallVec<[Word; 8]> {
    let bytes = s.as_bytes();
    let mut words = SmallVec::with_capacity(bytes.len() / 4 + 1);
    for chunk in bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        words.push(u32::from_le_bytes(word));
    }
    //full last word means the terminator needs its own
    if bytes.len() % 4 == 0 {
        words.push(0);
    }
    words
}

///Reads a literal string from the start of `words`. Returns the string and the number of words it
/// occupied, including the terminator.
pub fn unpack_string(words: &[Word]) -> (String, usize) {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    let mut consumed = 0;
    'words: for word in words {
        consumed += 1;
        for byte in word.to_le_bytes() {
            if byte == 0 {
                break 'words;
            }
            bytes.push(byte);
        }
    }

    (String::from_utf8_lossy(&bytes).into_owned(), consumed)
}

///Owned instruction that can be inserted into a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    op: Op,
    operands: SmallVec<[Word; 8]>,
}

impl Operation {
    pub fn new(op: Op, operands: impl IntoIterator<Item = Word>) -> Self {
        Operation {
            op,
            operands: operands.into_iter().collect(),
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn operands(&self) -> &[Word] {
        &self.operands
    }

    pub fn operands_mut(&mut self) -> &mut SmallVec<[Word; 8]> {
        &mut self.operands
    }

    ///Number of words this operation occupies once encoded, including the header word.
    pub fn word_count(&self) -> usize {
        self.operands.len() + 1
    }

    ///Writes the encoded operation to `dst`, which must be exactly [Self::word_count] long.
    pub(crate) fn encode_into(&self, dst: &mut [Word]) {
        debug_assert_eq!(dst.len(), self.word_count());
        dst[0] = instruction_header(self.word_count() as u16, self.op as u16);
        dst[1..].copy_from_slice(&self.operands);
    }

    pub fn to_words(&self) -> SmallVec<[Word; 9]> {
        let mut words = SmallVec::from_elem(0, self.word_count());
        self.encode_into(&mut words);
        words
    }

    pub fn result_id(&self) -> Option<Id> {
        result_index(self.op)
            .and_then(|idx| self.operands.get(idx))
            .and_then(|w| Id::new(*w))
    }

    pub fn set_result_id(&mut self, id: Id) {
        if let Some(slot) = result_index(self.op).and_then(|idx| self.operands.get_mut(idx)) {
            *slot = id.value();
        }
    }

    pub fn result_type(&self) -> Option<Id> {
        if has_result_type(self.op) {
            self.operands.first().and_then(|w| Id::new(*w))
        } else {
            None
        }
    }

    pub fn capability(capability: Capability) -> Self {
        Operation::new(Op::Capability, [capability as Word])
    }

    pub fn extension(name: &str) -> Self {
        Operation::new(Op::Extension, pack_string(name))
    }

    pub fn ext_inst_import(id: Id, name: &str) -> Self {
        let mut op = Operation::new(Op::ExtInstImport, [id.value()]);
        op.operands.extend(pack_string(name));
        op
    }

    pub fn entry_point(
        model: ExecutionModel,
        function: Id,
        name: &str,
        interface: impl IntoIterator<Item = Id>,
    ) -> Self {
        let mut op = Operation::new(Op::EntryPoint, [model as Word, function.value()]);
        op.operands.extend(pack_string(name));
        op.operands.extend(interface.into_iter().map(Word::from));
        op
    }

    pub fn execution_mode(
        entry: Id,
        mode: ExecutionMode,
        params: impl IntoIterator<Item = Word>,
    ) -> Self {
        let mut op = Operation::new(Op::ExecutionMode, [entry.value(), mode as Word]);
        op.operands.extend(params);
        op
    }

    pub fn decorate(
        target: Id,
        decoration: Decoration,
        params: impl IntoIterator<Item = Word>,
    ) -> Self {
        let mut op = Operation::new(Op::Decorate, [target.value(), decoration as Word]);
        op.operands.extend(params);
        op
    }

    pub fn member_decorate(
        target: Id,
        member: u32,
        decoration: Decoration,
        params: impl IntoIterator<Item = Word>,
    ) -> Self {
        let mut op = Operation::new(
            Op::MemberDecorate,
            [target.value(), member, decoration as Word],
        );
        op.operands.extend(params);
        op
    }

    pub fn name(target: Id, name: &str) -> Self {
        let mut op = Operation::new(Op::Name, [target.value()]);
        op.operands.extend(pack_string(name));
        op
    }

    pub fn member_name(target: Id, member: u32, name: &str) -> Self {
        let mut op = Operation::new(Op::MemberName, [target.value(), member]);
        op.operands.extend(pack_string(name));
        op
    }

    pub fn variable(
        result_type: Id,
        id: Id,
        storage: StorageClass,
        initializer: Option<Id>,
    ) -> Self {
        let mut op = Operation::new(
            Op::Variable,
            [result_type.value(), id.value(), storage as Word],
        );
        op.operands.extend(initializer.map(Word::from));
        op
    }

    pub fn constant(result_type: Id, id: Id, value: impl IntoIterator<Item = Word>) -> Self {
        let mut op = Operation::new(Op::Constant, [result_type.value(), id.value()]);
        op.operands.extend(value);
        op
    }

    ///Call into an imported extended instruction set.
    pub fn ext_inst(
        result_type: Id,
        id: Id,
        set: Id,
        instruction: Word,
        params: impl IntoIterator<Item = Word>,
    ) -> Self {
        let mut op = Operation::new(
            Op::ExtInst,
            [result_type.value(), id.value(), set.value(), instruction],
        );
        op.operands.extend(params);
        op
    }

    ///Call into `GLSL.std.450`. `set` is the id returned when importing that set.
    pub fn glsl450(
        result_type: Id,
        id: Id,
        set: Id,
        instruction: GLOp,
        params: impl IntoIterator<Item = Word>,
    ) -> Self {
        Operation::ext_inst(result_type, id, set, instruction as Word, params)
    }

    pub fn function(result_type: Id, id: Id, control: FunctionControl, function_type: Id) -> Self {
        Operation::new(
            Op::Function,
            [
                result_type.value(),
                id.value(),
                control.bits(),
                function_type.value(),
            ],
        )
    }

    pub fn label(id: Id) -> Self {
        Operation::new(Op::Label, [id.value()])
    }
}

///Borrowed view of one instruction inside a module.
#[derive(Debug, Clone, Copy)]
pub struct OperationRef<'a> {
    location: Location,
    words: &'a [Word],
}

impl<'a> OperationRef<'a> {
    ///`words` must be exactly the instruction, header included.
    pub(crate) fn new(location: Location, words: &'a [Word]) -> Self {
        OperationRef { location, words }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn opcode(&self) -> u16 {
        split_header(self.words[0]).1
    }

    ///Decoded opcode, `None` for opcodes this version of the grammar does not know.
    pub fn op(&self) -> Option<Op> {
        Op::from_u32(self.opcode() as u32)
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn words(&self) -> &'a [Word] {
        self.words
    }

    pub fn operands(&self) -> &'a [Word] {
        &self.words[1..]
    }

    pub fn operand(&self, index: usize) -> Option<Word> {
        self.operands().get(index).copied()
    }

    pub fn result_id(&self) -> Option<Id> {
        self.op()
            .and_then(result_index)
            .and_then(|idx| self.operand(idx))
            .and_then(Id::new)
    }

    pub fn result_type(&self) -> Option<Id> {
        match self.op() {
            Some(op) if has_result_type(op) => self.operand(0).and_then(Id::new),
            _ => None,
        }
    }

    ///Decodes the literal string starting at operand `index`.
    pub fn string_operand(&self, index: usize) -> Option<String> {
        self.operands()
            .get(index..)
            .filter(|rest| !rest.is_empty())
            .map(|rest| unpack_string(rest).0)
    }

    pub fn to_operation(&self) -> Option<Operation> {
        self.op().map(|op| Operation::new(op, self.operands().iter().copied()))
    }
}

///Ordered list of operations, for instance a whole function body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationList(Vec<Operation>);

impl OperationList {
    pub fn new() -> Self {
        OperationList(Vec::new())
    }

    ///Appends `op` and returns its result id, if it defines one.
    pub fn add(&mut self, op: Operation) -> Option<Id> {
        let id = op.result_id();
        self.0.push(op);
        id
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    ///Number of words all operations take once encoded.
    pub fn word_count(&self) -> usize {
        self.0.iter().map(Operation::word_count).sum()
    }
}

impl<'a> IntoIterator for &'a OperationList {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_packing() {
        let packed = pack_string("main");
        assert_eq!(packed.len(), 2, "4 byte string needs an extra terminator word");
        assert_eq!(packed[0], u32::from_le_bytes(*b"main"));
        assert_eq!(packed[1], 0);

        let packed = pack_string("GLSL.std.450");
        assert_eq!(packed.len(), 4);
        assert_eq!(unpack_string(&packed), ("GLSL.std.450".to_string(), 4));

        let packed = pack_string("abcdef");
        assert_eq!(packed.len(), 2);
        assert_eq!(unpack_string(&packed).0, "abcdef");
    }

    #[test]
    fn result_positions() {
        assert_eq!(result_index(Op::TypeFloat), Some(0));
        assert_eq!(result_index(Op::Constant), Some(1));
        assert_eq!(result_index(Op::Decorate), None);

        let id = Id::new(7).unwrap();
        let ty = Id::new(3).unwrap();
        let var = Operation::variable(ty, id, StorageClass::Uniform, None);
        assert_eq!(var.result_id(), Some(id));
        assert_eq!(var.result_type(), Some(ty));
        assert_eq!(Operation::capability(Capability::Shader).result_id(), None);
    }

    #[test]
    fn header_encoding() {
        let op = Operation::capability(Capability::Shader);
        let words = op.to_words();
        assert_eq!(words.len(), 2);
        assert_eq!(split_header(words[0]), (2, Op::Capability as u16));
        assert_eq!(words[1], Capability::Shader as u32);
    }

    #[test]
    fn zero_is_not_an_id() {
        assert!(Id::new(0).is_none());
        assert_eq!(Id::new(12).map(|id| id.value()), Some(12));
    }
}
