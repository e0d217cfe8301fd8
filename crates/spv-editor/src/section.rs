//! # Module sections
//!
//! A SPIR-V module is a header followed by instructions that must appear in a fixed order of
//! *logical sections*. Each section is tracked as a half-open range of word offsets into the
//! module. Ranges are contiguous: the end of one section is always the start of the next one.

use rspirv::spirv::Op;

///One of the globally ordered instruction sections of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Capabilities = 0,
    Extensions,
    ExtInstImports,
    MemoryModel,
    EntryPoints,
    ExecutionModes,
    ///Debug strings, sources, `OpName` and `OpMemberName`.
    DebugNames,
    ///Decorations.
    Annotations,
    ///Types, constants and global variables.
    Types,
    Functions,
}

impl Section {
    pub const COUNT: usize = 10;

    pub const ALL: [Section; Section::COUNT] = [
        Section::Capabilities,
        Section::Extensions,
        Section::ExtInstImports,
        Section::MemoryModel,
        Section::EntryPoints,
        Section::ExecutionModes,
        Section::DebugNames,
        Section::Annotations,
        Section::Types,
        Section::Functions,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    ///Returns the section `op` has to be placed in, or `None` if the instruction may live in
    /// more than one section (`OpNop`, `OpLine`, `OpVariable` ...).
    pub fn of(op: Op) -> Option<Section> {
        let section = match op {
            Op::Capability => Section::Capabilities,
            Op::Extension => Section::Extensions,
            Op::ExtInstImport => Section::ExtInstImports,
            Op::MemoryModel => Section::MemoryModel,
            Op::EntryPoint => Section::EntryPoints,
            Op::ExecutionMode | Op::ExecutionModeId => Section::ExecutionModes,
            Op::String
            | Op::Source
            | Op::SourceContinued
            | Op::SourceExtension
            | Op::Name
            | Op::MemberName
            | Op::ModuleProcessed => Section::DebugNames,
            Op::Decorate
            | Op::MemberDecorate
            | Op::DecorateId
            | Op::DecorateString
            | Op::MemberDecorateString
            | Op::DecorationGroup
            | Op::GroupDecorate
            | Op::GroupMemberDecorate => Section::Annotations,
            Op::Nop | Op::Line | Op::NoLine | Op::Undef | Op::Variable | Op::ExtInst => {
                return None
            }
            _ if is_type_or_constant(op) => Section::Types,
            _ => Section::Functions,
        };

        Some(section)
    }
}

///True for every `OpType*`, `OpConstant*` and `OpSpecConstant*`.
fn is_type_or_constant(op: Op) -> bool {
    matches!(
        op,
        Op::TypeVoid
            | Op::TypeBool
            | Op::TypeInt
            | Op::TypeFloat
            | Op::TypeVector
            | Op::TypeMatrix
            | Op::TypeImage
            | Op::TypeSampler
            | Op::TypeSampledImage
            | Op::TypeArray
            | Op::TypeRuntimeArray
            | Op::TypeStruct
            | Op::TypeOpaque
            | Op::TypePointer
            | Op::TypeFunction
            | Op::TypeEvent
            | Op::TypeDeviceEvent
            | Op::TypeReserveId
            | Op::TypeQueue
            | Op::TypePipe
            | Op::TypeForwardPointer
            | Op::TypePipeStorage
            | Op::TypeNamedBarrier
            | Op::TypeAccelerationStructureKHR
            | Op::TypeRayQueryKHR
            | Op::ConstantTrue
            | Op::ConstantFalse
            | Op::Constant
            | Op::ConstantComposite
            | Op::ConstantSampler
            | Op::ConstantNull
            | Op::ConstantPipeStorage
            | Op::SpecConstantTrue
            | Op::SpecConstantFalse
            | Op::SpecConstant
            | Op::SpecConstantComposite
            | Op::SpecConstantOp
    )
}

///Half-open range of word offsets `[start, end)` covered by one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionRange {
    pub start: usize,
    pub end: usize,
}

impl SectionRange {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    ///True if `offset` can be used as an insertion point for this section. Both ends are
    /// valid insertion points.
    pub fn accepts(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

///The ordered table of all section ranges of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTable {
    ranges: [SectionRange; Section::COUNT],
}

impl SectionTable {
    ///Layout of a module without any instruction: every section is empty and starts right after
    /// the header.
    pub fn empty(header_end: usize) -> Self {
        SectionTable {
            ranges: [SectionRange {
                start: header_end,
                end: header_end,
            }; Section::COUNT],
        }
    }

    pub(crate) fn from_ranges(ranges: [SectionRange; Section::COUNT]) -> Self {
        SectionTable { ranges }
    }

    pub fn range(&self, section: Section) -> SectionRange {
        self.ranges[section.index()]
    }

    ///Finds the non-empty section `offset` lies in.
    pub fn containing(&self, offset: usize) -> Option<Section> {
        Section::ALL
            .iter()
            .copied()
            .find(|s| self.ranges[s.index()].contains(offset))
    }

    ///Grows (or shrinks, for a negative `delta`) `target` by `delta` words at its tail end and
    /// moves every later section along.
    pub(crate) fn shift(&mut self, target: Section, delta: isize) {
        for section in Section::ALL {
            let range = &mut self.ranges[section.index()];
            if section == target {
                range.end = range.end.wrapping_add_signed(delta);
            } else if section > target {
                range.start = range.start.wrapping_add_signed(delta);
                range.end = range.end.wrapping_add_signed(delta);
            }
        }
    }

    ///Checks the contiguity invariant. `Functions` must end at the end of the module.
    pub fn is_contiguous(&self, module_len: usize) -> bool {
        self.ranges.windows(2).all(|w| w[0].end == w[1].start)
            && self.ranges.iter().all(|r| r.start <= r.end)
            && self.ranges[Section::Functions.index()].end == module_len
    }
}
