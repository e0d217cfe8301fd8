//! # SpirV-Editor.
//!
//! In-place editing of SPIR-V binaries. Meant for tools that inject, rewrite or remove
//! instructions of an already compiled shader (instrumentation, binding remapping ...) while
//! keeping the module structurally valid after every edit.
//!
//! It is structured in a couple of layers:
//!
//! - Processor: validates a word buffer and finds its sections.
//! - Operations: owned and borrowed views of single instructions.
//! - Registry / Types: side tables derived from the module (id locations, bindings, names and
//!   the type deduplication tables).
//! - Editor: the editing session. Allocates ids, declares types and inserts, modifies or removes
//!   instructions while keeping all of the above in sync with the words.
//!
//! ```ignore
//! let mut words = spv_editor::words_from_bytes(&bytes)?;
//! let mut editor = spv_editor::Editor::prepare(&mut words, Default::default())?;
//! let float = editor.declare_type(Scalar::float(32))?;
//! ```
#![deny(warnings)]

use rspirv::spirv::Op;
use thiserror::Error;

pub use rspirv;

mod editor;
pub mod operation;
mod processor;
pub mod registry;
pub mod section;
pub mod types;

pub use editor::{Editor, EditorConfig, StructDedup};
pub use operation::{Id, Location, Operation, OperationList, OperationRef};
pub use processor::{
    words_from_bytes, InstructionIter, ModuleLayout, Processor, ProcessorError, HEADER_WORDS,
};
pub use registry::Binding;
pub use section::{Section, SectionRange, SectionTable};
pub use types::{
    FunctionType, Image, ImmediateValue, Matrix, MissingType, Pointer, SampledImage, Sampler,
    Scalar, TypeCategory, TypeKey, Vector,
};

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Could not load SPIR-V module: {0}")]
    Load(#[from] ProcessorError),
    #[error("Cannot declare {key:?}, {missing:?} is not declared")]
    MissingDependency { key: TypeKey, missing: MissingType },
    #[error("Struct member {0} is not declared")]
    UndeclaredMember(Id),
    #[error("No instruction at word offset {0}")]
    InvalidLocation(usize),
    #[error("Instruction at word offset {0} was already removed")]
    AlreadyRemoved(usize),
    #[error("Instruction at word offset {0} was modified outside of a modify bracket")]
    UnbracketedModify(usize),
    #[error("Modification of the instruction at word offset {0} is still pending")]
    ModifyPending(usize),
    #[error("{op:?} can not be placed at word offset {offset}")]
    Misplaced { op: Op, offset: usize },
    #[error("{0:?} does not define an id")]
    NoResultId(Op),
    #[error("Operation of {0} words exceeds the maximum instruction length")]
    OperationTooLong(usize),
    #[error("Identifier space is exhausted")]
    IdsExhausted,
    #[error("Edit session was aborted by an earlier contract violation")]
    Aborted,
}
