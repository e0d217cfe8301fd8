//! # Loading SPIR-V modules
//!
//! Decodes a raw word buffer into the initial section layout the [Editor](crate::Editor) works
//! on. The processor never mutates the words; it only validates the header, walks every
//! instruction once and records where each section starts.

use rspirv::spirv::{Op, Word, MAGIC_NUMBER};
use thiserror::Error;

use crate::{
    operation::{split_header, Location, OperationRef},
    section::{Section, SectionRange, SectionTable},
};

///Number of words in the module header.
pub const HEADER_WORDS: usize = 5;

///Header word index of the version.
pub(crate) const VERSION_WORD: usize = 1;
///Header word index of the generator magic.
pub(crate) const GENERATOR_WORD: usize = 2;
///Header word index of the identifier bound.
pub(crate) const BOUND_WORD: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("Module is only {0} words long, the header alone needs 5")]
    TruncatedHeader(usize),
    #[error("Not a SPIR-V module, magic number was {0:#010x}")]
    BadMagic(Word),
    #[error("Byte length {0} is not a multiple of the word size")]
    UnalignedLength(usize),
    #[error("Instruction at word {0} has a word count of zero")]
    ZeroWordCount(usize),
    #[error("Instruction at word {offset} claims {word_count} words, but the module ends at {len}")]
    InstructionOverrun {
        offset: usize,
        word_count: usize,
        len: usize,
    },
    #[error("{op:?} at word {offset} belongs to {section:?}, which must come before {current:?}")]
    SectionOrder {
        offset: usize,
        op: Op,
        section: Section,
        current: Section,
    },
}

///Converts a binary blob into SPIR-V words. Modules written with the opposite endianness are
/// byte-swapped, so the result is always in native order.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<Word>, ProcessorError> {
    if bytes.len() % 4 != 0 {
        return Err(ProcessorError::UnalignedLength(bytes.len()));
    }

    let mut words: Vec<Word> = bytemuck::pod_collect_to_vec(bytes);
    match words.first() {
        Some(&MAGIC_NUMBER) => {}
        Some(&magic) if magic.swap_bytes() == MAGIC_NUMBER => {
            log::info!("Module has swapped endianness, converting to native");
            for word in words.iter_mut() {
                *word = word.swap_bytes();
            }
        }
        Some(&magic) => return Err(ProcessorError::BadMagic(magic)),
        None => return Err(ProcessorError::TruncatedHeader(0)),
    }

    Ok(words)
}

///Header values and section layout of a parsed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    pub version: (u8, u8),
    pub generator: Word,
    pub bound: Word,
    pub sections: SectionTable,
}

///Parsing collaborator of the editor.
pub struct Processor;

impl Processor {
    pub fn parse(words: &[Word]) -> Result<ModuleLayout, ProcessorError> {
        if words.len() < HEADER_WORDS {
            return Err(ProcessorError::TruncatedHeader(words.len()));
        }
        if words[0] != MAGIC_NUMBER {
            return Err(ProcessorError::BadMagic(words[0]));
        }

        let version = words[VERSION_WORD];
        let version = (((version >> 16) & 0xff) as u8, ((version >> 8) & 0xff) as u8);

        //first offset at which each section starts. Sections that never show up start
        // where the next present one does.
        let mut starts: [Option<usize>; Section::COUNT] = [None; Section::COUNT];
        let mut current = Section::Capabilities;

        let mut offset = HEADER_WORDS;
        while offset < words.len() {
            let (word_count, opcode) = split_header(words[offset]);
            let word_count = word_count as usize;
            if word_count == 0 {
                return Err(ProcessorError::ZeroWordCount(offset));
            }
            if offset + word_count > words.len() {
                return Err(ProcessorError::InstructionOverrun {
                    offset,
                    word_count,
                    len: words.len(),
                });
            }

            let section = match Op::from_u32(opcode as u32) {
                Some(op) => match Section::of(op) {
                    //also rejects types and constants declared inside a function body
                    Some(section) if section < current => {
                        return Err(ProcessorError::SectionOrder {
                            offset,
                            op,
                            section,
                            current,
                        });
                    }
                    Some(section) => section,
                    None => match op {
                        //global variables and undefs only live in the types section
                        Op::Variable | Op::Undef if current < Section::Types => Section::Types,
                        _ => current,
                    },
                },
                None => {
                    log::warn!("Unknown opcode {} at word {}", opcode, offset);
                    current
                }
            };

            if starts[section.index()].is_none() {
                starts[section.index()] = Some(offset);
            }
            current = section;
            offset += word_count;
        }

        let mut ranges = [SectionRange::default(); Section::COUNT];
        let mut next_start = words.len();
        for section in Section::ALL.iter().rev() {
            let start = starts[section.index()].unwrap_or(next_start);
            ranges[section.index()] = SectionRange {
                start,
                end: next_start,
            };
            next_start = start;
        }

        Ok(ModuleLayout {
            version,
            generator: words[GENERATOR_WORD],
            bound: words[BOUND_WORD],
            sections: SectionTable::from_ranges(ranges),
        })
    }
}

///Iterates the instructions of a word range.
pub struct InstructionIter<'a> {
    words: &'a [Word],
    offset: usize,
    end: usize,
}

impl<'a> InstructionIter<'a> {
    pub(crate) fn new(words: &'a [Word], range: SectionRange) -> Self {
        InstructionIter {
            words,
            offset: range.start,
            end: range.end.min(words.len()),
        }
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = OperationRef<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let word_count = split_header(self.words[self.offset]).0 as usize;
        if word_count == 0 || self.offset + word_count > self.end {
            log::error!("Malformed instruction at word {}, stopping", self.offset);
            self.offset = self.end;
            return None;
        }

        let inst = OperationRef::new(
            Location::new(self.offset),
            &self.words[self.offset..self.offset + word_count],
        );
        self.offset += word_count;
        Some(inst)
    }
}
