//! Opcode word format descriptor.
//!
//! One instruction assembles to a fixed-width word: the operation tag in the
//! top bits, followed by up to three register-sized argument fields, or one
//! wide field in the low bits for constant indices and jump targets. Field
//! widths have changed across bytecode revisions, so the layout lives in a
//! [`WordFormat`] value that the encoder and serializer are handed once,
//! instead of being hard-coded.
//!
//! Packing is overflow-checked: a value that does not fit its field is an
//! error, never silently masked. Words are written big-endian.

use crate::assembler::errors::AsmError;
use crate::types::encoding::{DecodeError, EncodeSink, read_bytes};

/// Bit layout of one opcode word.
///
/// Fields are assumed to fit inside the word (`op_bits + 3 * reg_bits` and
/// `op_bits + wide_bits` both at most `word_bytes * 8`), and `word_bytes` is
/// at most 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordFormat {
    /// Serialized width of one word in bytes.
    pub word_bytes: usize,
    /// Width of the operation tag field.
    pub op_bits: u32,
    /// Width of one register argument field.
    pub reg_bits: u32,
    /// Width of the wide (constant index / jump target) field.
    pub wide_bits: u32,
}

impl WordFormat {
    /// The current layout: 32-bit words, 8-bit tag, three 8-bit argument
    /// fields, 16-bit wide field.
    pub const STANDARD: WordFormat = WordFormat {
        word_bytes: 4,
        op_bits: 8,
        reg_bits: 8,
        wide_bits: 16,
    };

    const fn word_bits(&self) -> u32 {
        (self.word_bytes * 8) as u32
    }

    const fn arg_shift(&self, slot: u32) -> u32 {
        self.word_bits() - self.op_bits - slot * self.reg_bits
    }

    /// Places an operation tag into the word's top field.
    pub const fn op(&self, tag: u8) -> u32 {
        (tag as u32) << (self.word_bits() - self.op_bits)
    }

    /// Places a value into register argument field `slot` (1-based).
    pub fn arg(&self, slot: u32, value: i64) -> Result<u32, AsmError> {
        let max = ((1u64 << self.reg_bits) - 1) as i64;
        if value < 0 || value > max {
            return Err(AsmError::OperandOverflow {
                value,
                bits: self.reg_bits,
            });
        }
        Ok((value as u32) << self.arg_shift(slot))
    }

    /// Places a value into the wide field in the word's low bits.
    pub fn wide(&self, value: i64) -> Result<u32, AsmError> {
        let max = ((1u64 << self.wide_bits) - 1) as i64;
        if value < 0 || value > max {
            return Err(AsmError::OperandOverflow {
                value,
                bits: self.wide_bits,
            });
        }
        Ok(value as u32)
    }

    /// Extracts the operation tag from a word.
    pub const fn op_of(&self, word: u32) -> u8 {
        (word >> (self.word_bits() - self.op_bits)) as u8
    }

    /// Extracts register argument field `slot` (1-based) from a word.
    pub fn arg_of(&self, word: u32, slot: u32) -> u32 {
        let mask = ((1u64 << self.reg_bits) - 1) as u32;
        (word >> self.arg_shift(slot)) & mask
    }

    /// Extracts the wide field from a word.
    pub fn wide_of(&self, word: u32) -> u32 {
        let mask = ((1u64 << self.wide_bits) - 1) as u32;
        word & mask
    }

    /// Writes one word to the sink, big-endian, `word_bytes` wide.
    pub fn write_word<S: EncodeSink>(&self, word: u32, out: &mut S) {
        let bytes = word.to_be_bytes();
        out.write(&bytes[bytes.len() - self.word_bytes..]);
    }

    /// Reads one word from the input, big-endian, `word_bytes` wide.
    pub fn read_word(&self, input: &mut &[u8]) -> Result<u32, DecodeError> {
        let raw = read_bytes(input, self.word_bytes)?;
        let mut word = 0u32;
        for byte in raw {
            word = (word << 8) | u32::from(*byte);
        }
        Ok(word)
    }
}
