//! Assembled function images and their binary serialization.
//!
//! [`Program`] is the result of a successful assembly: the sealed root
//! [`Function`] plus the word format it was encoded with. Serialization is
//! depth-first and big-endian:
//!
//! ```text
//! Function := arity:u16 locals:u16 nInstr:u16 instr[nInstr] nConst:u16 const[nConst]
//! instr    := opcode word, word_bytes wide
//! const    := tag:u8 payload
//!   0 nil      -> (no payload)
//!   1 integer  -> i64
//!   2 real     -> f64 bit pattern as u64
//!   3 string   -> len:u32, raw bytes
//!   4 boolean  -> u8 (0 or 1)
//!   5 function -> nested Function, recursively
//! ```
//!
//! [`Program::from_bytes`] is the validating inverse, so a consumer that does
//! not know the contained data in advance can read exactly the right number
//! of bytes.

use crate::assembler::errors::AsmError;
use crate::assembler::word::WordFormat;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, SizeCounter, read_bytes};

/// A tagged constant-pool value.
///
/// Constants are referenced from instructions by their pool index, which is
/// their position of first appearance.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Nil,
    Integer(i64),
    Real(f64),
    String(String),
    Boolean(bool),
    Function(Function),
}

impl Constant {
    /// Returns the wire tag written ahead of the payload.
    pub const fn tag(&self) -> u8 {
        match self {
            Constant::Nil => 0,
            Constant::Integer(_) => 1,
            Constant::Real(_) => 2,
            Constant::String(_) => 3,
            Constant::Boolean(_) => 4,
            Constant::Function(_) => 5,
        }
    }

    fn encode<S: EncodeSink>(&self, format: &WordFormat, out: &mut S) {
        self.tag().encode(out);
        match self {
            Constant::Nil => {}
            Constant::Integer(value) => value.encode(out),
            Constant::Real(value) => value.encode(out),
            Constant::String(value) => {
                (value.len() as u32).encode(out);
                out.write(value.as_bytes());
            }
            Constant::Boolean(value) => u8::from(*value).encode(out),
            Constant::Function(function) => function.encode(format, out),
        }
    }

    fn decode(format: &WordFormat, input: &mut &[u8]) -> Result<Constant, DecodeError> {
        let tag = u8::decode(input)?;
        match tag {
            0 => Ok(Constant::Nil),
            1 => Ok(Constant::Integer(i64::decode(input)?)),
            2 => Ok(Constant::Real(f64::decode(input)?)),
            3 => {
                let length = u32::decode(input)? as usize;
                let bytes = read_bytes(input, length)?;
                let value =
                    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidValue)?;
                Ok(Constant::String(value))
            }
            4 => match u8::decode(input)? {
                0 => Ok(Constant::Boolean(false)),
                1 => Ok(Constant::Boolean(true)),
                _ => Err(DecodeError::InvalidValue),
            },
            5 => Ok(Constant::Function(Function::decode(format, input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// A sealed function body: every jump resolved, every count within range.
///
/// Produced by sealing a [`Context`](super::context::Context); nested
/// functions appear as [`Constant::Function`] entries in the pool. Sealing
/// guarantees `words` and `constants` fit their u16 counts.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    /// Parameter count.
    pub arity: u16,
    /// Declared local-slot count.
    pub locals: u16,
    /// Encoded opcode words, in execution order.
    pub words: Vec<u32>,
    /// Constant pool, in order of first appearance.
    pub constants: Vec<Constant>,
}

impl Function {
    /// Writes the image of this function, then its constants, depth-first.
    pub fn encode<S: EncodeSink>(&self, format: &WordFormat, out: &mut S) {
        self.arity.encode(out);
        self.locals.encode(out);
        (self.words.len() as u16).encode(out);
        for word in &self.words {
            format.write_word(*word, out);
        }
        (self.constants.len() as u16).encode(out);
        for constant in &self.constants {
            constant.encode(format, out);
        }
    }

    /// Reads one function image, advancing the input past it.
    pub fn decode(format: &WordFormat, input: &mut &[u8]) -> Result<Function, DecodeError> {
        let arity = u16::decode(input)?;
        let locals = u16::decode(input)?;

        let word_count = u16::decode(input)?;
        let mut words = Vec::with_capacity(word_count as usize);
        for _ in 0..word_count {
            words.push(format.read_word(input)?);
        }

        let constant_count = u16::decode(input)?;
        let mut constants = Vec::with_capacity(constant_count as usize);
        for _ in 0..constant_count {
            constants.push(Constant::decode(format, input)?);
        }

        Ok(Function {
            arity,
            locals,
            words,
            constants,
        })
    }
}

/// A fully assembled program: the root function and its word format.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    /// Word layout the instructions were packed with.
    pub format: WordFormat,
    /// The outermost, file-level function.
    pub root: Function,
}

impl Program {
    /// Serializes the whole program into one buffer with exact capacity.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.root.encode(&self.format, &mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.root.encode(&self.format, &mut out);
        out
    }

    /// Deserializes a program, rejecting truncated input and trailing bytes.
    pub fn from_bytes(format: WordFormat, mut input: &[u8]) -> Result<Program, AsmError> {
        let root = Function::decode(&format, &mut input)?;
        if !input.is_empty() {
            return Err(AsmError::Decode {
                reason: "trailing bytes".to_string(),
            });
        }
        Ok(Program { format, root })
    }
}
