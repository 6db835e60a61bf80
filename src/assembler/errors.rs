use crate::types::encoding::DecodeError;
use basm_derive::Error;

/// Errors that can abort an assembly run.
///
/// All of these are fatal: the first one aborts the whole run and no output
/// bytes are produced. Token indices are zero-based positions in the token
/// stream; function numbers are assigned in order of opening (root is `#0`).
#[derive(Debug, Error)]
pub enum AsmError {
    /// Unrecognized instruction mnemonic.
    #[error("unknown operation `{token}` at token {index}")]
    UnknownOperation { token: String, index: usize },
    /// Expected a register operand (e.g. `R0`) but got something else.
    #[error("invalid register `{token}` at token {index}")]
    InvalidRegister { token: String, index: usize },
    /// Expected a label reference (e.g. `@loop`) but got something else.
    #[error("invalid label `{token}` at token {index}")]
    InvalidLabel { token: String, index: usize },
    /// Operand token does not parse as the expected literal kind.
    #[error("expected {expected}, got `{token}` at token {index}")]
    InvalidOperand {
        expected: &'static str,
        token: String,
        index: usize,
    },
    /// A value does not fit the field width it is encoded into.
    #[error("operand {value} does not fit in {bits} bits")]
    OperandOverflow { value: i64, bits: u32 },
    /// A jump target label was never defined in its function.
    #[error("unresolved label `{label}` in function #{function}")]
    UnresolvedLabel { label: String, function: usize },
    /// Label defined more than once within one function.
    #[error("duplicate label `{label}`")]
    DuplicateLabel { label: String },
    /// An operation needed more operand tokens than remain.
    #[error("unexpected end of input while reading operands for `{operation}`")]
    UnexpectedEndOfInput { operation: String },
    /// `end` encountered with no open nested function.
    #[error("`end` without an open function at token {index}")]
    UnbalancedEnd { index: usize },
    /// Input ran out while nested functions were still open.
    #[error("end of input with {open} unclosed function(s)")]
    UnclosedFunction { open: usize },
    /// Failed to decode a binary function image.
    #[error("decoding error: {reason}")]
    Decode { reason: String },
}

impl From<DecodeError> for AsmError {
    fn from(err: DecodeError) -> Self {
        AsmError::Decode {
            reason: err.to_string(),
        }
    }
}
