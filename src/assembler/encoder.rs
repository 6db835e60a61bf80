//! Assembly driver and instruction encoder.
//!
//! [`Assembler`] walks the token stream one operation at a time, reading the
//! fixed operand arity of each mnemonic, packing finished opcode words into
//! the current [`Context`], and recording jumps for the back-patching pass
//! that runs when a context closes. Nested `function` ... `end` bodies push
//! and pop contexts; the implicit root context is sealed when the input is
//! exhausted.
//!
//! # Operands
//!
//! - Registers: `R` plus a non-negative index (`R0`, `R17`)
//! - Integers: `i64` literals, or the symbolic forms `#C` (current
//!   constant-pool size, i.e. the index the next constant will occupy) and
//!   `#R` (highest referenced register plus one)
//! - Labels: `@name`
//! - Strings: double-quoted, quotes stripped, no escapes

use crate::assembler::context::{Context, PendingJump};
use crate::assembler::errors::AsmError;
use crate::assembler::isa::{Directive, Op};
use crate::assembler::program::{Constant, Function, Program};
use crate::assembler::tokenizer::tokenize;
use crate::assembler::word::WordFormat;
use crate::error;

/// Assembles source text into a [`Program`] using the standard word format.
pub fn assemble_source(source: &str) -> Result<Program, AsmError> {
    Assembler::new().assemble(source)
}

/// One assembly run: token cursor, context stack, and word format.
pub struct Assembler {
    format: WordFormat,
    tokens: Vec<String>,
    index: usize,
    /// Index of the operation token currently being encoded.
    op_index: usize,
    root: Context,
    nested: Vec<Context>,
    next_id: usize,
}

impl Assembler {
    /// Creates an assembler using [`WordFormat::STANDARD`].
    pub fn new() -> Self {
        Self::with_format(WordFormat::STANDARD)
    }

    /// Creates an assembler for a specific word layout.
    pub fn with_format(format: WordFormat) -> Self {
        Self {
            format,
            tokens: Vec::new(),
            index: 0,
            op_index: 0,
            root: Context::new(0),
            nested: Vec::new(),
            next_id: 1,
        }
    }

    /// Runs the whole pipeline: tokenize, encode, seal the root context.
    ///
    /// On failure the in-progress compilation state is logged for diagnosis
    /// and the error is returned; no output is produced.
    pub fn assemble(mut self, source: &str) -> Result<Program, AsmError> {
        self.tokens = tokenize(source);
        match self.run() {
            Ok(root) => Ok(Program {
                format: self.format,
                root,
            }),
            Err(err) => {
                error!("{err}");
                error!("{}", self.state_summary());
                Err(err)
            }
        }
    }

    fn run(&mut self) -> Result<Function, AsmError> {
        while self.index < self.tokens.len() {
            self.op_index = self.index;
            let token = self.tokens[self.index].clone();
            self.index += 1;
            self.dispatch(&token)?;
        }

        if !self.nested.is_empty() {
            return Err(AsmError::UnclosedFunction {
                open: self.nested.len(),
            });
        }

        let root = std::mem::replace(&mut self.root, Context::new(0));
        root.seal(&self.format)
    }

    fn dispatch(&mut self, token: &str) -> Result<(), AsmError> {
        if let Some(op) = Op::from_mnemonic(token) {
            return self.operation(op);
        }
        if let Some(directive) = Directive::from_mnemonic(token) {
            return self.directive(directive);
        }
        Err(AsmError::UnknownOperation {
            token: token.to_string(),
            index: self.op_index,
        })
    }

    /// Encodes one opcode-word-emitting operation.
    fn operation(&mut self, op: Op) -> Result<(), AsmError> {
        let format = self.format;
        let word = match op {
            Op::LoadConstant => {
                let dst = self.register()?;
                let index = self.integer()?;
                format.op(op.tag()) | format.arg(1, i64::from(dst))? | format.wide(index)?
            }
            Op::Invoke => {
                let base = self.register()?;
                let argc = self.integer()?;
                format.op(op.tag()) | format.arg(1, i64::from(base))? | format.arg(2, argc)?
            }
            Op::Return | Op::NewMap => self.word_r(op)?,
            Op::LoadGlobal | Op::Copy | Op::StoreGlobal | Op::Not => self.word_rr(op)?,
            Op::Equal
            | Op::Lt
            | Op::Lte
            | Op::Gt
            | Op::Gte
            | Op::Add
            | Op::Sub
            | Op::Mult
            | Op::Div
            | Op::MapSet => self.word_rrr(op)?,
            Op::Noop => format.op(op.tag()),
            Op::Jump => {
                let label = self.label()?;
                self.current().push_pending(PendingJump {
                    op,
                    register: None,
                    label,
                });
                return Ok(());
            }
            Op::JumpFalse => {
                let register = self.register()?;
                let label = self.label()?;
                self.current().push_pending(PendingJump {
                    op,
                    register: Some(register),
                    label,
                });
                return Ok(());
            }
        };

        self.current().push_word(word);
        Ok(())
    }

    /// Processes one pseudo-instruction.
    fn directive(&mut self, directive: Directive) -> Result<(), AsmError> {
        match directive {
            Directive::Arity => {
                let value = self.integer()?;
                let arity = self.header_u16(value)?;
                self.current().arity = arity;
            }
            Directive::Locals => {
                let value = self.integer()?;
                let locals = self.header_u16(value)?;
                self.current().locals = locals;
            }
            Directive::Nil => self.push_constant(Constant::Nil)?,
            Directive::Integer => {
                let value = self.integer()?;
                self.push_constant(Constant::Integer(value))?;
            }
            Directive::Float => {
                let value = self.float()?;
                self.push_constant(Constant::Real(value))?;
            }
            Directive::String => {
                let value = self.quoted()?;
                self.push_constant(Constant::String(value))?;
            }
            Directive::Boolean => {
                let value = self.boolean()?;
                self.push_constant(Constant::Boolean(value))?;
            }
            Directive::Function => self.open_function(),
            Directive::End => self.end_function()?,
            Directive::Label => {
                let name = self.label()?;
                let context = self.current();
                let offset = context.instruction_count();
                context.define_label(name, offset)?;
            }
        }
        Ok(())
    }

    // ---------- context stack ----------

    fn current(&mut self) -> &mut Context {
        match self.nested.last_mut() {
            Some(context) => context,
            None => &mut self.root,
        }
    }

    fn push_constant(&mut self, constant: Constant) -> Result<(), AsmError> {
        self.current().push_constant(constant)
    }

    fn open_function(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        self.nested.push(Context::new(id));
    }

    /// Seals the innermost open function and moves it into its parent's
    /// constant pool.
    fn end_function(&mut self) -> Result<(), AsmError> {
        let Some(child) = self.nested.pop() else {
            return Err(AsmError::UnbalancedEnd {
                index: self.op_index,
            });
        };
        let sealed = child.seal(&self.format)?;
        self.push_constant(Constant::Function(sealed))
    }

    // ---------- operand readers ----------

    fn next(&mut self) -> Result<String, AsmError> {
        let Some(token) = self.tokens.get(self.index) else {
            return Err(AsmError::UnexpectedEndOfInput {
                operation: self.tokens[self.op_index].clone(),
            });
        };
        let token = token.clone();
        self.index += 1;
        Ok(token)
    }

    /// Reads a register operand (`R` plus a non-negative index) and folds it
    /// into the current context's register high-water mark.
    fn register(&mut self) -> Result<u32, AsmError> {
        let token = self.next()?;
        let index = self.index - 1;
        let parsed = token
            .strip_prefix('R')
            .and_then(|digits| digits.parse::<u32>().ok());
        let Some(value) = parsed else {
            return Err(AsmError::InvalidRegister { token, index });
        };
        self.current().note_register(value);
        Ok(value)
    }

    /// Reads an integer operand: a literal, `#C` (constant-pool size) or
    /// `#R` (register count).
    fn integer(&mut self) -> Result<i64, AsmError> {
        let token = self.next()?;
        let index = self.index - 1;
        if token == "#C" {
            return Ok(self.current().constant_count() as i64);
        }
        if token == "#R" {
            return Ok(i64::from(self.current().max_register()) + 1);
        }
        token.parse::<i64>().map_err(|_| AsmError::InvalidOperand {
            expected: "integer",
            token,
            index,
        })
    }

    fn float(&mut self) -> Result<f64, AsmError> {
        let token = self.next()?;
        let index = self.index - 1;
        token.parse::<f64>().map_err(|_| AsmError::InvalidOperand {
            expected: "float",
            token,
            index,
        })
    }

    fn boolean(&mut self) -> Result<bool, AsmError> {
        let token = self.next()?;
        let index = self.index - 1;
        if token == "true" {
            return Ok(true);
        }
        if token == "false" {
            return Ok(false);
        }
        Err(AsmError::InvalidOperand {
            expected: "boolean",
            token,
            index,
        })
    }

    /// Reads a label reference (`@` plus a name).
    fn label(&mut self) -> Result<String, AsmError> {
        let token = self.next()?;
        let index = self.index - 1;
        if token.starts_with('@') && token.len() > 1 {
            return Ok(token);
        }
        Err(AsmError::InvalidLabel { token, index })
    }

    /// Reads a double-quoted string literal and strips the quotes.
    fn quoted(&mut self) -> Result<String, AsmError> {
        let token = self.next()?;
        let index = self.index - 1;
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            let inner = token[1..token.len() - 1].to_string();
            if inner.len() > u32::MAX as usize {
                return Err(AsmError::OperandOverflow {
                    value: inner.len() as i64,
                    bits: 32,
                });
            }
            return Ok(inner);
        }
        Err(AsmError::InvalidOperand {
            expected: "string literal",
            token,
            index,
        })
    }

    fn header_u16(&self, value: i64) -> Result<u16, AsmError> {
        u16::try_from(value).map_err(|_| AsmError::OperandOverflow { value, bits: 16 })
    }

    // ---------- word builders ----------

    fn word_r(&mut self, op: Op) -> Result<u32, AsmError> {
        let format = self.format;
        let a = self.register()?;
        Ok(format.op(op.tag()) | format.arg(1, i64::from(a))?)
    }

    fn word_rr(&mut self, op: Op) -> Result<u32, AsmError> {
        let format = self.format;
        let a = self.register()?;
        let b = self.register()?;
        Ok(format.op(op.tag()) | format.arg(1, i64::from(a))? | format.arg(2, i64::from(b))?)
    }

    fn word_rrr(&mut self, op: Op) -> Result<u32, AsmError> {
        let format = self.format;
        let a = self.register()?;
        let b = self.register()?;
        let c = self.register()?;
        Ok(format.op(op.tag())
            | format.arg(1, i64::from(a))?
            | format.arg(2, i64::from(b))?
            | format.arg(3, i64::from(c))?)
    }

    // ---------- diagnostics ----------

    /// One-line description of the in-progress compilation, logged on failure.
    fn state_summary(&self) -> String {
        let scopes: Vec<String> = std::iter::once(&self.root)
            .chain(self.nested.iter())
            .map(|context| {
                format!(
                    "function #{}: {} instructions, {} constants, {} labels",
                    context.id(),
                    context.instruction_count(),
                    context.constant_count(),
                    context.label_count()
                )
            })
            .collect();
        format!("stopped at token {}: {}", self.op_index, scopes.join("; "))
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: WordFormat = WordFormat::STANDARD;

    fn assemble(source: &str) -> Program {
        assemble_source(source).unwrap()
    }

    fn fail(source: &str) -> AsmError {
        assemble_source(source).unwrap_err()
    }

    // ==================== Basics ====================

    #[test]
    fn empty_source_yields_an_empty_root() {
        let program = assemble("");
        assert_eq!(program.root, Function {
            arity: 0,
            locals: 0,
            words: Vec::new(),
            constants: Vec::new(),
        });
    }

    #[test]
    fn minimal_body() {
        let program = assemble("arity 0 locals 0 nil return R0");
        assert_eq!(program.root.arity, 0);
        assert_eq!(program.root.locals, 0);
        assert_eq!(program.root.constants, vec![Constant::Nil]);
        assert_eq!(program.root.words, vec![0x0300_0000]);
    }

    #[test]
    fn header_directives_set_fields() {
        let program = assemble("arity 2 locals 7");
        assert_eq!(program.root.arity, 2);
        assert_eq!(program.root.locals, 7);
    }

    // ==================== Word encodings ====================

    #[test]
    fn loadc_packs_register_and_wide_index() {
        let program = assemble("loadc R1 5");
        assert_eq!(program.root.words, vec![0x0001_0005]);
    }

    #[test]
    fn invoke_packs_base_and_argument_count() {
        let program = assemble("invoke R2 3");
        assert_eq!(program.root.words, vec![0x0202_0300]);
    }

    #[test]
    fn two_register_forms() {
        assert_eq!(assemble("copy R4 R5").root.words, vec![0x0404_0500]);
        assert_eq!(assemble("loadg R1 R2").root.words, vec![0x0101_0200]);
        assert_eq!(assemble("storeg R1 R2").root.words, vec![0x1101_0200]);
        assert_eq!(assemble("not R1 R0").root.words, vec![0x1201_0000]);
    }

    #[test]
    fn three_register_forms() {
        assert_eq!(assemble("add R1 R2 R3").root.words, vec![0x0A01_0203]);
        assert_eq!(assemble("sub R1 R2 R3").root.words, vec![0x0B01_0203]);
        assert_eq!(assemble("mult R1 R2 R3").root.words, vec![0x0C01_0203]);
        assert_eq!(assemble("div R1 R2 R3").root.words, vec![0x0D01_0203]);
        assert_eq!(assemble("mapset R1 R2 R3").root.words, vec![0x1301_0203]);
    }

    #[test]
    fn comparison_forms_carry_their_own_tags() {
        for (source, op) in [
            ("equal R1 R2 R3", Op::Equal),
            ("lt R1 R2 R3", Op::Lt),
            ("lte R1 R2 R3", Op::Lte),
            ("gt R1 R2 R3", Op::Gt),
            ("gte R1 R2 R3", Op::Gte),
        ] {
            let program = assemble(source);
            assert_eq!(F.op_of(program.root.words[0]), op.tag());
            assert_eq!(F.arg_of(program.root.words[0], 3), 3);
        }
    }

    #[test]
    fn single_register_and_bare_forms() {
        assert_eq!(assemble("return R0").root.words, vec![0x0300_0000]);
        assert_eq!(assemble("newmap R7").root.words, vec![0x1407_0000]);
        assert_eq!(assemble("noop").root.words, vec![0x0E00_0000]);
    }

    // ==================== Labels and jumps ====================

    #[test]
    fn forward_reference_patches_to_label_offset() {
        let program = assemble("jumpf R0 @end add R1 R2 R3 label @end");
        assert_eq!(program.root.words[0], 0x0F00_0002);
    }

    #[test]
    fn immediately_following_label_patches_to_zero() {
        let program = assemble("label @L0 jumpf R0 @L0");
        let word = program.root.words[0];
        assert_eq!(F.op_of(word), Op::JumpFalse.tag());
        assert_eq!(F.wide_of(word), 0);
    }

    #[test]
    fn backward_reference_matches_forward_semantics() {
        let program = assemble("label @top noop jump @top");
        assert_eq!(program.root.words[1], 0x1000_0000);
    }

    #[test]
    fn label_definition_emits_no_instruction() {
        let program = assemble("noop label @here noop");
        assert_eq!(program.root.words.len(), 2);
    }

    #[test]
    fn unresolved_label_in_root() {
        let err = fail("jump @missing");
        assert!(matches!(
            err,
            AsmError::UnresolvedLabel { ref label, function: 0 } if label == "@missing"
        ));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let err = fail("label @a label @a");
        assert!(matches!(err, AsmError::DuplicateLabel { ref label } if label == "@a"));
    }

    #[test]
    fn labels_do_not_leak_between_functions() {
        // The child's label is invisible to the root...
        let err = fail("function label @x end jump @x");
        assert!(matches!(err, AsmError::UnresolvedLabel { function: 0, .. }));

        // ...and the root's label is invisible to the child.
        let err = fail("label @x function jumpf R0 @x end");
        assert!(matches!(err, AsmError::UnresolvedLabel { function: 1, .. }));
    }

    #[test]
    fn sibling_functions_reuse_label_names() {
        let program = assemble(concat!(
            "function label @l jump @l end ",
            "function label @l jump @l end"
        ));
        assert_eq!(program.root.constants.len(), 2);
    }

    // ==================== Nested functions ====================

    #[test]
    fn closing_a_function_appends_one_constant_to_the_parent() {
        let program = assemble("function arity 2 locals 1 return R0 end");
        assert_eq!(program.root.constants.len(), 1);
        let Constant::Function(child) = &program.root.constants[0] else {
            panic!("expected a function constant");
        };
        assert_eq!(child.arity, 2);
        assert_eq!(child.locals, 1);
        assert_eq!(child.words, vec![0x0300_0000]);
    }

    #[test]
    fn function_constant_lands_at_the_predicted_index() {
        // The `loadc Rn #C function ... end` idiom: #C is read in the parent
        // before the body opens, and the sealed child lands at that index.
        let program = assemble("nil loadc R0 #C function return R0 end");
        assert_eq!(F.wide_of(program.root.words[0]), 1);
        assert!(matches!(program.root.constants[1], Constant::Function(_)));
    }

    #[test]
    fn deeply_nested_functions() {
        let program = assemble("function function return R0 end end");
        let Constant::Function(outer) = &program.root.constants[0] else {
            panic!("expected a function constant");
        };
        assert!(matches!(outer.constants[0], Constant::Function(_)));
    }

    #[test]
    fn function_ids_follow_opening_order() {
        let err = fail("function end function jumpf R0 @missing end");
        assert!(matches!(err, AsmError::UnresolvedLabel { function: 2, .. }));
    }

    #[test]
    fn end_without_open_function() {
        let err = fail("noop end");
        assert!(matches!(err, AsmError::UnbalancedEnd { index: 1 }));
    }

    #[test]
    fn unclosed_functions_at_end_of_input() {
        assert!(matches!(
            fail("function arity 1"),
            AsmError::UnclosedFunction { open: 1 }
        ));
        assert!(matches!(
            fail("function function"),
            AsmError::UnclosedFunction { open: 2 }
        ));
    }

    // ==================== Constants ====================

    #[test]
    fn literal_constants_append_in_order() {
        let program = assemble(concat!(
            "nil integer -12 float 2.5 string \"hi there\" boolean true ",
            "boolean false"
        ));
        assert_eq!(program.root.constants, vec![
            Constant::Nil,
            Constant::Integer(-12),
            Constant::Real(2.5),
            Constant::String("hi there".to_string()),
            Constant::Boolean(true),
            Constant::Boolean(false),
        ]);
    }

    #[test]
    fn integer_directive_accepts_symbolic_forms() {
        let program = assemble("nil integer #C");
        assert_eq!(program.root.constants, vec![
            Constant::Nil,
            Constant::Integer(1),
        ]);
    }

    #[test]
    fn empty_string_constant() {
        let program = assemble(r#"string """#);
        assert_eq!(program.root.constants, vec![Constant::String(String::new())]);
    }

    // ==================== Symbolic integers ====================

    #[test]
    fn pool_size_symbol_counts_existing_constants() {
        let program = assemble("integer 9 loadc R0 #C");
        assert_eq!(F.wide_of(program.root.words[0]), 1);
    }

    #[test]
    fn register_count_symbol_is_max_register_plus_one() {
        let program = assemble("copy R4 R2 invoke R0 #R");
        assert_eq!(F.arg_of(program.root.words[1], 2), 5);
    }

    #[test]
    fn register_count_includes_condition_registers() {
        let program = assemble("jumpf R9 @l label @l invoke R0 #R");
        assert_eq!(F.arg_of(program.root.words[1], 2), 10);
    }

    #[test]
    fn register_count_is_per_function() {
        let program = assemble("copy R9 R9 function invoke R0 #R end");
        let Constant::Function(child) = &program.root.constants[0] else {
            panic!("expected a function constant");
        };
        assert_eq!(F.arg_of(child.words[0], 2), 1);
    }

    // ==================== Errors ====================

    #[test]
    fn unknown_operation_reports_token_and_position() {
        let err = fail("bogus");
        assert!(matches!(
            err,
            AsmError::UnknownOperation { ref token, index: 0 } if token == "bogus"
        ));
    }

    #[test]
    fn invoke_with_non_register_operand() {
        let err = fail("invoke 5 2");
        assert!(matches!(
            err,
            AsmError::InvalidRegister { ref token, index: 1 } if token == "5"
        ));
    }

    #[test]
    fn malformed_registers() {
        assert!(matches!(fail("return r0"), AsmError::InvalidRegister { .. }));
        assert!(matches!(fail("return R-1"), AsmError::InvalidRegister { .. }));
        assert!(matches!(fail("return Rx"), AsmError::InvalidRegister { .. }));
    }

    #[test]
    fn operands_past_end_of_input_name_the_operation() {
        let err = fail("add R1 R2");
        assert!(matches!(
            err,
            AsmError::UnexpectedEndOfInput { ref operation } if operation == "add"
        ));
    }

    #[test]
    fn register_field_overflow() {
        let err = fail("return R256");
        assert!(matches!(err, AsmError::OperandOverflow { value: 256, bits: 8 }));
    }

    #[test]
    fn wide_field_overflow() {
        let err = fail("loadc R0 65536");
        assert!(matches!(
            err,
            AsmError::OperandOverflow {
                value: 65536,
                bits: 16
            }
        ));
    }

    #[test]
    fn negative_immediate_overflows() {
        let err = fail("invoke R0 -1");
        assert!(matches!(err, AsmError::OperandOverflow { value: -1, bits: 8 }));
    }

    #[test]
    fn header_range_is_u16() {
        assert_eq!(assemble("arity 65535").root.arity, 65535);
        assert!(matches!(
            fail("arity 65536"),
            AsmError::OperandOverflow { bits: 16, .. }
        ));
        assert!(matches!(
            fail("locals -1"),
            AsmError::OperandOverflow { bits: 16, .. }
        ));
    }

    #[test]
    fn malformed_labels() {
        assert!(matches!(fail("jump target"), AsmError::InvalidLabel { .. }));
        assert!(matches!(fail("jump @"), AsmError::InvalidLabel { .. }));
    }

    #[test]
    fn malformed_literals() {
        assert!(matches!(
            fail("integer five"),
            AsmError::InvalidOperand { expected: "integer", .. }
        ));
        assert!(matches!(
            fail("float x"),
            AsmError::InvalidOperand { expected: "float", .. }
        ));
        assert!(matches!(
            fail("boolean maybe"),
            AsmError::InvalidOperand { expected: "boolean", .. }
        ));
        assert!(matches!(
            fail("string unquoted"),
            AsmError::InvalidOperand { expected: "string literal", .. }
        ));
    }

    // ==================== End to end ====================

    #[test]
    fn countdown_loop_assembles_and_roundtrips() {
        let source = r#"
            arity 0 locals 0
            loadc R1 #C integer 3
            loadc R2 #C integer 1
            label @loop
            equal R3 R1 R2
            jumpf R3 @done
            sub R1 R1 R2
            jump @loop
            label @done
            return R1
        "#;
        let program = assemble(source);

        assert_eq!(program.root.words.len(), 7);
        // jumpf R3 @done -> offset 6, jump @loop -> offset 2.
        assert_eq!(program.root.words[3], 0x0F03_0006);
        assert_eq!(program.root.words[5], 0x1000_0002);

        let decoded = Program::from_bytes(F, &program.to_bytes()).unwrap();
        assert_eq!(decoded, program);
    }
}
