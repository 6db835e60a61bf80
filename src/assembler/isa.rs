//! Instruction set definitions.
//!
//! The `operations!` macro holds the canonical operation list (opcode tag
//! plus assembly mnemonic) and expands into the [`Op`] enum with its lookup
//! tables. Pseudo-instructions that shape the current compilation context
//! without emitting an opcode word are listed separately as [`Directive`]s.
//!
//! See [`word`](super::word) for how a tag and its operand fields pack into
//! an opcode word, and [`encoder`](super::encoder) for operand arities.

macro_rules! operations {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $tag:expr, $mnemonic:literal
        ),* $(,)?
    ) => {
        /// A bytecode operation that assembles to one opcode word.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Op {
            $(
                $(#[$doc])*
                $name,
            )*
        }

        impl Op {
            /// Every operation, in opcode-tag order.
            pub const ALL: &'static [Op] = &[ $( Op::$name, )* ];

            /// Returns the operation tag packed into the word's top field.
            pub const fn tag(&self) -> u8 {
                match self {
                    $( Op::$name => $tag, )*
                }
            }

            /// Returns the assembly mnemonic for this operation.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Op::$name => $mnemonic, )*
                }
            }

            /// Looks up an operation by its mnemonic.
            pub fn from_mnemonic(token: &str) -> Option<Op> {
                match token {
                    $( $mnemonic => Some(Op::$name), )*
                    _ => None,
                }
            }
        }
    };
}

operations! {
    /// loadc dst, index ; dst = constants[index]
    LoadConstant = 0x00, "loadc",
    /// loadg dst, name ; dst = globals[name], name register holds the key
    LoadGlobal = 0x01, "loadg",
    /// invoke base, argc ; call the function in base with argc arguments
    Invoke = 0x02, "invoke",
    /// return src ; return the value in src to the caller
    Return = 0x03, "return",
    /// copy dst, src ; dst = src
    Copy = 0x04, "copy",
    /// equal dst, a, b ; dst = (a == b)
    Equal = 0x05, "equal",
    /// lt dst, a, b ; dst = (a < b)
    Lt = 0x06, "lt",
    /// lte dst, a, b ; dst = (a <= b)
    Lte = 0x07, "lte",
    /// gt dst, a, b ; dst = (a > b)
    Gt = 0x08, "gt",
    /// gte dst, a, b ; dst = (a >= b)
    Gte = 0x09, "gte",
    /// add dst, a, b ; dst = a + b
    Add = 0x0A, "add",
    /// sub dst, a, b ; dst = a - b
    Sub = 0x0B, "sub",
    /// mult dst, a, b ; dst = a * b
    Mult = 0x0C, "mult",
    /// div dst, a, b ; dst = a / b
    Div = 0x0D, "div",
    /// noop ; does nothing
    Noop = 0x0E, "noop",
    /// jumpf cond, @target ; jump to target when cond holds false
    JumpFalse = 0x0F, "jumpf",
    /// jump @target ; unconditional jump
    Jump = 0x10, "jump",
    /// storeg name, value ; globals[name] = value
    StoreGlobal = 0x11, "storeg",
    /// not dst, src ; dst = !src
    Not = 0x12, "not",
    /// mapset map, key, value ; map[key] = value
    MapSet = 0x13, "mapset",
    /// newmap dst ; dst = fresh empty map
    NewMap = 0x14, "newmap",
}

/// A pseudo-instruction that shapes the current context instead of emitting
/// an opcode word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Directive {
    /// arity n ; declare the parameter count of the current function
    Arity,
    /// locals n ; declare the local-slot count of the current function
    Locals,
    /// nil ; append a nil constant to the pool
    Nil,
    /// integer n ; append an integer constant to the pool
    Integer,
    /// float x ; append a real constant to the pool
    Float,
    /// string "..." ; append a string constant to the pool
    String,
    /// boolean true|false ; append a boolean constant to the pool
    Boolean,
    /// function ; open a nested function body
    Function,
    /// end ; close the innermost open function body
    End,
    /// label @name ; bind name to the next instruction offset
    Label,
}

impl Directive {
    /// Every directive.
    pub const ALL: &'static [Directive] = &[
        Directive::Arity,
        Directive::Locals,
        Directive::Nil,
        Directive::Integer,
        Directive::Float,
        Directive::String,
        Directive::Boolean,
        Directive::Function,
        Directive::End,
        Directive::Label,
    ];

    /// Returns the assembly mnemonic for this directive.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Directive::Arity => "arity",
            Directive::Locals => "locals",
            Directive::Nil => "nil",
            Directive::Integer => "integer",
            Directive::Float => "float",
            Directive::String => "string",
            Directive::Boolean => "boolean",
            Directive::Function => "function",
            Directive::End => "end",
            Directive::Label => "label",
        }
    }

    /// Looks up a directive by its mnemonic.
    pub fn from_mnemonic(token: &str) -> Option<Directive> {
        Directive::ALL
            .iter()
            .copied()
            .find(|directive| directive.mnemonic() == token)
    }
}
