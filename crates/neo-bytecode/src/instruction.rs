//! NeoVM opcodes and encoded instructions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::hash::interop_hash;

/// Shape of the operand that follows an opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    /// No operand
    Empty,
    /// Operand of exactly this many bytes
    Fixed(usize),
    /// Little-endian length prefix of this many bytes, then that many data bytes
    Prefixed(usize),
}

use OperandLayout::{Empty, Fixed, Prefixed};

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $byte:literal, $mnemonic:literal, $layout:expr; )*) => {
        /// NeoVM opcodes
        ///
        /// Stack-based instruction set. Operands, when present, follow the opcode
        /// byte directly; jump operands are signed offsets measured from the
        /// jump's own opcode byte.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $variant = $byte, )*
        }

        impl Opcode {
            /// Convert from raw byte
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Get the runtime mnemonic of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $mnemonic, )*
                }
            }

            /// Get the operand layout of this opcode
            pub const fn operand_layout(self) -> OperandLayout {
                match self {
                    $( Self::$variant => $layout, )*
                }
            }

            /// Every opcode, in byte order
            pub const ALL: &'static [Opcode] = &[ $( Self::$variant, )* ];
        }
    };
}

opcodes! {
    // ==================== Constants ====================
    /// Push a 1-byte signed integer
    PushInt8 = 0x00, "PUSHINT8", Fixed(1);
    /// Push a 2-byte signed integer
    PushInt16 = 0x01, "PUSHINT16", Fixed(2);
    /// Push a 4-byte signed integer
    PushInt32 = 0x02, "PUSHINT32", Fixed(4);
    /// Push an 8-byte signed integer
    PushInt64 = 0x03, "PUSHINT64", Fixed(8);
    /// Push a 16-byte signed integer
    PushInt128 = 0x04, "PUSHINT128", Fixed(16);
    /// Push a 32-byte signed integer
    PushInt256 = 0x05, "PUSHINT256", Fixed(32);
    /// Push a pointer relative to this instruction
    PushA = 0x0A, "PUSHA", Fixed(4);
    /// Push null
    PushNull = 0x0B, "PUSHNULL", Empty;
    /// Push data with a 1-byte length prefix
    PushData1 = 0x0C, "PUSHDATA1", Prefixed(1);
    /// Push data with a 2-byte length prefix
    PushData2 = 0x0D, "PUSHDATA2", Prefixed(2);
    /// Push data with a 4-byte length prefix
    PushData4 = 0x0E, "PUSHDATA4", Prefixed(4);
    /// Push -1
    PushM1 = 0x0F, "PUSHM1", Empty;
    /// Push 0
    Push0 = 0x10, "PUSH0", Empty;
    /// Push 1
    Push1 = 0x11, "PUSH1", Empty;
    /// Push 2
    Push2 = 0x12, "PUSH2", Empty;
    /// Push 3
    Push3 = 0x13, "PUSH3", Empty;
    /// Push 4
    Push4 = 0x14, "PUSH4", Empty;
    /// Push 5
    Push5 = 0x15, "PUSH5", Empty;
    /// Push 6
    Push6 = 0x16, "PUSH6", Empty;
    /// Push 7
    Push7 = 0x17, "PUSH7", Empty;
    /// Push 8
    Push8 = 0x18, "PUSH8", Empty;
    /// Push 9
    Push9 = 0x19, "PUSH9", Empty;
    /// Push 10
    Push10 = 0x1A, "PUSH10", Empty;
    /// Push 11
    Push11 = 0x1B, "PUSH11", Empty;
    /// Push 12
    Push12 = 0x1C, "PUSH12", Empty;
    /// Push 13
    Push13 = 0x1D, "PUSH13", Empty;
    /// Push 14
    Push14 = 0x1E, "PUSH14", Empty;
    /// Push 15
    Push15 = 0x1F, "PUSH15", Empty;
    /// Push 16
    Push16 = 0x20, "PUSH16", Empty;

    // ==================== Control Flow ====================
    /// No operation
    Nop = 0x21, "NOP", Empty;
    /// Unconditional jump (1-byte offset)
    Jmp = 0x22, "JMP", Fixed(1);
    /// Unconditional jump (4-byte offset)
    JmpL = 0x23, "JMP_L", Fixed(4);
    /// Jump if true (1-byte offset)
    JmpIf = 0x24, "JMPIF", Fixed(1);
    /// Jump if true (4-byte offset)
    JmpIfL = 0x25, "JMPIF_L", Fixed(4);
    /// Jump if false (1-byte offset)
    JmpIfNot = 0x26, "JMPIFNOT", Fixed(1);
    /// Jump if false (4-byte offset)
    JmpIfNotL = 0x27, "JMPIFNOT_L", Fixed(4);
    /// Jump if equal (1-byte offset)
    JmpEq = 0x28, "JMPEQ", Fixed(1);
    /// Jump if equal (4-byte offset)
    JmpEqL = 0x29, "JMPEQ_L", Fixed(4);
    /// Jump if not equal (1-byte offset)
    JmpNe = 0x2A, "JMPNE", Fixed(1);
    /// Jump if not equal (4-byte offset)
    JmpNeL = 0x2B, "JMPNE_L", Fixed(4);
    /// Jump if greater (1-byte offset)
    JmpGt = 0x2C, "JMPGT", Fixed(1);
    /// Jump if greater (4-byte offset)
    JmpGtL = 0x2D, "JMPGT_L", Fixed(4);
    /// Jump if greater or equal (1-byte offset)
    JmpGe = 0x2E, "JMPGE", Fixed(1);
    /// Jump if greater or equal (4-byte offset)
    JmpGeL = 0x2F, "JMPGE_L", Fixed(4);
    /// Jump if less (1-byte offset)
    JmpLt = 0x30, "JMPLT", Fixed(1);
    /// Jump if less (4-byte offset)
    JmpLtL = 0x31, "JMPLT_L", Fixed(4);
    /// Jump if less or equal (1-byte offset)
    JmpLe = 0x32, "JMPLE", Fixed(1);
    /// Jump if less or equal (4-byte offset)
    JmpLeL = 0x33, "JMPLE_L", Fixed(4);
    /// Call function (1-byte offset)
    Call = 0x34, "CALL", Fixed(1);
    /// Call function (4-byte offset)
    CallL = 0x35, "CALL_L", Fixed(4);
    /// Call the pointer on top of the stack
    CallA = 0x36, "CALLA", Empty;
    /// Abort execution unconditionally
    Abort = 0x38, "ABORT", Empty;
    /// Fault unless the top of the stack is true
    Assert = 0x39, "ASSERT", Empty;
    /// Throw the top of the stack
    Throw = 0x3A, "THROW", Empty;
    /// Begin try block (1-byte catch and finally offsets)
    Try = 0x3B, "TRY", Fixed(2);
    /// Begin try block (4-byte catch and finally offsets)
    TryL = 0x3C, "TRY_L", Fixed(8);
    /// Leave try or catch block (1-byte offset)
    EndTry = 0x3D, "ENDTRY", Fixed(1);
    /// Leave try or catch block (4-byte offset)
    EndTryL = 0x3E, "ENDTRY_L", Fixed(4);
    /// Leave finally block
    EndFinally = 0x3F, "ENDFINALLY", Empty;
    /// Return from function
    Ret = 0x40, "RET", Empty;
    /// Invoke a runtime interop service by hash
    Syscall = 0x41, "SYSCALL", Fixed(4);

    // ==================== Stack ====================
    /// Push the stack depth
    Depth = 0x43, "DEPTH", Empty;
    /// Discard the top item
    Drop = 0x45, "DROP", Empty;
    /// Discard the second item
    Nip = 0x46, "NIP", Empty;
    /// Discard the item at index n
    XDrop = 0x48, "XDROP", Empty;
    /// Discard every item
    Clear = 0x49, "CLEAR", Empty;
    /// Duplicate the top item
    Dup = 0x4A, "DUP", Empty;
    /// Copy the second item to the top
    Over = 0x4B, "OVER", Empty;
    /// Copy the item at index n to the top
    Pick = 0x4D, "PICK", Empty;
    /// Copy the top item below the second
    Tuck = 0x4E, "TUCK", Empty;
    /// Swap the top two items
    Swap = 0x50, "SWAP", Empty;
    /// Move the third item to the top
    Rot = 0x51, "ROT", Empty;
    /// Move the item at index n to the top
    Roll = 0x52, "ROLL", Empty;
    /// Reverse the top three items
    Reverse3 = 0x53, "REVERSE3", Empty;
    /// Reverse the top four items
    Reverse4 = 0x54, "REVERSE4", Empty;
    /// Reverse the top n items
    ReverseN = 0x55, "REVERSEN", Empty;

    // ==================== Slots ====================
    /// Initialize the static field slot
    InitSSlot = 0x56, "INITSSLOT", Fixed(1);
    /// Initialize local and argument slots
    InitSlot = 0x57, "INITSLOT", Fixed(2);
    /// Load static field 0
    LdSFld0 = 0x58, "LDSFLD0", Empty;
    /// Load static field 1
    LdSFld1 = 0x59, "LDSFLD1", Empty;
    /// Load static field 2
    LdSFld2 = 0x5A, "LDSFLD2", Empty;
    /// Load static field 3
    LdSFld3 = 0x5B, "LDSFLD3", Empty;
    /// Load static field 4
    LdSFld4 = 0x5C, "LDSFLD4", Empty;
    /// Load static field 5
    LdSFld5 = 0x5D, "LDSFLD5", Empty;
    /// Load static field 6
    LdSFld6 = 0x5E, "LDSFLD6", Empty;
    /// Load static field by index
    LdSFld = 0x5F, "LDSFLD", Fixed(1);
    /// Store static field 0
    StSFld0 = 0x60, "STSFLD0", Empty;
    /// Store static field 1
    StSFld1 = 0x61, "STSFLD1", Empty;
    /// Store static field 2
    StSFld2 = 0x62, "STSFLD2", Empty;
    /// Store static field 3
    StSFld3 = 0x63, "STSFLD3", Empty;
    /// Store static field 4
    StSFld4 = 0x64, "STSFLD4", Empty;
    /// Store static field 5
    StSFld5 = 0x65, "STSFLD5", Empty;
    /// Store static field 6
    StSFld6 = 0x66, "STSFLD6", Empty;
    /// Store static field by index
    StSFld = 0x67, "STSFLD", Fixed(1);
    /// Load local 0
    LdLoc0 = 0x68, "LDLOC0", Empty;
    /// Load local 1
    LdLoc1 = 0x69, "LDLOC1", Empty;
    /// Load local 2
    LdLoc2 = 0x6A, "LDLOC2", Empty;
    /// Load local 3
    LdLoc3 = 0x6B, "LDLOC3", Empty;
    /// Load local 4
    LdLoc4 = 0x6C, "LDLOC4", Empty;
    /// Load local 5
    LdLoc5 = 0x6D, "LDLOC5", Empty;
    /// Load local 6
    LdLoc6 = 0x6E, "LDLOC6", Empty;
    /// Load local by index
    LdLoc = 0x6F, "LDLOC", Fixed(1);
    /// Store local 0
    StLoc0 = 0x70, "STLOC0", Empty;
    /// Store local 1
    StLoc1 = 0x71, "STLOC1", Empty;
    /// Store local 2
    StLoc2 = 0x72, "STLOC2", Empty;
    /// Store local 3
    StLoc3 = 0x73, "STLOC3", Empty;
    /// Store local 4
    StLoc4 = 0x74, "STLOC4", Empty;
    /// Store local 5
    StLoc5 = 0x75, "STLOC5", Empty;
    /// Store local 6
    StLoc6 = 0x76, "STLOC6", Empty;
    /// Store local by index
    StLoc = 0x77, "STLOC", Fixed(1);
    /// Load argument 0
    LdArg0 = 0x78, "LDARG0", Empty;
    /// Load argument 1
    LdArg1 = 0x79, "LDARG1", Empty;
    /// Load argument 2
    LdArg2 = 0x7A, "LDARG2", Empty;
    /// Load argument 3
    LdArg3 = 0x7B, "LDARG3", Empty;
    /// Load argument 4
    LdArg4 = 0x7C, "LDARG4", Empty;
    /// Load argument 5
    LdArg5 = 0x7D, "LDARG5", Empty;
    /// Load argument 6
    LdArg6 = 0x7E, "LDARG6", Empty;
    /// Load argument by index
    LdArg = 0x7F, "LDARG", Fixed(1);
    /// Store argument 0
    StArg0 = 0x80, "STARG0", Empty;
    /// Store argument 1
    StArg1 = 0x81, "STARG1", Empty;
    /// Store argument 2
    StArg2 = 0x82, "STARG2", Empty;
    /// Store argument 3
    StArg3 = 0x83, "STARG3", Empty;
    /// Store argument 4
    StArg4 = 0x84, "STARG4", Empty;
    /// Store argument 5
    StArg5 = 0x85, "STARG5", Empty;
    /// Store argument 6
    StArg6 = 0x86, "STARG6", Empty;
    /// Store argument by index
    StArg = 0x87, "STARG", Fixed(1);

    // ==================== Splice ====================
    /// Create a zeroed buffer
    NewBuffer = 0x88, "NEWBUFFER", Empty;
    /// Copy bytes between buffers
    Memcpy = 0x89, "MEMCPY", Empty;
    /// Concatenate two byte strings into a buffer
    Cat = 0x8B, "CAT", Empty;
    /// Extract a byte range into a buffer
    Substr = 0x8C, "SUBSTR", Empty;
    /// Keep the leftmost n bytes
    Left = 0x8D, "LEFT", Empty;
    /// Keep the rightmost n bytes
    Right = 0x8E, "RIGHT", Empty;

    // ==================== Bitwise ====================
    /// Bitwise NOT
    Invert = 0x90, "INVERT", Empty;
    /// Bitwise AND
    And = 0x91, "AND", Empty;
    /// Bitwise OR
    Or = 0x92, "OR", Empty;
    /// Bitwise XOR
    Xor = 0x93, "XOR", Empty;
    /// Equality of any two items
    Equal = 0x97, "EQUAL", Empty;
    /// Inequality of any two items
    NotEqual = 0x98, "NOTEQUAL", Empty;

    // ==================== Arithmetic ====================
    /// Sign of an integer
    Sign = 0x99, "SIGN", Empty;
    /// Absolute value
    Abs = 0x9A, "ABS", Empty;
    /// Negation
    Negate = 0x9B, "NEGATE", Empty;
    /// Increment
    Inc = 0x9C, "INC", Empty;
    /// Decrement
    Dec = 0x9D, "DEC", Empty;
    /// Addition
    Add = 0x9E, "ADD", Empty;
    /// Subtraction
    Sub = 0x9F, "SUB", Empty;
    /// Multiplication
    Mul = 0xA0, "MUL", Empty;
    /// Truncating division
    Div = 0xA1, "DIV", Empty;
    /// Remainder
    Mod = 0xA2, "MOD", Empty;
    /// Exponentiation
    Pow = 0xA3, "POW", Empty;
    /// Integer square root
    Sqrt = 0xA4, "SQRT", Empty;
    /// Shift left
    Shl = 0xA8, "SHL", Empty;
    /// Arithmetic shift right
    Shr = 0xA9, "SHR", Empty;
    /// Logical NOT
    Not = 0xAA, "NOT", Empty;
    /// Logical AND
    BoolAnd = 0xAB, "BOOLAND", Empty;
    /// Logical OR
    BoolOr = 0xAC, "BOOLOR", Empty;
    /// Non-zero test
    Nz = 0xB1, "NZ", Empty;
    /// Numeric equality
    NumEqual = 0xB3, "NUMEQUAL", Empty;
    /// Numeric inequality
    NumNotEqual = 0xB4, "NUMNOTEQUAL", Empty;
    /// Less than
    Lt = 0xB5, "LT", Empty;
    /// Less than or equal
    Le = 0xB6, "LE", Empty;
    /// Greater than
    Gt = 0xB7, "GT", Empty;
    /// Greater than or equal
    Ge = 0xB8, "GE", Empty;
    /// Minimum of two integers
    Min = 0xB9, "MIN", Empty;
    /// Maximum of two integers
    Max = 0xBA, "MAX", Empty;
    /// Half-open range test: a <= x < b
    Within = 0xBB, "WITHIN", Empty;

    // ==================== Compound Types ====================
    /// Pack n key/value pairs into a map
    PackMap = 0xBE, "PACKMAP", Empty;
    /// Pack n items into a struct
    PackStruct = 0xBF, "PACKSTRUCT", Empty;
    /// Pack n items into an array
    Pack = 0xC0, "PACK", Empty;
    /// Unpack a compound item onto the stack
    Unpack = 0xC1, "UNPACK", Empty;
    /// Create an empty array
    NewArray0 = 0xC2, "NEWARRAY0", Empty;
    /// Create an array of n nulls
    NewArray = 0xC3, "NEWARRAY", Empty;
    /// Create an array of n default items of a type
    NewArrayT = 0xC4, "NEWARRAY_T", Fixed(1);
    /// Create an empty struct
    NewStruct0 = 0xC5, "NEWSTRUCT0", Empty;
    /// Create a struct of n nulls
    NewStruct = 0xC6, "NEWSTRUCT", Empty;
    /// Create an empty map
    NewMap = 0xC8, "NEWMAP", Empty;
    /// Size of an item
    Size = 0xCA, "SIZE", Empty;
    /// Key or index membership
    HasKey = 0xCB, "HASKEY", Empty;
    /// Keys of a map
    Keys = 0xCC, "KEYS", Empty;
    /// Values of a compound item
    Values = 0xCD, "VALUES", Empty;
    /// Read an element
    PickItem = 0xCE, "PICKITEM", Empty;
    /// Append to an array
    Append = 0xCF, "APPEND", Empty;
    /// Write an element
    SetItem = 0xD0, "SETITEM", Empty;
    /// Reverse an array or buffer in place
    ReverseItems = 0xD1, "REVERSEITEMS", Empty;
    /// Remove an element
    Remove = 0xD2, "REMOVE", Empty;
    /// Remove every element
    ClearItems = 0xD3, "CLEARITEMS", Empty;
    /// Remove and push the last element
    PopItem = 0xD4, "POPITEM", Empty;

    // ==================== Types ====================
    /// Null test
    IsNull = 0xD8, "ISNULL", Empty;
    /// Type test
    IsType = 0xD9, "ISTYPE", Fixed(1);
    /// Type conversion
    Convert = 0xDB, "CONVERT", Fixed(1);
}

impl Opcode {
    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Is this a single-offset jump or call (including `ENDTRY`)
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jmp
                | Self::JmpL
                | Self::JmpIf
                | Self::JmpIfL
                | Self::JmpIfNot
                | Self::JmpIfNotL
                | Self::JmpEq
                | Self::JmpEqL
                | Self::JmpNe
                | Self::JmpNeL
                | Self::JmpGt
                | Self::JmpGtL
                | Self::JmpGe
                | Self::JmpGeL
                | Self::JmpLt
                | Self::JmpLtL
                | Self::JmpLe
                | Self::JmpLeL
                | Self::Call
                | Self::CallL
                | Self::EndTry
                | Self::EndTryL
        )
    }

    /// Is this a `TRY` marker (two offsets)
    pub const fn is_try(self) -> bool {
        matches!(self, Self::Try | Self::TryL)
    }

    /// Long (4-byte offset) counterpart of a short jump, call or try
    pub const fn long_form(self) -> Option<Self> {
        match self {
            Self::Jmp => Some(Self::JmpL),
            Self::JmpIf => Some(Self::JmpIfL),
            Self::JmpIfNot => Some(Self::JmpIfNotL),
            Self::JmpEq => Some(Self::JmpEqL),
            Self::JmpNe => Some(Self::JmpNeL),
            Self::JmpGt => Some(Self::JmpGtL),
            Self::JmpGe => Some(Self::JmpGeL),
            Self::JmpLt => Some(Self::JmpLtL),
            Self::JmpLe => Some(Self::JmpLeL),
            Self::Call => Some(Self::CallL),
            Self::EndTry => Some(Self::EndTryL),
            Self::Try => Some(Self::TryL),
            _ => None,
        }
    }

    /// Short (1-byte offset) counterpart of a long jump, call or try
    pub const fn short_form(self) -> Option<Self> {
        match self {
            Self::JmpL => Some(Self::Jmp),
            Self::JmpIfL => Some(Self::JmpIf),
            Self::JmpIfNotL => Some(Self::JmpIfNot),
            Self::JmpEqL => Some(Self::JmpEq),
            Self::JmpNeL => Some(Self::JmpNe),
            Self::JmpGtL => Some(Self::JmpGt),
            Self::JmpGeL => Some(Self::JmpGe),
            Self::JmpLtL => Some(Self::JmpLt),
            Self::JmpLeL => Some(Self::JmpLe),
            Self::CallL => Some(Self::Call),
            Self::EndTryL => Some(Self::EndTry),
            Self::TryL => Some(Self::Try),
            _ => None,
        }
    }

    /// Is this the long member of a jump family
    pub const fn is_long_form(self) -> bool {
        self.short_form().is_some()
    }

    /// Width in bytes of one jump offset carried by this opcode
    pub const fn offset_width(self) -> Option<usize> {
        if self.is_jump() || self.is_try() {
            if self.is_long_form() { Some(4) } else { Some(1) }
        } else {
            None
        }
    }

    /// Encoded size of this opcode with an operand of `data_len` data bytes
    pub const fn encoded_size(self, data_len: usize) -> usize {
        match self.operand_layout() {
            Empty => 1,
            Fixed(n) => 1 + n,
            Prefixed(p) => 1 + p + data_len,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An encoded instruction: an opcode and its raw operand bytes
///
/// For length-prefixed opcodes the operand includes the prefix, so
/// `size() == 1 + operand().len()` for every instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    opcode: Opcode,
    operand: Vec<u8>,
}

impl Instruction {
    /// Create an instruction without operand
    pub fn new(opcode: Opcode) -> Self {
        debug_assert!(
            opcode.operand_layout() == Empty,
            "{opcode} requires an operand"
        );
        Self {
            opcode,
            operand: Vec::new(),
        }
    }

    /// Create an instruction with raw operand bytes, validated against the layout
    pub fn with_operand(opcode: Opcode, operand: Vec<u8>) -> Result<Self> {
        match opcode.operand_layout() {
            Empty if !operand.is_empty() => {
                return Err(BytecodeError::invalid_operand(opcode, "takes no operand"));
            }
            Fixed(n) if operand.len() != n => {
                return Err(BytecodeError::invalid_operand(
                    opcode,
                    format!("expected {n} operand bytes, got {}", operand.len()),
                ));
            }
            Prefixed(p) => {
                if operand.len() < p {
                    return Err(BytecodeError::invalid_operand(opcode, "missing length prefix"));
                }
                let declared = read_le_unsigned(&operand[..p]);
                if declared != (operand.len() - p) as u64 {
                    return Err(BytecodeError::invalid_operand(
                        opcode,
                        format!(
                            "length prefix {declared} does not match {} data bytes",
                            operand.len() - p
                        ),
                    ));
                }
            }
            _ => {}
        }
        Ok(Self { opcode, operand })
    }

    /// Assemble an instruction whose operand the caller has already encoded
    pub(crate) fn from_parts(opcode: Opcode, operand: Vec<u8>) -> Self {
        Self { opcode, operand }
    }

    /// Create a `SYSCALL` for the named interop service
    pub fn syscall(name: &str) -> Self {
        Self {
            opcode: Opcode::Syscall,
            operand: interop_hash(name).to_vec(),
        }
    }

    /// Get the opcode
    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Get the raw operand bytes (including any length prefix)
    #[inline]
    pub fn operand(&self) -> &[u8] {
        &self.operand
    }

    /// Get the operand without its length prefix
    pub fn data(&self) -> &[u8] {
        match self.opcode.operand_layout() {
            Prefixed(p) => &self.operand[p..],
            _ => &self.operand,
        }
    }

    /// Encoded size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        1 + self.operand.len()
    }

    /// Append the encoded instruction to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode.to_byte());
        out.extend_from_slice(&self.operand);
    }

    /// Encode the instruction to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.encode_into(&mut out);
        out
    }

    /// Signed offset of a single-offset jump, call or `ENDTRY`
    pub fn jump_offset(&self) -> Option<i64> {
        if !self.opcode.is_jump() {
            return None;
        }
        Some(read_le_signed(&self.operand))
    }

    /// Catch and finally offsets of a `TRY` (zero means absent)
    pub fn try_offsets(&self) -> Option<(i64, i64)> {
        let width = match self.opcode {
            Opcode::Try => 1,
            Opcode::TryL => 4,
            _ => return None,
        };
        Some((
            read_le_signed(&self.operand[..width]),
            read_le_signed(&self.operand[width..]),
        ))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if let Some(offset) = self.jump_offset() {
            write!(f, " {offset:+}")
        } else if let Some((catch, finally)) = self.try_offsets() {
            write!(f, " {catch:+} {finally:+}")
        } else if !self.operand.is_empty() {
            write!(f, " 0x{}", hex::encode(self.data()))
        } else {
            Ok(())
        }
    }
}

/// Read a little-endian unsigned integer of up to 8 bytes
pub(crate) fn read_le_unsigned(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Read a little-endian two's-complement integer of up to 8 bytes
pub(crate) fn read_le_signed(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let unsigned = read_le_unsigned(bytes);
    let bits = bytes.len() * 8;
    if bits >= 64 {
        return unsigned as i64;
    }
    let shift = 64 - bits;
    ((unsigned << shift) as i64) >> shift
}
