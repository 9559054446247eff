//! Operand encoding
//!
//! Pure translation from semantic values (integers, byte strings, jump
//! distances, slot indices) to wire encodings. Nothing here has side effects
//! besides a warning on lossy integer truncation.

use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::instruction::{Instruction, Opcode};

/// Which slot array a load or store addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// Function local variable
    Local,
    /// Function argument
    Argument,
    /// Contract-wide static field
    Static,
}

/// Stack item type tags used by `CONVERT`, `ISTYPE` and `NEWARRAY_T`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StackItemType {
    /// Any item
    Any = 0x00,
    /// Instruction pointer
    Pointer = 0x10,
    /// Boolean
    Boolean = 0x20,
    /// Integer
    Integer = 0x21,
    /// Immutable byte string
    ByteString = 0x28,
    /// Mutable byte buffer
    Buffer = 0x30,
    /// Array
    Array = 0x40,
    /// Struct
    Struct = 0x41,
    /// Map
    Map = 0x48,
    /// Opaque interop object
    InteropInterface = 0x60,
}

impl StackItemType {
    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

const SMALL_INTS: [Opcode; 17] = [
    Opcode::Push0,
    Opcode::Push1,
    Opcode::Push2,
    Opcode::Push3,
    Opcode::Push4,
    Opcode::Push5,
    Opcode::Push6,
    Opcode::Push7,
    Opcode::Push8,
    Opcode::Push9,
    Opcode::Push10,
    Opcode::Push11,
    Opcode::Push12,
    Opcode::Push13,
    Opcode::Push14,
    Opcode::Push15,
    Opcode::Push16,
];

const INT_WIDTHS: [(usize, Opcode); 6] = [
    (1, Opcode::PushInt8),
    (2, Opcode::PushInt16),
    (4, Opcode::PushInt32),
    (8, Opcode::PushInt64),
    (16, Opcode::PushInt128),
    (32, Opcode::PushInt256),
];

/// Encode an integer literal push
///
/// `-1..=16` use the dedicated single-byte opcodes. Anything else is written as
/// minimal little-endian two's complement, sign-extended to the next supported
/// width. Values wider than 32 bytes are truncated to 32 bytes; the result is
/// then no longer the requested value.
pub fn encode_integer_push(value: &BigInt) -> Instruction {
    if let Some(small) = value.to_i64() {
        if small == -1 {
            return Instruction::new(Opcode::PushM1);
        }
        if (0..=16).contains(&small) {
            return Instruction::new(SMALL_INTS[small as usize]);
        }
    }

    let mut bytes = value.to_signed_bytes_le();
    let (width, opcode) = match INT_WIDTHS.iter().find(|(w, _)| *w >= bytes.len()) {
        Some(&found) => found,
        None => {
            tracing::warn!(
                width = bytes.len(),
                "integer literal wider than 32 bytes, truncating"
            );
            bytes.truncate(32);
            (32, Opcode::PushInt256)
        }
    };
    let fill = if value.sign() == Sign::Minus { 0xFF } else { 0x00 };
    bytes.resize(width, fill);
    Instruction::from_parts(opcode, bytes)
}

/// Encode a push of a machine-sized integer
pub fn encode_int(value: i64) -> Instruction {
    encode_integer_push(&BigInt::from(value))
}

/// Encode a boolean push (`PUSH1` / `PUSH0`)
pub fn encode_bool_push(value: bool) -> Instruction {
    Instruction::new(if value { Opcode::Push1 } else { Opcode::Push0 })
}

/// Encode a byte string push with the narrowest length prefix
pub fn encode_data_push(data: &[u8]) -> Result<Instruction> {
    let len = data.len();
    let (opcode, mut operand) = if let Ok(len) = u8::try_from(len) {
        (Opcode::PushData1, vec![len])
    } else if let Ok(len) = u16::try_from(len) {
        (Opcode::PushData2, len.to_le_bytes().to_vec())
    } else if let Ok(len) = u32::try_from(len) {
        (Opcode::PushData4, len.to_le_bytes().to_vec())
    } else {
        return Err(BytecodeError::invalid_operand(
            Opcode::PushData4,
            format!("{len} bytes exceed the 4-byte length prefix"),
        ));
    };
    operand.extend_from_slice(data);
    Ok(Instruction::from_parts(opcode, operand))
}

/// Encode a text push; text is stored as UTF-8
pub fn encode_text_push(text: &str) -> Result<Instruction> {
    encode_data_push(text.as_bytes())
}

/// Encode a jump, call or `ENDTRY` over `distance` bytes
///
/// `distance` is `target - jump_offset`, measured as if the jump were short.
/// With `jump_through` the jump lands one byte further, on the instruction
/// following the one-byte instruction that ends at `distance`. When the
/// offset does not fit one signed byte the long form is used; a forward
/// distance then grows by the three extra operand bytes.
pub fn encode_jump(kind: Opcode, distance: i64, jump_through: bool) -> Result<Instruction> {
    if !kind.is_jump() {
        return Err(BytecodeError::NotAJumpOpcode(kind));
    }
    let short = kind.short_form().unwrap_or(kind);
    let distance = distance + i64::from(jump_through);

    if let Ok(offset) = i8::try_from(distance) {
        return Ok(Instruction::from_parts(short, offset.to_le_bytes().to_vec()));
    }

    let long = short
        .long_form()
        .ok_or(BytecodeError::NotAJumpOpcode(short))?;
    let grown = if distance > 0 { distance + 3 } else { distance };
    Ok(Instruction::from_parts(long, jump_operand(long, grown)?))
}

/// Encode a `TRY` with catch and finally offsets (zero means absent)
///
/// Offsets are measured from the `TRY` opcode as if it were short; when the
/// long form is needed, present offsets grow by the six extra operand bytes.
pub fn encode_try(catch: i64, finally: i64) -> Result<Instruction> {
    if let (Ok(c), Ok(f)) = (i8::try_from(catch), i8::try_from(finally)) {
        return Ok(Instruction::from_parts(
            Opcode::Try,
            vec![c.to_le_bytes()[0], f.to_le_bytes()[0]],
        ));
    }
    let grow = |offset: i64| if offset > 0 { offset + 6 } else { offset };
    Ok(Instruction::from_parts(
        Opcode::TryL,
        try_operand(Opcode::TryL, grow(catch), grow(finally))?,
    ))
}

/// Encode `offset` exactly as the operand of `opcode`, without promotion
pub fn jump_operand(opcode: Opcode, offset: i64) -> Result<Vec<u8>> {
    let width = opcode
        .offset_width()
        .ok_or(BytecodeError::NotAJumpOpcode(opcode))?;
    encode_offset(opcode, offset, width)
}

/// Encode both `TRY` offsets exactly, without promotion
pub fn try_operand(opcode: Opcode, catch: i64, finally: i64) -> Result<Vec<u8>> {
    if !opcode.is_try() {
        return Err(BytecodeError::NotAJumpOpcode(opcode));
    }
    let width = if opcode.is_long_form() { 4 } else { 1 };
    let mut operand = encode_offset(opcode, catch, width)?;
    operand.extend(encode_offset(opcode, finally, width)?);
    Ok(operand)
}

/// Does `offset` fit the short (one signed byte) jump form
#[inline]
pub fn fits_short(offset: i64) -> bool {
    i8::try_from(offset).is_ok()
}

fn encode_offset(opcode: Opcode, offset: i64, width: usize) -> Result<Vec<u8>> {
    let out_of_range =
        || BytecodeError::invalid_operand(opcode, format!("offset {offset} out of range"));
    if width == 1 {
        let byte = i8::try_from(offset).map_err(|_| out_of_range())?;
        Ok(byte.to_le_bytes().to_vec())
    } else {
        let word = i32::try_from(offset).map_err(|_| out_of_range())?;
        Ok(word.to_le_bytes().to_vec())
    }
}

fn slot_opcode(kind: SlotKind, index: usize, load: bool) -> Result<Instruction> {
    let (first, generic) = match (kind, load) {
        (SlotKind::Local, true) => (Opcode::LdLoc0, Opcode::LdLoc),
        (SlotKind::Local, false) => (Opcode::StLoc0, Opcode::StLoc),
        (SlotKind::Argument, true) => (Opcode::LdArg0, Opcode::LdArg),
        (SlotKind::Argument, false) => (Opcode::StArg0, Opcode::StArg),
        (SlotKind::Static, true) => (Opcode::LdSFld0, Opcode::LdSFld),
        (SlotKind::Static, false) => (Opcode::StSFld0, Opcode::StSFld),
    };

    if index <= 6 {
        // The seven dedicated opcodes are contiguous and precede the generic one.
        if let Some(op) = Opcode::from_byte(first.to_byte() + index as u8) {
            return Ok(Instruction::new(op));
        }
    }
    let index = u8::try_from(index).map_err(|_| {
        BytecodeError::invalid_operand(generic, format!("slot index {index} exceeds 255"))
    })?;
    Ok(Instruction::from_parts(generic, vec![index]))
}

/// Load from a local, argument or static slot
pub fn load_slot(kind: SlotKind, index: usize) -> Result<Instruction> {
    slot_opcode(kind, index, true)
}

/// Store into a local, argument or static slot
pub fn store_slot(kind: SlotKind, index: usize) -> Result<Instruction> {
    slot_opcode(kind, index, false)
}

/// Encode a `CONVERT` to the given item type
pub fn encode_convert(target: StackItemType) -> Instruction {
    Instruction::from_parts(Opcode::Convert, vec![target.to_byte()])
}

/// Encode the `INITSLOT` that opens a function
///
/// The runtime rejects a frame with neither locals nor arguments, so
/// callers emit nothing in that case.
pub fn encode_init_slot(locals: usize, args: usize) -> Result<Instruction> {
    if locals == 0 && args == 0 {
        return Err(BytecodeError::invalid_operand(
            Opcode::InitSlot,
            "needs at least one local or argument",
        ));
    }
    let count = |n: usize, what: &str| {
        u8::try_from(n).map_err(|_| {
            BytecodeError::invalid_operand(Opcode::InitSlot, format!("{n} {what} exceed 255"))
        })
    };
    Ok(Instruction::from_parts(
        Opcode::InitSlot,
        vec![count(locals, "locals")?, count(args, "arguments")?],
    ))
}

/// Encode the `INITSSLOT` that sizes the static field array
pub fn encode_init_static_slot(fields: usize) -> Result<Instruction> {
    match u8::try_from(fields) {
        Ok(0) => Err(BytecodeError::invalid_operand(
            Opcode::InitSSlot,
            "needs at least one static field",
        )),
        Ok(n) => Ok(Instruction::from_parts(Opcode::InitSSlot, vec![n])),
        Err(_) => Err(BytecodeError::invalid_operand(
            Opcode::InitSSlot,
            format!("{fields} static fields exceed 255"),
        )),
    }
}
