//! # Neo Bytecode
//!
//! This crate defines the NeoVM instruction model and the NEF container that
//! wraps a compiled script for deployment.
//!
//! ## Design Principles
//!
//! - **Stack-based**: Operations work on the evaluation stack and fixed slots
//! - **Compact**: Push and jump encodings are picked by operand magnitude
//! - **Deterministic**: Identical inputs always serialize to identical bytes
//! - **Verifiable**: Containers re-parse with checksum and script hash checks

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod error;
pub mod hash;
pub mod instruction;
pub mod nef;
pub mod operand;

pub use decode::{DecodedInstruction, disassemble, listing};
pub use error::{BytecodeError, Result};
pub use hash::{ScriptHash, interop_hash};
pub use instruction::{Instruction, OperandLayout, Opcode};
pub use nef::{NefFile, Version};
pub use operand::{
    SlotKind, StackItemType, encode_bool_push, encode_convert, encode_data_push,
    encode_init_slot, encode_init_static_slot, encode_int, encode_integer_push, encode_jump,
    encode_text_push, encode_try, fits_short, jump_operand, load_slot, store_slot, try_operand,
};

/// Magic number at the start of every NEF container ("NEF3", little-endian)
pub const NEF_MAGIC: u32 = 0x3346_454E;

/// Maximum script length accepted by the container format
pub const MAX_SCRIPT_LENGTH: usize = 1024 * 1024;
