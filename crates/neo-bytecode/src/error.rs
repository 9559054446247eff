//! Bytecode errors

use thiserror::Error;

use crate::instruction::Opcode;

/// Errors that can occur during bytecode operations
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Value cannot be encoded by the targeted opcode
    #[error("Invalid operand for {opcode}: {reason}")]
    InvalidOperand {
        /// Opcode the operand was meant for
        opcode: Opcode,
        /// What made the operand unrepresentable
        reason: String,
    },

    /// A jump encoding was requested for an opcode that does not jump
    #[error("{0} is not a jump opcode")]
    NotAJumpOpcode(Opcode),

    /// Byte that does not name any opcode
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Unexpected end of bytecode
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid magic number in container
    #[error("Invalid magic number: {0:#010x}")]
    InvalidMagic(u32),

    /// Stored checksum does not match the header
    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum found in the container
        stored: u32,
        /// Checksum recomputed from the header
        computed: u32,
    },

    /// Stored script hash does not match the script body
    #[error("Script hash does not match script body")]
    ScriptHashMismatch,

    /// Compiler name is not valid UTF-8
    #[error("Compiler name is not valid UTF-8")]
    InvalidCompilerName,

    /// A field exceeds the limit declared by the container format
    #[error("{field} length {len} exceeds maximum {max}")]
    ContainerOverflow {
        /// Field that overflowed
        field: &'static str,
        /// Actual length
        len: usize,
        /// Declared maximum
        max: usize,
    },

    /// Bytes left over after the container body
    #[error("{0} trailing bytes after container")]
    TrailingBytes(usize),

    /// IO error during serialization
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BytecodeError {
    /// Create an invalid operand error
    pub fn invalid_operand(opcode: Opcode, reason: impl Into<String>) -> Self {
        Self::InvalidOperand {
            opcode,
            reason: reason.into(),
        }
    }
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
