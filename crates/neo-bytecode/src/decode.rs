//! Script disassembly

use std::fmt;

use crate::error::{BytecodeError, Result};
use crate::instruction::{Instruction, OperandLayout, Opcode, read_le_unsigned};

/// An instruction together with its byte offset in the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// The decoded instruction
    pub instruction: Instruction,
}

impl DecodedInstruction {
    /// Absolute targets of this instruction's jump offsets, if any
    ///
    /// Zero `TRY` offsets mean "no handler" and are skipped.
    pub fn targets(&self) -> Vec<i64> {
        let base = self.offset as i64;
        if let Some(offset) = self.instruction.jump_offset() {
            return vec![base + offset];
        }
        if let Some((catch, finally)) = self.instruction.try_offsets() {
            return [catch, finally]
                .into_iter()
                .filter(|&o| o != 0)
                .map(|o| base + o)
                .collect();
        }
        Vec::new()
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.instruction)
    }
}

/// Decode a script into its instruction sequence
pub fn disassemble(script: &[u8]) -> Result<Vec<DecodedInstruction>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor < script.len() {
        let offset = cursor;
        let byte = script[cursor];
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))?;
        cursor += 1;

        let operand_len = match opcode.operand_layout() {
            OperandLayout::Empty => 0,
            OperandLayout::Fixed(n) => n,
            OperandLayout::Prefixed(p) => {
                let prefix = take(script, cursor, p)?;
                p + read_le_unsigned(prefix) as usize
            }
        };
        let operand = take(script, cursor, operand_len)?.to_vec();
        cursor += operand_len;

        out.push(DecodedInstruction {
            offset,
            instruction: Instruction::with_operand(opcode, operand)?,
        });
    }

    Ok(out)
}

/// Render a script as one instruction per line
pub fn listing(script: &[u8]) -> Result<String> {
    let mut text = String::new();
    for decoded in disassemble(script)? {
        text.push_str(&decoded.to_string());
        text.push('\n');
    }
    Ok(text)
}

fn take(buf: &[u8], cursor: usize, len: usize) -> Result<&[u8]> {
    let end = cursor
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or(BytecodeError::UnexpectedEnd(cursor))?;
    Ok(&buf[cursor..end])
}
