//! Jump layout
//!
//! Every jump starts in its short form. Each pass measures the stream,
//! records label positions, and promotes any short jump whose distance left
//! `[-128, 127]`. Promotion only grows the stream, so the loop reaches a fixed
//! point after at most one pass per jump; in practice one or two.

use neo_bytecode::{
    BytecodeError, Instruction, Opcode, fits_short, jump_operand, try_operand,
};

use crate::codegen::{FunctionBuffer, Item, Label};
use crate::error::{CompileError, CompileResult};

/// A fully laid out program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Script bytes
    pub script: Vec<u8>,
    /// Byte offset of each function, in emission order
    pub function_offsets: Vec<(String, usize)>,
    /// Resolved byte offset of every label
    pub labels: Vec<Option<usize>>,
    /// Layout passes until the fixed point
    pub passes: usize,
    /// Jumps promoted to the long form
    pub promoted: usize,
}

impl Assembly {
    /// Byte offset of a label
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.get(label.index()).copied().flatten()
    }
}

struct Entry<'a> {
    function: &'a str,
    position: usize,
    item: &'a Item,
}

impl Entry<'_> {
    fn fail(&self, source: BytecodeError) -> CompileError {
        CompileError::encoding(self.function, self.position, source)
    }
}

/// Lay out all functions in order and encode the final stream
pub fn assemble(functions: &[FunctionBuffer], label_count: usize) -> CompileResult<Assembly> {
    let entries = flatten(functions)?;
    let mut long = vec![false; entries.len()];
    let mut offsets = vec![0usize; entries.len()];
    let mut labels = vec![None; label_count];
    let mut passes = 0;

    loop {
        passes += 1;
        measure(&entries, &long, &mut offsets, &mut labels)?;

        let mut changed = false;
        for (i, entry) in entries.iter().enumerate() {
            if long[i] {
                continue;
            }
            let fits = match entry.item {
                Item::Jump { target, .. } => fits_short(distance(&labels, *target, offsets[i])?),
                Item::Try { catch, finally } => [catch, finally].into_iter().flatten().try_fold(
                    true,
                    |fits, &target| -> CompileResult<bool> {
                        Ok(fits && fits_short(distance(&labels, target, offsets[i])?))
                    },
                )?,
                _ => true,
            };
            if !fits {
                tracing::trace!(
                    function = entry.function,
                    position = entry.position,
                    "promoting jump to long form"
                );
                long[i] = true;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let mut script = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let base = offsets[i];
        match entry.item {
            Item::Instr(instruction) => instruction.encode_into(&mut script),
            Item::Jump { opcode, target } => {
                let form = jump_form(*opcode, long[i]).map_err(|e| entry.fail(e))?;
                let offset = distance(&labels, *target, base)?;
                let operand = jump_operand(form, offset).map_err(|e| entry.fail(e))?;
                Instruction::with_operand(form, operand)
                    .map_err(|e| entry.fail(e))?
                    .encode_into(&mut script);
            }
            Item::Try { catch, finally } => {
                let form = if long[i] { Opcode::TryL } else { Opcode::Try };
                let resolve = |target: &Option<Label>| -> CompileResult<i64> {
                    target.map_or(Ok(0), |label| distance(&labels, label, base))
                };
                let operand = try_operand(form, resolve(catch)?, resolve(finally)?)
                    .map_err(|e| entry.fail(e))?;
                Instruction::with_operand(form, operand)
                    .map_err(|e| entry.fail(e))?
                    .encode_into(&mut script);
            }
            Item::Place(_) => {}
        }
    }

    let function_offsets = functions
        .iter()
        .map(|f| {
            let offset = labels
                .get(f.entry.index())
                .copied()
                .flatten()
                .ok_or_else(|| CompileError::internal(format!("{} has no entry", f.name)))?;
            Ok((f.name.clone(), offset))
        })
        .collect::<CompileResult<Vec<_>>>()?;

    let promoted = long.iter().filter(|&&l| l).count();
    tracing::debug!(
        bytes = script.len(),
        passes,
        promoted,
        "layout reached fixed point"
    );

    Ok(Assembly {
        script,
        function_offsets,
        labels,
        passes,
        promoted,
    })
}

fn flatten(functions: &[FunctionBuffer]) -> CompileResult<Vec<Entry<'_>>> {
    let mut entries = Vec::new();
    for function in functions {
        let mut position = 0;
        for item in &function.items {
            let entry = Entry {
                function: &function.name,
                position,
                item,
            };
            if let Item::Jump { opcode, .. } = item {
                if !opcode.is_jump() {
                    return Err(entry.fail(BytecodeError::NotAJumpOpcode(*opcode)));
                }
            }
            if !matches!(item, Item::Place(_)) {
                position += 1;
            }
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn measure(
    entries: &[Entry<'_>],
    long: &[bool],
    offsets: &mut [usize],
    labels: &mut [Option<usize>],
) -> CompileResult<()> {
    labels.fill(None);
    let mut offset = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        offsets[i] = offset;
        offset += match entry.item {
            Item::Instr(instruction) => instruction.size(),
            Item::Jump { opcode, .. } => jump_form(*opcode, long[i])
                .map_err(|e| entry.fail(e))?
                .encoded_size(0),
            Item::Try { .. } if long[i] => Opcode::TryL.encoded_size(0),
            Item::Try { .. } => Opcode::Try.encoded_size(0),
            Item::Place(label) => {
                let slot = labels
                    .get_mut(label.index())
                    .ok_or_else(|| CompileError::internal(format!("unknown label {}", label.0)))?;
                if slot.is_some() {
                    return Err(CompileError::internal(format!(
                        "label {} placed twice",
                        label.0
                    )));
                }
                *slot = Some(offset);
                0
            }
        };
    }
    Ok(())
}

fn jump_form(opcode: Opcode, long: bool) -> Result<Opcode, BytecodeError> {
    let short = opcode.short_form().unwrap_or(opcode);
    if long {
        short.long_form().ok_or(BytecodeError::NotAJumpOpcode(opcode))
    } else {
        Ok(short)
    }
}

fn distance(labels: &[Option<usize>], target: Label, from: usize) -> CompileResult<i64> {
    let to = labels
        .get(target.index())
        .copied()
        .flatten()
        .ok_or_else(|| CompileError::internal(format!("label {} is never placed", target.0)))?;
    Ok(to as i64 - from as i64)
}
