//! Relocatable operation templates
//!
//! Builtins without a single native opcode are implemented as instruction
//! fragments. Jumps inside a fragment name template-local labels rather than
//! byte offsets; when a fragment is spliced into a function buffer those
//! labels become ordinary buffer labels, so internal jumps are laid out by the
//! same pass as every other jump and a template's byte length is always
//! measured after encoding.
//!
//! Stack effects are written `[inputs] -> [outputs]`, top of stack last.

use neo_bytecode::{Instruction, Opcode, StackItemType, encode_convert, encode_int};
use serde::{Deserialize, Serialize};

use crate::ir::Type;

/// A label local to one template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateLabel(pub(crate) usize);

impl TemplateLabel {
    /// Index of this label within its template
    pub fn index(self) -> usize {
        self.0
    }
}

/// One template element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOp {
    /// A fully encoded instruction
    Instr(Instruction),
    /// A jump whose form is picked at layout time
    Jump {
        /// Jump family, short form
        opcode: Opcode,
        /// Local target
        target: TemplateLabel,
    },
    /// Marks the position of a label
    Place(TemplateLabel),
}

/// An instruction fragment with template-local jump targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    ops: Vec<TemplateOp>,
    labels: usize,
}

impl Template {
    /// Template name, used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Elements in order
    pub fn ops(&self) -> &[TemplateOp] {
        &self.ops
    }

    /// Number of local labels
    pub fn label_count(&self) -> usize {
        self.labels
    }

    /// Number of instructions, jumps included
    pub fn instruction_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| !matches!(op, TemplateOp::Place(_)))
            .count()
    }

    /// Concatenate two templates; `next` runs after `self` falls through
    pub fn then(mut self, next: Template) -> Template {
        let shift = self.labels;
        let relabel = |label: TemplateLabel| TemplateLabel(label.0 + shift);
        self.ops.extend(next.ops.into_iter().map(|op| match op {
            TemplateOp::Jump { opcode, target } => TemplateOp::Jump {
                opcode,
                target: relabel(target),
            },
            TemplateOp::Place(label) => TemplateOp::Place(relabel(label)),
            instr => instr,
        }));
        self.labels += next.labels;
        self.name = format!("{}+{}", self.name, next.name);
        self
    }
}

/// Builds a [`Template`]
///
/// Label 0 is reserved for the template end and placed by [`build`].
///
/// [`build`]: TemplateBuilder::build
#[derive(Debug)]
pub struct TemplateBuilder {
    name: String,
    ops: Vec<TemplateOp>,
    labels: usize,
}

impl TemplateBuilder {
    /// Start a template
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
            labels: 1,
        }
    }

    /// Label placed after the last instruction
    pub fn end(&self) -> TemplateLabel {
        TemplateLabel(0)
    }

    /// Allocate a label
    pub fn label(&mut self) -> TemplateLabel {
        let label = TemplateLabel(self.labels);
        self.labels += 1;
        label
    }

    /// Place a label at the current position
    pub fn place(&mut self, label: TemplateLabel) -> &mut Self {
        self.ops.push(TemplateOp::Place(label));
        self
    }

    /// Append an operand-less opcode
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.instr(Instruction::new(opcode))
    }

    /// Append several operand-less opcodes
    pub fn ops(&mut self, opcodes: &[Opcode]) -> &mut Self {
        for &opcode in opcodes {
            self.op(opcode);
        }
        self
    }

    /// Append an encoded instruction
    pub fn instr(&mut self, instruction: Instruction) -> &mut Self {
        self.ops.push(TemplateOp::Instr(instruction));
        self
    }

    /// Append an integer push
    pub fn push(&mut self, value: i64) -> &mut Self {
        self.instr(encode_int(value))
    }

    /// Append a `CONVERT`
    pub fn convert(&mut self, target: StackItemType) -> &mut Self {
        self.instr(encode_convert(target))
    }

    /// Append a jump to a local label
    pub fn jump(&mut self, opcode: Opcode, target: TemplateLabel) -> &mut Self {
        self.ops.push(TemplateOp::Jump { opcode, target });
        self
    }

    /// Append a syscall
    pub fn syscall(&mut self, name: &str) -> &mut Self {
        self.instr(Instruction::syscall(name))
    }

    /// Finish, placing the end label
    pub fn build(mut self) -> Template {
        self.ops.push(TemplateOp::Place(TemplateLabel(0)));
        Template {
            name: self.name,
            ops: self.ops,
            labels: self.labels,
        }
    }
}

/// Builtin operations implemented by templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// ASCII upper-case
    Upper,
    /// ASCII lower-case
    Lower,
    /// All bytes are decimal digits
    IsDigit,
    /// Split on a separator
    Split,
    /// Copy a sub-range
    Slice,
    /// Append every item of another list
    Extend,
    /// List of `0..n`
    Range,
    /// RIPEMD-160 of SHA-256
    Hash160,
    /// Double SHA-256
    Hash256,
}

impl TemplateKind {
    /// Pick the variant for the resolved operand type
    ///
    /// Returns `None` when no variant exists for that type.
    pub fn instantiate(self, operand: Type) -> Option<Template> {
        let byte_string = operand.is_byte_string();
        match self {
            Self::Upper if byte_string => Some(change_case(true)),
            Self::Lower if byte_string => Some(change_case(false)),
            Self::IsDigit if byte_string => Some(is_digit()),
            Self::Split if byte_string => Some(split()),
            Self::Slice if byte_string => Some(substring()),
            Self::Slice if operand == Type::List => Some(list_slice()),
            Self::Extend if operand == Type::List => Some(extend()),
            Self::Range if matches!(operand, Type::Int | Type::Any) => Some(range()),
            Self::Hash160 => Some(syscall(SHA256).then(syscall(RIPEMD160))),
            Self::Hash256 => Some(syscall(SHA256).then(syscall(SHA256))),
            _ => None,
        }
    }

    /// Does the operation leave a result on the stack
    pub fn returns_value(self) -> bool {
        !matches!(self, Self::Extend)
    }
}

/// SHA-256 service name
pub const SHA256: &str = "Neo.Crypto.SHA256";

/// RIPEMD-160 service name
pub const RIPEMD160: &str = "Neo.Crypto.RIPEMD160";

/// A single syscall as a template, for composition
pub fn syscall(name: &str) -> Template {
    let mut t = TemplateBuilder::new(name);
    t.syscall(name);
    t.build()
}

/// `[s] -> [s']` with ASCII letters of one case flipped to the other
fn change_case(upper: bool) -> Template {
    use Opcode::*;
    let (name, from, to, shift) = if upper {
        ("upper", 0x61, 0x7B, Sub)
    } else {
        ("lower", 0x41, 0x5B, Add)
    };

    let mut t = TemplateBuilder::new(name);
    let (body, keep, next, test) = (t.label(), t.label(), t.label(), t.label());

    t.convert(StackItemType::Buffer).op(Push0).jump(Jmp, test);
    t.place(body)
        .ops(&[Over, Over, PickItem, Dup])
        .push(from)
        .push(to)
        .op(Within)
        .jump(JmpIfNot, keep);
    t.push(0x20).op(shift);
    t.ops(&[Push2, Pick, Push2, Pick, Rot, SetItem]).jump(Jmp, next);
    t.place(keep).op(Drop);
    t.place(next).op(Inc);
    t.place(test)
        .ops(&[Dup, Push2, Pick, Size, Lt])
        .jump(JmpIf, body);
    t.op(Drop).convert(StackItemType::ByteString);
    t.build()
}

/// `[s] -> [bool]`, false for the empty string
fn is_digit() -> Template {
    use Opcode::*;
    let mut t = TemplateBuilder::new("isdigit");
    let (body, fail, empty) = (t.label(), t.label(), t.label());
    let end = t.end();

    t.ops(&[Dup, Size]).jump(JmpIfNot, empty);
    t.op(Push0);
    t.place(body)
        .ops(&[Over, Over, PickItem])
        .push(0x30)
        .push(0x3A)
        .op(Within)
        .jump(JmpIfNot, fail);
    t.op(Inc)
        .ops(&[Dup, Push2, Pick, Size, Lt])
        .jump(JmpIf, body);
    t.ops(&[Drop, Drop, Push1]).jump(Jmp, end);
    t.place(fail).op(Drop);
    t.place(empty).ops(&[Drop, Push0]);
    t.build()
}

/// `[s, sep] -> [pieces]`; an empty separator faults
fn split() -> Template {
    use Opcode::*;
    let mut t = TemplateBuilder::new("split");
    let (body, next, test) = (t.label(), t.label(), t.label());

    // [r, s, sep, start, i]
    t.ops(&[Dup, Size, Assert, NewArray0, Rot, Rot, Push0, Push0])
        .jump(Jmp, test);

    t.place(body)
        .ops(&[Push3, Pick, Over, Push4, Pick, Size, Substr])
        .convert(StackItemType::ByteString)
        .ops(&[Push3, Pick, Equal])
        .jump(JmpIfNot, next);

    // Separator found at i: append s[start..i], resume after it.
    t.ops(&[Push4, Pick, Push4, Pick, Push3, Pick, Push3, Pick, Over, Sub, Substr])
        .convert(StackItemType::ByteString)
        .ops(&[Append, Nip, Over, Size, Add, Dup])
        .jump(Jmp, test);

    t.place(next).op(Inc);
    t.place(test)
        .ops(&[Dup, Push3, Pick, Size, Add, Push4, Pick, Size, Le])
        .jump(JmpIf, body);

    t.ops(&[Drop, Nip, Over, Size, Over, Sub, Substr])
        .convert(StackItemType::ByteString)
        .ops(&[Over, Swap, Append]);
    t.build()
}

/// `[s, start, end] -> [s[start..end]]` for byte strings, bounds clamped
fn substring() -> Template {
    use Opcode::*;
    let mut t = TemplateBuilder::new("slice_bytes");
    t.ops(&[Swap, Push2, Pick, Size, Min, Swap])
        .ops(&[Push2, Pick, Size, Min, Over, Sub, Push0, Max, Substr])
        .convert(StackItemType::ByteString);
    t.build()
}

/// `[l, start, end] -> [copy]` for lists, end clamped
fn list_slice() -> Template {
    use Opcode::*;
    let mut t = TemplateBuilder::new("slice_list");
    let (body, test) = (t.label(), t.label());

    // [r, end, l, i]
    t.ops(&[Push2, Pick, Size, Min, Swap, NewArray0, Reverse4, Rot])
        .jump(Jmp, test);
    t.place(body)
        .ops(&[Push3, Pick, Push2, Pick, Push2, Pick, PickItem, Append, Inc]);
    t.place(test)
        .ops(&[Dup, Push3, Pick, Lt])
        .jump(JmpIf, body);
    t.ops(&[Drop, Drop, Drop]);
    t.build()
}

/// `[l, other] -> []`
fn extend() -> Template {
    use Opcode::*;
    let mut t = TemplateBuilder::new("extend");
    let (body, test) = (t.label(), t.label());

    // [l, other, n, i] with n = SIZE(other) taken before the first APPEND
    t.ops(&[Dup, Size, Push0]).jump(Jmp, test);
    t.place(body)
        .ops(&[Push3, Pick, Push3, Pick, Push2, Pick, PickItem, Append, Inc]);
    t.place(test)
        .ops(&[Dup, Push2, Pick, Lt])
        .jump(JmpIf, body);
    t.ops(&[Drop, Drop, Drop, Drop]);
    t.build()
}

/// `[n] -> [[0, 1, .., n - 1]]`
fn range() -> Template {
    use Opcode::*;
    let mut t = TemplateBuilder::new("range");
    let (body, test) = (t.label(), t.label());

    // [r, n, i]
    t.ops(&[NewArray0, Swap, Push0]).jump(Jmp, test);
    t.place(body).ops(&[Push2, Pick, Over, Append, Inc]);
    t.place(test)
        .ops(&[Dup, Push2, Pick, Lt])
        .jump(JmpIf, body);
    t.ops(&[Drop, Drop]);
    t.build()
}
