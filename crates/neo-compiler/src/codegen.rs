//! Function buffers and symbolic labels

use neo_bytecode::{Instruction, Opcode};
use rustc_hash::FxHashMap;

use crate::error::{CompileError, CompileResult};
use crate::layout::{Assembly, assemble};
use crate::templates::{Template, TemplateLabel, TemplateOp};

/// A program-wide jump target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) usize);

impl Label {
    /// Index into the label table
    pub fn index(self) -> usize {
        self.0
    }
}

/// One element of a function buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Fully encoded instruction
    Instr(Instruction),
    /// Jump, call or `ENDTRY` whose form is picked at layout time
    Jump {
        /// Jump family, short form
        opcode: Opcode,
        /// Target label
        target: Label,
    },
    /// `TRY` with optional catch and finally targets
    Try {
        /// Catch block
        catch: Option<Label>,
        /// Finally block
        finally: Option<Label>,
    },
    /// Label position marker; encodes to nothing
    Place(Label),
}

/// Function being compiled
#[derive(Debug)]
pub struct FunctionBuffer {
    /// Function name
    pub name: String,
    /// Label placed at the function's first byte
    pub entry: Label,
    /// Number of local slots
    pub locals: usize,
    /// Number of argument slots
    pub args: usize,
    /// Items in order
    pub items: Vec<Item>,
}

impl FunctionBuffer {
    /// Create a buffer whose first item is its entry label
    pub fn new(name: impl Into<String>, entry: Label, locals: usize, args: usize) -> Self {
        Self {
            name: name.into(),
            entry,
            locals,
            args,
            items: vec![Item::Place(entry)],
        }
    }

    /// Get the number of instructions emitted so far
    pub fn current_index(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !matches!(item, Item::Place(_)))
            .count()
    }
}

/// Code generator state
///
/// Labels are allocated program-wide so calls can target other functions'
/// entry labels; all offsets are resolved together in [`CodeGen::finish`].
#[derive(Debug, Default)]
pub struct CodeGen {
    /// Finished functions
    pub functions: Vec<FunctionBuffer>,
    /// Function being compiled
    current: Option<FunctionBuffer>,
    /// Entry label per function name
    entries: FxHashMap<String, Label>,
    /// Next label index
    next_label: usize,
    /// Items emitted while no function was open
    stray: usize,
}

impl CodeGen {
    /// Create a new code generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a label
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Entry label of a function, allocated on first use
    pub fn function_label(&mut self, name: &str) -> Label {
        if let Some(&label) = self.entries.get(name) {
            return label;
        }
        let label = self.new_label();
        self.entries.insert(name.to_string(), label);
        label
    }

    /// Start compiling a function
    pub fn enter_function(&mut self, name: &str, locals: usize, args: usize) -> CompileResult<()> {
        if let Some(open) = &self.current {
            return Err(CompileError::internal(format!(
                "{name} started while {} is open",
                open.name
            )));
        }
        let entry = self.function_label(name);
        self.current = Some(FunctionBuffer::new(name, entry, locals, args));
        Ok(())
    }

    /// Finish compiling the current function
    pub fn exit_function(&mut self) -> CompileResult<()> {
        let func = self
            .current
            .take()
            .ok_or_else(|| CompileError::internal("no function to exit"))?;
        self.functions.push(func);
        Ok(())
    }

    fn push(&mut self, item: Item) {
        match self.current.as_mut() {
            Some(buffer) => buffer.items.push(item),
            None => self.stray += 1,
        }
    }

    /// Name of the function being compiled
    pub fn function_name(&self) -> &str {
        self.current.as_ref().map_or("<none>", |f| f.name.as_str())
    }

    /// Emit an instruction
    pub fn emit(&mut self, instruction: Instruction) {
        self.push(Item::Instr(instruction));
    }

    /// Emit an operand-less opcode
    pub fn emit_op(&mut self, opcode: Opcode) {
        self.emit(Instruction::new(opcode));
    }

    /// Emit a jump to a label
    pub fn emit_jump(&mut self, opcode: Opcode, target: Label) {
        self.push(Item::Jump { opcode, target });
    }

    /// Emit a `TRY`
    pub fn emit_try(&mut self, catch: Option<Label>, finally: Option<Label>) {
        self.push(Item::Try { catch, finally });
    }

    /// Place a label at the current position
    pub fn place(&mut self, label: Label) {
        self.push(Item::Place(label));
    }

    /// Get current instruction index
    pub fn current_index(&self) -> usize {
        self.current.as_ref().map_or(0, FunctionBuffer::current_index)
    }

    /// Splice a template, mapping its local labels to fresh labels
    pub fn splice(&mut self, template: &Template) {
        let base = self.next_label;
        self.next_label += template.label_count();
        let map = |local: TemplateLabel| Label(base + local.index());

        for op in template.ops() {
            self.push(match op {
                TemplateOp::Instr(instruction) => Item::Instr(instruction.clone()),
                TemplateOp::Jump { opcode, target } => Item::Jump {
                    opcode: *opcode,
                    target: map(*target),
                },
                TemplateOp::Place(label) => Item::Place(map(*label)),
            });
        }
        tracing::trace!(
            template = template.name(),
            labels = template.label_count(),
            "spliced template"
        );
    }

    /// Lay out every function and resolve all labels
    pub fn finish(mut self) -> CompileResult<Assembly> {
        if self.current.is_some() {
            self.exit_function()?;
        }
        if self.stray > 0 {
            return Err(CompileError::internal(format!(
                "{} items emitted outside any function",
                self.stray
            )));
        }
        assemble(&self.functions, self.next_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_unique() {
        let mut cg = CodeGen::new();
        let a = cg.new_label();
        let b = cg.new_label();
        assert_ne!(a, b);
        assert_eq!(cg.function_label("f"), cg.function_label("f"));
        assert_ne!(cg.function_label("f"), cg.function_label("g"));
    }

    #[test]
    fn test_current_index_skips_labels() {
        let mut cg = CodeGen::new();
        cg.enter_function("f", 0, 0).unwrap();
        let label = cg.new_label();
        cg.emit_op(Opcode::Nop);
        cg.place(label);
        cg.emit_jump(Opcode::Jmp, label);
        assert_eq!(cg.current_index(), 2);
        assert_eq!(cg.function_name(), "f");
    }

    #[test]
    fn test_emission_outside_function_is_internal_error() {
        let mut cg = CodeGen::new();
        cg.emit_op(Opcode::Ret);
        assert!(matches!(cg.finish(), Err(CompileError::Internal(_))));
    }

    #[test]
    fn test_nested_enter_is_internal_error() {
        let mut cg = CodeGen::new();
        cg.enter_function("f", 0, 0).unwrap();
        assert!(matches!(
            cg.enter_function("g", 0, 0),
            Err(CompileError::Internal(_))
        ));
    }

    #[test]
    fn test_splice_allocates_fresh_labels() {
        let template = crate::templates::TemplateKind::Range
            .instantiate(crate::ir::Type::Int)
            .unwrap();
        let mut cg = CodeGen::new();
        cg.enter_function("f", 0, 0).unwrap();
        cg.splice(&template);
        cg.splice(&template);
        cg.exit_function().unwrap();

        let targets: Vec<Label> = cg.functions[0]
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Jump { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        let half = targets.len() / 2;
        for (first, second) in targets[..half].iter().zip(&targets[half..]) {
            assert_eq!(second.index() - first.index(), template.label_count());
        }
    }
}
