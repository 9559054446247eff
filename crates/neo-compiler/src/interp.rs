//! Minimal evaluator for generated scripts
//!
//! Covers the opcodes emitted by the templates and the statement lowerings,
//! with NeoVM stack semantics. Compound items are shared by reference, so
//! aliasing (a list extended with itself, a buffer picked and mutated)
//! behaves as it does on chain.

use std::cell::RefCell;
use std::rc::Rc;

use neo_bytecode::{Opcode, StackItemType, disassemble};
use rustc_hash::FxHashMap;

use crate::codegen::CodeGen;
use crate::templates::Template;

const MAX_STEPS: usize = 10_000;

/// A stack item
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Array(Rc<RefCell<Vec<Value>>>),
    Null,
}

impl Value {
    pub fn text(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }

    pub fn list(items: impl IntoIterator<Item = i64>) -> Self {
        Self::array(items.into_iter().map(Self::Int).collect())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn int(&self) -> Result<i64, String> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Bool(b) => Ok(i64::from(*b)),
            other => Err(format!("{other:?} is not an integer")),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Bool(b) => *b,
            Self::Bytes(b) => b.iter().any(|&x| x != 0),
            Self::Null => false,
            Self::Buffer(_) | Self::Array(_) => true,
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, String> {
        match self {
            Self::Bytes(b) => Ok(b.clone()),
            Self::Buffer(b) => Ok(b.borrow().clone()),
            other => Err(format!("{other:?} is not a byte string")),
        }
    }

    /// Items of an array of integers
    pub fn ints(&self) -> Vec<i64> {
        match self {
            Self::Array(items) => items.borrow().iter().map(|v| v.int().unwrap()).collect(),
            other => panic!("{other:?} is not an array"),
        }
    }

    /// Items of an array of byte strings, as text
    pub fn texts(&self) -> Vec<String> {
        match self {
            Self::Array(items) => items
                .borrow()
                .iter()
                .map(|v| String::from_utf8(v.bytes().unwrap()).unwrap())
                .collect(),
            other => panic!("{other:?} is not an array"),
        }
    }
}

/// Lay out a template followed by `RET`
pub fn assemble_template(template: &Template) -> Vec<u8> {
    let mut cg = CodeGen::new();
    cg.enter_function("template", 0, 0).unwrap();
    cg.splice(template);
    cg.emit_op(Opcode::Ret);
    cg.finish().unwrap().script
}

/// Run a template on the given stack
pub fn run_template(template: &Template, stack: Vec<Value>) -> Result<Vec<Value>, String> {
    run(&assemble_template(template), stack)
}

/// Run a script from offset 0 until its first `RET`
pub fn run(script: &[u8], stack: Vec<Value>) -> Result<Vec<Value>, String> {
    let code = disassemble(script).map_err(|e| e.to_string())?;
    let index: FxHashMap<usize, usize> = code
        .iter()
        .enumerate()
        .map(|(i, d)| (d.offset, i))
        .collect();

    let mut vm = Machine {
        stack,
        locals: Vec::new(),
        args: Vec::new(),
    };
    let mut pc = 0;

    for _ in 0..MAX_STEPS {
        let decoded = code.get(pc).ok_or("ran past the end of the script")?;
        let instruction = &decoded.instruction;
        let opcode = instruction.opcode();
        let byte = opcode.to_byte();
        let mut next = pc + 1;

        let jump = |taken: bool| -> Result<Option<usize>, String> {
            if !taken {
                return Ok(None);
            }
            let offset = instruction.jump_offset().ok_or("not a jump")?;
            let target = (decoded.offset as i64 + offset) as usize;
            index
                .get(&target)
                .copied()
                .map(Some)
                .ok_or_else(|| format!("jump into the middle of an instruction at {target}"))
        };

        use Opcode::*;
        match opcode {
            PushM1 | Push0 | Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8
            | Push9 | Push10 | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 => {
                vm.push(Value::Int(i64::from(byte) - i64::from(Push0.to_byte())));
            }
            PushInt8 | PushInt16 | PushInt32 | PushInt64 => {
                let data = instruction.data();
                let fill = if data[data.len() - 1] & 0x80 != 0 { 0xFF } else { 0 };
                let mut word = [fill; 8];
                word[..data.len()].copy_from_slice(data);
                vm.push(Value::Int(i64::from_le_bytes(word)));
            }
            PushNull => vm.push(Value::Null),
            PushData1 | PushData2 | PushData4 => vm.push(Value::Bytes(instruction.data().to_vec())),

            Jmp | JmpL => next = jump(true)?.unwrap_or(next),
            JmpIf | JmpIfL => {
                let taken = vm.pop()?.truthy();
                next = jump(taken)?.unwrap_or(next);
            }
            JmpIfNot | JmpIfNotL => {
                let taken = !vm.pop()?.truthy();
                next = jump(taken)?.unwrap_or(next);
            }
            Ret => return Ok(vm.stack),
            Assert => {
                if !vm.pop()?.truthy() {
                    return Err("ASSERT failed".to_string());
                }
            }
            Throw => return Err(format!("THROW {:?}", vm.pop()?)),

            Drop => {
                vm.pop()?;
            }
            Nip => {
                let top = vm.pop()?;
                vm.pop()?;
                vm.push(top);
            }
            Dup => vm.push(vm.peek(0)?),
            Over => vm.push(vm.peek(1)?),
            Pick => {
                let n = vm.pop()?.int()? as usize;
                vm.push(vm.peek(n)?);
            }
            Swap => {
                let len = vm.depth(2)?;
                vm.stack.swap(len - 1, len - 2);
            }
            Rot => {
                let len = vm.depth(3)?;
                let item = vm.stack.remove(len - 3);
                vm.push(item);
            }
            Reverse4 => {
                let len = vm.depth(4)?;
                vm.stack[len - 4..].reverse();
            }

            InitSlot => {
                let data = instruction.data();
                let args = (0..data[1]).map(|_| vm.pop()).collect::<Result<_, _>>()?;
                vm.locals = vec![Value::Null; usize::from(data[0])];
                vm.args = args;
            }
            _ if (LdLoc0.to_byte()..=LdLoc6.to_byte()).contains(&byte) => {
                let slot = usize::from(byte - LdLoc0.to_byte());
                vm.push(vm.locals[slot].clone());
            }
            _ if (StLoc0.to_byte()..=StLoc6.to_byte()).contains(&byte) => {
                let slot = usize::from(byte - StLoc0.to_byte());
                vm.locals[slot] = vm.pop()?;
            }
            _ if (LdArg0.to_byte()..=LdArg6.to_byte()).contains(&byte) => {
                let slot = usize::from(byte - LdArg0.to_byte());
                vm.push(vm.args[slot].clone());
            }

            Inc => {
                let v = vm.pop()?.int()?;
                vm.push(Value::Int(v + 1));
            }
            Add | Sub | Min | Max => {
                let b = vm.pop()?.int()?;
                let a = vm.pop()?.int()?;
                vm.push(Value::Int(match opcode {
                    Add => a + b,
                    Sub => a - b,
                    Min => a.min(b),
                    _ => a.max(b),
                }));
            }
            Lt | Le | NumEqual => {
                let b = vm.pop()?.int()?;
                let a = vm.pop()?.int()?;
                vm.push(Value::Bool(match opcode {
                    Lt => a < b,
                    Le => a <= b,
                    _ => a == b,
                }));
            }
            Within => {
                let hi = vm.pop()?.int()?;
                let lo = vm.pop()?.int()?;
                let x = vm.pop()?.int()?;
                vm.push(Value::Bool(lo <= x && x < hi));
            }
            Equal => {
                let b = vm.pop()?;
                let a = vm.pop()?;
                let same = match (&a, &b) {
                    (Value::Bytes(x), Value::Bytes(y)) => x == y,
                    (Value::Int(x), Value::Int(y)) => x == y,
                    (Value::Buffer(x), Value::Buffer(y)) => Rc::ptr_eq(x, y),
                    (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
                    _ => false,
                };
                vm.push(Value::Bool(same));
            }

            NewArray0 => vm.push(Value::array(Vec::new())),
            Size => {
                let len = match vm.pop()? {
                    Value::Array(items) => items.borrow().len(),
                    other => other.bytes()?.len(),
                };
                vm.push(Value::Int(len as i64));
            }
            PickItem => {
                let key = vm.pop()?.int()? as usize;
                let item = match vm.pop()? {
                    Value::Array(items) => items.borrow().get(key).cloned(),
                    other => other.bytes()?.get(key).map(|&b| Value::Int(i64::from(b))),
                };
                vm.push(item.ok_or_else(|| format!("index {key} out of range"))?);
            }
            SetItem => {
                let value = vm.pop()?;
                let key = vm.pop()?.int()? as usize;
                match vm.pop()? {
                    Value::Array(items) => {
                        *items.borrow_mut().get_mut(key).ok_or("index out of range")? = value;
                    }
                    Value::Buffer(bytes) => {
                        *bytes.borrow_mut().get_mut(key).ok_or("index out of range")? =
                            value.int()? as u8;
                    }
                    other => return Err(format!("SETITEM on {other:?}")),
                }
            }
            Append => {
                let item = vm.pop()?;
                match vm.pop()? {
                    Value::Array(items) => items.borrow_mut().push(item),
                    other => return Err(format!("APPEND to {other:?}")),
                }
            }
            Substr => {
                let count = vm.pop()?.int()?;
                let start = vm.pop()?.int()?;
                let bytes = vm.pop()?.bytes()?;
                if start < 0 || count < 0 || (start + count) as usize > bytes.len() {
                    return Err(format!("SUBSTR {start}+{count} of {} bytes", bytes.len()));
                }
                let piece = bytes[start as usize..(start + count) as usize].to_vec();
                vm.push(Value::Buffer(Rc::new(RefCell::new(piece))));
            }
            Convert => {
                let item = vm.pop()?;
                let target = instruction.data()[0];
                let converted = if target == StackItemType::ByteString.to_byte() {
                    Value::Bytes(item.bytes()?)
                } else if target == StackItemType::Buffer.to_byte() {
                    match item {
                        Value::Buffer(_) => item,
                        other => Value::Buffer(Rc::new(RefCell::new(other.bytes()?))),
                    }
                } else {
                    return Err(format!("CONVERT to 0x{target:02x}"));
                };
                vm.push(converted);
            }

            other => return Err(format!("{other} is not supported")),
        }
        pc = next;
    }
    Err(format!("no RET after {MAX_STEPS} steps"))
}

struct Machine {
    stack: Vec<Value>,
    locals: Vec<Value>,
    args: Vec<Value>,
}

impl Machine {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn peek(&self, n: usize) -> Result<Value, String> {
        let len = self.depth(n + 1)?;
        Ok(self.stack[len - 1 - n].clone())
    }

    fn depth(&self, needed: usize) -> Result<usize, String> {
        let len = self.stack.len();
        if len < needed {
            return Err("stack underflow".to_string());
        }
        Ok(len)
    }
}
