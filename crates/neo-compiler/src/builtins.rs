//! Builtin bindings
//!
//! Analysis decides which builtin a call refers to; this table decides how
//! it is lowered. The table is built once and handed to the compiler, so a
//! test can compile against a table holding only what it needs.

use neo_bytecode::Opcode;
use rustc_hash::FxHashMap;

use crate::templates::TemplateKind;

/// How a builtin is lowered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lowering {
    /// One operand-less opcode; arguments pushed in order
    Opcode(Opcode),
    /// One syscall; arguments pushed in reverse
    Syscall(String),
    /// A template variant picked by operand type; arguments pushed in order
    Template(TemplateKind),
}

/// One builtin table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtin {
    /// Lowering strategy
    pub lowering: Lowering,
    /// Does the call leave a value on the stack
    pub returns_value: bool,
}

impl Builtin {
    /// Opcode-backed builtin
    pub fn opcode(opcode: Opcode, returns_value: bool) -> Self {
        Self {
            lowering: Lowering::Opcode(opcode),
            returns_value,
        }
    }

    /// Syscall-backed builtin
    pub fn syscall(name: impl Into<String>, returns_value: bool) -> Self {
        Self {
            lowering: Lowering::Syscall(name.into()),
            returns_value,
        }
    }

    /// Template-backed builtin
    pub fn template(kind: TemplateKind) -> Self {
        Self {
            lowering: Lowering::Template(kind),
            returns_value: kind.returns_value(),
        }
    }
}

/// Read-only mapping from builtin name to lowering
#[derive(Debug, Clone, Default)]
pub struct BuiltinTable {
    entries: FxHashMap<String, Builtin>,
}

impl BuiltinTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the standard library bindings
    pub fn standard() -> Self {
        let mut table = Self::new();

        for (name, opcode, returns_value) in [
            ("len", Opcode::Size, true),
            ("abs", Opcode::Abs, true),
            ("min", Opcode::Min, true),
            ("max", Opcode::Max, true),
            ("sqrt", Opcode::Sqrt, true),
            ("within", Opcode::Within, true),
            ("keys", Opcode::Keys, true),
            ("values", Opcode::Values, true),
            ("has_key", Opcode::HasKey, true),
            ("append", Opcode::Append, false),
            ("remove", Opcode::Remove, false),
            ("reverse", Opcode::ReverseItems, false),
            ("clear", Opcode::ClearItems, false),
            ("pop", Opcode::PopItem, true),
        ] {
            table.insert(name, Builtin::opcode(opcode, returns_value));
        }

        for (name, service, returns_value) in [
            ("log", "System.Runtime.Log", false),
            ("notify", "System.Runtime.Notify", false),
            ("check_witness", "System.Runtime.CheckWitness", true),
            ("get_time", "System.Runtime.GetTime", true),
            ("get_trigger", "System.Runtime.GetTrigger", true),
            ("executing_script_hash", "System.Runtime.GetExecutingScriptHash", true),
            ("calling_script_hash", "System.Runtime.GetCallingScriptHash", true),
            ("storage_context", "System.Storage.GetContext", true),
            ("storage_get", "System.Storage.Get", true),
            ("storage_put", "System.Storage.Put", false),
            ("storage_delete", "System.Storage.Delete", false),
            ("call_contract", "System.Contract.Call", true),
            ("sha256", crate::templates::SHA256, true),
            ("ripemd160", crate::templates::RIPEMD160, true),
        ] {
            table.insert(name, Builtin::syscall(service, returns_value));
        }

        for (name, kind) in [
            ("upper", TemplateKind::Upper),
            ("lower", TemplateKind::Lower),
            ("isdigit", TemplateKind::IsDigit),
            ("split", TemplateKind::Split),
            ("slice", TemplateKind::Slice),
            ("extend", TemplateKind::Extend),
            ("range", TemplateKind::Range),
            ("hash160", TemplateKind::Hash160),
            ("hash256", TemplateKind::Hash256),
        ] {
            table.insert(name, Builtin::template(kind));
        }

        table
    }

    /// Add or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, builtin: Builtin) -> &mut Self {
        self.entries.insert(name.into(), builtin);
        self
    }

    /// Look up an entry
    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.entries.get(name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the table empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
