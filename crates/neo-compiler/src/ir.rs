//! Typed call graph handed over by analysis
//!
//! Everything here is already resolved: symbols are slot references with
//! stable indices, operator nodes carry the operand type that decides their
//! lowering, and builtin calls name an entry of the [`BuiltinTable`].
//!
//! [`BuiltinTable`]: crate::builtins::BuiltinTable

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use neo_bytecode::SlotKind;

use crate::error::{CompileError, CompileResult};

/// A whole contract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Functions in emission order
    pub functions: Vec<Function>,
    /// Contract-wide static fields; the position is the slot index
    #[serde(default)]
    pub statics: Vec<StaticField>,
    /// Explicit entry function, if not the first one
    #[serde(default)]
    pub entry: Option<String>,
}

impl Program {
    /// Parse a program from its JSON form
    pub fn from_json(text: &str) -> CompileResult<Self> {
        serde_json::from_str(text).map_err(|e| CompileError::Input(e.to_string()))
    }

    /// Render the program as JSON
    pub fn to_json(&self) -> CompileResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CompileError::Input(e.to_string()))
    }

    /// Look up a function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A static field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticField {
    /// Field name
    pub name: String,
    /// Initial value, stored by `_initialize`
    #[serde(default)]
    pub init: Option<Expr>,
}

/// A function with resolved slot counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Number of argument slots
    #[serde(default)]
    pub args: usize,
    /// Number of local slots
    #[serde(default)]
    pub locals: usize,
    /// Does a call produce a value
    #[serde(default)]
    pub returns_value: bool,
    /// Body statements
    pub body: Vec<Stmt>,
}

impl Function {
    /// Create a function with no body
    pub fn new(name: impl Into<String>, args: usize, locals: usize) -> Self {
        Self {
            name: name.into(),
            args,
            locals,
            returns_value: false,
            body: Vec::new(),
        }
    }

    /// Mark the function as returning a value
    pub fn returning(mut self) -> Self {
        self.returns_value = true;
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }
}

/// A resolved variable reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Slot array
    pub kind: SlotKind,
    /// Index into that array
    pub index: usize,
}

impl Slot {
    /// Local variable slot
    pub const fn local(index: usize) -> Self {
        Self {
            kind: SlotKind::Local,
            index,
        }
    }

    /// Argument slot
    pub const fn arg(index: usize) -> Self {
        Self {
            kind: SlotKind::Argument,
            index,
        }
    }

    /// Static field slot
    pub const fn field(index: usize) -> Self {
        Self {
            kind: SlotKind::Static,
            index,
        }
    }
}

/// Resolved operand type, used to pick type-dependent lowerings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    /// Arbitrary precision integer
    Int,
    /// Boolean
    Bool,
    /// UTF-8 text
    Str,
    /// Raw bytes
    Bytes,
    /// Ordered sequence
    List,
    /// Key-value mapping
    Map,
    /// The null value
    None,
    /// Not statically known
    #[default]
    Any,
}

impl Type {
    /// Text or byte string
    pub fn is_byte_string(self) -> bool {
        matches!(self, Self::Str | Self::Bytes)
    }

    /// Compared by numeric value
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Bool)
    }
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    /// Expression evaluated for effect
    Expr {
        /// The expression
        expr: Expr,
    },
    /// Store into a slot
    Assign {
        /// Destination slot
        target: Slot,
        /// Stored value
        value: Expr,
    },
    /// `container[key] = value`
    SetItem {
        /// List or map
        container: Expr,
        /// Index or key
        key: Expr,
        /// Stored value
        value: Expr,
    },
    /// Conditional
    If {
        /// Condition
        cond: Expr,
        /// Taken branch
        then: Vec<Stmt>,
        /// Fallback branch
        #[serde(default)]
        otherwise: Vec<Stmt>,
    },
    /// Condition-tested loop
    While {
        /// Condition
        cond: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// Iterate the items of a list, map keys, or a string
    ForEach {
        /// Slot receiving each item
        var: Slot,
        /// Iterated value
        iterable: Expr,
        /// Type of the iterated value
        #[serde(default)]
        ty: Type,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// Leave the innermost loop
    Break,
    /// Skip to the next iteration of the innermost loop
    Continue,
    /// Leave the function
    Return {
        /// Returned value
        #[serde(default)]
        value: Option<Expr>,
    },
    /// Exception handling
    Try {
        /// Protected body
        body: Vec<Stmt>,
        /// Exception handler
        #[serde(default)]
        handler: Option<Handler>,
        /// Always-run block
        #[serde(default)]
        finally: Option<Vec<Stmt>>,
    },
    /// Throw an exception
    Raise {
        /// Exception value
        value: Expr,
    },
    /// Fault unless the test holds
    Assert {
        /// Tested condition
        test: Expr,
        /// Message thrown on failure
        #[serde(default)]
        message: Option<Expr>,
    },
}

/// An exception handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    /// Slot bound to the caught exception
    #[serde(default)]
    pub binding: Option<Slot>,
    /// Handler body
    pub body: Vec<Stmt>,
}

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    /// Constant
    Literal {
        /// The value
        value: Literal,
    },
    /// Read a slot
    Load {
        /// Source slot
        slot: Slot,
    },
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Arithmetic or bitwise operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
        /// Operand type
        #[serde(default)]
        ty: Type,
    },
    /// Comparison
    Compare {
        /// Operator
        op: CompareOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
        /// Type of the compared operands (the container for `in`)
        #[serde(default)]
        ty: Type,
    },
    /// Short-circuit `and` / `or`
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// `then if cond else otherwise`
    Conditional {
        /// Condition
        cond: Box<Expr>,
        /// Value when true
        then: Box<Expr>,
        /// Value when false
        otherwise: Box<Expr>,
    },
    /// List literal
    List {
        /// Items in order
        items: Vec<Expr>,
    },
    /// Map literal
    Map {
        /// Key-value pairs in order
        entries: Vec<(Expr, Expr)>,
    },
    /// `value[index]`
    Subscript {
        /// Indexed value
        value: Box<Expr>,
        /// Index or key
        index: Box<Expr>,
        /// Type of the indexed value
        #[serde(default)]
        ty: Type,
    },
    /// `value[start:end]`
    Slice {
        /// Sliced value
        value: Box<Expr>,
        /// First index, zero when absent
        #[serde(default)]
        start: Option<Box<Expr>>,
        /// End index, the length when absent
        #[serde(default)]
        end: Option<Box<Expr>>,
        /// Type of the sliced value
        #[serde(default)]
        ty: Type,
    },
    /// `value is None`
    IsNone {
        /// Tested value
        value: Box<Expr>,
    },
    /// Call of a user function
    Call {
        /// Callee name
        function: String,
        /// Arguments in declaration order
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// Call of a builtin resolved by analysis
    Builtin {
        /// Builtin table key
        name: String,
        /// Type of the receiver or first argument, selects the variant
        #[serde(default)]
        operand: Type,
        /// Arguments, receiver first
        #[serde(default)]
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Integer literal
    pub fn int(value: impl Into<BigInt>) -> Self {
        Self::Literal {
            value: Literal::Int(value.into()),
        }
    }

    /// Boolean literal
    pub fn bool(value: bool) -> Self {
        Self::Literal {
            value: Literal::Bool(value),
        }
    }

    /// Text literal
    pub fn str(value: impl Into<String>) -> Self {
        Self::Literal {
            value: Literal::Str(value.into()),
        }
    }

    /// Byte string literal
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Literal {
            value: Literal::Bytes(value.into()),
        }
    }

    /// `None` literal
    pub fn none() -> Self {
        Self::Literal {
            value: Literal::None,
        }
    }

    /// Slot read
    pub fn load(slot: Slot) -> Self {
        Self::Load { slot }
    }

    /// Binary operator over `ty` operands
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// Comparison over `ty` operands
    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr, ty: Type) -> Self {
        Self::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// User function call
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            function: function.into(),
            args,
        }
    }

    /// Builtin call
    pub fn builtin(name: impl Into<String>, operand: Type, args: Vec<Expr>) -> Self {
        Self::Builtin {
            name: name.into(),
            operand,
            args,
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    /// Integer, carried as decimal text in serialized form
    Int(#[serde(with = "decimal")] BigInt),
    /// Boolean
    Bool(bool),
    /// Text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Null
    None,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
    /// Logical not
    Not,
    /// Bitwise complement
    Invert,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// Addition, or concatenation of byte strings
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Truncating division
    Div,
    /// Remainder
    Mod,
    /// Exponentiation
    Pow,
    /// Left shift
    Shl,
    /// Right shift
    Shr,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise xor
    BitXor,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less or equal
    Le,
    /// Greater than
    Gt,
    /// Greater or equal
    Ge,
    /// Key membership in a map
    In,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    /// Left if falsy, else right
    And,
    /// Left if truthy, else right
    Or,
}

mod decimal {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}
