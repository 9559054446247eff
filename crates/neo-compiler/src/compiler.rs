//! Main compiler implementation

use neo_bytecode::{
    Instruction, NefFile, Opcode, ScriptHash, StackItemType, encode_bool_push,
    encode_convert, encode_data_push, encode_init_slot, encode_init_static_slot,
    encode_integer_push, encode_text_push, listing, load_slot, store_slot,
};
use rustc_hash::FxHashMap;

use crate::builtins::{BuiltinTable, Lowering};
use crate::codegen::{CodeGen, Label};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::ir::{
    BinaryOp, CompareOp, Expr, Function, Handler, Literal, LogicalOp, Program, Slot, StaticField,
    Stmt, Type, UnaryOp,
};
use crate::scope::{ControlStack, LoopKind};
use crate::templates::TemplateKind;

/// Name of the generated static field initializer
pub const INITIALIZE: &str = "_initialize";

/// Output of a successful compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    /// Script bytes
    pub script: Vec<u8>,
    /// Content address of the script
    pub script_hash: ScriptHash,
    /// Byte offset of every function, in emission order
    pub method_offsets: Vec<(String, usize)>,
    /// Byte offset of the entry function
    pub entry_offset: usize,
}

impl CompiledProgram {
    /// Byte offset of a function
    pub fn method_offset(&self, name: &str) -> Option<usize> {
        self.method_offsets
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, offset)| offset)
    }

    /// Wrap the script in a container
    pub fn to_nef(&self, config: &CompilerConfig) -> CompileResult<NefFile> {
        Ok(NefFile::new(
            self.script.clone(),
            &config.compiler_name,
            config.container_version(),
        )?)
    }

    /// Disassembly listing of the script
    pub fn listing(&self) -> CompileResult<String> {
        Ok(listing(&self.script)?)
    }
}

#[derive(Debug, Clone, Copy)]
struct Signature {
    args: usize,
    returns_value: bool,
}

/// The compiler
pub struct Compiler<'a> {
    /// Settings
    config: CompilerConfig,
    /// Builtin lowerings
    builtins: &'a BuiltinTable,
    /// Code generator
    codegen: CodeGen,
    /// Enclosing loops and try blocks
    control: ControlStack,
    /// Callable functions by name
    signatures: FxHashMap<String, Signature>,
    /// Does the function being compiled return a value
    returns_value: bool,
}

impl<'a> Compiler<'a> {
    /// Create a new compiler
    pub fn new(config: CompilerConfig, builtins: &'a BuiltinTable) -> Self {
        Self {
            config,
            builtins,
            codegen: CodeGen::new(),
            control: ControlStack::new(),
            signatures: FxHashMap::default(),
            returns_value: false,
        }
    }

    /// Compile a program to a script
    pub fn compile(mut self, program: &Program) -> CompileResult<CompiledProgram> {
        if program.functions.is_empty() {
            return Err(CompileError::unsupported("<program>", 0, "program without functions"));
        }
        for function in &program.functions {
            let signature = Signature {
                args: function.args,
                returns_value: function.returns_value,
            };
            if function.name == INITIALIZE && !program.statics.is_empty() {
                return Err(CompileError::unsupported(
                    &function.name,
                    0,
                    "name is reserved for the static field initializer",
                ));
            }
            if self
                .signatures
                .insert(function.name.clone(), signature)
                .is_some()
            {
                return Err(CompileError::unsupported(
                    &function.name,
                    0,
                    "function defined twice",
                ));
            }
        }

        for function in &program.functions {
            self.compile_function(function)?;
        }
        if !program.statics.is_empty() {
            self.compile_initializer(&program.statics)?;
        }

        let assembly = std::mem::take(&mut self.codegen).finish()?;

        let entry_offset = match program.entry.as_deref().or(self.config.entry.as_deref()) {
            Some(name) => assembly
                .function_offsets
                .iter()
                .find(|(n, _)| n == name)
                .map(|&(_, offset)| offset)
                .ok_or_else(|| {
                    CompileError::unsupported(name, 0, "entry function is not defined")
                })?,
            None => 0,
        };

        let script_hash = ScriptHash::of(&assembly.script);
        tracing::debug!(
            functions = assembly.function_offsets.len(),
            bytes = assembly.script.len(),
            passes = assembly.passes,
            %script_hash,
            "compiled program"
        );

        Ok(CompiledProgram {
            script: assembly.script,
            script_hash,
            method_offsets: assembly.function_offsets,
            entry_offset,
        })
    }

    /// Compile one function
    fn compile_function(&mut self, function: &Function) -> CompileResult<()> {
        self.codegen
            .enter_function(&function.name, function.locals, function.args)?;
        self.returns_value = function.returns_value;

        if function.locals > 0 || function.args > 0 {
            let init = self.encoded(encode_init_slot(function.locals, function.args))?;
            self.codegen.emit(init);
        }

        self.compile_block(&function.body)?;

        if !matches!(
            function.body.last(),
            Some(Stmt::Return { .. } | Stmt::Raise { .. })
        ) {
            if self.returns_value {
                self.codegen.emit_op(Opcode::PushNull);
            }
            self.codegen.emit_op(Opcode::Ret);
        }

        tracing::debug!(
            function = function.name.as_str(),
            instructions = self.codegen.current_index(),
            "compiled function"
        );
        self.codegen.exit_function()
    }

    /// Compile the static field initializer
    fn compile_initializer(&mut self, statics: &[StaticField]) -> CompileResult<()> {
        self.codegen.enter_function(INITIALIZE, 0, 0)?;
        self.returns_value = false;

        let init = self.encoded(encode_init_static_slot(statics.len()))?;
        self.codegen.emit(init);
        for (index, field) in statics.iter().enumerate() {
            if let Some(value) = &field.init {
                self.compile_value(value)?;
                self.store(Slot::field(index))?;
            }
        }
        self.codegen.emit_op(Opcode::Ret);

        self.codegen.exit_function()
    }

    fn compile_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for stmt in stmts {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// Compile a statement
    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr { expr } => {
                // Discard the result, if any
                if self.compile_expression(expr)? {
                    self.codegen.emit_op(Opcode::Drop);
                }
                Ok(())
            }

            Stmt::Assign { target, value } => {
                self.compile_value(value)?;
                self.store(*target)
            }

            Stmt::SetItem {
                container,
                key,
                value,
            } => {
                self.compile_value(container)?;
                self.compile_value(key)?;
                self.compile_value(value)?;
                self.codegen.emit_op(Opcode::SetItem);
                Ok(())
            }

            Stmt::If {
                cond,
                then,
                otherwise,
            } => self.compile_if(cond, then, otherwise),

            Stmt::While { cond, body } => self.compile_while(cond, body),

            Stmt::ForEach {
                var,
                iterable,
                ty,
                body,
            } => self.compile_for_each(*var, iterable, *ty, body),

            Stmt::Break => {
                let targets = self
                    .control
                    .innermost_loop()
                    .map_err(|e| self.unsupported(e.describe("break")))?;
                self.codegen.emit_jump(Opcode::Jmp, targets.break_label);
                Ok(())
            }

            Stmt::Continue => {
                let targets = self
                    .control
                    .innermost_loop()
                    .map_err(|e| self.unsupported(e.describe("continue")))?;
                self.codegen.emit_jump(Opcode::Jmp, targets.continue_label);
                Ok(())
            }

            Stmt::Return { value } => self.compile_return(value.as_ref()),

            Stmt::Try {
                body,
                handler,
                finally,
            } => self.compile_try(body, handler.as_ref(), finally.as_deref()),

            Stmt::Raise { value } => {
                self.compile_value(value)?;
                self.codegen.emit_op(Opcode::Throw);
                Ok(())
            }

            Stmt::Assert { test, message } => {
                self.compile_value(test)?;
                match message {
                    None => self.codegen.emit_op(Opcode::Assert),
                    Some(message) => {
                        let ok = self.codegen.new_label();
                        self.codegen.emit_jump(Opcode::JmpIf, ok);
                        self.compile_value(message)?;
                        self.codegen.emit_op(Opcode::Throw);
                        self.codegen.place(ok);
                    }
                }
                Ok(())
            }
        }
    }

    /// Compile an if statement
    fn compile_if(&mut self, cond: &Expr, then: &[Stmt], otherwise: &[Stmt]) -> CompileResult<()> {
        let else_label = self.codegen.new_label();
        self.compile_value(cond)?;
        self.codegen.emit_jump(Opcode::JmpIfNot, else_label);

        self.compile_block(then)?;

        if otherwise.is_empty() {
            self.codegen.place(else_label);
        } else {
            let end = self.codegen.new_label();
            self.codegen.emit_jump(Opcode::Jmp, end);
            self.codegen.place(else_label);
            self.compile_block(otherwise)?;
            self.codegen.place(end);
        }
        Ok(())
    }

    /// Compile a while statement
    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) -> CompileResult<()> {
        let start = self.codegen.new_label();
        let end = self.codegen.new_label();

        self.codegen.place(start);
        self.compile_value(cond)?;
        self.codegen.emit_jump(Opcode::JmpIfNot, end);

        self.control.enter_loop(LoopKind::While, end, start);
        let result = self.compile_block(body);
        self.control.exit();
        result?;

        self.codegen.emit_jump(Opcode::Jmp, start);
        self.codegen.place(end);
        Ok(())
    }

    /// Compile a for-each statement
    ///
    /// The sequence and the running index stay on the evaluation stack for
    /// the duration of the loop: `[sequence, index]`.
    fn compile_for_each(
        &mut self,
        var: Slot,
        iterable: &Expr,
        ty: Type,
        body: &[Stmt],
    ) -> CompileResult<()> {
        let (top, next, test, end) = (
            self.codegen.new_label(),
            self.codegen.new_label(),
            self.codegen.new_label(),
            self.codegen.new_label(),
        );

        self.compile_value(iterable)?;
        if ty == Type::Map {
            self.codegen.emit_op(Opcode::Keys);
        }
        self.codegen.emit_op(Opcode::Push0);
        self.codegen.emit_jump(Opcode::Jmp, test);

        self.codegen.place(top);
        self.codegen.emit_op(Opcode::Over);
        self.codegen.emit_op(Opcode::Over);
        if ty == Type::Str {
            self.codegen.emit_op(Opcode::Push1);
            self.codegen.emit_op(Opcode::Substr);
            self.codegen.emit(encode_convert(StackItemType::ByteString));
        } else {
            self.codegen.emit_op(Opcode::PickItem);
        }
        self.store(var)?;

        self.control.enter_loop(LoopKind::ForEach, end, next);
        let result = self.compile_block(body);
        self.control.exit();
        result?;

        self.codegen.place(next);
        self.codegen.emit_op(Opcode::Inc);
        self.codegen.place(test);
        for op in [Opcode::Dup, Opcode::Push2, Opcode::Pick, Opcode::Size, Opcode::Lt] {
            self.codegen.emit_op(op);
        }
        self.codegen.emit_jump(Opcode::JmpIf, top);

        self.codegen.place(end);
        self.codegen.emit_op(Opcode::Drop);
        self.codegen.emit_op(Opcode::Drop);
        Ok(())
    }

    /// Compile a return, dropping for-each state first
    fn compile_return(&mut self, value: Option<&Expr>) -> CompileResult<()> {
        if self.control.skips_finally() {
            return Err(self.unsupported("return out of a try block with finally"));
        }
        let mismatch = match (value.is_some(), self.returns_value) {
            (false, true) => Some("return without a value in a function that returns one"),
            (true, false) => Some("return with a value in a function without a result"),
            _ => None,
        };
        if let Some(what) = mismatch {
            return Err(self.unsupported(what));
        }
        let frames = self.control.iteration_frames();
        let drop = match value {
            Some(value) => {
                self.compile_value(value)?;
                Opcode::Nip
            }
            None => Opcode::Drop,
        };
        for _ in 0..frames * 2 {
            self.codegen.emit_op(drop);
        }
        self.codegen.emit_op(Opcode::Ret);
        Ok(())
    }

    /// Compile a try statement
    ///
    /// ```text
    ///     TRY catch, finally
    ///     <body>
    ///     ENDTRY end
    /// catch:
    ///     STLOC e | DROP
    ///     <handler>
    ///     ENDTRY end
    /// finally:
    ///     <finally>
    ///     ENDFINALLY
    /// end:
    /// ```
    fn compile_try(
        &mut self,
        body: &[Stmt],
        handler: Option<&Handler>,
        finally: Option<&[Stmt]>,
    ) -> CompileResult<()> {
        if handler.is_none() && finally.is_none() {
            return self.compile_block(body);
        }

        let catch_label = handler.map(|_| self.codegen.new_label());
        let finally_label = finally.map(|_| self.codegen.new_label());
        let end = self.codegen.new_label();

        self.codegen.emit_try(catch_label, finally_label);

        self.control.enter_try(finally.is_some());
        let result = self.compile_protected(body, handler, catch_label, end);
        self.control.exit();
        result?;

        if let (Some(block), Some(label)) = (finally, finally_label) {
            self.codegen.place(label);
            self.control.enter_try(false);
            let result = self.compile_block(block);
            self.control.exit();
            result?;
            self.codegen.emit_op(Opcode::EndFinally);
        }

        self.codegen.place(end);
        Ok(())
    }

    fn compile_protected(
        &mut self,
        body: &[Stmt],
        handler: Option<&Handler>,
        catch_label: Option<Label>,
        end: Label,
    ) -> CompileResult<()> {
        self.compile_block(body)?;
        self.codegen.emit_jump(Opcode::EndTry, end);

        if let (Some(handler), Some(label)) = (handler, catch_label) {
            self.codegen.place(label);
            match handler.binding {
                Some(slot) => self.store(slot)?,
                None => self.codegen.emit_op(Opcode::Drop),
            }
            self.compile_block(&handler.body)?;
            self.codegen.emit_jump(Opcode::EndTry, end);
        }
        Ok(())
    }

    /// Compile an expression that must produce a value
    fn compile_value(&mut self, expr: &Expr) -> CompileResult<()> {
        if self.compile_expression(expr)? {
            Ok(())
        } else {
            Err(self.unsupported("call without a result used as a value"))
        }
    }

    /// Compile an expression, returning whether it left a value
    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<bool> {
        match expr {
            Expr::Literal { value } => {
                self.compile_literal(value)?;
            }

            Expr::Load { slot } => {
                let load = self.encoded(load_slot(slot.kind, slot.index))?;
                self.codegen.emit(load);
            }

            Expr::Unary { op, operand } => {
                self.compile_value(operand)?;
                self.codegen.emit_op(match op {
                    UnaryOp::Neg => Opcode::Negate,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::Invert => Opcode::Invert,
                });
            }

            Expr::Binary { op, lhs, rhs, ty } => {
                self.compile_value(lhs)?;
                self.compile_value(rhs)?;
                self.compile_binary(*op, *ty)?;
            }

            Expr::Compare { op, lhs, rhs, ty } => self.compile_compare(*op, lhs, rhs, *ty)?,

            Expr::Logical { op, lhs, rhs } => {
                let end = self.codegen.new_label();
                self.compile_value(lhs)?;
                self.codegen.emit_op(Opcode::Dup);
                self.codegen.emit_jump(
                    match op {
                        LogicalOp::And => Opcode::JmpIfNot,
                        LogicalOp::Or => Opcode::JmpIf,
                    },
                    end,
                );
                self.codegen.emit_op(Opcode::Drop);
                self.compile_value(rhs)?;
                self.codegen.place(end);
            }

            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.codegen.new_label();
                let end = self.codegen.new_label();
                self.compile_value(cond)?;
                self.codegen.emit_jump(Opcode::JmpIfNot, else_label);
                self.compile_value(then)?;
                self.codegen.emit_jump(Opcode::Jmp, end);
                self.codegen.place(else_label);
                self.compile_value(otherwise)?;
                self.codegen.place(end);
            }

            Expr::List { items } => {
                if items.is_empty() {
                    self.codegen.emit_op(Opcode::NewArray0);
                } else {
                    // PACK takes the top item as index 0
                    for item in items.iter().rev() {
                        self.compile_value(item)?;
                    }
                    self.codegen.emit(neo_bytecode::encode_int(items.len() as i64));
                    self.codegen.emit_op(Opcode::Pack);
                }
            }

            Expr::Map { entries } => {
                self.codegen.emit_op(Opcode::NewMap);
                for (key, value) in entries {
                    self.codegen.emit_op(Opcode::Dup);
                    self.compile_value(key)?;
                    self.compile_value(value)?;
                    self.codegen.emit_op(Opcode::SetItem);
                }
            }

            Expr::Subscript { value, index, ty } => {
                self.compile_value(value)?;
                self.compile_value(index)?;
                if *ty == Type::Str {
                    self.codegen.emit_op(Opcode::Push1);
                    self.codegen.emit_op(Opcode::Substr);
                    self.codegen.emit(encode_convert(StackItemType::ByteString));
                } else {
                    self.codegen.emit_op(Opcode::PickItem);
                }
            }

            Expr::Slice {
                value,
                start,
                end,
                ty,
            } => {
                let template = TemplateKind::Slice
                    .instantiate(*ty)
                    .ok_or_else(|| self.unsupported(format!("slice of {ty:?}")))?;
                self.compile_value(value)?;
                match start {
                    Some(start) => self.compile_value(start)?,
                    None => self.codegen.emit_op(Opcode::Push0),
                }
                match end {
                    Some(end) => self.compile_value(end)?,
                    None => {
                        self.codegen.emit_op(Opcode::Over);
                        self.codegen.emit_op(Opcode::Size);
                    }
                }
                self.codegen.splice(&template);
            }

            Expr::IsNone { value } => {
                self.compile_value(value)?;
                self.codegen.emit_op(Opcode::IsNull);
            }

            Expr::Call { function, args } => return self.compile_call(function, args),

            Expr::Builtin {
                name,
                operand,
                args,
            } => return self.compile_builtin(name, *operand, args),
        }
        Ok(true)
    }

    fn compile_literal(&mut self, literal: &Literal) -> CompileResult<()> {
        let instruction = match literal {
            Literal::Int(value) => encode_integer_push(value),
            Literal::Bool(value) => encode_bool_push(*value),
            Literal::Str(text) => self.encoded(encode_text_push(text))?,
            Literal::Bytes(bytes) => self.encoded(encode_data_push(bytes))?,
            Literal::None => Instruction::new(Opcode::PushNull),
        };
        self.codegen.emit(instruction);
        Ok(())
    }

    /// Compile a comparison; membership tests evaluate the container first
    fn compile_compare(
        &mut self,
        op: CompareOp,
        lhs: &Expr,
        rhs: &Expr,
        ty: Type,
    ) -> CompileResult<()> {
        if op == CompareOp::In {
            if ty != Type::Map {
                return Err(self.unsupported(format!("membership test on {ty:?}")));
            }
            self.compile_value(rhs)?;
            self.compile_value(lhs)?;
            self.codegen.emit_op(Opcode::HasKey);
            return Ok(());
        }

        let numeric = ty.is_numeric();
        let ordered = numeric || ty == Type::Any;
        let opcode = match op {
            CompareOp::Eq if numeric => Opcode::NumEqual,
            CompareOp::Eq => Opcode::Equal,
            CompareOp::Ne if numeric => Opcode::NumNotEqual,
            CompareOp::Ne => Opcode::NotEqual,
            CompareOp::Lt if ordered => Opcode::Lt,
            CompareOp::Le if ordered => Opcode::Le,
            CompareOp::Gt if ordered => Opcode::Gt,
            CompareOp::Ge if ordered => Opcode::Ge,
            _ => return Err(self.unsupported(format!("{op:?} comparison on {ty:?}"))),
        };
        self.compile_value(lhs)?;
        self.compile_value(rhs)?;
        self.codegen.emit_op(opcode);
        Ok(())
    }

    fn compile_binary(&mut self, op: BinaryOp, ty: Type) -> CompileResult<()> {
        if op == BinaryOp::Add && ty.is_byte_string() {
            self.codegen.emit_op(Opcode::Cat);
            self.codegen.emit(encode_convert(StackItemType::ByteString));
            return Ok(());
        }
        if !matches!(ty, Type::Int | Type::Bool | Type::Any) {
            return Err(self.unsupported(format!("{op:?} on {ty:?}")));
        }
        self.codegen.emit_op(match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Pow => Opcode::Pow,
            BinaryOp::Shl => Opcode::Shl,
            BinaryOp::Shr => Opcode::Shr,
            BinaryOp::BitAnd => Opcode::And,
            BinaryOp::BitOr => Opcode::Or,
            BinaryOp::BitXor => Opcode::Xor,
        });
        Ok(())
    }

    /// Compile a user function call; arguments are pushed last to first
    fn compile_call(&mut self, name: &str, args: &[Expr]) -> CompileResult<bool> {
        let signature = *self
            .signatures
            .get(name)
            .ok_or_else(|| self.unsupported(format!("call to undefined function {name}")))?;
        if signature.args != args.len() {
            return Err(self.unsupported(format!(
                "{name} called with {} arguments, expects {}",
                args.len(),
                signature.args
            )));
        }

        for arg in args.iter().rev() {
            self.compile_value(arg)?;
        }
        let target = self.codegen.function_label(name);
        self.codegen.emit_jump(Opcode::Call, target);
        Ok(signature.returns_value)
    }

    /// Compile a builtin call
    fn compile_builtin(&mut self, name: &str, operand: Type, args: &[Expr]) -> CompileResult<bool> {
        let builtins = self.builtins;
        let builtin = builtins
            .get(name)
            .ok_or_else(|| self.unsupported(format!("unknown builtin {name}")))?;

        match &builtin.lowering {
            Lowering::Opcode(opcode) => {
                for arg in args {
                    self.compile_value(arg)?;
                }
                self.codegen.emit_op(*opcode);
            }
            Lowering::Syscall(service) => {
                for arg in args.iter().rev() {
                    self.compile_value(arg)?;
                }
                self.codegen.emit(Instruction::syscall(service));
            }
            Lowering::Template(kind) => {
                let template = kind.instantiate(operand).ok_or_else(|| {
                    self.unsupported(format!("{name} has no variant for {operand:?}"))
                })?;
                for arg in args {
                    self.compile_value(arg)?;
                }
                self.codegen.splice(&template);
            }
        }
        Ok(builtin.returns_value)
    }

    fn store(&mut self, slot: Slot) -> CompileResult<()> {
        let store = self.encoded(store_slot(slot.kind, slot.index))?;
        self.codegen.emit(store);
        Ok(())
    }

    /// Attach the current function and position to an encoding result
    fn encoded<T>(&self, result: neo_bytecode::Result<T>) -> CompileResult<T> {
        result.map_err(|e| {
            CompileError::encoding(self.codegen.function_name(), self.codegen.current_index(), e)
        })
    }

    fn unsupported(&self, what: impl Into<String>) -> CompileError {
        CompileError::unsupported(
            self.codegen.function_name(),
            self.codegen.current_index(),
            what,
        )
    }
}
