//! Control scopes for `break`, `continue` and `return`
//!
//! Symbols arrive already resolved to slots, so the only scoping left at
//! code generation is control flow: which loop a `break` leaves, and what
//! evaluation stack state must be dropped on the way out.

use crate::codegen::Label;

/// How a loop keeps its iteration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// Condition-tested loop; nothing on the stack
    While,
    /// Sequence iteration; the sequence and the index stay on the stack
    ForEach,
}

/// An enclosing control construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScope {
    /// A loop body
    Loop {
        /// Loop flavor
        kind: LoopKind,
        /// Target of `break`
        break_label: Label,
        /// Target of `continue`
        continue_label: Label,
    },
    /// A `try`, `except` or `finally` block
    Try {
        /// Does the statement carry a `finally` block
        has_finally: bool,
    },
}

/// Jump targets of the innermost loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTargets {
    /// Target of `break`
    pub break_label: Label,
    /// Target of `continue`
    pub continue_label: Label,
}

/// Why a loop jump cannot be lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// No enclosing loop
    OutsideLoop,
    /// The innermost loop encloses a `try` that the jump would leave
    CrossesTry,
}

impl ScopeError {
    /// Human readable reason
    pub fn describe(self, what: &str) -> String {
        match self {
            Self::OutsideLoop => format!("{what} outside a loop"),
            Self::CrossesTry => format!("{what} out of a try block"),
        }
    }
}

/// Stack of enclosing control constructs
#[derive(Debug, Default)]
pub struct ControlStack {
    scopes: Vec<ControlScope>,
}

impl ControlStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a loop body
    pub fn enter_loop(&mut self, kind: LoopKind, break_label: Label, continue_label: Label) {
        self.scopes.push(ControlScope::Loop {
            kind,
            break_label,
            continue_label,
        });
    }

    /// Enter a protected region
    pub fn enter_try(&mut self, has_finally: bool) {
        self.scopes.push(ControlScope::Try { has_finally });
    }

    /// Exit the innermost scope
    pub fn exit(&mut self) {
        self.scopes.pop();
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Targets for `break` / `continue`
    pub fn innermost_loop(&self) -> Result<LoopTargets, ScopeError> {
        for scope in self.scopes.iter().rev() {
            match *scope {
                ControlScope::Try { .. } => return Err(ScopeError::CrossesTry),
                ControlScope::Loop {
                    break_label,
                    continue_label,
                    ..
                } => {
                    return Ok(LoopTargets {
                        break_label,
                        continue_label,
                    });
                }
            }
        }
        Err(ScopeError::OutsideLoop)
    }

    /// Would leaving the function skip a `finally` block
    pub fn skips_finally(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| matches!(s, ControlScope::Try { has_finally: true }))
    }

    /// Number of for-each loops whose state is on the stack
    pub fn iteration_frames(&self) -> usize {
        self.scopes
            .iter()
            .filter(|s| matches!(s, ControlScope::Loop { kind: LoopKind::ForEach, .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_loop() {
        let mut stack = ControlStack::new();
        assert_eq!(stack.innermost_loop(), Err(ScopeError::OutsideLoop));

        stack.enter_loop(LoopKind::While, Label(1), Label(2));
        stack.enter_loop(LoopKind::ForEach, Label(3), Label(4));
        assert_eq!(
            stack.innermost_loop(),
            Ok(LoopTargets {
                break_label: Label(3),
                continue_label: Label(4)
            })
        );
        assert_eq!(stack.iteration_frames(), 1);

        stack.exit();
        assert_eq!(stack.innermost_loop().unwrap().break_label, Label(1));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_try_blocks_loop_jumps() {
        let mut stack = ControlStack::new();
        stack.enter_loop(LoopKind::While, Label(1), Label(2));
        stack.enter_try(false);
        assert_eq!(stack.innermost_loop(), Err(ScopeError::CrossesTry));
        assert!(!stack.skips_finally());
        stack.enter_try(true);
        assert!(stack.skips_finally());

        stack.enter_loop(LoopKind::ForEach, Label(3), Label(4));
        assert!(stack.innermost_loop().is_ok());
        assert_eq!(stack.iteration_frames(), 1);
    }

    #[test]
    fn test_describe() {
        assert_eq!(ScopeError::OutsideLoop.describe("break"), "break outside a loop");
        assert_eq!(
            ScopeError::CrossesTry.describe("continue"),
            "continue out of a try block"
        );
    }
}
