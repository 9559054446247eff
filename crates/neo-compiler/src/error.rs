//! Compilation errors

use neo_bytecode::BytecodeError;
use thiserror::Error;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// A construct reached code generation that cannot be lowered
    #[error("Unsupported construct in {function} at instruction {position}: {what}")]
    UnsupportedConstruct {
        /// Function being compiled
        function: String,
        /// Index of the next instruction in that function
        position: usize,
        /// What could not be lowered
        what: String,
    },

    /// An operand could not be encoded for its opcode
    #[error("Encoding failed in {function} at instruction {position}: {source}")]
    Encoding {
        /// Function being compiled
        function: String,
        /// Index of the offending instruction in that function
        position: usize,
        /// Underlying encoding error
        #[source]
        source: BytecodeError,
    },

    /// Container or other bytecode-level failure outside any function
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    /// Invalid compiler configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Program input could not be read
    #[error("Invalid program input: {0}")]
    Input(String),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create an unsupported construct error
    pub fn unsupported(function: &str, position: usize, what: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            function: function.to_string(),
            position,
            what: what.into(),
        }
    }

    /// Attach function and position to an encoding error
    pub fn encoding(function: &str, position: usize, source: BytecodeError) -> Self {
        Self::Encoding {
            function: function.to_string(),
            position,
            source,
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
