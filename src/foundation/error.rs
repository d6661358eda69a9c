/// Convenience result type used across the interpreter.
pub type VmResult<T> = Result<T, VmError>;

/// Failure taxonomy for program loading and invocation.
///
/// Every failure is reported synchronously; a failed invocation leaves no
/// output the caller may rely on.
#[derive(thiserror::Error, Debug)]
pub enum VmError {
    /// Argument, return, uniform or input counts do not match the function/program.
    #[error("shape error: {0}")]
    Shape(String),

    /// A fixed-size engine buffer (stack, globals, predicate stacks, frames) would overflow.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// An active lane addressed a slot outside its valid range.
    #[error("bounds error: {0}")]
    Bounds(String),

    /// Integer division or remainder by zero on an active lane.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Truncated or malformed instruction stream.
    #[error("bytecode error: {0}")]
    Bytecode(String),

    /// A recognised instruction the software engine does not execute.
    #[error("unsupported instruction: {0}")]
    Unsupported(String),

    /// Static program verification failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors when serializing or deserializing programs.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Error raised by a host-supplied external value.
    #[error(transparent)]
    External(#[from] anyhow::Error),
}

impl VmError {
    /// Build a [`VmError::Shape`] value.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Build a [`VmError::Capacity`] value.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    /// Build a [`VmError::Bounds`] value.
    pub fn bounds(msg: impl Into<String>) -> Self {
        Self::Bounds(msg.into())
    }

    /// Build a [`VmError::Arithmetic`] value.
    pub fn arithmetic(msg: impl Into<String>) -> Self {
        Self::Arithmetic(msg.into())
    }

    /// Build a [`VmError::Bytecode`] value.
    pub fn bytecode(msg: impl Into<String>) -> Self {
        Self::Bytecode(msg.into())
    }

    /// Build a [`VmError::Unsupported`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Build a [`VmError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VmError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
