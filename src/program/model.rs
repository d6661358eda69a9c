use std::fmt;
use std::sync::Arc;

use crate::foundation::error::{VmError, VmResult};
use crate::program::external::ExternalValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// One declared parameter: how many slots of the flat argument block it spans.
pub struct Parameter {
    /// Number of consecutive argument slots.
    pub slot_count: usize,
    /// `out`/`inout` parameters are copied back to the caller after return.
    #[serde(default)]
    pub is_out: bool,
}

impl Parameter {
    /// Read-only parameter spanning `slot_count` slots.
    pub fn input(slot_count: usize) -> Self {
        Self {
            slot_count,
            is_out: false,
        }
    }

    /// `out`/`inout` parameter spanning `slot_count` slots.
    pub fn output(slot_count: usize) -> Self {
        Self {
            slot_count,
            is_out: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// A compiled function: frame shape plus its instruction stream.
pub struct Function {
    /// Name used by [`Program::get_function`].
    pub name: String,
    /// Total argument slots (sum of `parameters` slot counts).
    pub parameter_count: usize,
    /// Local slots following the parameters; zeroed on entry.
    #[serde(default)]
    pub local_count: usize,
    /// Declared maximum operand-stack depth.
    #[serde(default)]
    pub stack_count: usize,
    /// Slots returned by `Return`.
    #[serde(default)]
    pub return_count: usize,
    /// Parameter layout of the argument block.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Deepest nesting of masked branches.
    #[serde(default)]
    pub condition_depth: usize,
    /// Deepest nesting of loops.
    #[serde(default)]
    pub loop_depth: usize,
    /// Encoded instruction stream.
    pub code: Vec<u8>,
}

impl Function {
    /// Describe a function with no locals and no declared nesting.
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_count: usize,
        code: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_count: parameters
                .iter()
                .fold(0, |n: usize, p| n.saturating_add(p.slot_count)),
            local_count: 0,
            stack_count: 0,
            return_count,
            parameters,
            condition_depth: 0,
            loop_depth: 0,
            code,
        }
    }

    /// Set the number of local slots.
    pub fn with_locals(mut self, local_count: usize) -> Self {
        self.local_count = local_count;
        self
    }

    /// Set the declared operand-stack depth.
    pub fn with_stack(mut self, stack_count: usize) -> Self {
        self.stack_count = stack_count;
        self
    }

    /// Set the declared branch and loop nesting depths.
    pub fn with_depths(mut self, condition_depth: usize, loop_depth: usize) -> Self {
        self.condition_depth = condition_depth;
        self.loop_depth = loop_depth;
        self
    }

    /// Slots addressable by `Load`/`Store`: parameters followed by locals.
    ///
    /// Saturates at `usize::MAX`, which no capacity check accepts.
    pub fn frame_size(&self) -> usize {
        self.parameter_count.saturating_add(self.local_count)
    }

    /// Stack values one activation occupies: its frame plus its operand stack.
    pub(crate) fn stack_need(&self) -> usize {
        self.frame_size().saturating_add(self.stack_count)
    }

    /// Sum of the declared parameter widths, `None` on overflow.
    pub(crate) fn declared_slots(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(0usize, |n, p| n.checked_add(p.slot_count))
    }
}

/// Resolved reference to a function inside one [`Program`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub(crate) usize);

impl FunctionHandle {
    /// Position of the function in [`Program::functions`].
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
/// An immutable compiled unit.
///
/// A program is plain data: it can be built in code, or loaded from JSON with
/// [`Program::from_json`]. External values are host objects and never serialised;
/// they are attached when the program is built or loaded.
///
/// Once built, a program is read-only and may be shared across threads. Every
/// invocation owns its own registers.
pub struct Program {
    /// Functions, addressed by index from `Call`.
    pub functions: Vec<Function>,
    /// Globals shared by every call within one invocation.
    #[serde(default)]
    pub global_slot_count: usize,
    /// Scalar uniforms broadcast to every lane.
    #[serde(default)]
    pub uniform_slot_count: usize,
    /// Global slot seeded by each input of the `*_seeded` entry points.
    #[serde(default)]
    pub input_slot_map: Vec<usize>,
    #[serde(skip)]
    external_values: Vec<Arc<dyn ExternalValue>>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("functions", &self.functions)
            .field("global_slot_count", &self.global_slot_count)
            .field("uniform_slot_count", &self.uniform_slot_count)
            .field("input_slot_map", &self.input_slot_map)
            .field("external_values", &self.external_values.len())
            .finish()
    }
}

impl Program {
    /// Empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a function; its index is the current function count.
    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Set the global slot count.
    pub fn with_global_slots(mut self, count: usize) -> Self {
        self.global_slot_count = count;
        self
    }

    /// Set the uniform slot count.
    pub fn with_uniform_slots(mut self, count: usize) -> Self {
        self.uniform_slot_count = count;
        self
    }

    /// Map input `i` of the seeded entry points to global slot `map[i]`.
    pub fn with_input_slot_map(mut self, map: Vec<usize>) -> Self {
        self.input_slot_map = map;
        self
    }

    /// Append an external value; its index is the current external count.
    pub fn with_external_value(mut self, value: Arc<dyn ExternalValue>) -> Self {
        self.external_values.push(value);
        self
    }

    /// Resolve a function by name.
    pub fn get_function(&self, name: &str) -> Option<FunctionHandle> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FunctionHandle)
    }

    /// Borrow the function behind `handle`.
    pub fn function(&self, handle: FunctionHandle) -> Option<&Function> {
        self.functions.get(handle.0)
    }

    /// Attached external values, in index order.
    pub fn external_values(&self) -> &[Arc<dyn ExternalValue>] {
        &self.external_values
    }

    /// Parse a program from JSON, attach `externals`, and verify it.
    pub fn from_json(json: &str, externals: Vec<Arc<dyn ExternalValue>>) -> VmResult<Self> {
        let mut program: Self = serde_json::from_str(json)
            .map_err(|e| VmError::serde(format!("parse program JSON: {e}")))?;
        program.external_values = externals;
        program.validate()?;
        Ok(program)
    }

    /// Serialise the program (without external values) to pretty JSON.
    pub fn to_json(&self) -> VmResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VmError::serde(format!("serialize program JSON: {e}")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/program/model.rs"]
mod tests;
