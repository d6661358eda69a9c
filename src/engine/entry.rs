//! Host-facing entry points.
//!
//! `run` executes one element in lane 0. `run_striped` walks `count` elements in chunks of
//! [`VEC_WIDTH`], each chunk on a fresh machine so every element starts from the same state.

use crate::engine::interpreter::{Machine, ReturnSink};
use crate::foundation::error::{VmError, VmResult};
use crate::foundation::lanes::VEC_WIDTH;
use crate::foundation::limits::{GLOBAL_CAPACITY, PREDICATE_CAPACITY, STACK_CAPACITY};
use crate::program::model::{Function, FunctionHandle, Program};

impl Program {
    /// Run `handle` for a single element.
    ///
    /// `args` holds every parameter slot in declaration order and must match the function's
    /// parameter count; `out` and `inout` slots are written back on success. `out_return`
    /// must hold exactly the declared return slots. On error neither buffer is touched.
    #[tracing::instrument(level = "trace", skip_all, fields(function = handle.index()))]
    pub fn run(
        &self,
        handle: FunctionHandle,
        args: &mut [f32],
        out_return: &mut [f32],
        uniforms: &[f32],
    ) -> VmResult<()> {
        self.run_one(handle, args, out_return, uniforms, None)
    }

    /// [`Program::run`] with `inputs` broadcast into the globals named by
    /// [`Program::input_slot_map`] first.
    #[tracing::instrument(level = "trace", skip_all, fields(function = handle.index()))]
    pub fn run_seeded(
        &self,
        handle: FunctionHandle,
        args: &mut [f32],
        out_return: &mut [f32],
        uniforms: &[f32],
        inputs: &[f32],
    ) -> VmResult<()> {
        self.run_one(handle, args, out_return, uniforms, Some(inputs))
    }

    /// Run `handle` for `count` elements laid out one array per parameter slot.
    ///
    /// `args[s][e]` is slot `s` of element `e`; `out` slots are updated in place. When
    /// `out_return` is non-empty it must hold one array per return slot, and return slot `i`
    /// of element `e` lands at `out_return[i][e]`. Every array needs at least `count`
    /// scalars.
    ///
    /// Chunks completed before a failing chunk keep their writes: a bounds or arithmetic
    /// failure in chunk `k` leaves the out-parameters and return arrays of elements
    /// `k * VEC_WIDTH..` untouched, but earlier elements are already updated.
    #[tracing::instrument(level = "trace", skip_all, fields(function = handle.index(), count = count))]
    pub fn run_striped(
        &self,
        handle: FunctionHandle,
        count: usize,
        args: &mut [&mut [f32]],
        out_return: &mut [&mut [f32]],
        uniforms: &[f32],
    ) -> VmResult<()> {
        self.run_chunks(handle, count, args, out_return, uniforms, None)
    }

    /// [`Program::run_striped`] with seeded inputs; see [`Program::run_seeded`].
    #[tracing::instrument(level = "trace", skip_all, fields(function = handle.index(), count = count))]
    pub fn run_striped_seeded(
        &self,
        handle: FunctionHandle,
        count: usize,
        args: &mut [&mut [f32]],
        out_return: &mut [&mut [f32]],
        uniforms: &[f32],
        inputs: &[f32],
    ) -> VmResult<()> {
        self.run_chunks(handle, count, args, out_return, uniforms, Some(inputs))
    }

    fn run_one(
        &self,
        handle: FunctionHandle,
        args: &mut [f32],
        out_return: &mut [f32],
        uniforms: &[f32],
        inputs: Option<&[f32]>,
    ) -> VmResult<()> {
        let function = self.prepare(
            handle,
            args.len(),
            Some(out_return.len()),
            uniforms.len(),
            inputs,
        )?;

        let mut machine = Machine::new(self, uniforms, 1, 0);
        if let Some(inputs) = inputs {
            machine.seed_inputs(inputs)?;
        }
        for (slot, &v) in args.iter().enumerate() {
            machine.set_arg(slot, 0, v);
        }
        machine.execute(handle.index(), &mut ReturnSink::Interleaved(out_return))?;
        for slot in out_slots(function) {
            args[slot] = machine.arg(slot, 0);
        }
        Ok(())
    }

    fn run_chunks(
        &self,
        handle: FunctionHandle,
        count: usize,
        args: &mut [&mut [f32]],
        out_return: &mut [&mut [f32]],
        uniforms: &[f32],
        inputs: Option<&[f32]>,
    ) -> VmResult<()> {
        let returns = (!out_return.is_empty()).then_some(out_return.len());
        let function = self.prepare(handle, args.len(), returns, uniforms.len(), inputs)?;
        check_arrays("argument", args, count)
            .and_then(|()| check_arrays("return", out_return, count))
            .inspect_err(|err| {
                tracing::debug!(function = %function.name, error = %err, "invocation rejected");
            })?;

        let mut offset = 0;
        while offset < count {
            let lanes = (count - offset).min(VEC_WIDTH);
            let mut machine = Machine::new(self, uniforms, lanes, offset);
            if let Some(inputs) = inputs {
                machine.seed_inputs(inputs)?;
            }
            for (slot, values) in args.iter().enumerate() {
                for lane in 0..lanes {
                    machine.set_arg(slot, lane, values[offset + lane]);
                }
            }

            let mut sink = if out_return.is_empty() {
                ReturnSink::Discard
            } else {
                ReturnSink::Striped {
                    outputs: &mut *out_return,
                    offset,
                }
            };
            machine.execute(handle.index(), &mut sink).inspect_err(|err| {
                tracing::debug!(
                    function = %function.name,
                    offset,
                    lanes,
                    error = %err,
                    "chunk failed"
                );
            })?;

            for slot in out_slots(function) {
                for lane in 0..lanes {
                    args[slot][offset + lane] = machine.arg(slot, lane);
                }
            }
            offset += lanes;
        }
        Ok(())
    }

    /// Resolve `handle` and reject any call whose shape or capacity needs cannot be met.
    fn prepare(
        &self,
        handle: FunctionHandle,
        args: usize,
        returns: Option<usize>,
        uniforms: usize,
        inputs: Option<&[f32]>,
    ) -> VmResult<&Function> {
        let Some(function) = self.function(handle) else {
            let err = VmError::shape(format!(
                "function handle {} outside 0..{}",
                handle.index(),
                self.functions.len()
            ));
            tracing::debug!(error = %err, "invocation rejected");
            return Err(err);
        };
        self.check_call(function, args, returns, uniforms, inputs)
            .inspect_err(|err| {
                tracing::debug!(function = %function.name, error = %err, "invocation rejected");
            })?;
        Ok(function)
    }

    fn check_call(
        &self,
        function: &Function,
        args: usize,
        returns: Option<usize>,
        uniforms: usize,
        inputs: Option<&[f32]>,
    ) -> VmResult<()> {
        let Some(declared) = function.declared_slots() else {
            return Err(VmError::shape(format!(
                "'{}' parameter slot counts overflow",
                function.name
            )));
        };
        if declared != function.parameter_count {
            return Err(VmError::shape(format!(
                "parameters declare {declared} slots, parameter count is {}",
                function.parameter_count
            )));
        }
        if args != function.parameter_count {
            return Err(VmError::shape(format!(
                "got {args} argument slots, '{}' takes {}",
                function.name, function.parameter_count
            )));
        }
        if let Some(returns) = returns
            && returns != function.return_count
        {
            return Err(VmError::shape(format!(
                "got {returns} return slots, '{}' returns {}",
                function.name, function.return_count
            )));
        }
        if uniforms != self.uniform_slot_count {
            return Err(VmError::shape(format!(
                "got {uniforms} uniforms, program declares {}",
                self.uniform_slot_count
            )));
        }
        if let Some(inputs) = inputs
            && inputs.len() != self.input_slot_map.len()
        {
            return Err(VmError::shape(format!(
                "got {} inputs, program maps {}",
                inputs.len(),
                self.input_slot_map.len()
            )));
        }

        if function.stack_need() > STACK_CAPACITY {
            return Err(VmError::capacity(format!(
                "'{}' frame of {} parameters, {} locals and {} stack values exceeds capacity {STACK_CAPACITY}",
                function.name, function.parameter_count, function.local_count, function.stack_count
            )));
        }
        if self.global_slot_count > GLOBAL_CAPACITY {
            return Err(VmError::capacity(format!(
                "{} global slots, capacity is {GLOBAL_CAPACITY}",
                self.global_slot_count
            )));
        }
        for (what, depth) in [
            ("condition", function.condition_depth),
            ("loop", function.loop_depth),
        ] {
            if depth >= PREDICATE_CAPACITY {
                return Err(VmError::capacity(format!(
                    "'{}' {what} depth {depth} exceeds {}",
                    function.name,
                    PREDICATE_CAPACITY - 1
                )));
            }
        }
        Ok(())
    }
}

fn check_arrays(what: &str, arrays: &[&mut [f32]], count: usize) -> VmResult<()> {
    for (i, array) in arrays.iter().enumerate() {
        if array.len() < count {
            return Err(VmError::shape(format!(
                "{what} array {i} holds {}, need {count}",
                array.len()
            )));
        }
    }
    Ok(())
}

/// Parameter slots the caller reads back after a successful call.
fn out_slots(function: &Function) -> impl Iterator<Item = usize> + '_ {
    function
        .parameters
        .iter()
        .scan(0usize, |start, p| {
            let slots = *start..*start + p.slot_count;
            *start += p.slot_count;
            Some((p.is_out, slots))
        })
        .filter(|(is_out, _)| *is_out)
        .flat_map(|(_, slots)| slots)
}

#[cfg(test)]
#[path = "../../tests/unit/engine/entry.rs"]
mod tests;
