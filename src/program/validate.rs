use std::collections::BTreeSet;

use crate::bytecode::cursor::Cursor;
use crate::bytecode::opcode::{
    EXTERNAL_ARGS, Layout, MATRIX_DIM, MAX_VECTOR, MULTIPLY_DIM, Opcode, SHIFT_LIMIT,
    SlotSpace, check_operand,
};
use crate::foundation::error::{VmError, VmResult};
use crate::foundation::limits::{GLOBAL_CAPACITY, PREDICATE_CAPACITY, STACK_CAPACITY};
use crate::program::model::{Function, Program};

impl Program {
    /// Check capacities, frame shapes and every function's instruction stream.
    ///
    /// The engine re-checks everything it touches at runtime; verification reports the same
    /// failures before any invocation.
    pub fn validate(&self) -> VmResult<()> {
        if self.global_slot_count > GLOBAL_CAPACITY {
            return Err(VmError::validation(format!(
                "{} global slots exceed capacity {GLOBAL_CAPACITY}",
                self.global_slot_count
            )));
        }
        for (input, &slot) in self.input_slot_map.iter().enumerate() {
            if slot >= self.global_slot_count {
                return Err(VmError::validation(format!(
                    "input {input} maps to global {slot}, but only {} globals exist",
                    self.global_slot_count
                )));
            }
        }
        for function in &self.functions {
            self.validate_frame(function)
                .map_err(|e| VmError::validation(format!("function '{}': {e}", function.name)))?;
            self.validate_code(function)?;
        }
        Ok(())
    }

    fn validate_frame(&self, f: &Function) -> VmResult<()> {
        let Some(declared) = f.declared_slots() else {
            return Err(VmError::shape("parameter slot counts overflow"));
        };
        if declared != f.parameter_count {
            return Err(VmError::shape(format!(
                "parameters span {declared} slots but parameter_count is {}",
                f.parameter_count
            )));
        }
        if f.stack_need() > STACK_CAPACITY {
            return Err(VmError::capacity(format!(
                "frame of {} parameters, {} locals and {} stack values exceeds capacity {STACK_CAPACITY}",
                f.parameter_count, f.local_count, f.stack_count
            )));
        }
        for (what, depth) in [("condition", f.condition_depth), ("loop", f.loop_depth)] {
            if depth >= PREDICATE_CAPACITY {
                return Err(VmError::capacity(format!(
                    "{what} depth {depth} exceeds capacity {}",
                    PREDICATE_CAPACITY - 1
                )));
            }
        }
        Ok(())
    }

    fn validate_code(&self, f: &Function) -> VmResult<()> {
        let fail = |at: usize, e: VmError| {
            VmError::validation(format!("function '{}' at offset {at}: {e}", f.name))
        };
        let mut boundaries = BTreeSet::new();
        let mut targets = Vec::new();
        let mut cursor = Cursor::new(&f.code);
        while !cursor.is_at_end() {
            let at = cursor.ip();
            boundaries.insert(at);
            let op = cursor.read_opcode().map_err(|e| fail(at, e))?;
            self.check_operands(f, op, &mut cursor, &mut targets)
                .map_err(|e| fail(at, e))?;
        }
        for (at, target) in targets {
            if !boundaries.contains(&target) {
                return Err(fail(
                    at,
                    VmError::bytecode(format!(
                        "branch target {target} is not an instruction start"
                    )),
                ));
            }
        }
        Ok(())
    }

    fn check_operands(
        &self,
        f: &Function,
        op: Opcode,
        cursor: &mut Cursor<'_>,
        targets: &mut Vec<(usize, usize)>,
    ) -> VmResult<()> {
        match op.layout() {
            Layout::Bare => {}
            Layout::Count { max } => {
                check_operand(op, "count", cursor.read_u8()?, 1..=max)?;
            }
            Layout::Slot(space) => {
                let count = check_operand(op, "count", cursor.read_u8()?, 1..=MAX_VECTOR)?;
                let slot = cursor.read_u8()?;
                let limit = self.slot_limit(f, space);
                if slot as usize + count as usize > limit {
                    return Err(VmError::bounds(format!(
                        "{op:?}: {} slots {slot}..{} outside 0..{limit}",
                        space.name(),
                        slot as usize + count as usize
                    )));
                }
            }
            Layout::Extended(_) => {
                check_operand(op, "count", cursor.read_u8()?, 1..=MAX_VECTOR)?;
            }
            Layout::Byte => {
                let operand = cursor.read_u8()?;
                if matches!(
                    op,
                    Opcode::ShiftLeft | Opcode::ShiftRightS | Opcode::ShiftRightU
                ) {
                    check_operand(op, "shift", operand, 0..=SHIFT_LIMIT - 1)?;
                }
            }
            Layout::Imm32 => {
                cursor.read_u32()?;
            }
            Layout::Target => {
                let at = cursor.ip() - 1;
                targets.push((at, cursor.read_u16()? as usize));
            }
            Layout::Function => {
                let index = cursor.read_u8()? as usize;
                if index >= self.functions.len() {
                    return Err(VmError::bytecode(format!(
                        "call to function {index}, but the program has {}",
                        self.functions.len()
                    )));
                }
            }
            Layout::Return => {
                let count = cursor.read_u8()? as usize;
                if count != f.return_count {
                    return Err(VmError::shape(format!(
                        "returns {count} slots, declared {}",
                        f.return_count
                    )));
                }
            }
            Layout::Swizzle => {
                let src = check_operand(op, "source count", cursor.read_u8()?, 1..=MAX_VECTOR)?;
                let count = check_operand(op, "count", cursor.read_u8()?, 1..=MAX_VECTOR)?;
                for _ in 0..count {
                    check_operand(op, "index", cursor.read_u8()?, 0..=src - 1)?;
                }
            }
            Layout::MatrixResize => {
                for _ in 0..4 {
                    check_operand(op, "dimension", cursor.read_u8()?, MATRIX_DIM)?;
                }
            }
            Layout::MatrixMultiply => {
                for _ in 0..3 {
                    check_operand(op, "dimension", cursor.read_u8()?, MULTIPLY_DIM)?;
                }
            }
            Layout::MatrixShape => {
                for _ in 0..2 {
                    check_operand(op, "dimension", cursor.read_u8()?, MATRIX_DIM)?;
                }
            }
            Layout::ExternalCall => {
                check_operand(op, "argument count", cursor.read_u8()?, EXTERNAL_ARGS)?;
                check_operand(op, "return count", cursor.read_u8()?, EXTERNAL_ARGS)?;
                self.check_external(cursor.read_u8()?)?;
            }
            Layout::ExternalAccess => {
                check_operand(op, "count", cursor.read_u8()?, 1..=MAX_VECTOR)?;
                self.check_external(cursor.read_u8()?)?;
            }
        }
        Ok(())
    }

    fn slot_limit(&self, f: &Function, space: SlotSpace) -> usize {
        match space {
            SlotSpace::Local => f.frame_size(),
            SlotSpace::Global => self.global_slot_count,
            SlotSpace::Uniform => self.uniform_slot_count,
        }
    }

    fn check_external(&self, index: u8) -> VmResult<()> {
        if (index as usize) < self.external_values().len() {
            Ok(())
        } else {
            Err(VmError::bytecode(format!(
                "external value {index} not attached ({} available)",
                self.external_values().len()
            )))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/program/validate.rs"]
mod tests;
