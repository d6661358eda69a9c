use std::sync::Arc;

use super::*;
use crate::bytecode::assembler::Assembler;
use crate::program::external::ExternalValue;
use crate::program::model::Parameter;

struct Sink;

impl ExternalValue for Sink {}

fn single(code: Vec<u8>, params: usize, returns: usize) -> Program {
    let parameters = (0..params).map(|_| Parameter::input(1)).collect();
    Program::new().with_function(Function::new("main", parameters, returns, code).with_stack(8))
}

fn assemble(build: impl FnOnce(&mut Assembler)) -> Vec<u8> {
    let mut asm = Assembler::new();
    build(&mut asm);
    asm.finish().unwrap()
}

#[test]
fn well_formed_program_passes() {
    let code = assemble(|a| {
        let skip = a.new_label();
        a.load(2, 0)
            .vector(Opcode::CompareFLT, 1)
            .op(Opcode::MaskPush)
            .branch_if_all_false(skip)
            .load(1, 1)
            .store(1, 0)
            .bind(skip)
            .op(Opcode::MaskPop)
            .load(1, 0)
            .ret(1);
    });
    single(code, 2, 1).validate().unwrap();
}

#[test]
fn slot_outside_frame_is_rejected() {
    let code = assemble(|a| {
        a.load(2, 0).ret(2);
    });
    let err = single(code, 1, 2).validate().unwrap_err();
    assert!(matches!(err, VmError::Validation(_)));
    assert!(err.to_string().contains("local slots 0..2"), "{err}");
}

#[test]
fn return_count_must_match_declaration() {
    let code = assemble(|a| {
        a.load(1, 0).ret(1);
    });
    let err = single(code, 1, 0).validate().unwrap_err();
    assert!(err.to_string().contains("returns 1 slots"), "{err}");
}

#[test]
fn branch_into_an_operand_is_rejected() {
    // Branch to offset 1, the middle of the branch's own operand.
    let code = vec![Opcode::Branch as u8, 1, 0, Opcode::Return as u8, 0];
    let err = single(code, 0, 0).validate().unwrap_err();
    assert!(err.to_string().contains("not an instruction start"), "{err}");
}

#[test]
fn truncated_stream_is_rejected() {
    let code = vec![Opcode::PushImmediate as u8, 0, 0];
    let err = single(code, 0, 0).validate().unwrap_err();
    assert!(err.to_string().contains("truncated"), "{err}");
}

#[test]
fn call_and_external_indices_are_checked() {
    let code = assemble(|a| {
        a.call(3).ret(0);
    });
    assert!(single(code, 0, 0).validate().is_err());

    let code = assemble(|a| {
        a.push_f32(1.0).write_external(1, 0).ret(0);
    });
    assert!(single(code.clone(), 0, 0).validate().is_err());
    single(code, 0, 0)
        .with_external_value(Arc::new(Sink))
        .validate()
        .unwrap();
}

#[test]
fn capacities_are_enforced() {
    let too_many_globals = Program::new().with_global_slots(GLOBAL_CAPACITY + 1);
    assert!(too_many_globals.validate().is_err());

    let deep = Program::new().with_function(
        Function::new("deep", Vec::new(), 0, vec![Opcode::Return as u8, 0])
            .with_depths(PREDICATE_CAPACITY, 0),
    );
    assert!(deep.validate().unwrap_err().to_string().contains("condition depth"));

    let wide = Program::new().with_function(
        Function::new("wide", Vec::new(), 0, vec![Opcode::Return as u8, 0])
            .with_locals(STACK_CAPACITY)
            .with_stack(1),
    );
    assert!(wide.validate().unwrap_err().to_string().contains("capacity error"));
}

#[test]
fn oversized_counts_are_rejected_not_overflowed() {
    let json = format!(
        r#"{{"functions":[{{"name":"f","parameter_count":1,"local_count":{},"parameters":[{{"slot_count":1}}],"code":[]}}]}}"#,
        usize::MAX
    );
    let err = Program::from_json(&json, Vec::new()).unwrap_err();
    assert!(err.to_string().contains("capacity error"), "{err}");

    let mut huge_stack = Function::new("f", Vec::new(), 0, vec![Opcode::Return as u8, 0]);
    huge_stack.local_count = 1;
    huge_stack.stack_count = usize::MAX;
    let err = Program::new().with_function(huge_stack).validate().unwrap_err();
    assert!(err.to_string().contains("capacity error"), "{err}");

    let wide_params = Function::new(
        "f",
        vec![Parameter::input(usize::MAX), Parameter::input(2)],
        0,
        vec![Opcode::Return as u8, 0],
    );
    let err = Program::new().with_function(wide_params).validate().unwrap_err();
    assert!(err.to_string().contains("overflow"), "{err}");

    let deep = Function::new("f", Vec::new(), 0, vec![Opcode::Return as u8, 0])
        .with_depths(0, usize::MAX);
    let err = Program::new().with_function(deep).validate().unwrap_err();
    assert!(err.to_string().contains("loop depth"), "{err}");
}

#[test]
fn input_map_must_target_existing_globals() {
    let program = Program::new().with_global_slots(2).with_input_slot_map(vec![0, 2]);
    let err = program.validate().unwrap_err();
    assert!(err.to_string().contains("input 1 maps to global 2"), "{err}");
}

#[test]
fn parameter_count_must_match_layout() {
    let mut f = Function::new("f", vec![Parameter::input(2)], 0, vec![Opcode::Return as u8, 0]);
    f.parameter_count = 3;
    let err = Program::new().with_function(f).validate().unwrap_err();
    assert!(err.to_string().contains("shape error"), "{err}");
}

#[test]
fn shift_amount_below_lane_width() {
    let code = vec![Opcode::ShiftLeft as u8, 32, Opcode::Return as u8, 0];
    assert!(single(code, 0, 0).validate().is_err());
}
