use super::*;
use crate::bytecode::cursor::Cursor;

#[test]
fn forward_and_backward_labels_are_patched() {
    let mut asm = Assembler::new();
    let top = asm.new_label();
    let exit = asm.new_label();
    asm.bind(top)
        .op(Opcode::LoopNext)
        .branch_if_all_false(exit)
        .branch(top)
        .bind(exit)
        .ret(0);
    let code = asm.finish().unwrap();

    let mut c = Cursor::new(&code);
    assert_eq!(c.read_opcode().unwrap(), Opcode::LoopNext);
    assert_eq!(c.read_opcode().unwrap(), Opcode::BranchIfAllFalse);
    assert_eq!(c.read_u16().unwrap(), 7);
    assert_eq!(c.read_opcode().unwrap(), Opcode::Branch);
    assert_eq!(c.read_u16().unwrap(), 0);
    assert_eq!(c.ip(), 7);
    assert_eq!(c.read_opcode().unwrap(), Opcode::Return);
}

#[test]
fn unbound_label_fails_at_finish() {
    let mut asm = Assembler::new();
    let nowhere = asm.new_label();
    asm.branch(nowhere);
    let err = asm.finish().unwrap_err();
    assert!(err.to_string().contains("never bound"), "{err}");
}

#[test]
fn binding_twice_is_rejected() {
    let mut asm = Assembler::new();
    let l = asm.new_label();
    asm.bind(l).op(Opcode::MaskPop).bind(l);
    assert!(asm.finish().is_err());
}

#[test]
fn first_operand_error_wins() {
    let mut asm = Assembler::new();
    asm.vector(Opcode::AddI, 5)
        .vector(Opcode::AddF, 0)
        .ret(0);
    let err = asm.finish().unwrap_err();
    assert!(err.to_string().contains("AddI"), "{err}");
}

#[test]
fn helpers_refuse_the_wrong_layout() {
    let mut asm = Assembler::new();
    asm.op(Opcode::AddF);
    assert!(asm.finish().is_err());

    let mut asm = Assembler::new();
    asm.vector(Opcode::MaskPush, 1);
    assert!(asm.finish().is_err());

    let mut asm = Assembler::new();
    asm.extended(Opcode::Load, 1);
    assert!(asm.finish().is_err());
}

#[test]
fn swizzle_indices_must_address_the_source() {
    let mut asm = Assembler::new();
    asm.swizzle(2, &[1, 0, 1]);
    assert_eq!(
        asm.finish().unwrap(),
        vec![Opcode::Swizzle as u8, 2, 3, 1, 0, 1]
    );

    let mut asm = Assembler::new();
    asm.swizzle(2, &[2]);
    assert!(asm.finish().is_err());
}

#[test]
fn immediates_are_little_endian() {
    let mut asm = Assembler::new();
    asm.push_f32(1.0).push_i32(-2);
    let code = asm.finish().unwrap();
    assert_eq!(&code[1..5], &1.0f32.to_bits().to_le_bytes());
    assert_eq!(&code[6..10], &(-2i32 as u32).to_le_bytes());
}

#[test]
fn matrix_dimensions_are_checked() {
    let mut asm = Assembler::new();
    asm.matrix_to_matrix(2, 2, 4, 4).matrix_multiply(4, 4, 1).scalar_to_matrix(3, 3);
    assert!(asm.finish().is_ok());

    let mut asm = Assembler::new();
    asm.matrix_to_matrix(1, 2, 2, 2);
    assert!(asm.finish().is_err());
}
