use super::*;

#[test]
fn table_is_indexed_by_encoding() {
    for (i, op) in Opcode::ALL.iter().enumerate() {
        assert_eq!(u8::from(*op) as usize, i, "{op:?}");
        assert_eq!(Opcode::from_u8(i as u8), Some(*op));
    }
}

#[test]
fn bytes_past_the_table_do_not_decode() {
    assert_eq!(Opcode::from_u8(Opcode::ALL.len() as u8), None);
    assert_eq!(Opcode::from_u8(u8::MAX), None);
}

#[test]
fn matrix_capable_families_take_wider_counts() {
    assert_eq!(Opcode::AddF.layout(), Layout::Count { max: MAX_MATRIX });
    assert_eq!(Opcode::CompareFNEQ.layout(), Layout::Count { max: MAX_MATRIX });
    assert_eq!(Opcode::AddI.layout(), Layout::Count { max: MAX_VECTOR });
    assert_eq!(Opcode::CompareFLT.layout(), Layout::Count { max: MAX_VECTOR });
    assert_eq!(Opcode::Dup.layout(), Layout::Count { max: u8::MAX });
}

#[test]
fn memory_layouts_name_their_register_file() {
    assert_eq!(Opcode::Load.layout(), Layout::Slot(SlotSpace::Local));
    assert_eq!(Opcode::StoreGlobal.layout(), Layout::Slot(SlotSpace::Global));
    assert_eq!(
        Opcode::LoadExtendedUniform.layout(),
        Layout::Extended(SlotSpace::Uniform)
    );
    assert_eq!(Opcode::Return.layout(), Layout::Return);
}

#[test]
fn operand_check_names_the_instruction() {
    assert_eq!(check_operand(Opcode::Swizzle, "count", 3, 1..=4).unwrap(), 3);
    let err = check_operand(Opcode::Swizzle, "count", 0, 1..=4).unwrap_err();
    assert_eq!(
        err.to_string(),
        "bytecode error: Swizzle: count 0 outside 1..=4"
    );
}
