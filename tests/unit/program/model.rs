use super::*;
use crate::bytecode::assembler::Assembler;

struct Constant(f32);

impl ExternalValue for Constant {
    fn read(&self, _element: usize, out: &mut [f32]) -> anyhow::Result<()> {
        out.fill(self.0);
        Ok(())
    }
}

fn identity() -> Function {
    let mut asm = Assembler::new();
    asm.load(1, 0).ret(1);
    Function::new("identity", vec![Parameter::input(1)], 1, asm.finish().unwrap()).with_stack(1)
}

#[test]
fn new_function_sums_parameter_slots() {
    let f = Function::new(
        "f",
        vec![Parameter::input(2), Parameter::output(3)],
        0,
        Vec::new(),
    )
    .with_locals(4);
    assert_eq!(f.parameter_count, 5);
    assert_eq!(f.frame_size(), 9);
    assert!(f.parameters[1].is_out);
}

#[test]
fn functions_resolve_by_name() {
    let program = Program::new()
        .with_function(identity())
        .with_function(Function::new("other", Vec::new(), 0, Vec::new()));
    let handle = program.get_function("other").unwrap();
    assert_eq!(handle.index(), 1);
    assert_eq!(program.function(handle).unwrap().name, "other");
    assert!(program.get_function("missing").is_none());
}

#[test]
fn json_roundtrip_drops_externals_and_reattaches_them() {
    let program = Program::new()
        .with_function(identity())
        .with_uniform_slots(2)
        .with_external_value(Arc::new(Constant(1.0)));
    let json = program.to_json().unwrap();
    assert!(!json.contains("external"));

    let loaded = Program::from_json(&json, vec![Arc::new(Constant(2.0))]).unwrap();
    assert_eq!(loaded.functions, program.functions);
    assert_eq!(loaded.uniform_slot_count, 2);
    assert_eq!(loaded.external_values().len(), 1);
}

#[test]
fn json_defaults_optional_fields() {
    let json = r#"{ "functions": [ { "name": "noop", "parameter_count": 0, "code": [80, 0] } ] }"#;
    let program = Program::from_json(json, Vec::new()).unwrap();
    let f = &program.functions[0];
    assert_eq!(f.local_count, 0);
    assert_eq!(f.return_count, 0);
    assert_eq!(program.global_slot_count, 0);
}

#[test]
fn malformed_json_is_a_serde_error() {
    let err = Program::from_json("{ not json", Vec::new()).unwrap_err();
    assert!(matches!(err, VmError::Serde(_)));
}

#[test]
fn debug_lists_external_count_only() {
    let program = Program::new().with_external_value(Arc::new(Constant(0.0)));
    let dbg = format!("{program:?}");
    assert!(dbg.contains("external_values: 1"), "{dbg}");
}
