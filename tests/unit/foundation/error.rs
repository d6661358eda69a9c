use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(VmError::shape("x").to_string().contains("shape error:"));
    assert!(VmError::capacity("x").to_string().contains("capacity error:"));
    assert!(VmError::bounds("x").to_string().contains("bounds error:"));
    assert!(
        VmError::arithmetic("x")
            .to_string()
            .contains("arithmetic error:")
    );
    assert!(VmError::bytecode("x").to_string().contains("bytecode error:"));
    assert!(
        VmError::unsupported("x")
            .to_string()
            .contains("unsupported instruction:")
    );
    assert!(
        VmError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        VmError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn external_preserves_source() {
    let base = std::io::Error::other("host exploded");
    let err = VmError::External(anyhow::Error::new(base));
    assert!(err.to_string().contains("host exploded"));
}
