pub(crate) mod assembler;
pub(crate) mod cursor;
pub(crate) mod opcode;
