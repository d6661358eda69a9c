use crate::bytecode::opcode::Opcode;
use crate::foundation::error::{VmError, VmResult};

/// Forward reader over one function's instruction stream.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'c> {
    code: &'c [u8],
    ip: usize,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(code: &'c [u8]) -> Self {
        Self::at(code, 0)
    }

    pub(crate) fn at(code: &'c [u8], ip: usize) -> Self {
        Self { code, ip }
    }

    pub(crate) fn ip(&self) -> usize {
        self.ip
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.ip >= self.code.len()
    }

    /// Move to an absolute offset. Landing exactly at the end is allowed; the next read fails.
    pub(crate) fn jump(&mut self, target: usize) -> VmResult<()> {
        if target > self.code.len() {
            return Err(VmError::bytecode(format!(
                "branch target {target} outside code of length {}",
                self.code.len()
            )));
        }
        self.ip = target;
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> VmResult<[u8; N]> {
        let end = self.ip + N;
        let bytes = self.code.get(self.ip..end).ok_or_else(|| {
            VmError::bytecode(format!(
                "truncated instruction stream at offset {} (wanted {N} bytes)",
                self.ip
            ))
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.ip = end;
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> VmResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> VmResult<u16> {
        Ok(u16::from_le_bytes(self.take::<2>()?))
    }

    pub(crate) fn read_u32(&mut self) -> VmResult<u32> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    pub(crate) fn read_opcode(&mut self) -> VmResult<Opcode> {
        let at = self.ip;
        let byte = self.read_u8()?;
        Opcode::from_u8(byte)
            .ok_or_else(|| VmError::bytecode(format!("unknown opcode {byte:#04x} at offset {at}")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bytecode/cursor.rs"]
mod tests;
