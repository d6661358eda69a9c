/// Host object the bytecode can read from, write to, or call into.
///
/// The engine invokes these once per live lane, passing the element's global index
/// (chunk base plus lane). Slices hold at most four scalars. Implementations must be
/// shareable because a [`crate::Program`] may be run from many threads at once; interior
/// mutability is the host's responsibility.
///
/// Every method defaults to an error so hosts only implement the directions they support.
pub trait ExternalValue: Send + Sync {
    /// Fill `out` with this value's scalars for `element`.
    fn read(&self, element: usize, out: &mut [f32]) -> anyhow::Result<()> {
        let _ = (element, out);
        anyhow::bail!("external value does not support read")
    }

    /// Accept `input` as this value's scalars for `element`.
    fn write(&self, element: usize, input: &[f32]) -> anyhow::Result<()> {
        let _ = (element, input);
        anyhow::bail!("external value does not support write")
    }

    /// Invoke this value as a function of `input`, filling `out`.
    fn call(&self, element: usize, input: &[f32], out: &mut [f32]) -> anyhow::Result<()> {
        let _ = (element, input, out);
        anyhow::bail!("external value is not callable")
    }
}
