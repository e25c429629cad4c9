//! Typed access to mapped resource memory.

use bytemuck::Pod;

use crate::error::GlError;

/// Writable view of a mapped resource range.
///
/// Implemented by the mappings returned from
/// [`RenderContext::map_range`](crate::RenderContext::map_range) and
/// [`DeferredContext::map_range`](crate::DeferredContext::map_range).
/// Element indices are relative to the start of the mapped range.
pub trait MappedMemory {
    /// Raw bytes of the mapped range.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Size of one element of the mapped resource in bytes.
    fn element_size(&self) -> usize;

    /// Number of elements in the mapped range.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `items` starting at element `first`.
    ///
    /// # Errors
    ///
    /// Returns a state error if the write would leave the mapped range.
    fn write_slice<V: Pod>(&mut self, first: usize, items: &[V]) -> Result<(), GlError> {
        let element_size = self.element_size();
        let data: &[u8] = bytemuck::cast_slice(items);
        let start = first * element_size;
        let bytes = self.bytes_mut();
        let Some(target) = bytes.get_mut(start..start + data.len()) else {
            return Err(GlError::state(
                "MappedMemory::write_slice",
                format!(
                    "write of {} bytes at offset {} exceeds mapped range of {} bytes",
                    data.len(),
                    start,
                    bytes.len()
                ),
            ));
        };
        target.copy_from_slice(data);
        Ok(())
    }

    /// Write a single element at index `index`.
    fn write<V: Pod>(&mut self, index: usize, item: &V) -> Result<(), GlError> {
        self.write_slice(index, std::slice::from_ref(item))
    }
}
