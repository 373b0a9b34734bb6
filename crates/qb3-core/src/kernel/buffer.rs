//! Scoped ownership of kernel staging memory.

use super::{KernelError, NativeKernel, NativePtr};

/// A block of kernel memory that is freed when the guard is dropped.
///
/// Every staging buffer used for a kernel call is held through one of these,
/// so early returns through `?` release memory exactly like the success path.
pub struct NativeBuffer<'k, K: NativeKernel + ?Sized> {
    kernel: &'k K,
    ptr: NativePtr,
    len: usize,
}

impl<'k, K: NativeKernel + ?Sized> NativeBuffer<'k, K> {
    /// Allocate `len` bytes of uninitialized kernel memory.
    ///
    /// # Errors
    ///
    /// Returns `KernelError::OutOfMemory` if the kernel hands back a null pointer.
    pub fn alloc(kernel: &'k K, len: usize) -> Result<Self, KernelError> {
        let ptr = kernel.malloc(len)?;
        if ptr.is_null() {
            return Err(KernelError::OutOfMemory(len));
        }
        log::trace!("native alloc {} bytes at {}", len, ptr);
        Ok(Self { kernel, ptr, len })
    }

    /// Allocate a buffer and copy `bytes` into it.
    pub fn from_slice(kernel: &'k K, bytes: &[u8]) -> Result<Self, KernelError> {
        let buffer = Self::alloc(kernel, bytes.len())?;
        kernel.write_bytes(buffer.ptr, bytes)?;
        Ok(buffer)
    }

    /// Take ownership of memory the kernel allocated and handed to the caller.
    ///
    /// The size of adopted memory is not known, so `len()` is 0. Returns
    /// `None` for a null pointer.
    pub fn adopt(kernel: &'k K, ptr: NativePtr) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        Some(Self { kernel, ptr, len: 0 })
    }

    pub fn ptr(&self) -> NativePtr {
        self.ptr
    }

    /// Allocated size in bytes, 0 for adopted memory.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the whole buffer out of kernel memory.
    pub fn to_vec(&self) -> Result<Vec<u8>, KernelError> {
        let mut out = vec![0u8; self.len];
        self.kernel.read_bytes(self.ptr, &mut out)?;
        Ok(out)
    }

    /// Read the buffer as a NUL-terminated string.
    ///
    /// Allocated buffers are never read past their end; adopted ones are read
    /// up to the terminator.
    pub fn read_c_string(&self) -> Result<String, KernelError> {
        let max_len = (self.len > 0).then_some(self.len);
        self.kernel.read_c_string(self.ptr, max_len)
    }
}

impl<K: NativeKernel + ?Sized> Drop for NativeBuffer<'_, K> {
    fn drop(&mut self) {
        log::trace!("native free {}", self.ptr);
        self.kernel.free(self.ptr);
    }
}
