//! The boundary between this crate and a native QB3 decode kernel.
//!
//! A kernel owns a memory space (the process heap for a linked C library, a
//! linear memory for a WebAssembly module) and exposes two primitives over
//! it: a header parser and a full decoder. Everything passed across the
//! boundary has to be staged in that memory first, so the trait also
//! exposes allocation and byte copies.
//!
//! # Implementations
//!
//! - `FfiKernel` (feature `ffi`) - the C `GetInfo`/`decode` entry points linked in-process
//! - `MockKernel` (feature `mock`, and in unit tests) - an instrumented in-memory heap
//! - `JsKernel` in the `qb3-wasm` crate - an Emscripten module instance
//!
//! Staging memory should always be held through a [`NativeBuffer`], which
//! frees it when dropped.

mod buffer;
#[cfg(feature = "ffi")]
mod ffi;
#[cfg(any(test, feature = "mock"))]
mod mock;

use std::fmt;

use thiserror::Error;

pub use buffer::NativeBuffer;
#[cfg(feature = "ffi")]
pub use ffi::FfiKernel;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockKernel, MockStats};

/// An address in a kernel's memory space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativePtr(usize);

impl NativePtr {
    /// The null sentinel returned by the kernel for "no result".
    pub const NULL: NativePtr = NativePtr(0);

    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Failures at the host level of a kernel call, as opposed to decode failures
/// the kernel itself reports.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The kernel could not allocate staging memory.
    #[error("Native allocation of {0} bytes failed")]
    OutOfMemory(usize),

    /// A read or write fell outside memory the kernel knows about.
    #[error("Native access out of bounds: {len} bytes at {ptr}")]
    OutOfBounds { ptr: NativePtr, len: usize },

    /// The host could not perform a kernel call.
    #[error("Native call `{name}` failed: {message}")]
    Call { name: &'static str, message: String },
}

/// A QB3 decode kernel and the memory space it operates on.
///
/// Methods take `&self`; implementations that need mutable state use
/// interior mutability. Calls are never issued concurrently against the
/// same kernel, so implementations need not be `Sync`.
pub trait NativeKernel {
    /// Allocate `size` bytes of kernel memory.
    fn malloc(&self, size: usize) -> Result<NativePtr, KernelError>;

    /// Release memory obtained from [`malloc`](Self::malloc) or returned by
    /// [`parse_header`](Self::parse_header). Freeing `NULL` is a no-op.
    fn free(&self, ptr: NativePtr);

    /// Copy `src` into kernel memory at `dst`.
    fn write_bytes(&self, dst: NativePtr, src: &[u8]) -> Result<(), KernelError>;

    /// Copy `dst.len()` bytes out of kernel memory starting at `src`.
    fn read_bytes(&self, src: NativePtr, dst: &mut [u8]) -> Result<(), KernelError>;

    /// Read a NUL-terminated UTF-8 string, stopping after `max_len` bytes if given.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    fn read_c_string(&self, src: NativePtr, max_len: Option<usize>)
        -> Result<String, KernelError>;

    /// Parse the header of the `len` bytes at `input`.
    ///
    /// Returns a pointer to a NUL-terminated JSON payload owned by the
    /// caller, or [`NativePtr::NULL`] if the header cannot be parsed.
    fn parse_header(&self, input: NativePtr, len: usize) -> Result<NativePtr, KernelError>;

    /// Decode the `len` bytes at `input` into `output`.
    ///
    /// Returns the number of bytes written, or 0 on failure, in which case
    /// a NUL-terminated reason has been written to `message`.
    fn decode(
        &self,
        input: NativePtr,
        len: usize,
        output: NativePtr,
        message: NativePtr,
    ) -> Result<usize, KernelError>;
}

impl<K: NativeKernel + ?Sized> NativeKernel for &K {
    fn malloc(&self, size: usize) -> Result<NativePtr, KernelError> {
        (**self).malloc(size)
    }

    fn free(&self, ptr: NativePtr) {
        (**self).free(ptr)
    }

    fn write_bytes(&self, dst: NativePtr, src: &[u8]) -> Result<(), KernelError> {
        (**self).write_bytes(dst, src)
    }

    fn read_bytes(&self, src: NativePtr, dst: &mut [u8]) -> Result<(), KernelError> {
        (**self).read_bytes(src, dst)
    }

    fn read_c_string(
        &self,
        src: NativePtr,
        max_len: Option<usize>,
    ) -> Result<String, KernelError> {
        (**self).read_c_string(src, max_len)
    }

    fn parse_header(&self, input: NativePtr, len: usize) -> Result<NativePtr, KernelError> {
        (**self).parse_header(input, len)
    }

    fn decode(
        &self,
        input: NativePtr,
        len: usize,
        output: NativePtr,
        message: NativePtr,
    ) -> Result<usize, KernelError> {
        (**self).decode(input, len, output, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_ptr_null() {
        assert!(NativePtr::NULL.is_null());
        assert!(NativePtr::default().is_null());
        assert!(!NativePtr::new(16).is_null());
        assert_eq!(NativePtr::new(16).addr(), 16);
    }

    #[test]
    fn test_native_ptr_display() {
        assert_eq!(NativePtr::new(255).to_string(), "0xff");
    }

    #[test]
    fn test_kernel_error_display() {
        let err = KernelError::OutOfBounds {
            ptr: NativePtr::new(0x10),
            len: 4,
        };
        assert_eq!(err.to_string(), "Native access out of bounds: 4 bytes at 0x10");

        let err = KernelError::Call {
            name: "_decode",
            message: "RuntimeError: unreachable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Native call `_decode` failed: RuntimeError: unreachable"
        );
    }
}
