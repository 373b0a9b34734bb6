//! In-process kernel backed by the C QB3 decode API.
//!
//! Links `GetInfo` and `decode` from the `qb3decapi` library and stages
//! memory on the C heap with `libc::malloc`. Reads and writes are checked
//! against the blocks this kernel allocated; the header payload returned by
//! `GetInfo` is the only foreign allocation, and it is only ever read as a
//! C string and freed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::{c_char, c_void, CStr};

use super::{KernelError, NativeKernel, NativePtr};

#[link(name = "qb3decapi")]
extern "C" {
    #[link_name = "GetInfo"]
    fn qb3_get_info(data: *mut c_void, sz: usize) -> *mut c_char;

    #[link_name = "decode"]
    fn qb3_decode(data: *mut c_void, sz: usize, outbuf: *mut c_void, message: *mut c_char) -> usize;
}

/// A [`NativeKernel`] calling the linked C decoder directly.
#[derive(Default)]
pub struct FfiKernel {
    /// Blocks from `malloc`, keyed by address.
    blocks: RefCell<BTreeMap<usize, usize>>,
}

impl FfiKernel {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, ptr: NativePtr, len: usize) -> Result<*mut u8, KernelError> {
        let blocks = self.blocks.borrow();
        let addr = ptr.addr();
        match blocks.range(..=addr).next_back() {
            Some((&start, &size)) if addr + len <= start + size => Ok(addr as *mut u8),
            _ => Err(KernelError::OutOfBounds { ptr, len }),
        }
    }
}

impl NativeKernel for FfiKernel {
    fn malloc(&self, size: usize) -> Result<NativePtr, KernelError> {
        // SAFETY: malloc has no preconditions; a null return is handled by the caller.
        let ptr = unsafe { libc::malloc(size.max(1)) } as usize;
        if ptr != 0 {
            self.blocks.borrow_mut().insert(ptr, size);
        }
        Ok(NativePtr::new(ptr))
    }

    fn free(&self, ptr: NativePtr) {
        if ptr.is_null() {
            return;
        }
        self.blocks.borrow_mut().remove(&ptr.addr());
        // SAFETY: ptr came from libc::malloc here or from GetInfo's strdup,
        // and every NativeBuffer frees its pointer exactly once.
        unsafe { libc::free(ptr.addr() as *mut c_void) }
    }

    fn write_bytes(&self, dst: NativePtr, src: &[u8]) -> Result<(), KernelError> {
        let dst = self.check(dst, src.len())?;
        // SAFETY: check() confirmed dst..dst+len lies inside a live block we allocated.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
        Ok(())
    }

    fn read_bytes(&self, src: NativePtr, dst: &mut [u8]) -> Result<(), KernelError> {
        let src = self.check(src, dst.len())?;
        // SAFETY: check() confirmed src..src+len lies inside a live block we allocated.
        unsafe { std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    fn read_c_string(
        &self,
        src: NativePtr,
        max_len: Option<usize>,
    ) -> Result<String, KernelError> {
        if src.is_null() {
            return Err(KernelError::OutOfBounds { ptr: src, len: 1 });
        }
        match max_len {
            Some(max) => {
                let mut bytes = vec![0u8; max];
                self.read_bytes(src, &mut bytes)?;
                let len = bytes.iter().position(|&b| b == 0).unwrap_or(max);
                Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
            }
            None => {
                // SAFETY: unbounded reads are only issued for GetInfo results,
                // which are NUL-terminated strdup copies.
                let text = unsafe { CStr::from_ptr(src.addr() as *const c_char) };
                Ok(text.to_string_lossy().into_owned())
            }
        }
    }

    fn parse_header(&self, input: NativePtr, len: usize) -> Result<NativePtr, KernelError> {
        let data = self.check(input, len)?;
        // SAFETY: data points at len readable bytes; GetInfo only reads them.
        let result = unsafe { qb3_get_info(data.cast(), len) };
        Ok(NativePtr::new(result as usize))
    }

    fn decode(
        &self,
        input: NativePtr,
        len: usize,
        output: NativePtr,
        message: NativePtr,
    ) -> Result<usize, KernelError> {
        let data = self.check(input, len)?;
        let out = self.check(output, 0)?;
        let msg = self.check(message, 1024)?;
        // SAFETY: all three pointers are live blocks; the caller sized output
        // from the header and message to the 1024 bytes decode may write.
        let written = unsafe { qb3_decode(data.cast(), len, out.cast(), msg.cast()) };
        Ok(written)
    }
}
