//! An in-memory kernel for tests.
//!
//! `MockKernel` keeps a linear heap with per-block accounting, so tests can
//! assert that every staging buffer was released and count how often each
//! primitive ran. It understands a trivial stand-in container instead of the
//! real QB3 bitstream:
//!
//! ```text
//! "QB3M" | xsize: u32 LE | ysize: u32 LE | nbands: u16 LE | type code: u8 | raw samples
//! ```
//!
//! Type codes follow `ElementType::ALL`; any other code is reported as `"unknown"`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::json;

use super::{KernelError, NativeKernel, NativePtr};
use crate::types::{ElementType, RasterDescriptor};

const MAGIC: &[u8; 4] = b"QB3M";
const HEADER_LEN: usize = 15;
const ALIGN: usize = 8;
const MESSAGE_CAPACITY: usize = 1024;
const UNKNOWN_TYPE_CODE: u8 = 0xFF;

/// Call and allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub allocations: usize,
    pub frees: usize,
    /// Frees of pointers that were not live (double or foreign frees).
    pub invalid_frees: usize,
    pub parse_calls: usize,
    pub decode_calls: usize,
}

enum HeaderOverride {
    Null,
    Payload(String),
}

struct Heap {
    memory: Vec<u8>,
    /// Live blocks, keyed by start address.
    blocks: BTreeMap<usize, usize>,
    next: usize,
}

impl Heap {
    fn new() -> Self {
        // Address 0 stays reserved for NULL
        Self {
            memory: vec![0; ALIGN],
            blocks: BTreeMap::new(),
            next: ALIGN,
        }
    }

    fn alloc(&mut self, size: usize) -> usize {
        let addr = self.next;
        let span = size.max(1).div_ceil(ALIGN) * ALIGN;
        self.next += span;
        self.memory.resize(self.next, 0);
        self.blocks.insert(addr, size);
        addr
    }

    /// Find the live block containing `addr` and return its end address.
    fn block_end(&self, addr: usize) -> Option<usize> {
        let (&start, &size) = self.blocks.range(..=addr).next_back()?;
        let end = start + size;
        (addr < end || (addr == start && size == 0)).then_some(end)
    }

    fn range(&self, ptr: NativePtr, len: usize) -> Result<std::ops::Range<usize>, KernelError> {
        let addr = ptr.addr();
        match self.block_end(addr) {
            Some(end) if addr + len <= end => Ok(addr..addr + len),
            _ => Err(KernelError::OutOfBounds { ptr, len }),
        }
    }
}

/// An instrumented, in-memory [`NativeKernel`].
pub struct MockKernel {
    heap: RefCell<Heap>,
    stats: Cell<MockStats>,
    allocations_left: Cell<Option<usize>>,
    header_override: RefCell<Option<HeaderOverride>>,
    decode_failure: RefCell<Option<String>>,
    written_override: Cell<Option<usize>>,
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            heap: RefCell::new(Heap::new()),
            stats: Cell::new(MockStats::default()),
            allocations_left: Cell::new(None),
            header_override: RefCell::new(None),
            decode_failure: RefCell::new(None),
            written_override: Cell::new(None),
        }
    }

    /// Build a stand-in container for a raster.
    ///
    /// An unrecognized `dtype` is encoded with a type code the kernel reports
    /// as `"unknown"`.
    pub fn encode(descriptor: &RasterDescriptor, samples: &[u8]) -> Vec<u8> {
        let code = descriptor
            .element_type()
            .and_then(|t| ElementType::ALL.iter().position(|&a| a == t))
            .map_or(UNKNOWN_TYPE_CODE, |i| i as u8);

        let mut out = Vec::with_capacity(HEADER_LEN + samples.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&descriptor.width.to_le_bytes());
        out.extend_from_slice(&descriptor.height.to_le_bytes());
        out.extend_from_slice(&(descriptor.bands as u16).to_le_bytes());
        out.push(code);
        out.extend_from_slice(samples);
        out
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MockStats {
        self.stats.get()
    }

    /// Number of blocks currently allocated.
    pub fn live_allocations(&self) -> usize {
        self.heap.borrow().blocks.len()
    }

    /// Let `count` more allocations succeed, then fail every one after.
    pub fn fail_allocation_after(&self, count: usize) {
        self.allocations_left.set(Some(count));
    }

    /// Make `parse_header` return the null sentinel regardless of input.
    pub fn reply_with_null_header(&self) {
        *self.header_override.borrow_mut() = Some(HeaderOverride::Null);
    }

    /// Make `parse_header` return `payload` regardless of input.
    pub fn reply_with_header(&self, payload: &str) {
        *self.header_override.borrow_mut() = Some(HeaderOverride::Payload(payload.to_string()));
    }

    /// Make `decode` fail with `message`.
    pub fn fail_decode_with(&self, message: &str) {
        *self.decode_failure.borrow_mut() = Some(message.to_string());
    }

    /// Make a successful `decode` report `written` bytes instead of the real count.
    pub fn report_written(&self, written: usize) {
        self.written_override.set(Some(written));
    }

    fn bump(&self, update: impl FnOnce(&mut MockStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }

    fn read_input(&self, input: NativePtr, len: usize) -> Result<Vec<u8>, KernelError> {
        let mut bytes = vec![0u8; len];
        self.read_bytes(input, &mut bytes)?;
        Ok(bytes)
    }

    fn write_message(&self, message: NativePtr, text: &str) -> Result<(), KernelError> {
        let mut bytes: Vec<u8> = text.bytes().take(MESSAGE_CAPACITY - 1).collect();
        bytes.push(0);
        self.write_bytes(message, &bytes)
    }
}

/// Parsed stand-in header: dimensions and the element type, if the code is known.
struct Header {
    width: u32,
    height: u32,
    bands: u16,
    element_type: Option<ElementType>,
}

fn read_header(bytes: &[u8]) -> Option<Header> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return None;
    }
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
    Some(Header {
        width: u32_at(4),
        height: u32_at(8),
        bands: u16::from_le_bytes([bytes[12], bytes[13]]),
        element_type: ElementType::ALL.get(bytes[14] as usize).copied(),
    })
}

impl NativeKernel for MockKernel {
    fn malloc(&self, size: usize) -> Result<NativePtr, KernelError> {
        if let Some(left) = self.allocations_left.get() {
            if left == 0 {
                return Ok(NativePtr::NULL);
            }
            self.allocations_left.set(Some(left - 1));
        }
        let addr = self.heap.borrow_mut().alloc(size);
        self.bump(|s| s.allocations += 1);
        Ok(NativePtr::new(addr))
    }

    fn free(&self, ptr: NativePtr) {
        if ptr.is_null() {
            return;
        }
        let removed = self.heap.borrow_mut().blocks.remove(&ptr.addr());
        match removed {
            Some(_) => self.bump(|s| s.frees += 1),
            None => self.bump(|s| s.invalid_frees += 1),
        }
    }

    fn write_bytes(&self, dst: NativePtr, src: &[u8]) -> Result<(), KernelError> {
        let mut heap = self.heap.borrow_mut();
        let range = heap.range(dst, src.len())?;
        heap.memory[range].copy_from_slice(src);
        Ok(())
    }

    fn read_bytes(&self, src: NativePtr, dst: &mut [u8]) -> Result<(), KernelError> {
        let heap = self.heap.borrow();
        let range = heap.range(src, dst.len())?;
        dst.copy_from_slice(&heap.memory[range]);
        Ok(())
    }

    fn read_c_string(
        &self,
        src: NativePtr,
        max_len: Option<usize>,
    ) -> Result<String, KernelError> {
        let heap = self.heap.borrow();
        let start = src.addr();
        let end = heap
            .block_end(start)
            .ok_or(KernelError::OutOfBounds { ptr: src, len: 1 })?;
        let limit = max_len.map_or(end, |max| end.min(start + max));
        let bytes = &heap.memory[start..limit];
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
    }

    fn parse_header(&self, input: NativePtr, len: usize) -> Result<NativePtr, KernelError> {
        self.bump(|s| s.parse_calls += 1);

        let payload = match self.header_override.borrow().as_ref() {
            Some(HeaderOverride::Null) => return Ok(NativePtr::NULL),
            Some(HeaderOverride::Payload(p)) => p.clone(),
            None => {
                let bytes = self.read_input(input, len)?;
                let Some(header) = read_header(&bytes) else {
                    return Ok(NativePtr::NULL);
                };
                json!({
                    "xsize": header.width,
                    "ysize": header.height,
                    "nbands": header.bands,
                    "dtype": header.element_type.map_or("unknown", ElementType::tag),
                    "mode": "stored",
                    "bandmap": null,
                })
                .to_string()
            }
        };

        let mut bytes = payload.into_bytes();
        bytes.push(0);
        let ptr = self.malloc(bytes.len())?;
        if ptr.is_null() {
            return Ok(NativePtr::NULL);
        }
        self.write_bytes(ptr, &bytes)?;
        Ok(ptr)
    }

    fn decode(
        &self,
        input: NativePtr,
        len: usize,
        output: NativePtr,
        message: NativePtr,
    ) -> Result<usize, KernelError> {
        self.bump(|s| s.decode_calls += 1);
        self.write_message(message, "")?;

        if let Some(reason) = self.decode_failure.borrow().as_deref() {
            self.write_message(message, reason)?;
            return Ok(0);
        }

        let bytes = self.read_input(input, len)?;
        let Some(header) = read_header(&bytes) else {
            self.write_message(message, "Invalid QB3 format")?;
            return Ok(0);
        };
        let Some(element_type) = header.element_type else {
            self.write_message(message, "Failed to read QB3 info")?;
            return Ok(0);
        };

        let size = header.width as usize
            * header.height as usize
            * header.bands as usize
            * element_type.size();
        let samples = &bytes[HEADER_LEN..];
        if samples.len() < size {
            self.write_message(message, "Failed to read QB3 data")?;
            return Ok(0);
        }

        self.write_bytes(output, &samples[..size])?;
        Ok(self.written_override.get().unwrap_or(size))
    }
}
