//! QB3 Core - raster inspection and decode orchestration
//!
//! This crate sits between a caller holding QB3-compressed bytes and a native
//! decode kernel that works on raw memory. It stages buffers in the kernel's
//! memory, validates the raster header against what the caller expects, and
//! hands back owned, typed sample buffers. The bitstream decoder itself lives
//! in the kernel.
//!
//! # Module Structure
//!
//! - `types` - descriptors, the element type table, decoded rasters and errors
//! - `pixels` - typed sample buffers
//! - `kernel` - the `NativeKernel` trait and scoped staging buffers
//! - `inspect` - header inspection
//! - `decode` - full decode
//! - `decoder` - a decoder bound to one kernel
//! - `config` - decoder settings

pub mod config;
pub mod decode;
pub mod decoder;
pub mod inspect;
pub mod kernel;
pub mod pixels;
pub mod types;

pub use config::DecoderConfig;
pub use decode::{decode, MESSAGE_CAPACITY};
pub use decoder::Qb3Decoder;
pub use inspect::{inspect, parse_payload};
#[cfg(feature = "ffi")]
pub use kernel::FfiKernel;
#[cfg(any(test, feature = "mock"))]
pub use kernel::{MockKernel, MockStats};
pub use kernel::{KernelError, NativeBuffer, NativeKernel, NativePtr};
pub use pixels::PixelData;
pub use types::{
    DecodeError, DecodedRaster, ElementType, ExpectedDescriptor, InspectError, RasterDescriptor,
};
