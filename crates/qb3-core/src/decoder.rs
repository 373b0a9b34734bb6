//! A decoder instance bound to one kernel.

use crate::config::DecoderConfig;
use crate::kernel::NativeKernel;
use crate::types::{DecodeError, DecodedRaster, ExpectedDescriptor, InspectError, RasterDescriptor};

/// QB3 inspection and decoding against a specific kernel.
///
/// Holds no state between calls besides the kernel handle and settings;
/// every call stages and releases its own buffers.
///
/// # Examples
///
/// ```ignore
/// use qb3_core::{ElementType, ExpectedDescriptor, FfiKernel, Qb3Decoder};
///
/// let decoder = Qb3Decoder::new(FfiKernel::new());
/// let bytes = std::fs::read("tile.qb3").unwrap();
/// let info = decoder.inspect(&bytes).unwrap();
/// let raster = decoder
///     .decode(&bytes, &ExpectedDescriptor::new(256, 256, 3, ElementType::U8))
///     .unwrap();
/// println!("{} -> {} bytes", info, raster.byte_len());
/// ```
pub struct Qb3Decoder<K> {
    kernel: K,
    config: DecoderConfig,
}

impl<K: NativeKernel> Qb3Decoder<K> {
    /// Create a decoder with default settings.
    pub fn new(kernel: K) -> Self {
        Self::with_config(kernel, DecoderConfig::default())
    }

    pub fn with_config(kernel: K, config: DecoderConfig) -> Self {
        Self { kernel, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn into_kernel(self) -> K {
        self.kernel
    }

    /// Describe an encoded raster without decoding it. See [`crate::inspect()`].
    pub fn inspect(&self, bytes: &[u8]) -> Result<RasterDescriptor, InspectError> {
        crate::inspect::inspect(&self.kernel, bytes, &self.config)
    }

    /// Decode a raster of a known shape. See [`crate::decode()`].
    pub fn decode(
        &self,
        bytes: &[u8],
        expected: &ExpectedDescriptor,
    ) -> Result<DecodedRaster, DecodeError> {
        crate::decode::decode(&self.kernel, bytes, expected, &self.config)
    }
}
