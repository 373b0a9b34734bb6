//! Core types for QB3 raster inspection and decoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::kernel::KernelError;
use crate::pixels::PixelData;

/// Per-sample storage type of a QB3 raster.
///
/// This is the single lookup table for element types: every size and
/// sample-format decision goes through a `match` on this enum, so adding a
/// variant fails to compile until all of them handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "uint64")]
    U64,
    #[serde(rename = "int64")]
    I64,
}

impl ElementType {
    /// All supported element types, in QB3 type-code order.
    pub const ALL: [ElementType; 8] = [
        ElementType::U8,
        ElementType::I8,
        ElementType::U16,
        ElementType::I16,
        ElementType::U32,
        ElementType::I32,
        ElementType::U64,
        ElementType::I64,
    ];

    /// Storage size of one sample in bytes.
    #[inline]
    pub fn size(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 => 4,
            ElementType::U64 | ElementType::I64 => 8,
        }
    }

    /// The lowercase tag used in header payloads (e.g. `"uint16"`).
    pub fn tag(self) -> &'static str {
        match self {
            ElementType::U8 => "uint8",
            ElementType::I8 => "int8",
            ElementType::U16 => "uint16",
            ElementType::I16 => "int16",
            ElementType::U32 => "uint32",
            ElementType::I32 => "int32",
            ElementType::U64 => "uint64",
            ElementType::I64 => "int64",
        }
    }

    /// Resolve a header tag to an element type.
    ///
    /// Returns `None` for anything outside the eight supported tags,
    /// including the `"unknown"` tag the kernel reports for corrupt type codes.
    pub fn from_tag(tag: &str) -> Option<Self> {
        ElementType::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Whether samples of this type are signed integers.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ElementType::I8 | ElementType::I16 | ElementType::I32 | ElementType::I64
        )
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Multiply the raster dimensions by a sample size, returning `None` on overflow.
fn checked_byte_size(width: u32, height: u32, bands: u32, element_size: usize) -> Option<usize> {
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(usize::try_from(bands).ok()?)?
        .checked_mul(element_size)
}

/// Description of an encoded raster, as reported by the kernel's header parser.
///
/// Field names on the wire follow the kernel payload (`xsize`, `ysize`,
/// `nbands`, `dtype`); the descriptive names are accepted as aliases.
/// Fields this crate does not interpret are kept in `extra` and written
/// back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterDescriptor {
    /// Raster width in pixels.
    #[serde(rename = "xsize", alias = "width")]
    pub width: u32,
    /// Raster height in pixels.
    #[serde(rename = "ysize", alias = "height")]
    pub height: u32,
    /// Number of interleaved bands.
    #[serde(rename = "nbands", alias = "bandCount")]
    pub bands: u32,
    /// Element type tag, kept verbatim until it is resolved.
    #[serde(rename = "dtype", alias = "elementType")]
    pub dtype: String,
    /// Encoding mode name (e.g. `"base"`, `"best_rle"`, `"stored"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Quantization step, only present when the raster was quantized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quanta: Option<u64>,
    /// Core band used as the reference for each band, when one is set.
    #[serde(default)]
    pub bandmap: Option<Vec<u32>>,
    /// Any other metadata fields, passed through unexamined.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RasterDescriptor {
    /// Create a descriptor with only the four core fields set.
    pub fn new(width: u32, height: u32, bands: u32, element_type: ElementType) -> Self {
        Self {
            width,
            height,
            bands,
            dtype: element_type.tag().to_string(),
            mode: None,
            quanta: None,
            bandmap: None,
            extra: Map::new(),
        }
    }

    /// Resolve the element type tag.
    pub fn element_type(&self) -> Option<ElementType> {
        ElementType::from_tag(&self.dtype)
    }

    /// Total number of samples (`width * height * bands`).
    pub fn sample_count(&self) -> Option<usize> {
        checked_byte_size(self.width, self.height, self.bands, 1)
    }

    /// Size in bytes of the fully decoded raster.
    ///
    /// Returns `None` if the element type is not supported or the size
    /// does not fit in `usize`.
    pub fn decoded_size(&self) -> Option<usize> {
        let element_type = self.element_type()?;
        checked_byte_size(self.width, self.height, self.bands, element_type.size())
    }

    /// Check the four core fields against a caller's expectation.
    ///
    /// Each field is compared for exact equality; nothing is coerced.
    pub fn matches(&self, expected: &ExpectedDescriptor) -> bool {
        self.width == expected.width
            && self.height == expected.height
            && self.bands == expected.bands
            && self.dtype == expected.dtype
    }

    /// Whether all dimensions are positive.
    pub fn has_valid_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0 && self.bands > 0
    }
}

impl fmt::Display for RasterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} {}",
            self.width, self.height, self.bands, self.dtype
        )
    }
}

/// The raster shape a caller expects to get back from [`decode`](crate::decode).
///
/// Used only for validation. Unknown fields are ignored when deserializing,
/// so a full descriptor object can be passed back in as an expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedDescriptor {
    #[serde(rename = "xsize", alias = "width")]
    pub width: u32,
    #[serde(rename = "ysize", alias = "height")]
    pub height: u32,
    #[serde(rename = "nbands", alias = "bandCount")]
    pub bands: u32,
    #[serde(rename = "dtype", alias = "elementType")]
    pub dtype: String,
}

impl ExpectedDescriptor {
    /// Create an expectation from dimensions and an element type.
    pub fn new(width: u32, height: u32, bands: u32, element_type: ElementType) -> Self {
        Self {
            width,
            height,
            bands,
            dtype: element_type.tag().to_string(),
        }
    }
}

impl From<&RasterDescriptor> for ExpectedDescriptor {
    fn from(descriptor: &RasterDescriptor) -> Self {
        Self {
            width: descriptor.width,
            height: descriptor.height,
            bands: descriptor.bands,
            dtype: descriptor.dtype.clone(),
        }
    }
}

impl fmt::Display for ExpectedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} {}",
            self.width, self.height, self.bands, self.dtype
        )
    }
}

/// A fully decoded raster: its descriptor plus an owned, typed sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRaster {
    /// The validated descriptor.
    pub descriptor: RasterDescriptor,
    /// Band-interleaved samples in row-major order.
    pub data: PixelData,
}

impl DecodedRaster {
    /// Combine a descriptor with its samples.
    pub fn new(descriptor: RasterDescriptor, data: PixelData) -> Self {
        debug_assert_eq!(
            Some(data.byte_len()),
            descriptor.decoded_size(),
            "Pixel buffer size mismatch"
        );
        Self { descriptor, data }
    }

    /// Number of samples in the pixel buffer.
    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.byte_len()
    }
}

/// Reasons the metadata inspector could not produce a descriptor.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The kernel did not recognize the bytes as a QB3 raster.
    #[error("Not a recognized QB3 raster")]
    NotRecognized,

    /// The kernel parsed the header and reported a problem with it.
    #[error("QB3 header rejected: {0}")]
    HeaderRejected(String),

    /// The kernel returned a payload that is not a valid descriptor.
    #[error("Malformed header payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The header reports a zero dimension.
    #[error("Invalid raster dimensions: {width}x{height}x{bands}")]
    InvalidDimensions { width: u32, height: u32, bands: u32 },

    /// Staging memory or the kernel call itself failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl InspectError {
    /// True for every outcome callers treat as "format could not be determined".
    ///
    /// Only host-level kernel failures are excluded.
    pub fn is_not_available(&self) -> bool {
        !matches!(self, InspectError::Kernel(_))
    }
}

/// Reasons a full decode produced no raster.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The header could not be inspected.
    #[error("Failed to decode QB3 raster: {0}")]
    FormatUnrecognized(#[source] InspectError),

    /// The raster does not have the shape the caller asked for.
    #[error("Expected format does not match the data: expected {expected}, got {found}")]
    DescriptorMismatch {
        expected: Box<ExpectedDescriptor>,
        found: Box<RasterDescriptor>,
    },

    /// The element type tag is not one of the eight supported types.
    #[error("Unsupported data type: {0}")]
    UnsupportedElementType(String),

    /// The decoded size does not fit in memory on this platform.
    #[error("Raster too large to decode: {0}")]
    SizeOverflow(Box<RasterDescriptor>),

    /// The kernel reported a decoding failure.
    #[error("Decoding failed: {0}")]
    NativeDecodeFailure(String),

    /// The kernel reported success but wrote an unexpected number of bytes.
    #[error("Decoder wrote {written} bytes, expected {expected}")]
    OutputSizeMismatch { expected: usize, written: usize },

    /// Staging memory or the kernel call itself failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl From<InspectError> for DecodeError {
    fn from(err: InspectError) -> Self {
        match err {
            InspectError::Kernel(e) => DecodeError::Kernel(e),
            other => DecodeError::FormatUnrecognized(other),
        }
    }
}
