//! Full decode orchestration.
//!
//! Validates the header against the caller's expectation, stages the input
//! and output buffers in kernel memory, runs the kernel decoder and copies
//! the result out as owned, typed samples.

use crate::config::DecoderConfig;
use crate::inspect::inspect;
use crate::kernel::{NativeBuffer, NativeKernel};
use crate::pixels::PixelData;
use crate::types::{DecodeError, DecodedRaster, ElementType, ExpectedDescriptor};

/// Size of the buffer the kernel writes its failure reason into.
pub const MESSAGE_CAPACITY: usize = 1024;

/// Decode a QB3 raster that must have the shape `expected`.
///
/// Steps, stopping at the first failure:
/// 1. Inspect the header
/// 2. Compare width, height, band count and element type with `expected`
/// 3. Resolve the element type to its sample size
/// 4. Stage the input, an output buffer of exactly the decoded size, and a
///    message buffer
/// 5. Run the kernel decoder and copy the samples out
///
/// No kernel memory outlives this call, whichever way it returns.
///
/// # Arguments
///
/// * `kernel` - The decode kernel
/// * `bytes` - The complete encoded raster
/// * `expected` - The shape the caller requires; the decoder never adapts to a different one
/// * `config` - Decoder settings
///
/// # Errors
///
/// - `FormatUnrecognized` - the header could not be inspected
/// - `DescriptorMismatch` - the raster differs from `expected` in any core field
/// - `UnsupportedElementType` - the element type tag is not supported
/// - `SizeOverflow` - the decoded size does not fit in `usize`
/// - `NativeDecodeFailure` - the kernel reported a failure, with its reason
/// - `OutputSizeMismatch` - the kernel wrote an unexpected number of bytes
///   (only when `config.verify_output_size` is set)
/// - `Kernel` - staging memory or a kernel call failed at the host level
pub fn decode<K: NativeKernel + ?Sized>(
    kernel: &K,
    bytes: &[u8],
    expected: &ExpectedDescriptor,
    config: &DecoderConfig,
) -> Result<DecodedRaster, DecodeError> {
    let descriptor = inspect(kernel, bytes, config)?;

    if !descriptor.matches(expected) {
        return Err(DecodeError::DescriptorMismatch {
            expected: Box::new(expected.clone()),
            found: Box::new(descriptor),
        });
    }

    let element_type = ElementType::from_tag(&descriptor.dtype)
        .ok_or_else(|| DecodeError::UnsupportedElementType(descriptor.dtype.clone()))?;

    let image_size = match descriptor
        .sample_count()
        .and_then(|n| n.checked_mul(element_type.size()))
    {
        Some(size) => size,
        None => return Err(DecodeError::SizeOverflow(Box::new(descriptor))),
    };

    log::debug!(
        "decoding {} ({} input bytes, {} output bytes)",
        descriptor,
        bytes.len(),
        image_size
    );

    let input = NativeBuffer::from_slice(kernel, bytes)?;
    let output = NativeBuffer::alloc(kernel, image_size)?;
    let message = NativeBuffer::alloc(kernel, MESSAGE_CAPACITY)?;
    kernel.write_bytes(message.ptr(), &[0])?;

    let written = kernel.decode(input.ptr(), input.len(), output.ptr(), message.ptr())?;
    drop(input);

    if written == 0 {
        let reason = message.read_c_string()?;
        drop(output);
        drop(message);
        return Err(DecodeError::NativeDecodeFailure(reason));
    }
    drop(message);

    if config.verify_output_size && written != image_size {
        return Err(DecodeError::OutputSizeMismatch {
            expected: image_size,
            written,
        });
    }

    let raw = output.to_vec()?;
    drop(output);

    log::trace!("kernel wrote {} bytes", written);
    let data = PixelData::from_ne_bytes(element_type, &raw);
    Ok(DecodedRaster::new(descriptor, data))
}
