//! Header inspection: describe an encoded raster without decoding it.

use serde_json::Value;

use crate::config::DecoderConfig;
use crate::kernel::{NativeBuffer, NativeKernel};
use crate::types::{InspectError, RasterDescriptor};

/// Read the descriptor of a QB3 raster from its leading bytes.
///
/// Only the first `config.header_probe_len` bytes are staged in kernel
/// memory, so this is cheap even for very large rasters. Every staging
/// allocation, including the payload the kernel returns, is released before
/// this function returns.
///
/// # Arguments
///
/// * `kernel` - The decode kernel to parse the header with
/// * `bytes` - The encoded raster, whole or truncated past its header
/// * `config` - Decoder settings (the probe length is used here)
///
/// # Errors
///
/// Every error except `InspectError::Kernel` means the format could not be
/// determined (see [`InspectError::is_not_available`]):
/// - `NotRecognized` - empty input, or the kernel returned no payload
/// - `HeaderRejected` - the kernel reported an error for this header
/// - `MalformedPayload` - the payload is not a valid descriptor
/// - `InvalidDimensions` - the header reports a zero dimension
pub fn inspect<K: NativeKernel + ?Sized>(
    kernel: &K,
    bytes: &[u8],
    config: &DecoderConfig,
) -> Result<RasterDescriptor, InspectError> {
    let probe = config.header_probe(bytes);
    if probe.is_empty() {
        return Err(InspectError::NotRecognized);
    }
    log::debug!("inspecting {} of {} bytes", probe.len(), bytes.len());

    let input = NativeBuffer::from_slice(kernel, probe)?;
    let result = kernel.parse_header(input.ptr(), input.len())?;
    drop(input);

    let payload = NativeBuffer::adopt(kernel, result).ok_or(InspectError::NotRecognized)?;
    let text = payload.read_c_string()?;
    drop(payload);

    parse_payload(&text)
}

/// Parse the kernel's JSON header payload into a descriptor.
///
/// A payload carrying an `error` field is the kernel's way of rejecting a
/// header it could partially read, and is reported as `HeaderRejected`.
pub fn parse_payload(text: &str) -> Result<RasterDescriptor, InspectError> {
    let value: Value = serde_json::from_str(text)?;
    if let Some(error) = value.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(InspectError::HeaderRejected(message));
    }

    let descriptor: RasterDescriptor = serde_json::from_value(value)?;
    if !descriptor.has_valid_dimensions() {
        return Err(InspectError::InvalidDimensions {
            width: descriptor.width,
            height: descriptor.height,
            bands: descriptor.bands,
        });
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::MockKernel;
    use crate::types::ElementType;
    use proptest::prelude::*;

    fn encoded(width: u32, height: u32, bands: u32, element_type: ElementType) -> Vec<u8> {
        let desc = RasterDescriptor::new(width, height, bands, element_type);
        let size = desc.decoded_size().unwrap();
        let samples: Vec<u8> = (0..size).map(|i| i as u8).collect();
        MockKernel::encode(&desc, &samples)
    }

    #[test]
    fn test_inspect_valid_raster() {
        let kernel = MockKernel::new();
        let bytes = encoded(4, 4, 1, ElementType::U16);

        let desc = inspect(&kernel, &bytes, &DecoderConfig::default()).unwrap();
        assert_eq!(desc.width, 4);
        assert_eq!(desc.height, 4);
        assert_eq!(desc.bands, 1);
        assert_eq!(desc.element_type(), Some(ElementType::U16));
        assert_eq!(desc.mode.as_deref(), Some("stored"));
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_inspect_truncated_input_same_descriptor() {
        let kernel = MockKernel::new();
        let bytes = encoded(64, 32, 3, ElementType::U8);
        assert!(bytes.len() > 1000);

        let full = inspect(&kernel, &bytes, &DecoderConfig::default()).unwrap();
        let truncated = inspect(&kernel, &bytes[..1000], &DecoderConfig::default()).unwrap();
        assert_eq!(full, truncated);
    }

    #[test]
    fn test_inspect_stages_only_probe() {
        let kernel = MockKernel::new();
        let bytes = encoded(64, 32, 3, ElementType::U8);
        let config = DecoderConfig {
            header_probe_len: 20,
            ..Default::default()
        };
        let desc = inspect(&kernel, &bytes, &config).unwrap();
        assert_eq!((desc.width, desc.height, desc.bands), (64, 32, 3));
    }

    #[test]
    fn test_inspect_empty_input() {
        let kernel = MockKernel::new();
        let result = inspect(&kernel, &[], &DecoderConfig::default());
        assert!(matches!(result, Err(InspectError::NotRecognized)));
        assert_eq!(kernel.stats().parse_calls, 0);
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_inspect_unrecognized_bytes() {
        let kernel = MockKernel::new();
        let result = inspect(&kernel, b"\x89PNG\r\n\x1a\n0000000", &DecoderConfig::default());
        assert!(matches!(result, Err(InspectError::NotRecognized)));
        assert_eq!(kernel.stats().parse_calls, 1);
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_inspect_null_header() {
        let kernel = MockKernel::new();
        kernel.reply_with_null_header();
        let result = inspect(&kernel, &encoded(2, 2, 1, ElementType::U8), &DecoderConfig::default());
        assert!(matches!(result, Err(InspectError::NotRecognized)));
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_inspect_error_payload() {
        let kernel = MockKernel::new();
        kernel.reply_with_header(r#"{"error":"Invalid QB3 format"}"#);
        let result = inspect(&kernel, b"anything", &DecoderConfig::default());
        match result {
            Err(InspectError::HeaderRejected(message)) => assert_eq!(message, "Invalid QB3 format"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_inspect_malformed_payload() {
        let kernel = MockKernel::new();
        kernel.reply_with_header("{xsize: 4");
        let result = inspect(&kernel, b"anything", &DecoderConfig::default());
        assert!(matches!(result, Err(InspectError::MalformedPayload(_))));
        assert!(result.unwrap_err().is_not_available());
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_inspect_zero_dimension() {
        let kernel = MockKernel::new();
        let result = inspect(&kernel, &encoded(0, 4, 1, ElementType::U8), &DecoderConfig::default());
        assert!(matches!(
            result,
            Err(InspectError::InvalidDimensions { width: 0, height: 4, bands: 1 })
        ));
    }

    #[test]
    fn test_inspect_allocation_failure() {
        let kernel = MockKernel::new();
        kernel.fail_allocation_after(0);
        let result = inspect(&kernel, &encoded(2, 2, 1, ElementType::U8), &DecoderConfig::default());
        assert!(matches!(result, Err(InspectError::Kernel(_))));
        assert_eq!(kernel.live_allocations(), 0);
    }

    #[test]
    fn test_parse_payload_non_string_error() {
        let result = parse_payload(r#"{"error":{"code":3}}"#);
        match result {
            Err(InspectError::HeaderRejected(message)) => assert_eq!(message, r#"{"code":3}"#),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_payload_unknown_dtype_is_kept() {
        let desc = parse_payload(r#"{"xsize":1,"ysize":1,"nbands":1,"dtype":"unknown"}"#).unwrap();
        assert_eq!(desc.dtype, "unknown");
        assert_eq!(desc.element_type(), None);
    }

    proptest! {
        #[test]
        fn prop_inspect_reports_encoded_descriptor(
            width in 1u32..64,
            height in 1u32..64,
            bands in 1u32..5,
            type_index in 0usize..8,
        ) {
            let element_type = ElementType::ALL[type_index];
            let kernel = MockKernel::new();
            let bytes = encoded(width, height, bands, element_type);

            let desc = inspect(&kernel, &bytes, &DecoderConfig::default()).unwrap();
            prop_assert_eq!(desc.width, width);
            prop_assert_eq!(desc.height, height);
            prop_assert_eq!(desc.bands, bands);
            prop_assert_eq!(desc.element_type(), Some(element_type));
            prop_assert_eq!(kernel.live_allocations(), 0);
        }
    }
}
