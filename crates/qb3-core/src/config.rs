//! Decoder configuration.

use serde::{Deserialize, Serialize};

/// Default number of leading bytes handed to the header parser.
///
/// QB3 headers are far smaller than this; the cap only avoids staging a
/// whole raster in kernel memory just to read its metadata.
pub const DEFAULT_HEADER_PROBE_LEN: usize = 1000;

/// Settings for [`Qb3Decoder`](crate::Qb3Decoder).
///
/// Deserializes from a partial object; missing fields take their defaults.
///
/// ```typescript
/// const decoder = new Qb3Decoder(module, { headerProbeLen: 4096 });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderConfig {
    /// Maximum number of leading bytes passed to the header parser.
    pub header_probe_len: usize,
    /// Reject a decode whose reported byte count differs from the expected size.
    pub verify_output_size: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            header_probe_len: DEFAULT_HEADER_PROBE_LEN,
            verify_output_size: true,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The probe slice of `bytes` to hand to the header parser.
    pub fn header_probe<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[..bytes.len().min(self.header_probe_len)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::new();
        assert_eq!(config.header_probe_len, 1000);
        assert!(config.verify_output_size);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: DecoderConfig = serde_json::from_str(r#"{"verifyOutputSize": false}"#).unwrap();
        assert_eq!(config.header_probe_len, DEFAULT_HEADER_PROBE_LEN);
        assert!(!config.verify_output_size);

        let config: DecoderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DecoderConfig::default());
    }

    #[test]
    fn test_header_probe() {
        let config = DecoderConfig {
            header_probe_len: 4,
            ..Default::default()
        };
        assert_eq!(config.header_probe(b"abcdefgh"), b"abcd");
        assert_eq!(config.header_probe(b"ab"), b"ab");
        assert!(config.header_probe(b"").is_empty());
    }
}
