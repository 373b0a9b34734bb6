//! Typed sample buffers for decoded rasters.

use bytemuck::{Pod, Zeroable};

use crate::types::ElementType;

/// Owned, contiguous samples of a decoded raster, one variant per element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
}

/// Copy native-endian bytes into a freshly allocated, properly aligned vector.
///
/// A trailing partial sample is dropped.
fn collect_samples<T: Pod>(bytes: &[u8]) -> Vec<T> {
    let count = bytes.len() / std::mem::size_of::<T>();
    let mut samples = vec![T::zeroed(); count];
    let dst: &mut [u8] = bytemuck::cast_slice_mut(&mut samples);
    let len = dst.len();
    dst.copy_from_slice(&bytes[..len]);
    samples
}

impl PixelData {
    /// Reinterpret a native-endian byte buffer as samples of `element_type`.
    ///
    /// The result owns its storage; nothing borrows from `bytes`.
    pub fn from_ne_bytes(element_type: ElementType, bytes: &[u8]) -> Self {
        debug_assert_eq!(
            bytes.len() % element_type.size(),
            0,
            "Byte length is not a whole number of samples"
        );
        match element_type {
            ElementType::U8 => PixelData::U8(bytes.to_vec()),
            ElementType::I8 => PixelData::I8(collect_samples(bytes)),
            ElementType::U16 => PixelData::U16(collect_samples(bytes)),
            ElementType::I16 => PixelData::I16(collect_samples(bytes)),
            ElementType::U32 => PixelData::U32(collect_samples(bytes)),
            ElementType::I32 => PixelData::I32(collect_samples(bytes)),
            ElementType::U64 => PixelData::U64(collect_samples(bytes)),
            ElementType::I64 => PixelData::I64(collect_samples(bytes)),
        }
    }

    /// The element type of the samples.
    pub fn element_type(&self) -> ElementType {
        match self {
            PixelData::U8(_) => ElementType::U8,
            PixelData::I8(_) => ElementType::I8,
            PixelData::U16(_) => ElementType::U16,
            PixelData::I16(_) => ElementType::I16,
            PixelData::U32(_) => ElementType::U32,
            PixelData::I32(_) => ElementType::I32,
            PixelData::U64(_) => ElementType::U64,
            PixelData::I64(_) => ElementType::I64,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::I8(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::I16(v) => v.len(),
            PixelData::U32(v) => v.len(),
            PixelData::I32(v) => v.len(),
            PixelData::U64(v) => v.len(),
            PixelData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the samples in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().size()
    }

    /// View the samples as native-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PixelData::U8(v) => v.as_slice(),
            PixelData::I8(v) => bytemuck::cast_slice(v),
            PixelData::U16(v) => bytemuck::cast_slice(v),
            PixelData::I16(v) => bytemuck::cast_slice(v),
            PixelData::U32(v) => bytemuck::cast_slice(v),
            PixelData::I32(v) => bytemuck::cast_slice(v),
            PixelData::U64(v) => bytemuck::cast_slice(v),
            PixelData::I64(v) => bytemuck::cast_slice(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_ne_bytes_u16() {
        let values: [u16; 4] = [0, 1, 0x1234, u16::MAX];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();

        let data = PixelData::from_ne_bytes(ElementType::U16, &bytes);
        assert_eq!(data, PixelData::U16(values.to_vec()));
        assert_eq!(data.len(), 4);
        assert_eq!(data.byte_len(), 8);
        assert_eq!(data.element_type(), ElementType::U16);
    }

    #[test]
    fn test_from_ne_bytes_signed() {
        let values: [i32; 3] = [-1, i32::MIN, 42];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(
            PixelData::from_ne_bytes(ElementType::I32, &bytes),
            PixelData::I32(values.to_vec())
        );
    }

    #[test]
    fn test_from_ne_bytes_unaligned_source() {
        // Offset by one so the source slice is misaligned for u64
        let mut storage = vec![0u8; 17];
        storage[1..9].copy_from_slice(&7u64.to_ne_bytes());
        storage[9..17].copy_from_slice(&u64::MAX.to_ne_bytes());

        let data = PixelData::from_ne_bytes(ElementType::U64, &storage[1..]);
        assert_eq!(data, PixelData::U64(vec![7, u64::MAX]));
    }

    #[test]
    fn test_empty_buffer() {
        let data = PixelData::from_ne_bytes(ElementType::I64, &[]);
        assert!(data.is_empty());
        assert_eq!(data.byte_len(), 0);
    }

    proptest! {
        #[test]
        fn prop_byte_length_matches_element_size(
            type_index in 0usize..8,
            samples in 0usize..64,
            seed in any::<u8>(),
        ) {
            let element_type = ElementType::ALL[type_index];
            let bytes: Vec<u8> = (0..samples * element_type.size())
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();

            let data = PixelData::from_ne_bytes(element_type, &bytes);
            prop_assert_eq!(data.len(), samples);
            prop_assert_eq!(data.byte_len(), bytes.len());
            prop_assert_eq!(data.element_type(), element_type);
            prop_assert_eq!(data.as_bytes(), &bytes[..]);
        }
    }
}
