//! QB3 decoding WASM bindings.
//!
//! Exposes a `Qb3Decoder` class bound to an instantiated Emscripten QB3
//! module. Both operations return `null` on any failure and report the
//! reason on the console; callers never need to inspect error values.
//!
//! # Example
//!
//! ```typescript
//! import createQB3 from './qb3dec.js';
//! import init, { Qb3Decoder } from '@qb3/wasm';
//!
//! await init();
//! const decoder = new Qb3Decoder(await createQB3());
//!
//! const bytes = new Uint8Array(await response.arrayBuffer());
//! const info = decoder.getInfo(bytes);
//! const image = decoder.decode(bytes, { xsize: 256, ysize: 256, nbands: 1, dtype: 'uint16' });
//! if (image) {
//!   console.log(image.data instanceof Uint16Array); // true
//! }
//! ```

use qb3_core::{
    DecodeError, DecodedRaster, DecoderConfig, ExpectedDescriptor, NativeKernel, Qb3Decoder,
    RasterDescriptor,
};
use wasm_bindgen::prelude::*;

use crate::kernel::JsKernel;
use crate::types::{descriptor_to_js, raster_to_js};

/// Inspect a raster, logging the reason and collapsing to `None` on failure.
pub(crate) fn inspect_or_log<K: NativeKernel>(
    decoder: &Qb3Decoder<K>,
    bytes: &[u8],
) -> Option<RasterDescriptor> {
    match decoder.inspect(bytes) {
        Ok(descriptor) => Some(descriptor),
        Err(e) if e.is_not_available() => {
            log::debug!("QB3 header not available: {}", e);
            None
        }
        Err(e) => {
            log::error!("QB3 inspection failed: {}", e);
            None
        }
    }
}

/// Decode a raster, logging the reason and collapsing to `None` on failure.
pub(crate) fn decode_or_log<K: NativeKernel>(
    decoder: &Qb3Decoder<K>,
    bytes: &[u8],
    expected: &ExpectedDescriptor,
) -> Option<DecodedRaster> {
    match decoder.decode(bytes, expected) {
        Ok(raster) => Some(raster),
        Err(DecodeError::DescriptorMismatch { expected, found }) => {
            log::error!("Expected format does not match the data");
            log::error!("Expected: {}", expected);
            log::error!("Got: {}", found);
            None
        }
        Err(e) => {
            log::error!("{}", e);
            None
        }
    }
}

/// A QB3 decoder bound to one Emscripten module instance.
///
/// The module must export `_malloc`, `_free`, `_GetInfo`, `_decode`,
/// `HEAPU8` and `UTF8ToString`.
#[wasm_bindgen(js_name = Qb3Decoder)]
pub struct JsQb3Decoder {
    inner: Qb3Decoder<JsKernel>,
}

#[wasm_bindgen(js_class = Qb3Decoder)]
impl JsQb3Decoder {
    /// Create a decoder for an instantiated module.
    ///
    /// # Arguments
    /// * `module` - The instantiated Emscripten module
    /// * `config` - Optional settings, e.g. `{ headerProbeLen: 1000, verifyOutputSize: true }`
    ///
    /// # Errors
    ///
    /// Throws if the module lacks a required export or the config is invalid.
    #[wasm_bindgen(constructor)]
    pub fn new(module: JsValue, config: JsValue) -> Result<JsQb3Decoder, JsValue> {
        let config: DecoderConfig = if config.is_undefined() || config.is_null() {
            DecoderConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let kernel = JsKernel::new(module)?;
        Ok(JsQb3Decoder {
            inner: Qb3Decoder::with_config(kernel, config),
        })
    }

    /// Describe a QB3 raster without decoding it.
    ///
    /// Only the first `headerProbeLen` bytes are used, so passing a prefix
    /// of the file is enough.
    ///
    /// # Returns
    ///
    /// `{ xsize, ysize, nbands, dtype, mode, quanta?, bandmap, ... }`, or
    /// `null` if the bytes are not a recognizable QB3 raster.
    #[wasm_bindgen(js_name = getInfo)]
    pub fn get_info(&self, bytes: &[u8]) -> JsValue {
        inspect_or_log(&self.inner, bytes)
            .and_then(|descriptor| to_js_or_log(descriptor_to_js(&descriptor)))
            .unwrap_or(JsValue::NULL)
    }

    /// Decode a QB3 raster of a known shape.
    ///
    /// # Arguments
    /// * `bytes` - The complete encoded raster
    /// * `expected` - `{ xsize, ysize, nbands, dtype }` the raster must match exactly
    ///
    /// # Returns
    ///
    /// The `getInfo` object plus `data`, a typed array matching `dtype`
    /// (`Uint8Array` ... `BigInt64Array`), or `null` on any failure.
    pub fn decode(&self, bytes: &[u8], expected: JsValue) -> JsValue {
        let expected: ExpectedDescriptor = match serde_wasm_bindgen::from_value(expected) {
            Ok(expected) => expected,
            Err(e) => {
                log::error!("Invalid expected descriptor: {}", e);
                return JsValue::NULL;
            }
        };
        decode_or_log(&self.inner, bytes, &expected)
            .and_then(|raster| to_js_or_log(raster_to_js(&raster)))
            .unwrap_or(JsValue::NULL)
    }
}

fn to_js_or_log(result: Result<JsValue, JsValue>) -> Option<JsValue> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("Failed to convert QB3 result: {:?}", e);
            None
        }
    }
}


/// WASM-specific tests that drive a fake Emscripten module.
///
/// These need a JavaScript runtime. Use `wasm-pack test` to run them.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use js_sys::{Reflect, Uint16Array};
    use qb3_core::ElementType;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    // Stand-in module: "QB3J" | width u8 | height u8 | bands u8 | uint16 LE samples
    #[wasm_bindgen(inline_js = r#"
export function fakeModule() {
  const heap = new Uint8Array(1 << 16);
  const live = new Set();
  let next = 8;
  const m = {
    HEAPU8: heap,
    _malloc(n) { const p = next; next += Math.max(8, (n + 7) & ~7); live.add(p); return p; },
    _free(p) { live.delete(p); },
    UTF8ToString(p, max) {
      const limit = max === undefined ? heap.length : p + max;
      let end = p;
      while (end < limit && heap[end] !== 0) end++;
      return new TextDecoder().decode(heap.subarray(p, end));
    },
    _GetInfo(p, n) {
      if (n < 7 || String.fromCharCode(...heap.subarray(p, p + 4)) !== 'QB3J') return 0;
      const json = JSON.stringify({ xsize: heap[p + 4], ysize: heap[p + 5], nbands: heap[p + 6],
        dtype: 'uint16', mode: 'stored', bandmap: null });
      const bytes = new TextEncoder().encode(json);
      const out = m._malloc(bytes.length + 1);
      heap.set(bytes, out);
      heap[out + bytes.length] = 0;
      return out;
    },
    _decode(p, n, out, msg) {
      const size = heap[p + 4] * heap[p + 5] * heap[p + 6] * 2;
      if (n < 7 + size) {
        const text = new TextEncoder().encode('Failed to read QB3 data');
        heap.set(text, msg);
        heap[msg + text.length] = 0;
        return 0;
      }
      heap.copyWithin(out, p + 7, p + 7 + size);
      return size;
    },
    liveCount() { return live.size; },
  };
  return m;
}
"#)]
    extern "C" {
        #[wasm_bindgen(js_name = fakeModule)]
        fn fake_module() -> JsValue;
    }

    fn encoded(width: u8, height: u8, bands: u8) -> Vec<u8> {
        let mut bytes = b"QB3J".to_vec();
        bytes.extend_from_slice(&[width, height, bands]);
        let count = width as u16 * height as u16 * bands as u16;
        for i in 0..count {
            bytes.extend_from_slice(&(i * 100).to_le_bytes());
        }
        bytes
    }

    fn live_count(module: &JsValue) -> f64 {
        let f: js_sys::Function = Reflect::get(module, &"liveCount".into())
            .unwrap()
            .dyn_into()
            .unwrap();
        f.call0(module).unwrap().as_f64().unwrap()
    }

    fn expected(bands: u32) -> JsValue {
        serde_wasm_bindgen::to_value(&ExpectedDescriptor::new(4, 4, bands, ElementType::U16)).unwrap()
    }

    #[wasm_bindgen_test]
    fn test_get_info() {
        let module = fake_module();
        let decoder = JsQb3Decoder::new(module.clone(), JsValue::UNDEFINED).unwrap();
        let info = decoder.get_info(&encoded(4, 4, 1));
        assert_eq!(Reflect::get(&info, &"xsize".into()).unwrap().as_f64(), Some(4.0));
        assert_eq!(
            Reflect::get(&info, &"dtype".into()).unwrap().as_string().as_deref(),
            Some("uint16")
        );
        assert_eq!(live_count(&module), 0.0);
    }

    #[wasm_bindgen_test]
    fn test_get_info_empty_is_null() {
        let decoder = JsQb3Decoder::new(fake_module(), JsValue::UNDEFINED).unwrap();
        assert!(decoder.get_info(&[]).is_null());
    }

    #[wasm_bindgen_test]
    fn test_decode_uint16() {
        let module = fake_module();
        let decoder = JsQb3Decoder::new(module.clone(), JsValue::UNDEFINED).unwrap();
        let image = decoder.decode(&encoded(4, 4, 1), expected(1));

        let data: Uint16Array = Reflect::get(&image, &"data".into())
            .unwrap()
            .dyn_into()
            .unwrap();
        assert_eq!(data.length(), 16);
        assert_eq!(data.byte_length(), 32);
        assert_eq!(data.get_index(3), 300);
        assert_eq!(live_count(&module), 0.0);
    }

    #[wasm_bindgen_test]
    fn test_decode_mismatch_is_null() {
        let module = fake_module();
        let decoder = JsQb3Decoder::new(module.clone(), JsValue::UNDEFINED).unwrap();
        assert!(decoder.decode(&encoded(4, 4, 1), expected(3)).is_null());
        assert_eq!(live_count(&module), 0.0);
    }

    #[wasm_bindgen_test]
    fn test_decode_truncated_is_null() {
        let module = fake_module();
        let decoder = JsQb3Decoder::new(module.clone(), JsValue::UNDEFINED).unwrap();
        let bytes = encoded(4, 4, 1);
        assert!(decoder.decode(&bytes[..20], expected(1)).is_null());
        assert_eq!(live_count(&module), 0.0);
    }

    #[wasm_bindgen_test]
    fn test_missing_export_rejected() {
        let module = js_sys::Object::new();
        assert!(JsQb3Decoder::new(module.into(), JsValue::UNDEFINED).is_err());
    }
}
