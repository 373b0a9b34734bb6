//! Conversions from core QB3 types to JavaScript values.

use js_sys::{
    BigInt64Array, BigUint64Array, Int16Array, Int32Array, Int8Array, Reflect, Uint16Array,
    Uint32Array, Uint8Array,
};
use qb3_core::{DecodedRaster, PixelData, RasterDescriptor};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::JsValue;

/// Convert a descriptor to a plain object (`{ xsize, ysize, nbands, dtype, ... }`).
///
/// Uses the JSON-compatible serializer so pass-through metadata becomes plain
/// objects rather than `Map`s.
pub(crate) fn descriptor_to_js(descriptor: &RasterDescriptor) -> Result<JsValue, JsValue> {
    Ok(descriptor.serialize(&Serializer::json_compatible())?)
}

/// Copy samples into a new typed array of the matching element type.
///
/// 64-bit samples become `BigUint64Array` / `BigInt64Array`.
pub(crate) fn pixels_to_js(data: &PixelData) -> JsValue {
    match data {
        PixelData::U8(v) => Uint8Array::from(v.as_slice()).into(),
        PixelData::I8(v) => Int8Array::from(v.as_slice()).into(),
        PixelData::U16(v) => Uint16Array::from(v.as_slice()).into(),
        PixelData::I16(v) => Int16Array::from(v.as_slice()).into(),
        PixelData::U32(v) => Uint32Array::from(v.as_slice()).into(),
        PixelData::I32(v) => Int32Array::from(v.as_slice()).into(),
        PixelData::U64(v) => BigUint64Array::from(v.as_slice()).into(),
        PixelData::I64(v) => BigInt64Array::from(v.as_slice()).into(),
    }
}

/// Convert a decoded raster to its descriptor object with the samples under `data`.
pub(crate) fn raster_to_js(raster: &DecodedRaster) -> Result<JsValue, JsValue> {
    let object = descriptor_to_js(&raster.descriptor)?;
    Reflect::set(&object, &JsValue::from_str("data"), &pixels_to_js(&raster.data))?;
    Ok(object)
}
