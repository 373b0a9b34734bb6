//! Kernel adapter over an instantiated Emscripten QB3 module.
//!
//! The host loads and instantiates the C decoder compiled with Emscripten and
//! hands the module object over. The adapter drives it through the module's
//! exports, the same way hand-written glue would:
//!
//! - `_malloc` / `_free` - staging memory in the module's linear memory
//! - `HEAPU8` - byte view of that memory, re-read on every access because it
//!   is replaced whenever the memory grows
//! - `UTF8ToString` - reads NUL-terminated strings
//! - `_GetInfo` / `_decode` - the header parser and decoder

use js_sys::{Array, Function, Object, Reflect, Uint8Array};
use qb3_core::{KernelError, NativeKernel, NativePtr};
use wasm_bindgen::{JsCast, JsValue};

/// A [`NativeKernel`] backed by an Emscripten module object.
pub struct JsKernel {
    module: Object,
    malloc: Function,
    free: Function,
    get_info: Function,
    decode: Function,
    utf8_to_string: Function,
}

impl JsKernel {
    /// Wrap an instantiated module.
    ///
    /// # Errors
    ///
    /// Returns an error if `module` is not an object or lacks one of the
    /// required exports.
    pub fn new(module: JsValue) -> Result<Self, JsValue> {
        let module: Object = module
            .dyn_into()
            .map_err(|_| JsValue::from_str("QB3 module must be an object"))?;
        Ok(Self {
            malloc: export(&module, "_malloc")?,
            free: export(&module, "_free")?,
            get_info: export(&module, "_GetInfo")?,
            decode: export(&module, "_decode")?,
            utf8_to_string: export(&module, "UTF8ToString")?,
            module,
        })
    }

    /// A view of `len` bytes at `ptr` in the module's current memory.
    fn view(&self, ptr: NativePtr, len: usize) -> Result<Uint8Array, KernelError> {
        let heap = Reflect::get(&self.module, &JsValue::from_str("HEAPU8"))
            .map_err(|e| call_error("HEAPU8", e))?
            .dyn_into::<Uint8Array>()
            .map_err(|e| call_error("HEAPU8", e))?;

        let start = ptr.addr();
        match start.checked_add(len) {
            Some(end) if !ptr.is_null() && end <= heap.length() as usize => {
                Ok(heap.subarray(start as u32, end as u32))
            }
            _ => Err(KernelError::OutOfBounds { ptr, len }),
        }
    }
}

fn export(module: &Object, name: &str) -> Result<Function, JsValue> {
    Reflect::get(module, &JsValue::from_str(name))?
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("QB3 module is missing `{}`", name)))
}

/// Best-effort text for a thrown JavaScript value.
fn describe(value: &JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn call_error(name: &'static str, err: JsValue) -> KernelError {
    KernelError::Call {
        name,
        message: describe(&err),
    }
}

fn number(value: usize) -> JsValue {
    JsValue::from_f64(value as f64)
}

/// Interpret a call result as an unsigned integer (a pointer or a byte count).
fn as_usize(name: &'static str, value: JsValue) -> Result<usize, KernelError> {
    match value.as_f64() {
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(KernelError::Call {
            name,
            message: format!("expected an unsigned integer, got {}", describe(&value)),
        }),
    }
}

impl NativeKernel for JsKernel {
    fn malloc(&self, size: usize) -> Result<NativePtr, KernelError> {
        let ptr = self
            .malloc
            .call1(&JsValue::NULL, &number(size))
            .map_err(|e| call_error("_malloc", e))?;
        Ok(NativePtr::new(as_usize("_malloc", ptr)?))
    }

    fn free(&self, ptr: NativePtr) {
        if ptr.is_null() {
            return;
        }
        if let Err(e) = self.free.call1(&JsValue::NULL, &number(ptr.addr())) {
            log::warn!("_free({}) threw: {}", ptr, describe(&e));
        }
    }

    fn write_bytes(&self, dst: NativePtr, src: &[u8]) -> Result<(), KernelError> {
        self.view(dst, src.len())?.copy_from(src);
        Ok(())
    }

    fn read_bytes(&self, src: NativePtr, dst: &mut [u8]) -> Result<(), KernelError> {
        self.view(src, dst.len())?.copy_to(dst);
        Ok(())
    }

    fn read_c_string(
        &self,
        src: NativePtr,
        max_len: Option<usize>,
    ) -> Result<String, KernelError> {
        let max = max_len.map_or(JsValue::UNDEFINED, number);
        let text = self
            .utf8_to_string
            .call2(&JsValue::NULL, &number(src.addr()), &max)
            .map_err(|e| call_error("UTF8ToString", e))?;
        text.as_string().ok_or_else(|| KernelError::Call {
            name: "UTF8ToString",
            message: "did not return a string".to_string(),
        })
    }

    fn parse_header(&self, input: NativePtr, len: usize) -> Result<NativePtr, KernelError> {
        let result = self
            .get_info
            .call2(&JsValue::NULL, &number(input.addr()), &number(len))
            .map_err(|e| call_error("_GetInfo", e))?;
        Ok(NativePtr::new(as_usize("_GetInfo", result)?))
    }

    fn decode(
        &self,
        input: NativePtr,
        len: usize,
        output: NativePtr,
        message: NativePtr,
    ) -> Result<usize, KernelError> {
        let args = Array::of4(
            &number(input.addr()),
            &number(len),
            &number(output.addr()),
            &number(message.addr()),
        );
        let written = self
            .decode
            .apply(&JsValue::NULL, &args)
            .map_err(|e| call_error("_decode", e))?;
        as_usize("_decode", written)
    }
}
