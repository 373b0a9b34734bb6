//! QB3 WASM - WebAssembly bindings for QB3 raster decoding
//!
//! This crate exposes qb3-core to JavaScript/TypeScript applications. The
//! QB3 decode kernel itself is a separate Emscripten module that the host
//! loads; a `Qb3Decoder` is bound to one instance of it.
//!
//! # Module Structure
//!
//! - `decode` - the `Qb3Decoder` class (`getInfo`, `decode`)
//! - `kernel` - kernel adapter over the Emscripten module's exports
//! - `types` - conversion of descriptors and samples to JS values
//! - `logger` - `log` backend writing to the browser console
//!
//! # Usage
//!
//! ```typescript
//! import init, { Qb3Decoder, setLogLevel } from '@qb3/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//! setLogLevel('debug');
//!
//! const decoder = new Qb3Decoder(qb3Module);
//! const image = decoder.decode(bytes, { xsize: 512, ysize: 512, nbands: 3, dtype: 'uint8' });
//! ```

use wasm_bindgen::prelude::*;

mod decode;
mod kernel;
mod logger;
mod types;

// Re-export public types
pub use decode::JsQb3Decoder;
pub use kernel::JsKernel;

/// Initialize the WASM module (called automatically on load)
///
/// Installs the console logger at `warn` level, so decode failures are
/// reported on the console.
#[wasm_bindgen(start)]
pub fn init() {
    logger::init(log::LevelFilter::Warn);
}

/// Set the console log level (`"off"`, `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`).
///
/// Returns `false` and leaves the level unchanged for an unknown name.
#[wasm_bindgen(js_name = setLogLevel)]
pub fn set_log_level(level: &str) -> bool {
    match logger::parse_level(level) {
        Some(filter) => {
            logger::init(filter);
            true
        }
        None => false,
    }
}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
