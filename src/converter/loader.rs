//! Dynamic converter loading using libloading.

use super::abi::{ConverterSymbols, payload_from_raw, payload_into_raw};
use super::{ContextHandle, MessageConverter};
use crate::error::{Error, Result};
use crate::metadata::FrameMeta;
use crate::payload::{Payload, PayloadType};
use libloading::Library;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Something converter symbols can be looked up in.
///
/// Implemented for [`libloading::Library`]; tests and hosts that link a
/// converter statically can provide their own table.
pub trait SymbolSource {
    /// Address of the symbol called `name`, or `None` if it is not exported.
    ///
    /// # Safety
    ///
    /// Looking up symbols may run code of the library being inspected.
    unsafe fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>>;
}

impl SymbolSource for Library {
    unsafe fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>> {
        // SAFETY: The symbol is only read as an address, never called here.
        let symbol = unsafe { self.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        NonNull::new(*symbol)
    }
}

/// A converter whose operations live in a shared library.
///
/// The library stays loaded for as long as the converter exists; dropping
/// the converter unloads it.
pub struct DynamicConverter {
    symbols: ConverterSymbols,
    path: Option<PathBuf>,
    /// Declared last so the library is unloaded after everything else.
    _library: Option<Library>,
}

impl DynamicConverter {
    /// Load a converter library and bind its four entry points.
    ///
    /// # Safety
    ///
    /// Loading a library executes its initializers, and the exported
    /// functions are trusted to follow the converter ABI.
    pub unsafe fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: Caller guarantees the library is trusted.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::ConverterLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // SAFETY: Caller guarantees the exported symbols follow the ABI. On
        // failure `library` is dropped here, unloading it.
        let symbols = unsafe { ConverterSymbols::resolve(&library) }?;

        tracing::info!(path = %path.display(), "loaded converter library");

        Ok(Self {
            symbols,
            path: Some(path.to_path_buf()),
            _library: Some(library),
        })
    }

    /// Use entry points that are already linked into the process.
    ///
    /// # Safety
    ///
    /// The functions must follow the converter ABI.
    pub unsafe fn from_symbols(symbols: ConverterSymbols) -> Self {
        Self {
            symbols,
            path: None,
            _library: None,
        }
    }

    /// Path of the loaded library, if the converter came from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The bound entry points.
    pub fn symbols(&self) -> &ConverterSymbols {
        &self.symbols
    }
}

impl MessageConverter for DynamicConverter {
    fn name(&self) -> &str {
        self.path
            .as_deref()
            .and_then(Path::to_str)
            .unwrap_or("dynamic")
    }

    fn create_context(&self, payload_type: PayloadType) -> Option<ContextHandle> {
        // SAFETY: The entry point was resolved at load time and the library is kept alive.
        unsafe {
            let raw = (self.symbols.create)(payload_type as u32);
            ContextHandle::from_raw(raw)
        }
    }

    fn destroy_context(&self, context: ContextHandle) {
        // SAFETY: The context was created by this library.
        unsafe { (self.symbols.destroy)(context.into_raw()) }
    }

    fn generate(&self, context: &ContextHandle, frame: &FrameMeta, count: u32) -> Option<Box<Payload>> {
        // SAFETY: The frame outlives the call and the context belongs to this library.
        unsafe {
            let raw = (self.symbols.generate)(
                context.as_ptr(),
                frame as *const FrameMeta as *const c_void,
                count,
            );
            payload_from_raw(raw)
        }
    }

    fn release(&self, context: &ContextHandle, payload: Box<Payload>) {
        // SAFETY: Ownership of the payload moves to the library.
        unsafe { (self.symbols.release)(context.as_ptr(), payload_into_raw(payload)) }
    }
}

impl std::fmt::Debug for DynamicConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicConverter")
            .field("path", &self.path)
            .field("loaded", &self._library.is_some())
            .finish()
    }
}
