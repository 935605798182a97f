//! Pluggable message converters.
//!
//! A message converter turns the analytics metadata of one frame into a
//! serialized [`Payload`]. Every converter provides the same four operations:
//!
//! | Operation | ABI symbol | Purpose |
//! |---|---|---|
//! | create | `msgconv_ctx_create` | allocate a context for a payload type |
//! | destroy | `msgconv_ctx_destroy` | free a context |
//! | generate | `msgconv_generate` | build the payload for one frame |
//! | release | `msgconv_release` | free a payload |
//!
//! In-process converters implement [`MessageConverter`] directly; the
//! built-in [`SchemaConverter`](crate::schema::SchemaConverter) is one.
//! External converters are shared libraries exporting the four symbols, which
//! [`DynamicConverter`] binds and calls. A Rust converter can be exported
//! from a `cdylib` with [`export_converter!`](crate::export_converter).
//!
//! # Example Converter Library
//!
//! ```ignore
//! use parallax_msgconv::converter::{ContextHandle, MessageConverter};
//! use parallax_msgconv::metadata::FrameMeta;
//! use parallax_msgconv::payload::{Payload, PayloadType};
//!
//! #[derive(Default)]
//! struct CsvConverter;
//!
//! impl MessageConverter for CsvConverter {
//!     // ...
//! }
//!
//! parallax_msgconv::export_converter!(CsvConverter);
//! ```

pub mod abi;
mod loader;
mod resolver;

pub use abi::{
    CREATE_SYMBOL, ConverterSymbols, CreateContextFn, DESTROY_SYMBOL, DestroyContextFn,
    GENERATE_SYMBOL, GenerateFn, RELEASE_SYMBOL, ReleaseFn, payload_from_raw, payload_into_raw,
};
pub use loader::{DynamicConverter, SymbolSource};
pub use resolver::{ActiveConverter, resolve_converter};

use crate::metadata::FrameMeta;
use crate::payload::{Payload, PayloadType};
use std::ffi::c_void;
use std::ptr::NonNull;

/// Opaque converter context.
///
/// A handle is created by [`MessageConverter::create_context`] and must only
/// be passed back to the converter that created it. It is consumed by
/// [`MessageConverter::destroy_context`], so it cannot be destroyed twice.
#[derive(Debug)]
pub struct ContextHandle {
    ptr: NonNull<c_void>,
}

// SAFETY: The handle is an opaque token; the converter that created it is
// `Send + Sync` and is responsible for the state behind it.
unsafe impl Send for ContextHandle {}
unsafe impl Sync for ContextHandle {}

impl ContextHandle {
    /// Wrap a raw context pointer, returning `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live context returned by a converter's create operation.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// Box a context value.
    pub fn from_box<T: Send + Sync>(context: Box<T>) -> Self {
        let ptr = Box::into_raw(context) as *mut c_void;
        // SAFETY: Box::into_raw never returns null.
        Self {
            ptr: unsafe { NonNull::new_unchecked(ptr) },
        }
    }

    /// Raw pointer, for passing across the ABI.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    /// Give up ownership and return the raw pointer.
    pub fn into_raw(self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    /// Borrow the context value.
    ///
    /// # Safety
    ///
    /// The handle must have been created by [`ContextHandle::from_box`] with a
    /// `Box<T>`.
    pub unsafe fn as_ref<T>(&self) -> &T {
        // SAFETY: Caller guarantees the pointee is a live T.
        unsafe { &*(self.ptr.as_ptr() as *const T) }
    }

    /// Take the context value back.
    ///
    /// # Safety
    ///
    /// The handle must have been created by [`ContextHandle::from_box`] with a
    /// `Box<T>`.
    pub unsafe fn into_box<T>(self) -> Box<T> {
        // SAFETY: Caller guarantees the pointer came from Box::<T>::into_raw.
        unsafe { Box::from_raw(self.ptr.as_ptr() as *mut T) }
    }
}

/// The four converter operations.
///
/// Implementations must not unwind and must not keep references into the
/// frame passed to [`generate`](MessageConverter::generate).
pub trait MessageConverter: Send + Sync {
    /// Name of this converter (for logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Create an independent context, or `None` on failure.
    fn create_context(&self, payload_type: PayloadType) -> Option<ContextHandle>;

    /// Free a context created by this converter.
    fn destroy_context(&self, context: ContextHandle);

    /// Build the payload for one frame.
    ///
    /// Returns `None` when no message should be produced for this frame.
    /// `count` is reserved for batched generation and is always 1.
    fn generate(&self, context: &ContextHandle, frame: &FrameMeta, count: u32)
    -> Option<Box<Payload>>;

    /// Free a payload produced by [`generate`](MessageConverter::generate) or
    /// copied from one.
    fn release(&self, context: &ContextHandle, payload: Box<Payload>);
}
