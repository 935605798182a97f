//! The converter ABI.
//!
//! A converter library exports four `extern "C"` functions under the names
//! below. Contexts, frames and payloads cross the boundary as pointers:
//!
//! - contexts are opaque `*mut c_void` owned by the library;
//! - frames are `*const FrameMeta`, borrowed for the duration of the call;
//! - payloads are `*mut Payload` created with [`payload_into_raw`].
//!
//! Frames and payloads are this crate's Rust types, so a converter library
//! must be built against the same version of this crate as the host.

use super::{ContextHandle, MessageConverter};
use crate::error::{Error, Result};
use crate::metadata::FrameMeta;
use crate::payload::{Payload, PayloadType};
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

/// Symbol name of the create operation.
pub const CREATE_SYMBOL: &str = "msgconv_ctx_create";
/// Symbol name of the destroy operation.
pub const DESTROY_SYMBOL: &str = "msgconv_ctx_destroy";
/// Symbol name of the generate operation.
pub const GENERATE_SYMBOL: &str = "msgconv_generate";
/// Symbol name of the release operation.
pub const RELEASE_SYMBOL: &str = "msgconv_release";

/// Creates a context for a payload type (passed as its `u32` discriminant).
///
/// Returns null on failure.
pub type CreateContextFn = unsafe extern "C" fn(payload_type: u32) -> *mut c_void;

/// Destroys a context.
pub type DestroyContextFn = unsafe extern "C" fn(context: *mut c_void);

/// Generates the payload for one frame (`*const FrameMeta`).
///
/// Returns null when no message is produced.
pub type GenerateFn =
    unsafe extern "C" fn(context: *mut c_void, frame: *const c_void, count: u32) -> *mut c_void;

/// Releases a payload (`*mut Payload`).
pub type ReleaseFn = unsafe extern "C" fn(context: *mut c_void, payload: *mut c_void);

/// The four converter entry points, bound together.
#[derive(Debug, Clone, Copy)]
pub struct ConverterSymbols {
    /// `msgconv_ctx_create`.
    pub create: CreateContextFn,
    /// `msgconv_ctx_destroy`.
    pub destroy: DestroyContextFn,
    /// `msgconv_generate`.
    pub generate: GenerateFn,
    /// `msgconv_release`.
    pub release: ReleaseFn,
}

impl ConverterSymbols {
    /// Resolve all four entry points from `source`.
    ///
    /// Either all four symbols resolve or an error naming the first missing
    /// one is returned; nothing is bound on failure.
    ///
    /// # Safety
    ///
    /// Each symbol found must be a function with the matching signature.
    pub unsafe fn resolve<S: super::SymbolSource + ?Sized>(source: &S) -> Result<Self> {
        let lookup = |symbol: &'static str| {
            // SAFETY: Caller guarantees the source is a trusted converter library.
            unsafe { source.symbol_address(symbol) }.ok_or(Error::MissingSymbol { symbol })
        };

        let create = lookup(CREATE_SYMBOL)?;
        let destroy = lookup(DESTROY_SYMBOL)?;
        let generate = lookup(GENERATE_SYMBOL)?;
        let release = lookup(RELEASE_SYMBOL)?;

        // SAFETY: Caller guarantees the symbols have the documented signatures;
        // function and data pointers have the same size on supported targets.
        unsafe {
            Ok(Self {
                create: std::mem::transmute::<*mut c_void, CreateContextFn>(create.as_ptr()),
                destroy: std::mem::transmute::<*mut c_void, DestroyContextFn>(destroy.as_ptr()),
                generate: std::mem::transmute::<*mut c_void, GenerateFn>(generate.as_ptr()),
                release: std::mem::transmute::<*mut c_void, ReleaseFn>(release.as_ptr()),
            })
        }
    }
}

/// Convert a payload box to a raw pointer for the ABI.
pub fn payload_into_raw(payload: Box<Payload>) -> *mut c_void {
    Box::into_raw(payload) as *mut c_void
}

/// Convert a raw ABI pointer back to a payload box.
///
/// Returns `None` for null.
///
/// # Safety
///
/// A non-null pointer must have been created by [`payload_into_raw`] and not
/// yet converted back.
pub unsafe fn payload_from_raw(ptr: *mut c_void) -> Option<Box<Payload>> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: Caller guarantees ptr came from payload_into_raw.
        Some(unsafe { Box::from_raw(ptr as *mut Payload) })
    }
}

/// Bodies of the functions generated by [`export_converter!`](crate::export_converter).
///
/// Each body catches panics so nothing unwinds across the ABI.
#[doc(hidden)]
pub mod export {
    use super::*;

    pub fn create<C: MessageConverter>(converter: &C, payload_type: u32) -> *mut c_void {
        let Some(payload_type) = PayloadType::from_raw(payload_type) else {
            return ptr::null_mut();
        };
        catch_unwind(AssertUnwindSafe(|| {
            converter
                .create_context(payload_type)
                .map(ContextHandle::into_raw)
        }))
        .ok()
        .flatten()
        .unwrap_or(ptr::null_mut())
    }

    /// # Safety
    ///
    /// `context` must be null or a context created by `create` for `converter`.
    pub unsafe fn destroy<C: MessageConverter>(converter: &C, context: *mut c_void) {
        // SAFETY: Caller guarantees the pointer is a live context.
        if let Some(context) = unsafe { ContextHandle::from_raw(context) } {
            let _ = catch_unwind(AssertUnwindSafe(|| converter.destroy_context(context)));
        }
    }

    /// # Safety
    ///
    /// `context` must be a live context of `converter`; `frame` must be null or
    /// point to a live `FrameMeta`.
    pub unsafe fn generate<C: MessageConverter>(
        converter: &C,
        context: *mut c_void,
        frame: *const c_void,
        count: u32,
    ) -> *mut c_void {
        // SAFETY: Caller guarantees the pointer is a live context.
        let Some(context) = (unsafe { ContextHandle::from_raw(context) }) else {
            return ptr::null_mut();
        };
        if frame.is_null() {
            return ptr::null_mut();
        }
        // SAFETY: Caller guarantees frame points to a FrameMeta for this call.
        let frame = unsafe { &*(frame as *const FrameMeta) };

        catch_unwind(AssertUnwindSafe(|| {
            converter.generate(&context, frame, count).map(payload_into_raw)
        }))
        .ok()
        .flatten()
        .unwrap_or(ptr::null_mut())
    }

    /// # Safety
    ///
    /// `context` must be a live context of `converter`; `payload` must be null
    /// or come from [`payload_into_raw`].
    pub unsafe fn release<C: MessageConverter>(
        converter: &C,
        context: *mut c_void,
        payload: *mut c_void,
    ) {
        // SAFETY: Caller guarantees the payload pointer ownership is handed over.
        let Some(payload) = (unsafe { payload_from_raw(payload) }) else {
            return;
        };
        // SAFETY: Caller guarantees the pointer is a live context.
        match unsafe { ContextHandle::from_raw(context) } {
            Some(context) => {
                let _ = catch_unwind(AssertUnwindSafe(|| converter.release(&context, payload)));
            }
            None => drop(payload),
        }
    }
}

/// Export a [`MessageConverter`] under the converter ABI symbol names.
///
/// The converter type must implement `Default`; one instance is created
/// lazily and shared by all contexts. Use this once per `cdylib`.
///
/// # Example
///
/// ```ignore
/// use parallax_msgconv::schema::SchemaConverter;
///
/// parallax_msgconv::export_converter!(SchemaConverter);
/// ```
#[macro_export]
macro_rules! export_converter {
    ($converter:ty) => {
        fn __msgconv_converter() -> &'static $converter {
            static CONVERTER: ::std::sync::OnceLock<$converter> = ::std::sync::OnceLock::new();
            CONVERTER.get_or_init(<$converter as ::std::default::Default>::default)
        }

        /// Converter ABI: create a context.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn msgconv_ctx_create(payload_type: u32) -> *mut ::std::ffi::c_void {
            $crate::converter::abi::export::create(__msgconv_converter(), payload_type)
        }

        /// Converter ABI: destroy a context.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn msgconv_ctx_destroy(context: *mut ::std::ffi::c_void) {
            unsafe { $crate::converter::abi::export::destroy(__msgconv_converter(), context) }
        }

        /// Converter ABI: generate the payload for one frame.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn msgconv_generate(
            context: *mut ::std::ffi::c_void,
            frame: *const ::std::ffi::c_void,
            count: u32,
        ) -> *mut ::std::ffi::c_void {
            unsafe {
                $crate::converter::abi::export::generate(__msgconv_converter(), context, frame, count)
            }
        }

        /// Converter ABI: release a payload.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn msgconv_release(
            context: *mut ::std::ffi::c_void,
            payload: *mut ::std::ffi::c_void,
        ) {
            unsafe { $crate::converter::abi::export::release(__msgconv_converter(), context, payload) }
        }
    };
}
