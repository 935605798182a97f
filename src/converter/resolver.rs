//! Converter selection and context lifetime.

use super::{ContextHandle, DynamicConverter, MessageConverter};
use crate::config::MsgConvConfig;
use crate::error::{Error, Result};
use crate::metadata::FrameMeta;
use crate::payload::{Payload, PayloadType};
use crate::schema::SchemaConverter;
use std::sync::Mutex;

/// Pick the converter for a configuration.
///
/// - [`PayloadType::Custom`] loads the configured converter library and binds
///   its four entry points; a missing path, a library that fails to load and a
///   missing symbol are all errors.
/// - Every other payload type uses the built-in [`SchemaConverter`]; nothing
///   is loaded.
pub fn resolve_converter(config: &MsgConvConfig) -> Result<Box<dyn MessageConverter>> {
    let payload_type = config.payload_type();

    if !payload_type.requires_library() {
        tracing::debug!(%payload_type, "using built-in schema converter");
        return Ok(Box::new(SchemaConverter::new()));
    }

    let path = config
        .converter_library()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(Error::MissingConverterLibrary)?;

    // SAFETY: The converter library is chosen by the application configuring
    // the element and is trusted to follow the converter ABI.
    let converter = unsafe { DynamicConverter::load(path) }?;
    Ok(Box::new(converter))
}

/// A converter together with the context created for it.
///
/// Dropping the `ActiveConverter` destroys the context and then drops the
/// converter, unloading its library if it came from one. Calls into the
/// converter are serialized, since contexts are not assumed to be reentrant.
pub struct ActiveConverter {
    context: Option<ContextHandle>,
    payload_type: PayloadType,
    calls: Mutex<()>,
    /// Declared after the context so it outlives it.
    converter: Box<dyn MessageConverter>,
}

impl ActiveConverter {
    /// Resolve the converter for `config` and create its context.
    pub fn start(config: &MsgConvConfig) -> Result<Self> {
        let converter = resolve_converter(config)?;
        Self::with_converter(converter, config.payload_type())
    }

    /// Create a context on an already resolved converter.
    ///
    /// If the converter returns no context it is dropped (unloading its
    /// library) before the error is returned.
    pub fn with_converter(
        converter: Box<dyn MessageConverter>,
        payload_type: PayloadType,
    ) -> Result<Self> {
        let Some(context) = converter.create_context(payload_type) else {
            tracing::error!(converter = converter.name(), %payload_type, "unable to create converter context");
            drop(converter);
            return Err(Error::ContextCreation(payload_type));
        };

        tracing::info!(converter = converter.name(), %payload_type, "converter context created");

        Ok(Self {
            context: Some(context),
            payload_type,
            calls: Mutex::new(()),
            converter,
        })
    }

    /// Payload type the context was created for.
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    /// Name of the bound converter.
    pub fn converter_name(&self) -> &str {
        self.converter.name()
    }

    /// Generate the payload for one frame.
    pub fn generate(&self, frame: &FrameMeta) -> Option<Box<Payload>> {
        let context = self.context.as_ref()?;
        let _guard = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        self.converter.generate(context, frame, 1)
    }

    /// Hand a payload back to the converter.
    pub fn release(&self, payload: Box<Payload>) {
        match self.context.as_ref() {
            Some(context) => {
                let _guard = self.calls.lock().unwrap_or_else(|e| e.into_inner());
                self.converter.release(context, payload);
            }
            None => drop(payload),
        }
    }
}

impl Drop for ActiveConverter {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.converter.destroy_context(context);
            tracing::info!(converter = self.converter.name(), "converter context destroyed");
        }
    }
}

impl std::fmt::Debug for ActiveConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConverter")
            .field("converter", &self.converter.name())
            .field("payload_type", &self.payload_type)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counts {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        dropped: AtomicUsize,
    }

    struct NullContextConverter(Arc<Counts>);

    impl MessageConverter for NullContextConverter {
        fn create_context(&self, _: PayloadType) -> Option<ContextHandle> {
            None
        }

        fn destroy_context(&self, _: ContextHandle) {
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn generate(&self, _: &ContextHandle, _: &FrameMeta, _: u32) -> Option<Box<Payload>> {
            None
        }

        fn release(&self, _: &ContextHandle, _: Box<Payload>) {}
    }

    impl Drop for NullContextConverter {
        fn drop(&mut self) {
            self.0.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct UnitContextConverter(Arc<Counts>);

    impl MessageConverter for UnitContextConverter {
        fn create_context(&self, _: PayloadType) -> Option<ContextHandle> {
            self.0.created.fetch_add(1, Ordering::SeqCst);
            Some(ContextHandle::from_box(Box::new(0u8)))
        }

        fn destroy_context(&self, context: ContextHandle) {
            drop(unsafe { context.into_box::<u8>() });
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn generate(&self, _: &ContextHandle, _: &FrameMeta, _: u32) -> Option<Box<Payload>> {
            None
        }

        fn release(&self, _: &ContextHandle, _: Box<Payload>) {}
    }

    impl Drop for UnitContextConverter {
        fn drop(&mut self) {
            self.0.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_builtin_for_non_custom_types() {
        for payload_type in [PayloadType::Full, PayloadType::Minimal, PayloadType::Reserved] {
            let config = MsgConvConfig::new().with_payload_type(payload_type);
            let active = ActiveConverter::start(&config).unwrap();
            assert_eq!(active.payload_type(), payload_type);
            assert_eq!(active.converter_name(), "schema");
        }
    }

    #[test]
    fn test_custom_without_library_is_config_error() {
        let config = MsgConvConfig::new().with_payload_type(PayloadType::Custom);
        let err = ActiveConverter::start(&config).unwrap_err();
        assert!(matches!(err, Error::MissingConverterLibrary));
        assert!(err.is_startup_error());
    }

    #[test]
    fn test_custom_with_empty_library_path_is_config_error() {
        let config = MsgConvConfig::new()
            .with_payload_type(PayloadType::Custom)
            .with_converter_library("");
        assert!(matches!(
            resolve_converter(&config),
            Err(Error::MissingConverterLibrary)
        ));
    }

    #[test]
    fn test_custom_with_missing_library_is_load_error() {
        let config = MsgConvConfig::new()
            .with_payload_type(PayloadType::Custom)
            .with_converter_library("/nonexistent/libconverter.so");
        assert!(matches!(
            ActiveConverter::start(&config),
            Err(Error::ConverterLoad { .. })
        ));
    }

    #[test]
    fn test_null_context_drops_converter_first() {
        let counts = Arc::new(Counts::default());
        let err = ActiveConverter::with_converter(
            Box::new(NullContextConverter(counts.clone())),
            PayloadType::Full,
        )
        .unwrap_err();

        assert!(matches!(err, Error::ContextCreation(PayloadType::Full)));
        assert_eq!(counts.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_destroys_context_then_converter() {
        let counts = Arc::new(Counts::default());
        let active = ActiveConverter::with_converter(
            Box::new(UnitContextConverter(counts.clone())),
            PayloadType::Minimal,
        )
        .unwrap();

        assert_eq!(counts.created.load(Ordering::SeqCst), 1);
        drop(active);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(counts.dropped.load(Ordering::SeqCst), 1);
    }
}
