//! Message converter element.
//!
//! Turns the batch analytics metadata attached to each buffer into one
//! serialized payload per frame and attaches the payloads back to their
//! frames as [`MetaType::Payload`] user metadata. Downstream elements (a
//! message broker sink, for example) pick the payloads up from there.
//!
//! The buffer content is never touched.

use crate::buffer::Buffer;
use crate::config::{MsgConvConfig, PROP_PAYLOAD_TYPE, PropertyValue};
use crate::converter::{ActiveConverter, MessageConverter};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::memory::{UserMetaData, UserMetaOps};
use crate::metadata::MetaType;
use crate::payload::Payload;
use std::collections::HashMap;
use std::sync::Arc;

/// Copy/release callbacks of attached payloads.
///
/// Holds the converter, so a payload that outlives [`MsgConv::stop`] is still
/// released through the converter that generated it.
struct PayloadMetaOps {
    converter: Arc<ActiveConverter>,
}

impl UserMetaOps for PayloadMetaOps {
    fn copy(&self, data: &UserMetaData) -> Option<UserMetaData> {
        data.downcast_ref::<Payload>()
            .map(|payload| Box::new(payload.clone()) as UserMetaData)
    }

    fn release(&self, data: UserMetaData) {
        match data.downcast::<Payload>() {
            Ok(payload) => self.converter.release(payload),
            Err(other) => drop(other),
        }
    }
}

/// Statistics for the message converter element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgConvStats {
    /// Buffers seen by `process`.
    pub buffers_processed: u64,
    /// Payloads attached to frames.
    pub payloads_attached: u64,
    /// Frames for which the converter produced no payload.
    pub frames_skipped: u64,
}

/// Converts frame metadata into payloads.
///
/// # Example
///
/// ```rust
/// use parallax_msgconv::buffer::Buffer;
/// use parallax_msgconv::config::MsgConvConfig;
/// use parallax_msgconv::element::Element;
/// use parallax_msgconv::elements::MsgConv;
/// use parallax_msgconv::metadata::{BatchMeta, FrameMeta, MetaType, ObjectMeta};
/// use parallax_msgconv::payload::{Payload, PayloadType};
///
/// let mut msgconv = MsgConv::new(
///     MsgConvConfig::new()
///         .with_payload_type(PayloadType::Minimal)
///         .with_component_id(2),
/// );
/// msgconv.start()?;
///
/// let mut buffer = Buffer::from_static(b"frame");
/// buffer.add_meta_batch(
///     BatchMeta::new(1).with_frame(FrameMeta::new(0, 0).with_object(ObjectMeta::new(1, 0, 0.9))),
/// );
///
/// let buffer = msgconv.process(buffer)?.unwrap();
/// let frame = &buffer.batch_meta().unwrap().frames[0];
/// let payload = frame.user_meta()[0].data::<Payload>().unwrap();
/// assert_eq!(frame.user_meta()[0].meta_type(), MetaType::Payload);
/// assert_eq!(payload.component_id, 2);
/// # Ok::<(), parallax_msgconv::Error>(())
/// ```
pub struct MsgConv {
    name: String,
    config: MsgConvConfig,
    active: Option<Arc<ActiveConverter>>,
    stats: MsgConvStats,
}

impl MsgConv {
    /// Create a stopped element.
    pub fn new(config: MsgConvConfig) -> Self {
        Self {
            name: "msgconv".to_string(),
            config,
            active: None,
            stats: MsgConvStats::default(),
        }
    }

    /// Create a stopped element from properties.
    pub fn from_properties(props: &HashMap<String, PropertyValue>) -> Result<Self> {
        Ok(Self::new(MsgConvConfig::from_properties(props)?))
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &MsgConvConfig {
        &self.config
    }

    /// Change a property.
    ///
    /// `payload-type` cannot be changed while the element is started; other
    /// properties take effect on the next buffer or the next start.
    pub fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        if name == PROP_PAYLOAD_TYPE && self.is_started() {
            return Err(Error::AlreadyStarted(PROP_PAYLOAD_TYPE));
        }
        self.config.set_property(name, value)
    }

    /// Resolve the converter and create its context.
    ///
    /// Does nothing if the element is already started.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }
        let active = ActiveConverter::start(&self.config).inspect_err(|e| {
            tracing::error!(element = %self.name, "failed to start: {}", e);
        })?;
        self.activate(active);
        Ok(())
    }

    /// Start with an in-process converter instead of resolving one.
    pub fn start_with_converter(&mut self, converter: Box<dyn MessageConverter>) -> Result<()> {
        if self.is_started() {
            return Err(Error::AlreadyStarted("converter"));
        }
        let active = ActiveConverter::with_converter(converter, self.config.payload_type())?;
        self.activate(active);
        Ok(())
    }

    fn activate(&mut self, active: ActiveConverter) {
        tracing::info!(
            element = %self.name,
            converter = active.converter_name(),
            payload_type = %active.payload_type(),
            "started"
        );
        self.active = Some(Arc::new(active));
    }

    /// Release the converter.
    ///
    /// The context is destroyed and the library unloaded once every payload
    /// still attached to an in-flight buffer has been released. Stopping a
    /// stopped element does nothing.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!(
                element = %self.name,
                outstanding = Arc::strong_count(&active) - 1,
                "stopped"
            );
        }
    }

    /// Whether the element has an active converter.
    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Get statistics.
    pub fn stats(&self) -> MsgConvStats {
        self.stats
    }
}

impl Drop for MsgConv {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Element for MsgConv {
    fn process(&mut self, mut buffer: Buffer) -> Result<Option<Buffer>> {
        let active = Arc::clone(self.active.as_ref().ok_or(Error::NotStarted)?);
        self.stats.buffers_processed += 1;

        let Some(batch) = buffer.batch_meta_mut() else {
            tracing::trace!(element = %self.name, sequence = buffer.sequence(), "no batch metadata");
            return Ok(Some(buffer));
        };

        let component_id = self.config.component_id();
        let mut generated = Vec::with_capacity(batch.frames.len());
        for (index, frame) in batch.frames.iter().enumerate() {
            match active.generate(frame) {
                Some(mut payload) => {
                    payload.component_id = component_id;
                    generated.push((index, payload));
                }
                None => {
                    tracing::trace!(frame_num = frame.frame_num, source_id = frame.source_id, "no payload");
                    self.stats.frames_skipped += 1;
                }
            }
        }

        // Reserve every slot before attaching anything, so a batch is either
        // fully annotated or left as it was.
        let mut slots = Vec::with_capacity(generated.len());
        for _ in 0..generated.len() {
            match batch.pool().acquire() {
                Some(slot) => slots.push(slot),
                None => {
                    drop(slots);
                    for (_, payload) in generated {
                        active.release(payload);
                    }
                    tracing::error!(element = %self.name, "user meta pool exhausted, buffer not annotated");
                    return Err(Error::PoolExhausted);
                }
            }
        }

        let ops: Arc<dyn UserMetaOps> = Arc::new(PayloadMetaOps {
            converter: Arc::clone(&active),
        });
        let attached = generated.len();
        for ((index, payload), mut slot) in generated.into_iter().zip(slots) {
            slot.set_data(MetaType::Payload, payload, Some(Arc::clone(&ops)));
            batch.frames[index].add_user_meta(slot);
        }

        self.stats.payloads_attached += attached as u64;
        tracing::debug!(
            element = %self.name,
            frames = batch.frames.len(),
            attached,
            "converted batch"
        );

        Ok(Some(buffer))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MsgConv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgConv")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PROP_COMPONENT_ID, PROP_CONVERTER_LIB};
    use crate::converter::ContextHandle;
    use crate::memory::UserMetaPool;
    use crate::metadata::{BatchMeta, FrameMeta, ObjectMeta};
    use crate::payload::PayloadType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counts {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        generated: AtomicUsize,
        released: AtomicUsize,
    }

    impl Counts {
        fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    /// Produces a payload for every frame with at least one object.
    struct CountingConverter(Arc<Counts>);

    impl MessageConverter for CountingConverter {
        fn name(&self) -> &str {
            "counting"
        }

        fn create_context(&self, _: PayloadType) -> Option<ContextHandle> {
            self.0.created.fetch_add(1, Ordering::SeqCst);
            Some(ContextHandle::from_box(Box::new(())))
        }

        fn destroy_context(&self, context: ContextHandle) {
            drop(unsafe { context.into_box::<()>() });
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn generate(&self, _: &ContextHandle, frame: &FrameMeta, _: u32) -> Option<Box<Payload>> {
            if frame.objects.is_empty() {
                return None;
            }
            self.0.generated.fetch_add(1, Ordering::SeqCst);
            Some(Box::new(Payload::new(format!("{}", frame.frame_num))))
        }

        fn release(&self, _: &ContextHandle, payload: Box<Payload>) {
            drop(payload);
            self.0.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_element(counts: &Arc<Counts>) -> MsgConv {
        let mut msgconv = MsgConv::new(MsgConvConfig::new().with_component_id(7));
        msgconv
            .start_with_converter(Box::new(CountingConverter(counts.clone())))
            .unwrap();
        msgconv
    }

    fn frame_with_objects(frame_num: i32) -> FrameMeta {
        FrameMeta::new(frame_num, 0).with_object(ObjectMeta::new(1, 0, 0.5))
    }

    fn batch_buffer(batch: BatchMeta) -> Buffer {
        let mut buffer = Buffer::from_static(b"pixels");
        buffer.add_meta_batch(batch);
        buffer
    }

    #[test]
    fn test_process_before_start() {
        let mut msgconv = MsgConv::new(MsgConvConfig::new());
        let result = msgconv.process(Buffer::from_static(b"x"));
        assert!(matches!(result, Err(Error::NotStarted)));
    }

    #[test]
    fn test_buffer_without_batch_passes_through() {
        let mut msgconv = MsgConv::new(MsgConvConfig::new());
        msgconv.start().unwrap();

        let buffer = Buffer::from_static(b"raw").with_sequence(5);
        let out = msgconv.process(buffer).unwrap().unwrap();
        assert_eq!(out.sequence(), 5);
        assert_eq!(out.as_bytes(), b"raw");
        assert!(out.metas().is_empty());
        assert_eq!(msgconv.stats().buffers_processed, 1);
        assert_eq!(msgconv.stats().payloads_attached, 0);
    }

    #[test]
    fn test_attaches_payload_per_frame() {
        let mut msgconv = MsgConv::new(
            MsgConvConfig::new()
                .with_payload_type(PayloadType::Minimal)
                .with_component_id(4),
        );
        msgconv.start().unwrap();

        let buffer = batch_buffer(
            BatchMeta::new(2)
                .with_frame(frame_with_objects(10))
                .with_frame(FrameMeta::new(11, 1)),
        );
        let content = buffer.as_bytes().as_ptr();

        let out = msgconv.process(buffer).unwrap().unwrap();
        assert_eq!(out.as_bytes().as_ptr(), content);

        let frames = &out.batch_meta().unwrap().frames;
        for frame in frames {
            assert_eq!(frame.user_meta().len(), 1);
            let meta = &frame.user_meta()[0];
            assert_eq!(meta.meta_type(), MetaType::Payload);
            let payload = meta.data::<Payload>().unwrap();
            assert_eq!(payload.component_id, 4);

            let doc: serde_json::Value = serde_json::from_slice(payload.as_bytes()).unwrap();
            assert_eq!(doc["frame_num"], frame.frame_num);
        }
        assert_eq!(msgconv.stats().payloads_attached, 2);
    }

    #[test]
    fn test_frames_without_payload_are_skipped() {
        let counts = Arc::new(Counts::default());
        let mut msgconv = counting_element(&counts);

        let buffer = batch_buffer(
            BatchMeta::new(3)
                .with_frame(frame_with_objects(1))
                .with_frame(FrameMeta::new(2, 0))
                .with_frame(frame_with_objects(3)),
        );
        let out = msgconv.process(buffer).unwrap().unwrap();

        let attached: Vec<usize> = out
            .batch_meta()
            .unwrap()
            .frames
            .iter()
            .map(|f| f.user_meta().len())
            .collect();
        assert_eq!(attached, vec![1, 0, 1]);
        assert_eq!(msgconv.stats().frames_skipped, 1);
        assert_eq!(msgconv.stats().payloads_attached, 2);
    }

    #[test]
    fn test_every_payload_released_once() {
        let counts = Arc::new(Counts::default());
        let mut msgconv = counting_element(&counts);

        let buffer = batch_buffer(
            BatchMeta::new(2)
                .with_frame(frame_with_objects(1))
                .with_frame(frame_with_objects(2)),
        );
        let out = msgconv.process(buffer).unwrap().unwrap();
        let copy = out.duplicate().unwrap();

        let payload = copy.batch_meta().unwrap().frames[1].user_meta()[0]
            .data::<Payload>()
            .unwrap();
        assert_eq!(payload.as_str(), Some("2"));
        assert_eq!(payload.component_id, 7);

        drop(out);
        assert_eq!(Counts::get(&counts.released), 2);
        drop(copy);
        assert_eq!(Counts::get(&counts.generated), 2);
        assert_eq!(Counts::get(&counts.released), 4);

        msgconv.stop();
        assert_eq!(Counts::get(&counts.created), 1);
        assert_eq!(Counts::get(&counts.destroyed), 1);
    }

    #[test]
    fn test_payloads_outlive_stop() {
        let counts = Arc::new(Counts::default());
        let mut msgconv = counting_element(&counts);

        let out = msgconv
            .process(batch_buffer(BatchMeta::new(1).with_frame(frame_with_objects(1))))
            .unwrap()
            .unwrap();

        msgconv.stop();
        assert!(!msgconv.is_started());
        assert_eq!(Counts::get(&counts.destroyed), 0);

        drop(out);
        assert_eq!(Counts::get(&counts.released), 1);
        assert_eq!(Counts::get(&counts.destroyed), 1);
    }

    #[test]
    fn test_pool_exhaustion_releases_payloads() {
        let counts = Arc::new(Counts::default());
        let mut msgconv = counting_element(&counts);

        let pool = UserMetaPool::new(1);
        let buffer = batch_buffer(
            BatchMeta::with_pool(2, pool.clone())
                .with_frame(frame_with_objects(1))
                .with_frame(frame_with_objects(2)),
        );

        let result = msgconv.process(buffer);
        assert!(matches!(result, Err(Error::PoolExhausted)));
        assert_eq!(Counts::get(&counts.generated), 2);
        assert_eq!(Counts::get(&counts.released), 2);
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().exhausted, 1);
        assert!(msgconv.is_started());
    }

    #[test]
    fn test_custom_without_library_fails_to_start() {
        let mut msgconv = MsgConv::new(MsgConvConfig::new().with_payload_type(PayloadType::Custom));
        assert!(matches!(msgconv.start(), Err(Error::MissingConverterLibrary)));
        assert!(!msgconv.is_started());
    }

    #[test]
    fn test_payload_type_locked_while_started() {
        let mut msgconv = MsgConv::new(MsgConvConfig::new());
        msgconv.start().unwrap();

        let err = msgconv
            .set_property(PROP_PAYLOAD_TYPE, &"minimal".into())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyStarted(PROP_PAYLOAD_TYPE)));

        msgconv
            .set_property(PROP_COMPONENT_ID, &PropertyValue::Integer(9))
            .unwrap();
        msgconv
            .set_property(PROP_CONVERTER_LIB, &"/opt/libother.so".into())
            .unwrap();
        assert_eq!(msgconv.config().component_id(), 9);

        msgconv.stop();
        msgconv.stop();
        msgconv
            .set_property(PROP_PAYLOAD_TYPE, &"minimal".into())
            .unwrap();
        assert_eq!(msgconv.config().payload_type(), PayloadType::Minimal);
    }

    #[test]
    fn test_restart_creates_fresh_context() {
        let counts = Arc::new(Counts::default());
        let mut msgconv = counting_element(&counts);
        msgconv.stop();
        msgconv
            .start_with_converter(Box::new(CountingConverter(counts.clone())))
            .unwrap();
        msgconv.stop();

        assert_eq!(Counts::get(&counts.created), 2);
        assert_eq!(Counts::get(&counts.destroyed), 2);
    }

    #[test]
    fn test_from_properties() {
        let props: HashMap<String, PropertyValue> =
            [(PROP_PAYLOAD_TYPE.to_string(), "PAYLOAD_DEEPSTREAM_MINIMAL".into())]
                .into_iter()
                .collect();
        let msgconv = MsgConv::from_properties(&props).unwrap().with_name("conv0");
        assert_eq!(msgconv.name(), "conv0");
        assert_eq!(msgconv.config().payload_type(), PayloadType::Minimal);
    }
}
