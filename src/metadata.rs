//! Frame analytics metadata.
//!
//! Upstream inference elements describe what they found in a batch of frames
//! with a tree of plain records:
//!
//! ```text
//! BatchMeta
//! └── FrameMeta (one per frame in the batch)
//!     ├── ObjectMeta (detected objects, in detection order)
//!     │   └── ClassifierMeta
//!     │       └── LabelInfo
//!     ├── DisplayMeta (overlay primitives)
//!     └── UserMeta (pool-managed attachments, e.g. payloads)
//! ```
//!
//! Sequences are plain `Vec`s and keep the order in which upstream produced
//! them. Converters only ever borrow this tree.

use crate::error::Result;
use crate::memory::{UserMeta, UserMetaPool};

/// Default number of user metadata slots in a batch pool.
pub const DEFAULT_USER_META_POOL_SIZE: usize = 64;

/// Type tag carried by every metadata record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MetaType {
    /// Unset or unknown.
    #[default]
    Invalid,
    /// Batch-level metadata attached to a buffer.
    Batch,
    /// Per-frame metadata.
    Frame,
    /// Detected object.
    Object,
    /// Display/overlay primitives.
    Display,
    /// Classifier output.
    Classifier,
    /// Single classification label.
    LabelInfo,
    /// Generic user metadata.
    User,
    /// Serialized payload produced by a message converter.
    Payload,
    /// Application-defined metadata type.
    Custom(i32),
}

impl MetaType {
    /// Integer value used in serialized documents.
    pub fn raw(&self) -> i32 {
        match self {
            MetaType::Invalid => -1,
            MetaType::Batch => 1,
            MetaType::Frame => 2,
            MetaType::Object => 3,
            MetaType::Display => 4,
            MetaType::Classifier => 5,
            MetaType::LabelInfo => 6,
            MetaType::User => 7,
            MetaType::Payload => 8,
            MetaType::Custom(value) => *value,
        }
    }
}

/// Header shared by all metadata records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseMeta {
    /// Record type.
    pub meta_type: MetaType,
}

impl BaseMeta {
    /// Create a header of the given type.
    pub const fn new(meta_type: MetaType) -> Self {
        Self { meta_type }
    }
}

/// RGBA color, each channel in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ColorParams {
    /// Red channel.
    pub red: f64,
    /// Green channel.
    pub green: f64,
    /// Blue channel.
    pub blue: f64,
    /// Alpha channel.
    pub alpha: f64,
}

impl ColorParams {
    /// Create a color from its channels.
    pub const fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

/// Bounding box and its overlay style.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RectParams {
    /// Left edge in pixels.
    pub left: u32,
    /// Top edge in pixels.
    pub top: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Border width in pixels.
    pub border_width: u32,
    /// Border color.
    pub border_color: ColorParams,
    /// Whether `bg_color` should be painted.
    pub has_bg_color: bool,
    /// Whether `color_id` refers to a palette entry.
    pub has_color_info: bool,
    /// Palette entry.
    pub color_id: u32,
    /// Fill color.
    pub bg_color: ColorParams,
}

impl RectParams {
    /// Create a box with the given geometry and default style.
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the border.
    pub fn with_border(mut self, width: u32, color: ColorParams) -> Self {
        self.border_width = width;
        self.border_color = color;
        self
    }

    /// Set a fill color.
    pub fn with_bg_color(mut self, color: ColorParams) -> Self {
        self.has_bg_color = true;
        self.bg_color = color;
        self
    }
}

/// Font used for text overlays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontParams {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: u32,
    /// Text color.
    pub font_color: ColorParams,
}

/// Text overlay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextParams {
    /// Text to draw.
    pub display_text: Option<String>,
    /// Horizontal offset in pixels.
    pub x_offset: u32,
    /// Vertical offset in pixels.
    pub y_offset: u32,
    /// Font.
    pub font_params: FontParams,
    /// Whether `text_bg_clr` should be painted behind the text.
    pub set_bg_clr: bool,
    /// Background color.
    pub text_bg_clr: ColorParams,
}

impl TextParams {
    /// Create an overlay showing `text` at the given offset.
    pub fn new(text: impl Into<String>, x_offset: u32, y_offset: u32) -> Self {
        Self {
            display_text: Some(text.into()),
            x_offset,
            y_offset,
            ..Default::default()
        }
    }
}

/// Line overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineParams {
    /// Start x.
    pub x1: u32,
    /// Start y.
    pub y1: u32,
    /// End x.
    pub x2: u32,
    /// End y.
    pub y2: u32,
    /// Line width in pixels.
    pub line_width: u32,
    /// Line color.
    pub line_color: ColorParams,
}

/// One label produced by a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelInfo {
    /// Record header.
    pub base_meta: BaseMeta,
    /// Number of classes the classifier distinguishes.
    pub num_classes: u32,
    /// Label string.
    pub result_label: Option<String>,
    /// Long label string, when it did not fit the short one.
    pub p_result_label: Option<String>,
    /// Class id of the result.
    pub result_class_id: u32,
    /// Label id within the classifier output.
    pub label_id: u32,
    /// Probability of the result.
    pub result_prob: f32,
}

impl Default for LabelInfo {
    fn default() -> Self {
        Self {
            base_meta: BaseMeta::new(MetaType::LabelInfo),
            num_classes: 0,
            result_label: None,
            p_result_label: None,
            result_class_id: 0,
            label_id: 0,
            result_prob: 0.0,
        }
    }
}

impl LabelInfo {
    /// Create a label.
    pub fn new(label: impl Into<String>, class_id: u32, prob: f32) -> Self {
        Self {
            result_label: Some(label.into()),
            result_class_id: class_id,
            result_prob: prob,
            ..Default::default()
        }
    }
}

/// Output of one secondary classifier for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierMeta {
    /// Record header.
    pub base_meta: BaseMeta,
    /// Id of the inference component that produced this output.
    pub unique_component_id: i32,
    /// Labels, in classifier order.
    pub labels: Vec<LabelInfo>,
}

impl Default for ClassifierMeta {
    fn default() -> Self {
        Self {
            base_meta: BaseMeta::new(MetaType::Classifier),
            unique_component_id: 0,
            labels: Vec::new(),
        }
    }
}

impl ClassifierMeta {
    /// Create an empty classifier output for a component.
    pub fn new(unique_component_id: i32) -> Self {
        Self {
            unique_component_id,
            ..Default::default()
        }
    }

    /// Append a label.
    pub fn with_label(mut self, label: LabelInfo) -> Self {
        self.labels.push(label);
        self
    }

    /// Number of labels.
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }
}

/// A detected object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    /// Record header.
    pub base_meta: BaseMeta,
    /// Id of the detector that produced this object.
    pub unique_component_id: i32,
    /// Detected class.
    pub class_id: i32,
    /// Tracking id.
    pub object_id: u64,
    /// Detector confidence.
    pub confidence: f32,
    /// Bounding box.
    pub rect_params: RectParams,
    /// Text overlay.
    pub text_params: TextParams,
    /// Class label.
    pub obj_label: Option<String>,
    /// Secondary classifier outputs.
    pub classifiers: Vec<ClassifierMeta>,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            base_meta: BaseMeta::new(MetaType::Object),
            unique_component_id: 0,
            class_id: 0,
            object_id: 0,
            confidence: 0.0,
            rect_params: RectParams::default(),
            text_params: TextParams::default(),
            obj_label: None,
            classifiers: Vec::new(),
        }
    }
}

impl ObjectMeta {
    /// Create an object with a tracking id, class and confidence.
    pub fn new(object_id: u64, class_id: i32, confidence: f32) -> Self {
        Self {
            object_id,
            class_id,
            confidence,
            ..Default::default()
        }
    }

    /// Set the detector component id.
    pub fn with_component_id(mut self, id: i32) -> Self {
        self.unique_component_id = id;
        self
    }

    /// Set the bounding box.
    pub fn with_rect(mut self, rect: RectParams) -> Self {
        self.rect_params = rect;
        self
    }

    /// Set the text overlay.
    pub fn with_text(mut self, text: TextParams) -> Self {
        self.text_params = text;
        self
    }

    /// Set the class label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.obj_label = Some(label.into());
        self
    }

    /// Append a classifier output.
    pub fn with_classifier(mut self, classifier: ClassifierMeta) -> Self {
        self.classifiers.push(classifier);
        self
    }
}

/// Overlay primitives drawn on a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMeta {
    /// Record header.
    pub base_meta: BaseMeta,
    /// Rectangles.
    pub rects: Vec<RectParams>,
    /// Text labels.
    pub labels: Vec<TextParams>,
    /// Lines.
    pub lines: Vec<LineParams>,
}

impl Default for DisplayMeta {
    fn default() -> Self {
        Self {
            base_meta: BaseMeta::new(MetaType::Display),
            rects: Vec::new(),
            labels: Vec::new(),
            lines: Vec::new(),
        }
    }
}

/// Everything known about one frame of a batch.
#[derive(Debug)]
pub struct FrameMeta {
    /// Record header.
    pub base_meta: BaseMeta,
    /// Sink pad the frame arrived on.
    pub pad_index: u32,
    /// Position of the frame in its batch.
    pub batch_id: u32,
    /// Frame number within its source.
    pub frame_num: i32,
    /// Buffer presentation timestamp in nanoseconds.
    pub buf_pts: u64,
    /// NTP timestamp in nanoseconds.
    pub ntp_timestamp: u64,
    /// Source id.
    pub source_id: u32,
    /// Number of surfaces the frame spans.
    pub num_surfaces_per_frame: i32,
    /// Width of the original frame.
    pub source_frame_width: u32,
    /// Height of the original frame.
    pub source_frame_height: u32,
    /// Surface type.
    pub surface_type: u32,
    /// Surface index.
    pub surface_index: u32,
    /// Whether inference ran on this frame.
    pub infer_done: bool,
    /// Detected objects, in detection order.
    pub objects: Vec<ObjectMeta>,
    /// Overlay primitives.
    pub display_meta: Vec<DisplayMeta>,
    /// Pool-managed user metadata attached to this frame.
    user_meta: Vec<UserMeta>,
}

impl Default for FrameMeta {
    fn default() -> Self {
        Self {
            base_meta: BaseMeta::new(MetaType::Frame),
            pad_index: 0,
            batch_id: 0,
            frame_num: 0,
            buf_pts: 0,
            ntp_timestamp: 0,
            source_id: 0,
            num_surfaces_per_frame: 1,
            source_frame_width: 0,
            source_frame_height: 0,
            surface_type: 0,
            surface_index: 0,
            infer_done: false,
            objects: Vec::new(),
            display_meta: Vec::new(),
            user_meta: Vec::new(),
        }
    }
}

impl FrameMeta {
    /// Create metadata for a frame of a source.
    pub fn new(frame_num: i32, source_id: u32) -> Self {
        Self {
            frame_num,
            source_id,
            ..Default::default()
        }
    }

    /// Set the original frame size.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.source_frame_width = width;
        self.source_frame_height = height;
        self
    }

    /// Append a detected object.
    pub fn with_object(mut self, object: ObjectMeta) -> Self {
        self.objects.push(object);
        self
    }

    /// Append overlay primitives.
    pub fn with_display_meta(mut self, display: DisplayMeta) -> Self {
        self.display_meta.push(display);
        self
    }

    /// Number of detected objects.
    pub fn num_obj_meta(&self) -> usize {
        self.objects.len()
    }

    /// User metadata attached to this frame.
    pub fn user_meta(&self) -> &[UserMeta] {
        &self.user_meta
    }

    /// Attach user metadata acquired from the batch pool.
    pub fn add_user_meta(&mut self, meta: UserMeta) {
        self.user_meta.push(meta);
    }

    /// Detach and return all user metadata of a type.
    pub fn take_user_meta(&mut self, meta_type: MetaType) -> Vec<UserMeta> {
        let (taken, kept): (Vec<UserMeta>, Vec<UserMeta>) = std::mem::take(&mut self.user_meta)
            .into_iter()
            .partition(|m| m.meta_type() == meta_type);
        self.user_meta = kept;
        taken
    }

    /// Deep copy of this frame; user metadata is copied through its callbacks.
    pub fn duplicate(&self, pool: &UserMetaPool) -> Result<FrameMeta> {
        let user_meta = self
            .user_meta
            .iter()
            .map(|m| m.duplicate(pool))
            .collect::<Result<Vec<_>>>()?;

        Ok(FrameMeta {
            base_meta: self.base_meta,
            pad_index: self.pad_index,
            batch_id: self.batch_id,
            frame_num: self.frame_num,
            buf_pts: self.buf_pts,
            ntp_timestamp: self.ntp_timestamp,
            source_id: self.source_id,
            num_surfaces_per_frame: self.num_surfaces_per_frame,
            source_frame_width: self.source_frame_width,
            source_frame_height: self.source_frame_height,
            surface_type: self.surface_type,
            surface_index: self.surface_index,
            infer_done: self.infer_done,
            objects: self.objects.clone(),
            display_meta: self.display_meta.clone(),
            user_meta,
        })
    }
}

/// Metadata for a batch of frames, attached to the batched buffer.
#[derive(Debug)]
pub struct BatchMeta {
    /// Record header.
    pub base_meta: BaseMeta,
    /// Maximum number of frames the batch can hold.
    pub max_frames_in_batch: u32,
    /// Frames, in batch order.
    pub frames: Vec<FrameMeta>,
    pool: UserMetaPool,
}

impl BatchMeta {
    /// Create an empty batch with the default user metadata pool.
    pub fn new(max_frames_in_batch: u32) -> Self {
        Self::with_pool(max_frames_in_batch, UserMetaPool::new(DEFAULT_USER_META_POOL_SIZE))
    }

    /// Create an empty batch backed by an existing pool.
    pub fn with_pool(max_frames_in_batch: u32, pool: UserMetaPool) -> Self {
        Self {
            base_meta: BaseMeta::new(MetaType::Batch),
            max_frames_in_batch,
            frames: Vec::new(),
            pool,
        }
    }

    /// Append a frame.
    pub fn with_frame(mut self, frame: FrameMeta) -> Self {
        self.frames.push(frame);
        self
    }

    /// The pool user metadata for this batch is acquired from.
    pub fn pool(&self) -> &UserMetaPool {
        &self.pool
    }

    /// Deep copy of the batch, sharing the same pool.
    pub fn duplicate(&self) -> Result<BatchMeta> {
        let frames = self
            .frames
            .iter()
            .map(|f| f.duplicate(&self.pool))
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchMeta {
            base_meta: self.base_meta,
            max_frames_in_batch: self.max_frames_in_batch,
            frames,
            pool: self.pool.clone(),
        })
    }
}
