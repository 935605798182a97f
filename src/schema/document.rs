//! Serializable views of the frame metadata tree.
//!
//! Records borrow strings from the frame and are dropped once the document
//! has been written. Fields that only exist in the full schema are wrapped
//! in `Option` and skipped when `None`, so a minimal document is always a
//! field subset of the full one. Key order follows declaration order.

use crate::metadata::{
    BaseMeta, ClassifierMeta, ColorParams, DisplayMeta, FontParams, FrameMeta, LabelInfo,
    ObjectMeta, RectParams, TextParams,
};
use serde::Serialize;

/// Value of the `dsversion` field of full documents.
pub const DS_VERSION: &str = "4.0";

/// Top-level document for one frame.
#[derive(Debug, Serialize)]
pub(crate) struct FrameDocument<'a> {
    messageid: String,
    #[serde(flatten)]
    header: Option<FrameHeader>,
    timestamp: u64,
    frame_num: i32,
    source_id: u32,
    #[serde(flatten)]
    surface: Option<SurfaceInfo>,
    num_obj_meta: usize,
    #[serde(rename = "bInferDone", skip_serializing_if = "Option::is_none")]
    infer_done: Option<bool>,
    obj_meta_list: Vec<ObjectRecord<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_meta_list: Option<Vec<DisplayRecord>>,
}

impl<'a> FrameDocument<'a> {
    /// Build the document for `frame`.
    ///
    /// `full` selects the full schema; otherwise only identifiers, geometry
    /// and labels are kept.
    pub(crate) fn new(frame: &'a FrameMeta, full: bool, messageid: String, timestamp: u64) -> Self {
        let obj_meta_list: Vec<_> = frame
            .objects
            .iter()
            .map(|o| ObjectRecord::new(o, full))
            .collect();

        Self {
            messageid,
            header: full.then(|| FrameHeader {
                dsversion: DS_VERSION,
                base_meta: frame.base_meta.into(),
                pad_index: frame.pad_index,
                batch_id: frame.batch_id,
                buf_pts: frame.buf_pts,
                ntp_timestamp: frame.ntp_timestamp,
            }),
            timestamp,
            frame_num: frame.frame_num,
            source_id: frame.source_id,
            surface: full.then(|| SurfaceInfo {
                num_surfaces_per_frame: frame.num_surfaces_per_frame,
                source_frame_width: frame.source_frame_width,
                source_frame_height: frame.source_frame_height,
                surface_type: frame.surface_type,
                surface_index: frame.surface_index,
            }),
            num_obj_meta: obj_meta_list.len(),
            infer_done: full.then_some(frame.infer_done),
            obj_meta_list,
            display_meta_list: full
                .then(|| frame.display_meta.iter().map(DisplayRecord::from).collect()),
        }
    }
}

#[derive(Debug, Serialize)]
struct FrameHeader {
    dsversion: &'static str,
    base_meta: BaseMetaRecord,
    pad_index: u32,
    batch_id: u32,
    buf_pts: u64,
    ntp_timestamp: u64,
}

#[derive(Debug, Serialize)]
struct SurfaceInfo {
    num_surfaces_per_frame: i32,
    source_frame_width: u32,
    source_frame_height: u32,
    surface_type: u32,
    surface_index: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct BaseMetaRecord {
    meta_type: i32,
}

impl From<BaseMeta> for BaseMetaRecord {
    fn from(base: BaseMeta) -> Self {
        Self {
            meta_type: base.meta_type.raw(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ColorRecord {
    red: f64,
    green: f64,
    blue: f64,
    alpha: f64,
}

impl From<&ColorParams> for ColorRecord {
    fn from(c: &ColorParams) -> Self {
        Self {
            red: c.red,
            green: c.green,
            blue: c.blue,
            alpha: c.alpha,
        }
    }
}

#[derive(Debug, Serialize)]
struct ObjectRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_meta: Option<BaseMetaRecord>,
    unique_component_id: i32,
    class_id: i32,
    object_id: u64,
    confidence: f32,
    rect_params: RectRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_params: Option<TextRecord<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    obj_label: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    classifier_meta_list: Option<Vec<ClassifierRecord<'a>>>,
}

impl<'a> ObjectRecord<'a> {
    fn new(object: &'a ObjectMeta, full: bool) -> Self {
        Self {
            base_meta: full.then(|| object.base_meta.into()),
            unique_component_id: object.unique_component_id,
            class_id: object.class_id,
            object_id: object.object_id,
            confidence: object.confidence,
            rect_params: RectRecord::new(&object.rect_params, full),
            text_params: full.then(|| TextRecord::from(&object.text_params)),
            obj_label: object.obj_label.as_deref(),
            classifier_meta_list: full
                .then(|| object.classifiers.iter().map(ClassifierRecord::from).collect()),
        }
    }
}

#[derive(Debug, Serialize)]
struct RectRecord {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    #[serde(flatten)]
    style: Option<RectStyle>,
}

impl RectRecord {
    fn new(rect: &RectParams, full: bool) -> Self {
        Self {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
            style: full.then(|| RectStyle {
                border_width: rect.border_width,
                has_bg_color: rect.has_bg_color.into(),
                has_color_info: rect.has_color_info.into(),
                color_id: rect.color_id,
                border_color: (&rect.border_color).into(),
                bg_color: (&rect.bg_color).into(),
            }),
        }
    }
}

// Flags are written as 0/1 integers.
#[derive(Debug, Serialize)]
struct RectStyle {
    border_width: u32,
    has_bg_color: u8,
    has_color_info: u8,
    color_id: u32,
    border_color: ColorRecord,
    bg_color: ColorRecord,
}

#[derive(Debug, Serialize)]
struct FontRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    font_name: Option<&'a str>,
    font_size: u32,
    font_color: ColorRecord,
}

impl<'a> From<&'a FontParams> for FontRecord<'a> {
    fn from(font: &'a FontParams) -> Self {
        Self {
            font_name: font.font_name.as_deref(),
            font_size: font.font_size,
            font_color: (&font.font_color).into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TextRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_text: Option<&'a str>,
    x_offset: u32,
    y_offset: u32,
    font_params: FontRecord<'a>,
    set_bg_clr: u8,
    text_bg_clr: ColorRecord,
}

impl<'a> From<&'a TextParams> for TextRecord<'a> {
    fn from(text: &'a TextParams) -> Self {
        Self {
            display_text: text.display_text.as_deref(),
            x_offset: text.x_offset,
            y_offset: text.y_offset,
            font_params: (&text.font_params).into(),
            set_bg_clr: text.set_bg_clr.into(),
            text_bg_clr: (&text.text_bg_clr).into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ClassifierRecord<'a> {
    base_meta: BaseMetaRecord,
    num_labels: usize,
    unique_component_id: i32,
    label_info_list: Vec<LabelRecord<'a>>,
}

impl<'a> From<&'a ClassifierMeta> for ClassifierRecord<'a> {
    fn from(classifier: &'a ClassifierMeta) -> Self {
        Self {
            base_meta: classifier.base_meta.into(),
            num_labels: classifier.num_labels(),
            unique_component_id: classifier.unique_component_id,
            label_info_list: classifier.labels.iter().map(LabelRecord::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LabelRecord<'a> {
    base_meta: BaseMetaRecord,
    num_classes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_label: Option<&'a str>,
    #[serde(rename = "pResult_label", skip_serializing_if = "Option::is_none")]
    p_result_label: Option<&'a str>,
    result_class_id: u32,
    label_id: u32,
    result_prob: f32,
}

impl<'a> From<&'a LabelInfo> for LabelRecord<'a> {
    fn from(label: &'a LabelInfo) -> Self {
        Self {
            base_meta: label.base_meta.into(),
            num_classes: label.num_classes,
            result_label: label.result_label.as_deref(),
            p_result_label: label.p_result_label.as_deref(),
            result_class_id: label.result_class_id,
            label_id: label.label_id,
            result_prob: label.result_prob,
        }
    }
}

#[derive(Debug, Serialize)]
struct DisplayRecord {
    base_meta: BaseMetaRecord,
    num_rects: usize,
    num_labels: usize,
    num_lines: usize,
}

impl From<&DisplayMeta> for DisplayRecord {
    fn from(display: &DisplayMeta) -> Self {
        Self {
            base_meta: display.base_meta.into(),
            num_rects: display.rects.len(),
            num_labels: display.labels.len(),
            num_lines: display.lines.len(),
        }
    }
}
