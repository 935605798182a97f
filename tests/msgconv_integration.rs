//! End-to-end tests for the message converter element.
//!
//! The built-in schema converter is exported through `export_converter!` in
//! this test binary, so the ABI path (raw pointers, symbol table, payload
//! ownership transfer) is exercised without building a separate cdylib.

use parallax_msgconv::buffer::Buffer;
use parallax_msgconv::config::MsgConvConfig;
use parallax_msgconv::converter::{
    ConverterSymbols, DynamicConverter, MessageConverter, SymbolSource, CREATE_SYMBOL,
    DESTROY_SYMBOL, GENERATE_SYMBOL, RELEASE_SYMBOL,
};
use parallax_msgconv::element::Element;
use parallax_msgconv::elements::MsgConv;
use parallax_msgconv::metadata::{
    BatchMeta, ClassifierMeta, FrameMeta, LabelInfo, MetaType, ObjectMeta, RectParams,
};
use parallax_msgconv::payload::{Payload, PayloadType};
use parallax_msgconv::schema::SchemaConverter;
use parallax_msgconv::Error;
use serde_json::Value;
use std::ffi::c_void;
use std::ptr::NonNull;

parallax_msgconv::export_converter!(SchemaConverter);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn exported_symbols() -> ConverterSymbols {
    ConverterSymbols {
        create: msgconv_ctx_create,
        destroy: msgconv_ctx_destroy,
        generate: msgconv_generate,
        release: msgconv_release,
    }
}

/// Symbol lookup over the functions exported above.
struct ExportedTable {
    skip: Option<&'static str>,
}

impl SymbolSource for ExportedTable {
    unsafe fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>> {
        if self.skip == Some(name) {
            return None;
        }
        let symbols = exported_symbols();
        let address = match name {
            CREATE_SYMBOL => symbols.create as *mut c_void,
            DESTROY_SYMBOL => symbols.destroy as *mut c_void,
            GENERATE_SYMBOL => symbols.generate as *mut c_void,
            RELEASE_SYMBOL => symbols.release as *mut c_void,
            _ => return None,
        };
        NonNull::new(address)
    }
}

fn two_object_batch() -> BatchMeta {
    let frame = FrameMeta::new(42, 3)
        .with_frame_size(1280, 720)
        .with_object(
            ObjectMeta::new(0, 2, 0.91)
                .with_rect(RectParams::new(10, 20, 30, 40))
                .with_label("car")
                .with_classifier(
                    ClassifierMeta::new(4).with_label(LabelInfo::new("sedan", 1, 0.77)),
                ),
        )
        .with_object(
            ObjectMeta::new(1, 0, 0.42)
                .with_rect(RectParams::new(50, 60, 70, 80))
                .with_label("person"),
        );
    BatchMeta::new(1).with_frame(frame)
}

fn payload_document(buffer: &Buffer) -> (Payload, Value) {
    let frame = &buffer.batch_meta().expect("batch meta").frames[0];
    let meta = frame
        .user_meta()
        .iter()
        .find(|m| m.meta_type() == MetaType::Payload)
        .expect("payload attached");
    let payload = meta.data::<Payload>().expect("payload data").clone();
    let doc = serde_json::from_slice(payload.as_bytes()).expect("valid json");
    (payload, doc)
}

#[test]
fn test_minimal_payload_through_exported_abi() {
    init_tracing();

    let symbols = unsafe { ConverterSymbols::resolve(&ExportedTable { skip: None }) }.unwrap();
    let converter = unsafe { DynamicConverter::from_symbols(symbols) };

    let mut msgconv = MsgConv::new(
        MsgConvConfig::new()
            .with_payload_type(PayloadType::Minimal)
            .with_component_id(5),
    );
    msgconv.start_with_converter(Box::new(converter)).unwrap();

    let mut buffer = Buffer::from_static(b"batched frames");
    buffer.add_meta_batch(two_object_batch());
    let out = msgconv.process(buffer).unwrap().unwrap();

    let (payload, doc) = payload_document(&out);
    assert_eq!(payload.component_id, 5);
    assert_eq!(doc["frame_num"], 42);
    assert_eq!(doc["num_obj_meta"], 2);

    let objects = doc["obj_meta_list"].as_array().unwrap();
    assert_eq!(objects[0]["obj_label"], "car");
    assert_eq!(objects[1]["obj_label"], "person");
    assert!(objects[0].get("classifier_meta_list").is_none());
    assert!(objects[0]["rect_params"].get("border_color").is_none());

    let copy = out.duplicate().unwrap();
    let (copied, _) = payload_document(&copy);
    assert_eq!(copied, payload);

    drop(out);
    drop(copy);
    msgconv.stop();
}

#[test]
fn test_full_payload_through_builtin_converter() {
    init_tracing();

    let mut msgconv = MsgConv::new(MsgConvConfig::new());
    msgconv.start().unwrap();

    let mut buffer = Buffer::from_static(b"batched frames");
    buffer.add_meta_batch(two_object_batch());
    let out = msgconv.process(buffer).unwrap().unwrap();

    let (payload, doc) = payload_document(&out);
    assert_eq!(payload.component_id, 0);
    assert_eq!(doc["dsversion"], "4.0");
    assert_eq!(doc["source_frame_width"], 1280);

    let classifier = &doc["obj_meta_list"][0]["classifier_meta_list"][0];
    assert_eq!(classifier["num_labels"], 1);
    assert_eq!(classifier["label_info_list"][0]["result_label"], "sedan");
    assert_eq!(
        doc["obj_meta_list"][1]["classifier_meta_list"],
        Value::Array(Vec::new())
    );
}

#[test]
fn test_abi_rejects_unknown_payload_type() {
    let symbols = exported_symbols();
    let context = unsafe { (symbols.create)(0x7777) };
    assert!(context.is_null());
}

#[test]
fn test_abi_reserved_context_generates_nothing() {
    let converter = unsafe { DynamicConverter::from_symbols(exported_symbols()) };
    let context = converter.create_context(PayloadType::Reserved).unwrap();

    let frame = FrameMeta::new(1, 0).with_object(ObjectMeta::new(1, 0, 0.5));
    assert!(converter.generate(&context, &frame, 1).is_none());
    converter.destroy_context(context);
}

#[test]
fn test_missing_release_symbol_binds_nothing() {
    let table = ExportedTable {
        skip: Some(RELEASE_SYMBOL),
    };
    let err = unsafe { ConverterSymbols::resolve(&table) }.unwrap_err();
    assert!(matches!(err, Error::MissingSymbol { symbol: RELEASE_SYMBOL }));
    assert!(err.is_startup_error());
}

#[test]
fn test_custom_payload_without_library_path() {
    let mut msgconv = MsgConv::new(MsgConvConfig::new().with_payload_type(PayloadType::Custom));
    let err = msgconv.start().unwrap_err();
    assert!(matches!(err, Error::MissingConverterLibrary));
    assert!(!msgconv.is_started());

    let result = msgconv.process(Buffer::from_static(b"x"));
    assert!(matches!(result, Err(Error::NotStarted)));
}

#[test]
fn test_custom_payload_with_bad_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libnot_a_converter.so");
    std::fs::write(&path, b"\x7fELF but not really").unwrap();

    let mut msgconv = MsgConv::new(
        MsgConvConfig::new()
            .with_payload_type(PayloadType::Custom)
            .with_converter_library(&path),
    );
    match msgconv.start() {
        Err(Error::ConverterLoad { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected load error, got {:?}", other),
    }
}
