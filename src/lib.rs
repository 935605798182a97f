//! # Parallax Message Converter
//!
//! Turns the analytics metadata attached to batched video buffers into
//! serialized messages, one per frame, ready for a message broker.
//!
//! ## Features
//!
//! - **Built-in JSON schemas**: full and minimal documents of the frame
//!   metadata tree
//! - **Pluggable converters**: any shared library exporting the four
//!   converter entry points can replace the built-in schema
//! - **Pool-managed payloads**: payloads are attached to their frames as user
//!   metadata and released through the converter that made them, exactly
//!   once, including copies made when buffers are duplicated
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parallax_msgconv::prelude::*;
//!
//! let mut msgconv = MsgConv::new(
//!     MsgConvConfig::new()
//!         .with_payload_type(PayloadType::Custom)
//!         .with_converter_library("/opt/converters/libcsvconv.so"),
//! );
//! msgconv.start()?;
//!
//! let buffer = msgconv.process(buffer)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod config;
pub mod converter;
pub mod element;
pub mod elements;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod payload;
pub mod schema;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::config::{MsgConvConfig, PropertyValue};
    pub use crate::converter::{ContextHandle, MessageConverter};
    pub use crate::element::Element;
    pub use crate::elements::MsgConv;
    pub use crate::error::{Error, Result};
    pub use crate::metadata::{BatchMeta, FrameMeta, MetaType, ObjectMeta};
    pub use crate::payload::{Payload, PayloadType};
}

pub use error::{Error, Result};
