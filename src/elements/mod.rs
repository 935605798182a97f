//! Built-in pipeline elements.
//!
//! ## Transforms
//! - [`MsgConv`]: Converts batch analytics metadata into per-frame payloads

mod msgconv;

pub use msgconv::{MsgConv, MsgConvStats};
