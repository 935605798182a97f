//! Converter element configuration.
//!
//! Configuration can be built three ways:
//!
//! - builder methods: `MsgConvConfig::new().with_payload_type(PayloadType::Minimal)`
//! - element properties, as produced by a pipeline description parser:
//!   `msgconv payload-type=minimal comp-id=3`
//! - deserialized from a file with `serde`, using the same property names.

use crate::error::{Error, Result};
use crate::payload::PayloadType;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Property name of the converter library path.
pub const PROP_CONVERTER_LIB: &str = "converter-lib";
/// Property name of the payload type.
pub const PROP_PAYLOAD_TYPE: &str = "payload-type";
/// Property name of the component id.
pub const PROP_COMPONENT_ID: &str = "comp-id";

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl PropertyValue {
    /// Get as a string, converting if necessary.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a u32.
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|i| u32::try_from(i).ok())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

/// Configuration of a message converter element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MsgConvConfig {
    /// Converter library, required for [`PayloadType::Custom`].
    #[serde(rename = "converter-lib")]
    converter_library: Option<PathBuf>,
    payload_type: PayloadType,
    /// Component id stamped on generated payloads; 0 means unfiltered.
    #[serde(rename = "comp-id")]
    component_id: u32,
}

impl MsgConvConfig {
    /// Default configuration: built-in full schema, component id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from element properties.
    pub fn from_properties(props: &HashMap<String, PropertyValue>) -> Result<Self> {
        let mut config = Self::new();
        for (name, value) in props {
            config.set_property(name, value)?;
        }
        Ok(config)
    }

    /// Set a single property by name.
    pub fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match name {
            PROP_CONVERTER_LIB => {
                self.converter_library = Some(PathBuf::from(value.as_string()));
            }
            PROP_PAYLOAD_TYPE => {
                self.payload_type = value
                    .as_string()
                    .parse()
                    .map_err(|reason| invalid(name, reason))?;
            }
            PROP_COMPONENT_ID => {
                self.component_id = value
                    .as_u32()
                    .ok_or_else(|| invalid(name, format!("expected u32, got {:?}", value)))?;
            }
            _ => return Err(invalid(name, "unknown property")),
        }
        Ok(())
    }

    /// Read a single property by name.
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        match name {
            PROP_CONVERTER_LIB => self
                .converter_library
                .as_ref()
                .map(|p| PropertyValue::String(p.display().to_string())),
            PROP_PAYLOAD_TYPE => Some(PropertyValue::String(self.payload_type.to_string())),
            PROP_COMPONENT_ID => Some(PropertyValue::Integer(self.component_id.into())),
            _ => None,
        }
    }

    /// Set the converter library path.
    pub fn with_converter_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.converter_library = Some(path.into());
        self
    }

    /// Set the payload type.
    pub fn with_payload_type(mut self, payload_type: PayloadType) -> Self {
        self.payload_type = payload_type;
        self
    }

    /// Set the component id.
    pub fn with_component_id(mut self, component_id: u32) -> Self {
        self.component_id = component_id;
        self
    }

    /// Converter library path.
    pub fn converter_library(&self) -> Option<&Path> {
        self.converter_library.as_deref()
    }

    /// Payload type.
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    /// Component id.
    pub fn component_id(&self) -> u32 {
        self.component_id
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidProperty {
        name: name.to_string(),
        reason: reason.into(),
    }
}
