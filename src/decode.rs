//! Structured-file decoders.
//!
//! The resolver is format-agnostic: it hands expanded text to a [`Decoder`]
//! and gets back a key/value tree. YAML is the default; it also accepts JSON
//! documents, so `.json` files only switch to the stricter JSON decoder.

use serde_json::{Map, Value};
use std::path::Path;

/// Turns expanded config-file text into a key/value tree.
pub trait Decoder: Send + Sync {
    /// Short format name used in error messages.
    fn name(&self) -> &'static str;

    /// Decode `text`. An empty document decodes to an empty object.
    fn decode(&self, text: &str) -> Result<Value, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDecoder;

impl Decoder for YamlDecoder {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn decode(&self, text: &str) -> Result<Value, String> {
        let value: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        into_object(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, text: &str) -> Result<Value, String> {
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        into_object(value)
    }
}

fn into_object(value: Value) -> Result<Value, String> {
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        other => Err(format!(
            "top-level value must be a mapping, found {}",
            kind(&other)
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// File format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

impl Format {
    /// `.json` selects JSON; anything else (including no extension) is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }

    pub fn decoder(self) -> &'static dyn Decoder {
        match self {
            Format::Yaml => &YamlDecoder,
            Format::Json => &JsonDecoder,
        }
    }
}
