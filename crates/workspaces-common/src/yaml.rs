//! YAML parsing using yaml-rust2
//!
//! Documents are converted to `serde_json::Value` so callers can deserialize
//! typed views with serde. Mapping keys are normalized to strings, which is
//! the only key representation the compiler works with. Conversion errors
//! name the offending field, e.g. `spec.containers[0].cpu`.

use std::fmt;

use serde_json::{Map, Number, Value};
use thiserror::Error;
use yaml_rust2::{Yaml, YamlLoader};

/// Error raised when YAML text cannot be parsed or converted
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct YamlError(String);

impl YamlError {
    /// Create an error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Parse a single YAML document into a `serde_json::Value`.
///
/// Only the first document is returned; empty input yields `Value::Null`.
pub fn parse_yaml(input: &str) -> Result<Value, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => Converter::default().node(doc),
        None => Ok(Value::Null),
    }
}

/// Parse a multi-document YAML stream, preserving document order.
///
/// Blank documents (for example produced by leading or trailing `---`
/// separators) are dropped.
pub fn parse_yaml_documents(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    docs.into_iter()
        .filter(|doc| !matches!(doc, Yaml::Null))
        .map(|doc| Converter::default().node(doc))
        .collect()
}

/// Walks a YAML tree, remembering where it is so errors can name the field.
///
/// Mapping entries are inserted in document order; manifests written back
/// out keep the layout the translator produced.
#[derive(Default)]
struct Converter {
    path: Vec<Segment>,
}

enum Segment {
    Key(String),
    Index(usize),
}

impl Converter {
    fn node(&mut self, node: Yaml) -> Result<Value, YamlError> {
        match node {
            Yaml::Null => Ok(Value::Null),
            Yaml::Boolean(b) => Ok(Value::Bool(b)),
            Yaml::Integer(i) => Ok(Value::from(i)),
            Yaml::Real(text) => self.real(&text),
            Yaml::String(s) => Ok(Value::String(s)),
            Yaml::Array(items) => self.sequence(items),
            Yaml::Hash(entries) => self.mapping(entries),
            Yaml::Alias(_) => Err(self.error("aliases are not supported")),
            Yaml::BadValue => Err(self.error("invalid value")),
        }
    }

    fn sequence(&mut self, items: Vec<Yaml>) -> Result<Value, YamlError> {
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            self.path.push(Segment::Index(index));
            out.push(self.node(item)?);
            self.path.pop();
        }
        Ok(Value::Array(out))
    }

    fn mapping(&mut self, entries: yaml_rust2::yaml::Hash) -> Result<Value, YamlError> {
        let mut out = Map::with_capacity(entries.len());
        for (key, item) in entries {
            let key = self.key(key)?;
            self.path.push(Segment::Key(key.clone()));
            let value = self.node(item)?;
            self.path.pop();
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }

    /// Non-finite reals have no JSON form and are rejected.
    fn real(&self, text: &str) -> Result<Value, YamlError> {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(format!("{text} is not a finite number")))
    }

    fn key(&self, key: Yaml) -> Result<String, YamlError> {
        match key {
            Yaml::String(s) | Yaml::Real(s) => Ok(s),
            Yaml::Integer(i) => Ok(i.to_string()),
            Yaml::Boolean(b) => Ok(b.to_string()),
            Yaml::Null => Ok("null".to_string()),
            _ => Err(self.error("mapping keys must be scalars")),
        }
    }

    fn error(&self, message: impl fmt::Display) -> YamlError {
        if self.path.is_empty() {
            return YamlError(message.to_string());
        }
        let mut location = String::new();
        for segment in &self.path {
            match segment {
                Segment::Key(key) if location.is_empty() => location.push_str(key),
                Segment::Key(key) => {
                    location.push('.');
                    location.push_str(key);
                }
                Segment::Index(index) => location.push_str(&format!("[{index}]")),
            }
        }
        YamlError(format!("{location}: {message}"))
    }
}
