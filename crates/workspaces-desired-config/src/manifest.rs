//! Generic resource manifest with typed accessors
//!
//! Resources move through the pipeline as structured documents. Only the
//! handful of fields the compiler touches get accessors; the Deployment pod
//! spec is lifted into the typed [`PodSpec`] for mutation and written back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::k8s::PodSpec;

/// Kind of the workload resource the pipeline hardens
pub const KIND_DEPLOYMENT: &str = "Deployment";

/// A single Kubernetes resource document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Value);

impl Manifest {
    /// Wrap a structured document; it must be a mapping
    pub fn from_value(value: Value) -> Result<Self, Error> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(Error::invalid_resource(format!(
                "expected a mapping, found {}",
                type_name(&value)
            )))
        }
    }

    /// Build a manifest from a typed resource
    pub fn from_resource<T: Serialize>(resource: &T) -> Result<Self, Error> {
        Self::from_value(serde_json::to_value(resource)?)
    }

    /// `kind`
    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    /// `apiVersion`
    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    /// `metadata.name`
    pub fn name(&self) -> Option<&str> {
        self.0.pointer("/metadata/name").and_then(Value::as_str)
    }

    /// `metadata.namespace`
    pub fn namespace(&self) -> Option<&str> {
        self.0.pointer("/metadata/namespace").and_then(Value::as_str)
    }

    /// A single `metadata.labels` entry
    pub fn label(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    /// A single `metadata.annotations` entry
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/annotations")
            .and_then(|annotations| annotations.get(key))
            .and_then(Value::as_str)
    }

    /// True when `kind` equals the given kind
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind() == Some(kind)
    }

    /// Borrow the underlying document
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying document
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Deserialize the pod spec at `spec.template.spec`.
    ///
    /// Returns `Ok(None)` for resources without a pod template.
    pub fn pod_spec(&self) -> Result<Option<PodSpec>, Error> {
        self.0
            .pointer("/spec/template/spec")
            .map(|spec| serde_json::from_value(spec.clone()).map_err(Error::from))
            .transpose()
    }

    /// Apply `f` to the Deployment pod spec and write the result back.
    ///
    /// A Deployment without `spec.template.spec` is rejected; a Deployment
    /// that cannot hold a pod would fail the hardening guarantees silently.
    pub fn update_pod_spec<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut PodSpec) -> Result<(), Error>,
    {
        let name = self.name().unwrap_or_default().to_string();
        let slot = self.0.pointer_mut("/spec/template/spec").ok_or_else(|| {
            Error::invalid_resource(format!("{} '{}' has no pod template", KIND_DEPLOYMENT, name))
        })?;

        let mut spec: PodSpec = serde_json::from_value(slot.take())?;
        f(&mut spec)?;
        *slot = serde_json::to_value(&spec)?;
        Ok(())
    }

    /// Check the fields every compiled resource must carry
    pub fn validate(&self) -> Result<(), Error> {
        for (field, value) in [
            ("kind", self.kind()),
            ("apiVersion", self.api_version()),
            ("metadata.name", self.name()),
        ] {
            if value.is_none_or(str::is_empty) {
                return Err(Error::invalid_resource(format!(
                    "resource is missing {field}: {}",
                    self.0
                )));
            }
        }
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
