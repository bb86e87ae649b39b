//! Compute resource specifications configured on the cluster agent

use std::fmt::{self, Write as _};

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// CPU and memory quantities, kept in the order they were declared
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceQuantity {
    entries: Vec<(&'static str, String)>,
}

impl ResourceQuantity {
    /// Create a quantity with both cpu and memory set, cpu first
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self::default().with_cpu(cpu).with_memory(memory)
    }

    /// Set cpu; a new entry goes after those already declared
    pub fn with_cpu(self, cpu: impl Into<String>) -> Self {
        self.with(CPU, cpu.into())
    }

    /// Set memory; a new entry goes after those already declared
    pub fn with_memory(self, memory: impl Into<String>) -> Self {
        self.with(MEMORY, memory.into())
    }

    fn with(mut self, key: &'static str, value: String) -> Self {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// CPU quantity, e.g. `500m` or `2`
    pub fn cpu(&self) -> Option<&str> {
        self.get(CPU)
    }

    /// Memory quantity, e.g. `512Mi`
    pub fn memory(&self) -> Option<&str> {
        self.get(MEMORY)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True when neither cpu nor memory is set
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(key, value)` pairs for the quantities that are set, in declared order
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    fn inspect(&self) -> String {
        let entries: Vec<String> = self
            .entries()
            .map(|(key, value)| format!(":{key}=>{}", inspect_str(value)))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

impl Serialize for ResourceQuantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in self.entries() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResourceQuantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(QuantityVisitor)
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = ResourceQuantity;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of cpu and memory quantities")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut quantity = ResourceQuantity::default();
        while let Some(key) = map.next_key::<String>()? {
            let key = match key.as_str() {
                CPU => CPU,
                MEMORY => MEMORY,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
            };
            if let Some(value) = map.next_value::<Option<RawQuantity>>()? {
                quantity = quantity.with(key, value.into_string());
            }
        }
        Ok(quantity)
    }
}

/// Quantities may be written as YAML numbers as well as strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawQuantity {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

/// `{limits:{cpu,memory}, requests:{cpu,memory}}`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimitSpec {
    /// Upper bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
    /// Guaranteed amounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,
}

impl ResourceLimitSpec {
    /// Create a spec with both limits and requests
    pub fn new(limits: ResourceQuantity, requests: ResourceQuantity) -> Self {
        Self {
            limits: Some(limits),
            requests: Some(requests),
        }
    }

    /// True when no quantity is set anywhere
    pub fn is_empty(&self) -> bool {
        self.limits.as_ref().is_none_or(ResourceQuantity::is_empty)
            && self.requests.as_ref().is_none_or(ResourceQuantity::is_empty)
    }

    /// Render the spec in the inspect form hashed for the
    /// max-resources annotation.
    ///
    /// Only the top level is ordered (`limits` before `requests`); quantities
    /// keep their declared order. Resources already applied to
    /// clusters carry hashes of exactly this string, so the format is fixed.
    pub fn to_hash_input(&self) -> String {
        let mut out = String::from("{");
        let mut first = true;
        for (key, quantity) in [("limits", &self.limits), ("requests", &self.requests)] {
            let Some(quantity) = quantity else { continue };
            if !first {
                out.push_str(", ");
            }
            first = false;
            let _ = write!(out, ":{key}=>{}", quantity.inspect());
        }
        out.push('}');
        out
    }
}

fn inspect_str(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_input_orders_limits_before_requests() {
        let spec: ResourceLimitSpec = serde_json::from_value(serde_json::json!({
            "requests": {"cpu": "1", "memory": "1Gi"},
            "limits": {"cpu": "2", "memory": "4Gi"}
        }))
        .unwrap();

        assert_eq!(
            spec.to_hash_input(),
            r#"{:limits=>{:cpu=>"2", :memory=>"4Gi"}, :requests=>{:cpu=>"1", :memory=>"1Gi"}}"#
        );
    }

    #[test]
    fn test_hash_input_empty_spec() {
        assert_eq!(ResourceLimitSpec::default().to_hash_input(), "{}");
    }

    #[test]
    fn test_hash_input_partial_spec() {
        let spec = ResourceLimitSpec {
            limits: Some(ResourceQuantity::default().with_memory("2Gi")),
            requests: None,
        };
        assert_eq!(spec.to_hash_input(), r#"{:limits=>{:memory=>"2Gi"}}"#);
    }

    #[test]
    fn test_hash_input_escapes_quotes() {
        let spec = ResourceLimitSpec {
            limits: Some(ResourceQuantity::new("a\"b", "1")),
            requests: None,
        };
        assert_eq!(
            spec.to_hash_input(),
            r#"{:limits=>{:cpu=>"a\"b", :memory=>"1"}}"#
        );
    }

    #[test]
    fn test_numeric_quantities_deserialize_as_strings() {
        let q: ResourceQuantity =
            serde_json::from_value(serde_json::json!({"cpu": 2, "memory": "1Gi"})).unwrap();
        assert_eq!(q.cpu(), Some("2"));

        let q: ResourceQuantity = serde_json::from_value(serde_json::json!({"cpu": 0.5})).unwrap();
        assert_eq!(q.cpu(), Some("0.5"));
        assert_eq!(q.memory(), None);
    }

    #[test]
    fn test_is_empty() {
        assert!(ResourceLimitSpec::default().is_empty());
        assert!(ResourceLimitSpec {
            limits: Some(ResourceQuantity::default()),
            requests: None,
        }
        .is_empty());
        assert!(!ResourceLimitSpec::new(
            ResourceQuantity::new("1", "1Gi"),
            ResourceQuantity::default()
        )
        .is_empty());
    }

    #[test]
    fn test_entries_skip_unset() {
        let q = ResourceQuantity::default().with_memory("1Gi");
        assert_eq!(q.entries().collect::<Vec<_>>(), vec![("memory", "1Gi")]);
    }

    #[test]
    fn test_hash_input_keeps_declared_quantity_order() {
        let spec: ResourceLimitSpec = serde_json::from_value(serde_json::json!({
            "requests": {"memory": "1Gi", "cpu": "1"},
            "limits": {"memory": "4Gi", "cpu": "2"}
        }))
        .unwrap();

        assert_eq!(
            spec.to_hash_input(),
            r#"{:limits=>{:memory=>"4Gi", :cpu=>"2"}, :requests=>{:memory=>"1Gi", :cpu=>"1"}}"#
        );
    }

    #[test]
    fn test_declared_order_survives_yaml() {
        let value = workspaces_common::yaml::parse_yaml("memory: 2Gi\ncpu: 500m\n").unwrap();
        let q: ResourceQuantity = serde_json::from_value(value).unwrap();
        assert_eq!(
            q.entries().collect::<Vec<_>>(),
            vec![("memory", "2Gi"), ("cpu", "500m")]
        );
        assert_eq!(
            serde_json::to_string(&q).unwrap(),
            r#"{"memory":"2Gi","cpu":"500m"}"#
        );
    }

    #[test]
    fn test_unknown_and_null_quantities_are_skipped() {
        let q: ResourceQuantity = serde_json::from_value(serde_json::json!({
            "cpu": null,
            "ephemeral-storage": "1Gi",
            "memory": "1Gi"
        }))
        .unwrap();
        assert_eq!(q.entries().collect::<Vec<_>>(), vec![("memory", "1Gi")]);
    }

    #[test]
    fn test_with_replaces_in_place() {
        let q = ResourceQuantity::new("1", "1Gi").with_cpu("2");
        assert_eq!(q.entries().collect::<Vec<_>>(), vec![("cpu", "2"), ("memory", "1Gi")]);
    }
}
