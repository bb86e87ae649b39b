//! Compiled desired configuration

use workspaces_common::ANNOTATION_PARTIAL_RECONCILIATION;

use crate::error::Error;
use crate::manifest::Manifest;

/// Ordered, validated resource list for one workspace
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledResult {
    resources: Vec<Manifest>,
}

impl CompiledResult {
    /// Validate and wrap a resource list. The list must be non-empty and
    /// every resource must carry `kind`, `apiVersion` and `metadata.name`.
    pub fn new(resources: Vec<Manifest>) -> Result<Self, Error> {
        if resources.is_empty() {
            return Err(Error::invalid_resource("compiled resource list is empty"));
        }
        for resource in &resources {
            resource.validate()?;
        }
        Ok(Self { resources })
    }

    /// Resources in apply order
    pub fn resources(&self) -> &[Manifest] {
        &self.resources
    }

    /// Take the resources
    pub fn into_resources(self) -> Vec<Manifest> {
        self.resources
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Always false for a validated result
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources of the given kind, in order
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Manifest> + 'a {
        self.resources.iter().filter(move |r| r.is_kind(kind))
    }

    /// Resources reconciled on lightweight passes, in order
    pub fn partial_reconciliation_resources(&self) -> Vec<&Manifest> {
        self.resources
            .iter()
            .filter(|r| r.annotation(ANNOTATION_PARTIAL_RECONCILIATION) == Some("true"))
            .collect()
    }

    /// Render as a multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String, Error> {
        let mut out = String::new();
        for resource in &self.resources {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(resource).map_err(|e| Error::Serialization {
                message: e.to_string(),
            })?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(kind: &str, name: &str, partial: bool) -> Manifest {
        let mut annotations = serde_json::Map::new();
        if partial {
            annotations.insert(ANNOTATION_PARTIAL_RECONCILIATION.to_string(), json!("true"));
        }
        Manifest::from_value(json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"name": name, "annotations": annotations}
        }))
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_list() {
        assert!(matches!(
            CompiledResult::new(Vec::new()),
            Err(Error::InvalidResource { .. })
        ));
    }

    #[test]
    fn test_rejects_malformed_resource() {
        let bad = Manifest::from_value(json!({"kind": "Service"})).unwrap();
        assert!(CompiledResult::new(vec![manifest("ConfigMap", "a", false), bad]).is_err());
    }

    #[test]
    fn test_partial_subset_and_kinds() {
        let result = CompiledResult::new(vec![
            manifest("ConfigMap", "inventory", true),
            manifest("Secret", "env", false),
            manifest("ServiceAccount", "ws", true),
        ])
        .unwrap();

        let partial: Vec<_> = result
            .partial_reconciliation_resources()
            .into_iter()
            .filter_map(Manifest::name)
            .collect();
        assert_eq!(partial, ["inventory", "ws"]);
        assert_eq!(result.of_kind("Secret").count(), 1);
        assert_eq!(result.len(), 3);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_to_yaml_round_trips_through_parser() {
        let result = CompiledResult::new(vec![
            manifest("ConfigMap", "inventory", true),
            manifest("Secret", "env", false),
        ])
        .unwrap();

        let yaml = result.to_yaml().unwrap();
        let docs = workspaces_common::yaml::parse_yaml_documents(&yaml).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["metadata"]["name"], "inventory");
        assert_eq!(docs[1]["kind"], "Secret");
    }
}
