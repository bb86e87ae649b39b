//! Splitting translator output into resource documents

use workspaces_common::yaml::parse_yaml_documents;

use super::CompilerStage;
use crate::context::DesiredConfigContext;
use crate::error::{Error, Stage};
use crate::manifest::Manifest;

/// Parses the translator's multi-document output
pub(crate) struct ManifestDocumentParser;

impl CompilerStage for ManifestDocumentParser {
    fn stage(&self) -> Stage {
        Stage::ParseManifests
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        let resources = parse_manifests(ctx.manifest_text()?)?;
        ctx.set_resources(resources)
    }
}

/// Parse a multi-document YAML stream into manifests, in document order.
///
/// Blank documents are skipped; a document that is not a mapping, or text
/// that is not YAML, fails the whole parse.
pub fn parse_manifests(text: &str) -> Result<Vec<Manifest>, Error> {
    parse_yaml_documents(text)
        .map_err(|e| Error::parse(e.to_string()))?
        .into_iter()
        .enumerate()
        .map(|(index, doc)| {
            Manifest::from_value(doc)
                .map_err(|e| Error::parse(format!("document {}: {}", index + 1, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSLATED: &str = r#"---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: ws
  namespace: ns
spec:
  replicas: 1
---
apiVersion: v1
kind: Service
metadata:
  name: ws
  namespace: ns
---
apiVersion: v1
kind: PersistentVolumeClaim
metadata:
  name: ws-gl-workspace-data
  namespace: ns
---
"#;

    #[test]
    fn test_parses_documents_in_order() {
        let resources = parse_manifests(TRANSLATED).unwrap();
        let kinds: Vec<_> = resources.iter().filter_map(Manifest::kind).collect();
        assert_eq!(kinds, ["Deployment", "Service", "PersistentVolumeClaim"]);
        assert_eq!(resources[0].as_value()["spec"]["replicas"], 1);
    }

    #[test]
    fn test_empty_stream_yields_no_resources() {
        assert!(parse_manifests("").unwrap().is_empty());
        assert!(parse_manifests("---\n---\n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = parse_manifests("kind: [Deployment\nmetadata: {name: ws\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_scalar_document_is_parse_error() {
        let err = parse_manifests("kind: Service\n---\njust a string\n").unwrap_err();
        match err {
            Error::Parse { message } => assert!(message.starts_with("document 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
