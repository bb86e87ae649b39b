//! Compilation context threaded through the pipeline
//!
//! Each slot is written by exactly one stage. Reading a slot before its
//! producer ran, or writing it twice, is a contract violation.

use std::collections::BTreeMap;

use tracing::error;

use crate::error::Error;
use crate::input::{CompileInput, EgressRule, ImagePullSecret};
use crate::manifest::Manifest;
use crate::pipeline::poststart::PostStart;
use crate::resources::ResourceLimitSpec;

/// Names derived from workspace identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedNames {
    /// Workspace id
    pub workspace_id: u64,
    /// Agent id
    pub agent_id: u64,
    /// Workspace name
    pub workspace_name: String,
    /// Namespace every resource lands in
    pub namespace: String,
    /// `{{.port}}-<name>.<dns zone>`
    pub domain_template: String,
    /// `<name>-workspace-inventory`
    pub workspace_inventory: String,
    /// `<name>-secrets-inventory`
    pub secrets_inventory: String,
    /// `<name>-scripts-configmap`
    pub scripts_configmap: String,
    /// `<name>-env-var`
    pub env_secret: String,
    /// `<name>-file`
    pub file_secret: String,
}

/// Annotation sets stamped on the different resource groups
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationSets {
    /// Agent annotations plus host template, workspace id and resource hash
    pub common: BTreeMap<String, String>,
    /// `common` marked for partial reconciliation
    pub common_partial: BTreeMap<String, String>,
    /// `common` owned by the workspace inventory
    pub workspace_owned: BTreeMap<String, String>,
    /// `workspace_owned` marked for partial reconciliation
    pub workspace_owned_partial: BTreeMap<String, String>,
    /// `common` owned by the secrets inventory
    pub secrets_owned: BTreeMap<String, String>,
}

/// Everything derived from the raw inputs before any resource exists
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigValues {
    /// Resource names
    pub names: ResolvedNames,
    /// Labels stamped on every resource
    pub labels: BTreeMap<String, String>,
    /// Annotation variants
    pub annotations: AnnotationSets,
    /// Deployment replicas
    pub replicas: u32,
    /// Workspace should be pruned down to its inventories
    pub terminated: bool,
    /// Workspaces of this agent share one namespace
    pub shared_namespace: bool,
    /// Hex SHA-256 of the per-workspace maximum spec
    pub max_resources_sha256: String,
    /// Defaults merged under container resources
    pub default_resources: ResourceLimitSpec,
    /// Per-workspace quota
    pub max_resources: ResourceLimitSpec,
    /// Pull secrets for the ServiceAccount
    pub image_pull_secrets: Vec<ImagePullSecret>,
    /// Whether to emit a NetworkPolicy
    pub network_policy_enabled: bool,
    /// Egress allow rules
    pub network_policy_egress: Vec<EgressRule>,
    /// Proxy namespace allowed to reach workspace pods
    pub proxy_namespace: String,
    /// RuntimeClass, empty when unset
    pub runtime_class: String,
    /// `allowPrivilegeEscalation` for every container
    pub allow_privilege_escalation: bool,
    /// Set `hostUsers` on the pod
    pub use_kubernetes_user_namespaces: bool,
    /// Environment variables, key to plain value
    pub env_variables: BTreeMap<String, String>,
    /// File variables, key to plain value
    pub file_variables: BTreeMap<String, String>,
    /// Reported actual state, written into the file secret
    pub actual_state: Option<String>,
}

/// Growing record shared by all stages of one compilation
#[derive(Debug)]
pub struct DesiredConfigContext<'a> {
    input: &'a CompileInput,
    values: Option<ConfigValues>,
    manifest_text: Option<String>,
    resources: Option<Vec<Manifest>>,
    post_start: Option<PostStart>,
}

impl<'a> DesiredConfigContext<'a> {
    /// Start a context over the caller's input
    pub fn new(input: &'a CompileInput) -> Self {
        Self {
            input,
            values: None,
            manifest_text: None,
            resources: None,
            post_start: None,
        }
    }

    /// Raw compile input
    pub fn input(&self) -> &'a CompileInput {
        self.input
    }

    /// Derived values
    pub fn values(&self) -> Result<&ConfigValues, Error> {
        require(self.values.as_ref(), "values")
    }

    /// Record derived values
    pub fn set_values(&mut self, values: ConfigValues) -> Result<(), Error> {
        fill(&mut self.values, values, "values")
    }

    /// Translator output
    pub fn manifest_text(&self) -> Result<&str, Error> {
        require(self.manifest_text.as_deref(), "manifest_text")
    }

    /// Record translator output
    pub fn set_manifest_text(&mut self, text: String) -> Result<(), Error> {
        fill(&mut self.manifest_text, text, "manifest_text")
    }

    /// Resources produced so far
    pub fn resources(&self) -> Result<&[Manifest], Error> {
        require(self.resources.as_deref(), "resources")
    }

    /// Resources produced so far, for in-place changes and appends
    pub fn resources_mut(&mut self) -> Result<&mut Vec<Manifest>, Error> {
        require(self.resources.as_mut(), "resources")
    }

    /// Record the initial resource list
    pub fn set_resources(&mut self, resources: Vec<Manifest>) -> Result<(), Error> {
        fill(&mut self.resources, resources, "resources")
    }

    /// postStart synthesis outcome
    pub fn post_start(&self) -> Result<&PostStart, Error> {
        require(self.post_start.as_ref(), "post_start")
    }

    /// Record the postStart synthesis outcome
    pub fn set_post_start(&mut self, post_start: PostStart) -> Result<(), Error> {
        fill(&mut self.post_start, post_start, "post_start")
    }

    /// Consume the context, returning the resource list
    pub fn into_resources(self) -> Result<Vec<Manifest>, Error> {
        require(self.resources, "resources")
    }
}

fn require<T>(slot: Option<T>, field: &str) -> Result<T, Error> {
    slot.ok_or_else(|| {
        error!(field, "context field read before it was produced");
        Error::contract_violation(format!("{field} has not been produced"))
    })
}

fn fill<T>(slot: &mut Option<T>, value: T, field: &str) -> Result<(), Error> {
    if slot.is_some() {
        error!(field, "context field written twice");
        return Err(Error::contract_violation(format!("{field} was already produced")));
    }
    *slot = Some(value);
    Ok(())
}
