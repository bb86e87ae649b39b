//! Compiler inputs: workspace identity, cluster agent policy and variables
//!
//! Every type deserializes from `snake_case` YAML/JSON. Agent policy fields
//! that agents commonly leave unset fall back to the same defaults the agent
//! configuration uses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resources::ResourceLimitSpec;

/// Everything a single compilation needs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompileInput {
    /// Workspace being compiled
    pub workspace: WorkspaceIdentity,
    /// Policy of the cluster agent hosting the workspace
    pub agent: AgentPolicy,
    /// Workspace-scoped variables
    #[serde(default)]
    pub variables: Vec<WorkspaceVariable>,
    /// Processed devfile text, passed verbatim to the translator
    #[serde(default)]
    pub devfile: String,
}

/// Desired run state of a workspace
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    /// Pods should be running
    #[default]
    Running,
    /// Resources stay in place, scaled to zero
    Stopped,
    /// Everything except the inventories should be pruned
    Terminated,
}

impl DesiredState {
    /// Deployment replica count for this state
    pub fn replicas(self) -> u32 {
        match self {
            Self::Running => 1,
            Self::Stopped | Self::Terminated => 0,
        }
    }
}

/// Workspace identity and state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceIdentity {
    /// Numeric workspace id
    pub id: u64,
    /// Workspace name, used as the base of every resource name
    pub name: String,
    /// Dedicated namespace; ignored when the agent sets a shared namespace
    pub namespace: String,
    /// Desired run state
    #[serde(default)]
    pub desired_state: DesiredState,
    /// Last state the reconciler reported, e.g. `Running`
    #[serde(default)]
    pub actual_state: Option<String>,
}

/// Cluster agent policy settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentPolicy {
    /// Numeric agent id
    pub agent_id: u64,
    /// DNS zone workspace hosts live under
    pub dns_zone: String,
    /// Defaults merged under each container's declared resources
    #[serde(default)]
    pub default_resources_per_workspace_container: ResourceLimitSpec,
    /// Per-workspace cap applied as a ResourceQuota
    #[serde(default)]
    pub max_resources_per_workspace: ResourceLimitSpec,
    /// Labels stamped on every resource
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Annotations stamped on every resource
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Pull secrets attached to the workspace ServiceAccount
    #[serde(default)]
    pub image_pull_secrets: Vec<ImagePullSecret>,
    /// Whether a NetworkPolicy is emitted
    #[serde(default = "default_true")]
    pub network_policy_enabled: bool,
    /// Egress rules appended after the DNS rule
    #[serde(default = "default_egress")]
    pub network_policy_egress: Vec<EgressRule>,
    /// RuntimeClass for workspace pods; empty means unset
    #[serde(default)]
    pub default_runtime_class: String,
    /// Value of `allowPrivilegeEscalation` on every container
    #[serde(default)]
    pub allow_privilege_escalation: bool,
    /// Whether `hostUsers` is set on workspace pods
    #[serde(default)]
    pub use_kubernetes_user_namespaces: bool,
    /// Namespace shared by all workspaces of this agent; empty means each
    /// workspace gets its own
    #[serde(default)]
    pub shared_namespace: String,
    /// Namespace the workspaces proxy runs in
    #[serde(default = "default_proxy_namespace")]
    pub gitlab_workspaces_proxy_namespace: String,
}

impl AgentPolicy {
    /// Policy with every optional field at its default
    pub fn new(agent_id: u64, dns_zone: impl Into<String>) -> Self {
        Self {
            agent_id,
            dns_zone: dns_zone.into(),
            default_resources_per_workspace_container: ResourceLimitSpec::default(),
            max_resources_per_workspace: ResourceLimitSpec::default(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            image_pull_secrets: Vec::new(),
            network_policy_enabled: true,
            network_policy_egress: default_egress(),
            default_runtime_class: String::new(),
            allow_privilege_escalation: false,
            use_kubernetes_user_namespaces: false,
            shared_namespace: String::new(),
            gitlab_workspaces_proxy_namespace: default_proxy_namespace(),
        }
    }

    /// The shared namespace, if one is configured
    pub fn shared_namespace(&self) -> Option<&str> {
        Some(self.shared_namespace.as_str()).filter(|ns| !ns.is_empty())
    }
}

/// Image pull secret reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullSecret {
    /// Secret name
    pub name: String,
    /// Namespace the secret is copied from
    #[serde(default)]
    pub namespace: String,
}

/// One egress allow rule with optional exceptions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRule {
    /// CIDR to allow
    pub allow: String,
    /// CIDRs carved out of `allow`
    #[serde(default)]
    pub except: Vec<String>,
}

/// How a workspace variable is exposed to containers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Injected as an environment variable
    Environment,
    /// Mounted as a file
    File,
}

/// A workspace-scoped variable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceVariable {
    /// Variable name or file name
    pub key: String,
    /// Plain-text value
    pub value: String,
    /// Exposure type
    pub variable_type: VariableType,
}

fn default_true() -> bool {
    true
}

fn default_proxy_namespace() -> String {
    "gitlab-workspaces".to_string()
}

fn default_egress() -> Vec<EgressRule> {
    vec![EgressRule {
        allow: "0.0.0.0/0".to_string(),
        except: vec![
            "10.0.0.0/8".to_string(),
            "172.16.0.0/12".to_string(),
            "192.168.0.0/16".to_string(),
        ],
    }]
}
