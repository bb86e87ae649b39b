//! Kubernetes resource types for desired-configuration compilation
//!
//! Auxiliary resources are modelled completely. Pod-level types only model
//! the fields the pipeline touches; everything else a translator emits is
//! carried through untouched in `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use workspaces_common::ObjectMeta;

// =============================================================================
// ConfigMap and Secret
// =============================================================================

/// Kubernetes ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// String data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create an empty ConfigMap
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata,
            data: BTreeMap::new(),
        }
    }

    /// Replace the data entries
    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }
}

/// Kubernetes Secret with pre-encoded data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Base64-encoded data, always rendered so empty secrets stay valid
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Create an empty Secret
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            metadata,
            data: BTreeMap::new(),
        }
    }
}

// =============================================================================
// ServiceAccount and ResourceQuota
// =============================================================================

/// Reference to an object by name
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalObjectReference {
    /// Object name
    pub name: String,
}

/// Kubernetes ServiceAccount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Whether the default API token is mounted into pods
    pub automount_service_account_token: bool,
    /// Pull secrets available to pods using this account
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

impl ServiceAccount {
    /// Create a ServiceAccount that does not auto-mount API tokens
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ServiceAccount".to_string(),
            metadata,
            automount_service_account_token: false,
            image_pull_secrets: Vec::new(),
        }
    }
}

/// Kubernetes ResourceQuota
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuota {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Quota spec
    pub spec: ResourceQuotaSpec,
}

/// ResourceQuota spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceQuotaSpec {
    /// Hard limits keyed by `limits.cpu`, `requests.memory`, ...
    pub hard: BTreeMap<String, String>,
}

impl ResourceQuota {
    /// Create a ResourceQuota with the given hard limits
    pub fn new(metadata: ObjectMeta, hard: BTreeMap<String, String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ResourceQuota".to_string(),
            metadata,
            spec: ResourceQuotaSpec { hard },
        }
    }
}

// =============================================================================
// NetworkPolicy
// =============================================================================

/// Kubernetes NetworkPolicy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Policy spec
    pub spec: NetworkPolicySpec,
}

/// NetworkPolicy spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Pods the policy applies to
    pub pod_selector: LabelSelector,
    /// Allowed inbound peers
    pub ingress: Vec<NetworkPolicyIngressRule>,
    /// Allowed outbound peers
    pub egress: Vec<NetworkPolicyEgressRule>,
    /// `Ingress` and/or `Egress`
    pub policy_types: Vec<String>,
}

/// Label selector; an empty selector matches everything
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact label matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Select on a single label
    pub fn matching(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            match_labels: BTreeMap::from([(key.into(), value.into())]),
        }
    }
}

/// Inbound rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyIngressRule {
    /// Allowed sources
    pub from: Vec<NetworkPolicyPeer>,
}

/// Outbound rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyEgressRule {
    /// Allowed ports; all ports when absent
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<NetworkPolicyPort>,
    /// Allowed destinations
    pub to: Vec<NetworkPolicyPeer>,
}

/// Port and protocol pair
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkPolicyPort {
    /// Port number
    pub port: u16,
    /// `TCP` or `UDP`
    pub protocol: String,
}

/// A peer selected by namespace, pod labels or CIDR
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyPeer {
    /// CIDR block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_block: Option<IpBlock>,
    /// Namespace selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
    /// Pod selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
}

/// CIDR block with exclusions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpBlock {
    /// Allowed CIDR
    pub cidr: String,
    /// Excluded CIDRs
    #[serde(default)]
    pub except: Vec<String>,
}

// =============================================================================
// Pod template substructures
// =============================================================================

/// The parts of a pod spec the pipeline reads or writes
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Main containers; the first one is the tooling container
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Init containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_containers: Option<Vec<Container>>,
    /// Pod volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    /// Pod security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,
    /// Service account the pod runs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// RuntimeClass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_class_name: Option<String>,
    /// Host user namespace toggle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_users: Option<bool>,
    /// Untouched fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PodSpec {
    /// All containers followed by all init containers
    pub fn all_containers_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        self.containers
            .iter_mut()
            .chain(self.init_containers.iter_mut().flatten())
    }

    /// Append a volume unless one with the same name exists
    pub fn ensure_volume(&mut self, volume: Volume) {
        let volumes = self.volumes.get_or_insert_with(Vec::new);
        if !volumes.iter().any(|v| v.name == volume.name) {
            volumes.push(volume);
        }
    }
}

/// Pod-level security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSecurityContext {
    /// Refuse to start containers running as root
    pub run_as_non_root: bool,
    /// UID for container processes
    pub run_as_user: i64,
    /// Supplemental group owning mounted volumes
    pub fs_group: i64,
    /// When volume ownership is rewritten
    pub fs_group_change_policy: String,
}

/// The parts of a container the pipeline reads or writes
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Compute resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,
    /// Bulk env sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_from: Option<Vec<EnvFromSource>>,
    /// Container security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Lifecycle hooks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    /// Untouched fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Container {
    /// Append a mount unless one with the same volume name exists
    pub fn ensure_volume_mount(&mut self, mount: VolumeMount) {
        let mounts = self.volume_mounts.get_or_insert_with(Vec::new);
        if !mounts.iter().any(|m| m.name == mount.name) {
            mounts.push(mount);
        }
    }

    /// Append an env source unless an identical one exists
    pub fn ensure_env_from(&mut self, source: EnvFromSource) {
        let sources = self.env_from.get_or_insert_with(Vec::new);
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
}

/// Container-level security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityContext {
    /// Whether a process can gain more privileges than its parent
    pub allow_privilege_escalation: bool,
    /// Privileged mode
    pub privileged: bool,
    /// Refuse to start as root
    pub run_as_non_root: bool,
    /// UID for the container process
    pub run_as_user: i64,
}

/// Container resource requirements, keyed by resource name
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    /// Upper bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Value>>,
    /// Guaranteed amounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, Value>>,
    /// Untouched fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Path inside the container
    pub mount_path: String,
    /// Mount read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Untouched fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VolumeMount {
    /// Mount a volume at a path
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: None,
            extra: Map::new(),
        }
    }

    /// Mark the mount read-only
    pub fn read_only(mut self) -> Self {
        self.read_only = Some(true);
        self
    }
}

/// Env source referencing a Secret or ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvFromSource {
    /// Secret reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
    /// ConfigMap reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<LocalObjectReference>,
    /// Untouched fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EnvFromSource {
    /// Load every key of a Secret as environment variables
    pub fn secret(name: impl Into<String>) -> Self {
        Self {
            secret_ref: Some(LocalObjectReference { name: name.into() }),
            config_map_ref: None,
            extra: Map::new(),
        }
    }
}

/// Pod volume
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// Projected volume source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected: Option<ProjectedVolumeSource>,
    /// Other volume sources, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Volume {
    /// A projected volume with a single source
    pub fn projected(name: impl Into<String>, default_mode: i32, source: VolumeProjection) -> Self {
        Self {
            name: name.into(),
            projected: Some(ProjectedVolumeSource {
                default_mode: Some(default_mode),
                sources: vec![source],
            }),
            extra: Map::new(),
        }
    }
}

/// Projected volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedVolumeSource {
    /// File mode applied to projected files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<i32>,
    /// Projected sources
    #[serde(default)]
    pub sources: Vec<VolumeProjection>,
}

/// One source of a projected volume
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeProjection {
    /// Secret projection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<LocalObjectReference>,
    /// ConfigMap projection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<LocalObjectReference>,
    /// Other projections, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VolumeProjection {
    /// Project every key of a Secret
    pub fn secret(name: impl Into<String>) -> Self {
        Self {
            secret: Some(LocalObjectReference { name: name.into() }),
            ..Default::default()
        }
    }

    /// Project every key of a ConfigMap
    pub fn config_map(name: impl Into<String>) -> Self {
        Self {
            config_map: Some(LocalObjectReference { name: name.into() }),
            ..Default::default()
        }
    }
}

/// Container lifecycle hooks
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    /// Hook run right after the container starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_start: Option<LifecycleHandler>,
    /// Other hooks, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lifecycle handler
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LifecycleHandler {
    /// Command executed inside the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
    /// Other handler kinds, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LifecycleHandler {
    /// Handler running a command
    pub fn exec(command: Vec<String>) -> Self {
        Self {
            exec: Some(ExecAction { command }),
            extra: Map::new(),
        }
    }
}

/// Exec action
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecAction {
    /// Command and arguments
    pub command: Vec<String>,
}
