//! Common types for the workspace desired-configuration compiler: metadata,
//! well-known keys, YAML parsing, and logging setup

#![deny(missing_docs)]

pub mod meta;
pub mod telemetry;
pub mod yaml;

pub use meta::ObjectMeta;

// =============================================================================
// Label keys
// =============================================================================

/// Label carrying the id of the cluster agent that owns the workspace
pub const LABEL_AGENT_ID: &str = "agent.gitlab.com/id";

/// Label carrying the workspace id, only set when workspaces share a namespace
pub const LABEL_WORKSPACE_ID: &str = "workspaces.gitlab.com/id";

/// Label tying an inventory ConfigMap to the inventory it anchors
pub const LABEL_INVENTORY_ID: &str = "cli-utils.sigs.k8s.io/inventory-id";

/// Well-known namespace name label set by Kubernetes on every namespace
pub const LABEL_NAMESPACE_NAME: &str = "kubernetes.io/metadata.name";

/// Standard application name label
pub const LABEL_APP_NAME: &str = "app.kubernetes.io/name";

// =============================================================================
// Annotation keys
// =============================================================================

/// Template used by the workspaces proxy to route `<port>-<name>` hosts
pub const ANNOTATION_HOST_TEMPLATE: &str = "workspaces.gitlab.com/host-template";

/// Workspace id annotation
pub const ANNOTATION_WORKSPACE_ID: &str = "workspaces.gitlab.com/id";

/// SHA-256 of the per-workspace maximum resource specification
pub const ANNOTATION_MAX_RESOURCES_SHA256: &str =
    "workspaces.gitlab.com/max-resources-per-workspace-sha256";

/// Marks resources reconciled on every lightweight (partial) pass
pub const ANNOTATION_PARTIAL_RECONCILIATION: &str =
    "workspaces.gitlab.com/include-in-partial-reconciliation";

/// Back-link from an owned resource to the inventory that tracks it
pub const ANNOTATION_OWNING_INVENTORY: &str = "config.k8s.io/owning-inventory";
