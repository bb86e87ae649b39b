//! Derivation of names, labels, annotations and the resource hash
//!
//! Pure and total over well-formed input: every later stage reads these
//! values instead of recomputing them, so the same workspace always produces
//! the same names and annotation sets.

use std::collections::BTreeMap;

use aws_lc_rs::digest::{digest, SHA256};
use workspaces_common::{
    ANNOTATION_HOST_TEMPLATE, ANNOTATION_MAX_RESOURCES_SHA256, ANNOTATION_OWNING_INVENTORY,
    ANNOTATION_PARTIAL_RECONCILIATION, ANNOTATION_WORKSPACE_ID, LABEL_AGENT_ID,
    LABEL_WORKSPACE_ID,
};

use super::CompilerStage;
use crate::context::{AnnotationSets, ConfigValues, DesiredConfigContext, ResolvedNames};
use crate::error::{Error, Stage};
use crate::input::{CompileInput, DesiredState, VariableType};
use crate::resources::ResourceLimitSpec;

/// Computes [`ConfigValues`] from the raw input
pub(crate) struct ConfigValueDeriver;

impl CompilerStage for ConfigValueDeriver {
    fn stage(&self) -> Stage {
        Stage::ConfigValues
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        let values = derive_config_values(ctx.input());
        ctx.set_values(values)
    }
}

/// Derive every name, label and annotation set for a workspace
pub fn derive_config_values(input: &CompileInput) -> ConfigValues {
    let workspace = &input.workspace;
    let agent = &input.agent;
    let shared_namespace = agent.shared_namespace();

    let name = workspace.name.as_str();
    let names = ResolvedNames {
        workspace_id: workspace.id,
        agent_id: agent.agent_id,
        workspace_name: name.to_string(),
        namespace: shared_namespace.unwrap_or(workspace.namespace.as_str()).to_string(),
        domain_template: format!("{{{{.port}}}}-{}.{}", name, agent.dns_zone),
        workspace_inventory: format!("{name}-workspace-inventory"),
        secrets_inventory: format!("{name}-secrets-inventory"),
        scripts_configmap: format!("{name}-scripts-configmap"),
        env_secret: format!("{name}-env-var"),
        file_secret: format!("{name}-file"),
    };

    let mut labels = agent.labels.clone();
    labels.insert(LABEL_AGENT_ID.to_string(), agent.agent_id.to_string());
    if shared_namespace.is_some() {
        labels.insert(LABEL_WORKSPACE_ID.to_string(), workspace.id.to_string());
    }

    let max_resources_sha256 = max_resources_sha256(&agent.max_resources_per_workspace);
    let annotations = annotation_sets(
        &agent.annotations,
        &names,
        &max_resources_sha256,
    );

    let variables = |kind: VariableType| -> BTreeMap<String, String> {
        input
            .variables
            .iter()
            .filter(|v| v.variable_type == kind)
            .map(|v| (v.key.clone(), v.value.clone()))
            .collect()
    };

    ConfigValues {
        labels,
        annotations,
        replicas: workspace.desired_state.replicas(),
        terminated: workspace.desired_state == DesiredState::Terminated,
        shared_namespace: shared_namespace.is_some(),
        max_resources_sha256,
        default_resources: agent.default_resources_per_workspace_container.clone(),
        max_resources: agent.max_resources_per_workspace.clone(),
        image_pull_secrets: agent.image_pull_secrets.clone(),
        network_policy_enabled: agent.network_policy_enabled,
        network_policy_egress: agent.network_policy_egress.clone(),
        proxy_namespace: agent.gitlab_workspaces_proxy_namespace.clone(),
        runtime_class: agent.default_runtime_class.clone(),
        allow_privilege_escalation: agent.allow_privilege_escalation,
        use_kubernetes_user_namespaces: agent.use_kubernetes_user_namespaces,
        env_variables: variables(VariableType::Environment),
        file_variables: variables(VariableType::File),
        actual_state: workspace.actual_state.clone(),
        names,
    }
}

/// Hex SHA-256 of the max-resources inspect string
pub fn max_resources_sha256(spec: &ResourceLimitSpec) -> String {
    let hash = digest(&SHA256, spec.to_hash_input().as_bytes());
    hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
}

fn annotation_sets(
    agent_annotations: &BTreeMap<String, String>,
    names: &ResolvedNames,
    max_resources_sha256: &str,
) -> AnnotationSets {
    let mut common = agent_annotations.clone();
    common.insert(
        ANNOTATION_HOST_TEMPLATE.to_string(),
        names.domain_template.clone(),
    );
    common.insert(
        ANNOTATION_WORKSPACE_ID.to_string(),
        names.workspace_id.to_string(),
    );
    common.insert(
        ANNOTATION_MAX_RESOURCES_SHA256.to_string(),
        max_resources_sha256.to_string(),
    );

    let with = |base: &BTreeMap<String, String>, key: &str, value: &str| {
        let mut set = base.clone();
        set.insert(key.to_string(), value.to_string());
        set
    };

    let workspace_owned = with(
        &common,
        ANNOTATION_OWNING_INVENTORY,
        &names.workspace_inventory,
    );

    AnnotationSets {
        common_partial: with(&common, ANNOTATION_PARTIAL_RECONCILIATION, "true"),
        workspace_owned_partial: with(&workspace_owned, ANNOTATION_PARTIAL_RECONCILIATION, "true"),
        secrets_owned: with(&common, ANNOTATION_OWNING_INVENTORY, &names.secrets_inventory),
        workspace_owned,
        common,
    }
}
