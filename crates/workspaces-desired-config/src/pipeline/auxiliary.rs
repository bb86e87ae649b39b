//! Auxiliary resources around the translated workload
//!
//! Emits the inventories, ServiceAccount, NetworkPolicy, ResourceQuota,
//! scripts ConfigMap and variable Secrets, and fixes the final resource
//! order the reconciler applies in.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use workspaces_common::{
    ObjectMeta, LABEL_APP_NAME, LABEL_INVENTORY_ID, LABEL_NAMESPACE_NAME, LABEL_WORKSPACE_ID,
};

use super::poststart::PostStart;
use super::CompilerStage;
use crate::context::{ConfigValues, DesiredConfigContext};
use crate::error::{Error, Stage};
use crate::k8s::{
    ConfigMap, IpBlock, LabelSelector, LocalObjectReference, NetworkPolicy,
    NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort,
    NetworkPolicySpec, ResourceQuota, Secret, ServiceAccount,
};
use crate::manifest::Manifest;

/// Namespace allowed to answer DNS queries
const DNS_NAMESPACE: &str = "kube-system";

/// `app.kubernetes.io/name` of the workspaces proxy pods
const PROXY_APP_NAME: &str = "gitlab-workspaces-proxy";

/// File secret entry holding the last reconciled actual state
pub const RECONCILED_ACTUAL_STATE_FILE: &str = "gl_workspace_reconciled_actual_state.txt";

/// Appends every resource the translator does not produce
pub(crate) struct AuxiliaryResourceSynthesizer;

impl CompilerStage for AuxiliaryResourceSynthesizer {
    fn stage(&self) -> Stage {
        Stage::AuxiliaryResources
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        let values = ctx.values()?.clone();
        if values.terminated {
            return ctx.set_resources(terminated_resources(&values)?);
        }

        let post_start = ctx.post_start()?.clone();
        let resources = ctx.resources_mut()?;
        let upstream = std::mem::take(resources);
        *resources = assemble_resources(&values, upstream, &post_start)?;
        Ok(())
    }
}

/// Full resource list for a running or stopped workspace.
///
/// Order: workspace inventory, translated resources, ServiceAccount,
/// NetworkPolicy, secrets inventory, ResourceQuota, scripts ConfigMap,
/// environment Secret, file Secret.
pub fn assemble_resources(
    values: &ConfigValues,
    upstream: Vec<Manifest>,
    post_start: &PostStart,
) -> Result<Vec<Manifest>, Error> {
    let mut resources = Vec::with_capacity(upstream.len() + 8);
    resources.push(Manifest::from_resource(&workspace_inventory(values))?);
    resources.extend(upstream);
    resources.push(Manifest::from_resource(&service_account(values))?);
    if values.network_policy_enabled {
        resources.push(Manifest::from_resource(&network_policy(values))?);
    }
    resources.push(Manifest::from_resource(&secrets_inventory(values))?);
    if let Some(quota) = resource_quota(values) {
        resources.push(Manifest::from_resource(&quota)?);
    }
    if let PostStart::Scripts(scripts) = post_start {
        resources.push(Manifest::from_resource(&scripts_configmap(values, &scripts.files))?);
    }
    resources.push(Manifest::from_resource(&variables_secret(
        values,
        &values.names.env_secret,
        &values.env_variables,
    ))?);
    resources.push(Manifest::from_resource(&variables_secret(
        values,
        &values.names.file_secret,
        &file_secret_data(values),
    ))?);
    Ok(resources)
}

/// Resources kept for a terminated workspace: just the two inventories, so
/// the reconciler prunes everything they used to own
pub fn terminated_resources(values: &ConfigValues) -> Result<Vec<Manifest>, Error> {
    Ok(vec![
        Manifest::from_resource(&workspace_inventory(values))?,
        Manifest::from_resource(&secrets_inventory(values))?,
    ])
}

fn metadata(values: &ConfigValues, name: &str, annotations: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta::new(name, &values.names.namespace)
        .with_labels(values.labels.clone())
        .with_annotations(annotations.clone())
}

fn workspace_inventory(values: &ConfigValues) -> ConfigMap {
    let name = &values.names.workspace_inventory;
    ConfigMap::new(
        metadata(values, name, &values.annotations.common_partial)
            .with_label(LABEL_INVENTORY_ID, name),
    )
}

fn secrets_inventory(values: &ConfigValues) -> ConfigMap {
    let name = &values.names.secrets_inventory;
    ConfigMap::new(metadata(values, name, &values.annotations.common).with_label(LABEL_INVENTORY_ID, name))
}

fn service_account(values: &ConfigValues) -> ServiceAccount {
    let mut account = ServiceAccount::new(metadata(
        values,
        &values.names.workspace_name,
        &values.annotations.workspace_owned_partial,
    ));
    account.image_pull_secrets = values
        .image_pull_secrets
        .iter()
        .map(|secret| LocalObjectReference {
            name: secret.name.clone(),
        })
        .collect();
    account
}

fn network_policy(values: &ConfigValues) -> NetworkPolicy {
    let pod_selector = if values.shared_namespace {
        LabelSelector::matching(LABEL_WORKSPACE_ID, values.names.workspace_id.to_string())
    } else {
        LabelSelector::default()
    };

    let dns = NetworkPolicyEgressRule {
        ports: ["TCP", "UDP"]
            .into_iter()
            .map(|protocol| NetworkPolicyPort {
                port: 53,
                protocol: protocol.to_string(),
            })
            .collect(),
        to: vec![NetworkPolicyPeer {
            namespace_selector: Some(LabelSelector::matching(LABEL_NAMESPACE_NAME, DNS_NAMESPACE)),
            ..Default::default()
        }],
    };
    let egress = std::iter::once(dns)
        .chain(values.network_policy_egress.iter().map(|rule| NetworkPolicyEgressRule {
            ports: Vec::new(),
            to: vec![NetworkPolicyPeer {
                ip_block: Some(IpBlock {
                    cidr: rule.allow.clone(),
                    except: rule.except.clone(),
                }),
                ..Default::default()
            }],
        }))
        .collect();

    let ingress = vec![NetworkPolicyIngressRule {
        from: vec![NetworkPolicyPeer {
            namespace_selector: Some(LabelSelector::matching(
                LABEL_NAMESPACE_NAME,
                &values.proxy_namespace,
            )),
            pod_selector: Some(LabelSelector::matching(LABEL_APP_NAME, PROXY_APP_NAME)),
            ..Default::default()
        }],
    }];

    NetworkPolicy {
        api_version: "networking.k8s.io/v1".to_string(),
        kind: "NetworkPolicy".to_string(),
        metadata: metadata(
            values,
            &values.names.workspace_name,
            &values.annotations.workspace_owned_partial,
        ),
        spec: NetworkPolicySpec {
            pod_selector,
            ingress,
            egress,
            policy_types: vec!["Ingress".to_string(), "Egress".to_string()],
        },
    }
}

/// Quotas are namespace scoped, so shared namespaces never get one
fn resource_quota(values: &ConfigValues) -> Option<ResourceQuota> {
    if values.shared_namespace || values.max_resources.is_empty() {
        return None;
    }

    let mut hard = BTreeMap::new();
    for (section, quantity) in [
        ("limits", &values.max_resources.limits),
        ("requests", &values.max_resources.requests),
    ] {
        for (key, value) in quantity.iter().flat_map(|q| q.entries()) {
            hard.insert(format!("{section}.{key}"), value.to_string());
        }
    }

    Some(ResourceQuota::new(
        metadata(
            values,
            &values.names.workspace_name,
            &values.annotations.workspace_owned,
        ),
        hard,
    ))
}

fn scripts_configmap(values: &ConfigValues, files: &BTreeMap<String, String>) -> ConfigMap {
    ConfigMap::new(metadata(
        values,
        &values.names.scripts_configmap,
        &values.annotations.workspace_owned_partial,
    ))
    .with_data(files.clone())
}

/// File variables plus the reconciled actual state, when known
fn file_secret_data(values: &ConfigValues) -> BTreeMap<String, String> {
    let mut data = values.file_variables.clone();
    if let Some(state) = &values.actual_state {
        data.insert(RECONCILED_ACTUAL_STATE_FILE.to_string(), state.clone());
    }
    data
}

fn variables_secret(
    values: &ConfigValues,
    name: &str,
    variables: &BTreeMap<String, String>,
) -> Secret {
    let mut secret = Secret::new(metadata(values, name, &values.annotations.secrets_owned));
    secret.data = variables
        .iter()
        .map(|(key, value)| (key.clone(), STANDARD.encode(value)))
        .collect();
    secret
}
