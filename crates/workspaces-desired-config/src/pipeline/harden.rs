//! Deployment hardening
//!
//! Only `Deployment` resources are touched. Their pod template gets the
//! fixed security contexts, container resource defaults, the workspace
//! variable secrets, and the workspace ServiceAccount.

use std::collections::BTreeMap;

use serde_json::Value;

use super::CompilerStage;
use crate::context::{ConfigValues, DesiredConfigContext};
use crate::error::{Error, Stage};
use crate::k8s::{
    Container, EnvFromSource, PodSecurityContext, PodSpec, ResourceRequirements, SecurityContext,
    Volume, VolumeMount, VolumeProjection,
};
use crate::manifest::{Manifest, KIND_DEPLOYMENT};
use crate::resources::{ResourceLimitSpec, ResourceQuantity};

/// UID every workspace container runs as
pub const RUN_AS_USER: i64 = 5001;

/// Volume holding file-type workspace variables
pub const VARIABLES_VOLUME_NAME: &str = "gl-workspace-variables";

/// Where file-type variables appear inside containers
pub const VARIABLES_MOUNT_PATH: &str = "/.workspace-data/variables/file";

/// Mode of projected variable files (rwxrwxr--)
pub const VARIABLES_VOLUME_MODE: i32 = 0o774;

/// Applies security and resource policy to the Deployment
pub(crate) struct ResourceHardener;

impl CompilerStage for ResourceHardener {
    fn stage(&self) -> Stage {
        Stage::Harden
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        let values = ctx.values()?.clone();
        harden_resources(ctx.resources_mut()?, &values)
    }
}

/// Harden every Deployment in `resources`; other kinds are left unchanged
pub fn harden_resources(resources: &mut [Manifest], values: &ConfigValues) -> Result<(), Error> {
    for resource in resources
        .iter_mut()
        .filter(|r| r.is_kind(KIND_DEPLOYMENT))
    {
        resource.update_pod_spec(|spec| {
            harden_pod_spec(spec, values);
            Ok(())
        })?;
    }
    Ok(())
}

/// Apply pod and container policy to a single pod spec
pub fn harden_pod_spec(spec: &mut PodSpec, values: &ConfigValues) {
    if values.use_kubernetes_user_namespaces {
        spec.host_users = Some(true);
    }
    if !values.runtime_class.is_empty() {
        spec.runtime_class_name = Some(values.runtime_class.clone());
    }
    spec.security_context = Some(PodSecurityContext {
        run_as_non_root: true,
        run_as_user: RUN_AS_USER,
        fs_group: 0,
        fs_group_change_policy: "OnRootMismatch".to_string(),
    });
    spec.service_account_name = Some(values.names.workspace_name.clone());

    for container in spec.all_containers_mut() {
        harden_container(container, values);
    }

    spec.ensure_volume(Volume::projected(
        VARIABLES_VOLUME_NAME,
        VARIABLES_VOLUME_MODE,
        VolumeProjection::secret(&values.names.file_secret),
    ));
}

fn harden_container(container: &mut Container, values: &ConfigValues) {
    container.security_context = Some(SecurityContext {
        allow_privilege_escalation: values.allow_privilege_escalation,
        privileged: false,
        run_as_non_root: true,
        run_as_user: RUN_AS_USER,
    });
    container.resources = merge_resources(container.resources.take(), &values.default_resources);
    container.ensure_volume_mount(VolumeMount::new(VARIABLES_VOLUME_NAME, VARIABLES_MOUNT_PATH));
    container.ensure_env_from(EnvFromSource::secret(&values.names.env_secret));
}

/// Deep-merge `defaults` underneath a container's declared resources.
///
/// Declared leaves win. Leaves that are absent or null are filled from the
/// defaults. Resource names other than cpu and memory are left untouched.
pub fn merge_resources(
    declared: Option<ResourceRequirements>,
    defaults: &ResourceLimitSpec,
) -> Option<ResourceRequirements> {
    if defaults.is_empty() {
        return declared;
    }

    let mut merged = declared.unwrap_or_default();
    fill_defaults(&mut merged.limits, defaults.limits.as_ref());
    fill_defaults(&mut merged.requests, defaults.requests.as_ref());
    Some(merged)
}

fn fill_defaults(section: &mut Option<BTreeMap<String, Value>>, defaults: Option<&ResourceQuantity>) {
    let Some(defaults) = defaults.filter(|d| !d.is_empty()) else {
        return;
    };
    let section = section.get_or_insert_with(BTreeMap::new);
    for (key, value) in defaults.entries() {
        let slot = section.entry(key.to_string()).or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::String(value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{AgentPolicy, CompileInput, DesiredState, WorkspaceIdentity};
    use crate::pipeline::values::derive_config_values;
    use serde_json::json;

    fn values_with(configure: impl FnOnce(&mut AgentPolicy)) -> ConfigValues {
        let mut agent = AgentPolicy::new(1, "example.dev");
        agent.default_resources_per_workspace_container = ResourceLimitSpec::new(
            ResourceQuantity::new("1", "1Gi"),
            ResourceQuantity::new("0.5", "512Mi"),
        );
        configure(&mut agent);
        derive_config_values(&CompileInput {
            workspace: WorkspaceIdentity {
                id: 7,
                name: "ws".to_string(),
                namespace: "ns".to_string(),
                desired_state: DesiredState::Running,
                actual_state: None,
            },
            agent,
            variables: Vec::new(),
            devfile: String::new(),
        })
    }

    fn deployment() -> Manifest {
        Manifest::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "ws", "namespace": "ns"},
            "spec": {
                "replicas": 1,
                "template": {
                    "metadata": {"name": "ws"},
                    "spec": {
                        "containers": [
                            {
                                "name": "tooling",
                                "image": "tooling:1",
                                "resources": {"limits": {"cpu": "2"}, "requests": {"memory": "2Gi"}},
                                "volumeMounts": [{"name": "gl-workspace-data", "mountPath": "/projects"}]
                            },
                            {"name": "database", "image": "postgres:16"}
                        ],
                        "initContainers": [{"name": "clone", "image": "git:1"}],
                        "volumes": [{"name": "gl-workspace-data", "persistentVolumeClaim": {"claimName": "ws-gl-workspace-data"}}]
                    }
                }
            }
        }))
        .unwrap()
    }

    fn service() -> Manifest {
        Manifest::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "ws", "namespace": "ns"},
            "spec": {"ports": [{"port": 60001}], "selector": {"app": "ws"}}
        }))
        .unwrap()
    }

    fn hardened(values: &ConfigValues) -> PodSpec {
        let mut resources = vec![deployment()];
        harden_resources(&mut resources, values).unwrap();
        resources[0].pod_spec().unwrap().unwrap()
    }

    #[test]
    fn test_non_deployments_are_unchanged() {
        let values = values_with(|_| {});
        let pvc = Manifest::from_value(json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "ws-gl-workspace-data"},
            "spec": {"template": {"spec": {"containers": []}}}
        }))
        .unwrap();
        let original = vec![service(), pvc];

        let mut resources = original.clone();
        harden_resources(&mut resources, &values).unwrap();
        assert_eq!(resources, original);
    }

    #[test]
    fn test_no_deployment_is_a_no_op() {
        let mut resources: Vec<Manifest> = Vec::new();
        harden_resources(&mut resources, &values_with(|_| {})).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_pod_security_context_and_service_account() {
        let spec = hardened(&values_with(|_| {}));
        assert_eq!(
            serde_json::to_value(spec.security_context).unwrap(),
            json!({"runAsNonRoot": true, "runAsUser": 5001, "fsGroup": 0, "fsGroupChangePolicy": "OnRootMismatch"})
        );
        assert_eq!(spec.service_account_name.as_deref(), Some("ws"));
        assert_eq!(spec.host_users, None);
        assert_eq!(spec.runtime_class_name, None);
    }

    #[test]
    fn test_user_namespaces_and_runtime_class() {
        let spec = hardened(&values_with(|agent| {
            agent.use_kubernetes_user_namespaces = true;
            agent.default_runtime_class = "gvisor".to_string();
        }));
        assert_eq!(spec.host_users, Some(true));
        assert_eq!(spec.runtime_class_name.as_deref(), Some("gvisor"));
    }

    #[test]
    fn test_container_security_context_honors_privilege_escalation() {
        let mut spec = hardened(&values_with(|agent| agent.allow_privilege_escalation = true));
        for container in spec.all_containers_mut() {
            assert_eq!(
                container.security_context,
                Some(SecurityContext {
                    allow_privilege_escalation: true,
                    privileged: false,
                    run_as_non_root: true,
                    run_as_user: RUN_AS_USER,
                })
            );
        }
    }

    #[test]
    fn test_resources_merge_defaults_under_declared_values() {
        let mut spec = hardened(&values_with(|_| {}));

        let tooling = serde_json::to_value(&spec.containers[0].resources).unwrap();
        assert_eq!(
            tooling,
            json!({
                "limits": {"cpu": "2", "memory": "1Gi"},
                "requests": {"cpu": "0.5", "memory": "2Gi"}
            })
        );

        let defaults = json!({
            "limits": {"cpu": "1", "memory": "1Gi"},
            "requests": {"cpu": "0.5", "memory": "512Mi"}
        });
        for container in spec.all_containers_mut().skip(1) {
            assert_eq!(serde_json::to_value(&container.resources).unwrap(), defaults);
        }
    }

    #[test]
    fn test_merge_keeps_other_resource_names_and_fills_nulls() {
        let declared: ResourceRequirements = serde_json::from_value(json!({
            "limits": {"nvidia.com/gpu": 1, "memory": null}
        }))
        .unwrap();
        let defaults = ResourceLimitSpec {
            limits: Some(ResourceQuantity::new("1", "1Gi")),
            requests: None,
        };

        let merged = merge_resources(Some(declared), &defaults).unwrap();
        assert_eq!(
            serde_json::to_value(merged).unwrap(),
            json!({"limits": {"cpu": "1", "memory": "1Gi", "nvidia.com/gpu": 1}})
        );
    }

    #[test]
    fn test_merge_without_defaults_keeps_declared() {
        assert_eq!(merge_resources(None, &ResourceLimitSpec::default()), None);
    }

    #[test]
    fn test_every_container_gets_variables_mount_and_env_secret() {
        let mut spec = hardened(&values_with(|_| {}));

        for container in spec.all_containers_mut() {
            let mounts = container.volume_mounts.as_ref().unwrap();
            assert!(mounts
                .iter()
                .any(|m| m.name == VARIABLES_VOLUME_NAME && m.mount_path == VARIABLES_MOUNT_PATH));
            assert_eq!(
                container.env_from.as_ref().unwrap(),
                &vec![EnvFromSource::secret("ws-env-var")]
            );
        }

        let volumes = spec.volumes.unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            serde_json::to_value(&volumes[1]).unwrap(),
            json!({
                "name": "gl-workspace-variables",
                "projected": {"defaultMode": 508, "sources": [{"secret": {"name": "ws-file"}}]}
            })
        );
    }

    #[test]
    fn test_hardening_twice_does_not_duplicate_entries() {
        let values = values_with(|_| {});
        let mut resources = vec![deployment()];
        harden_resources(&mut resources, &values).unwrap();
        let once = resources.clone();
        harden_resources(&mut resources, &values).unwrap();
        assert_eq!(resources, once);
    }

    #[test]
    fn test_translator_fields_survive() {
        let spec = hardened(&values_with(|_| {}));
        assert_eq!(spec.containers[0].extra["image"], "tooling:1");
        assert_eq!(spec.containers[0].volume_mounts.as_ref().unwrap()[0].name, "gl-workspace-data");
    }

    #[test]
    fn test_partial_security_contexts_are_replaced() {
        let mut deployment = deployment().into_value();
        let pod = &mut deployment["spec"]["template"]["spec"];
        pod["securityContext"] = json!({"fsGroup": 1000});
        pod["containers"][0]["securityContext"] = json!({"runAsUser": 1000});
        pod["initContainers"][0]["securityContext"] = json!({"privileged": true});
        let mut resources = vec![Manifest::from_value(deployment).unwrap()];

        harden_resources(&mut resources, &values_with(|_| {})).unwrap();

        let hardened = &resources[0].as_value()["spec"]["template"]["spec"];
        assert_eq!(
            hardened["securityContext"],
            json!({"runAsNonRoot": true, "runAsUser": 5001, "fsGroup": 0, "fsGroupChangePolicy": "OnRootMismatch"})
        );
        let expected = json!({
            "allowPrivilegeEscalation": false,
            "privileged": false,
            "runAsNonRoot": true,
            "runAsUser": 5001
        });
        assert_eq!(hardened["containers"][0]["securityContext"], expected);
        assert_eq!(hardened["initContainers"][0]["securityContext"], expected);
    }
}
