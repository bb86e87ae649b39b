//! Scripts volume wiring
//!
//! Mounts the scripts ConfigMap into every container and init container as
//! a read-and-execute projected volume. Safe to apply more than once.

use super::poststart::{PostStart, SCRIPTS_MOUNT_PATH};
use super::CompilerStage;
use crate::context::DesiredConfigContext;
use crate::error::{Error, Stage};
use crate::k8s::{PodSpec, Volume, VolumeMount, VolumeProjection};
use crate::manifest::{Manifest, KIND_DEPLOYMENT};

/// Name of the projected scripts volume
pub const SCRIPTS_VOLUME_NAME: &str = "gl-workspace-scripts";

/// Mode of projected script files (r-xr-xr-x)
pub const SCRIPTS_VOLUME_MODE: i32 = 0o555;

/// Adds the scripts volume when postStart scripts exist
pub(crate) struct ScriptsVolumeInjector;

impl CompilerStage for ScriptsVolumeInjector {
    fn stage(&self) -> Stage {
        Stage::ScriptsVolume
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        if let PostStart::Skipped = ctx.post_start()? {
            return Ok(());
        }
        let configmap = ctx.values()?.names.scripts_configmap.clone();
        inject_scripts_volume(ctx.resources_mut()?, &configmap)
    }
}

/// Add the scripts volume to every Deployment in `resources`
pub fn inject_scripts_volume(resources: &mut [Manifest], configmap: &str) -> Result<(), Error> {
    for resource in resources
        .iter_mut()
        .filter(|r| r.is_kind(KIND_DEPLOYMENT))
    {
        resource.update_pod_spec(|spec| {
            add_scripts_volume(spec, configmap);
            Ok(())
        })?;
    }
    Ok(())
}

/// Add the scripts volume and mounts to a pod spec, skipping entries that
/// already exist
pub fn add_scripts_volume(spec: &mut PodSpec, configmap: &str) {
    spec.ensure_volume(Volume::projected(
        SCRIPTS_VOLUME_NAME,
        SCRIPTS_VOLUME_MODE,
        VolumeProjection::config_map(configmap),
    ));
    for container in spec.all_containers_mut() {
        container.ensure_volume_mount(
            VolumeMount::new(SCRIPTS_VOLUME_NAME, SCRIPTS_MOUNT_PATH).read_only(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::Container;
    use serde_json::json;

    fn pod_spec() -> PodSpec {
        serde_json::from_value(json!({
            "containers": [
                {"name": "tooling", "volumeMounts": [{"name": "gl-workspace-data", "mountPath": "/projects"}]},
                {"name": "database"}
            ],
            "initContainers": [{"name": "clone"}],
            "volumes": [{"name": "gl-workspace-data", "emptyDir": {}}]
        }))
        .unwrap()
    }

    fn mount_count(container: &Container) -> usize {
        container
            .volume_mounts
            .iter()
            .flatten()
            .filter(|m| m.name == SCRIPTS_VOLUME_NAME)
            .count()
    }

    #[test]
    fn test_adds_volume_and_mounts_everywhere() {
        let mut spec = pod_spec();
        add_scripts_volume(&mut spec, "ws-scripts-configmap");

        let volumes = spec.volumes.clone().unwrap();
        assert_eq!(
            serde_json::to_value(&volumes[1]).unwrap(),
            json!({
                "name": "gl-workspace-scripts",
                "projected": {"defaultMode": 365, "sources": [{"configMap": {"name": "ws-scripts-configmap"}}]}
            })
        );

        for container in spec.all_containers_mut() {
            assert_eq!(mount_count(container), 1);
            let mount = container
                .volume_mounts
                .iter()
                .flatten()
                .find(|m| m.name == SCRIPTS_VOLUME_NAME)
                .unwrap();
            assert_eq!(mount.mount_path, "/workspace-scripts");
            assert_eq!(mount.read_only, Some(true));
        }
    }

    #[test]
    fn test_injecting_twice_does_not_duplicate() {
        let mut spec = pod_spec();
        add_scripts_volume(&mut spec, "ws-scripts-configmap");
        let once = spec.clone();
        add_scripts_volume(&mut spec, "ws-scripts-configmap");

        assert_eq!(spec, once);
        assert_eq!(spec.volumes.as_ref().unwrap().len(), 2);
        for container in spec.all_containers_mut() {
            assert_eq!(mount_count(container), 1);
        }
    }

    #[test]
    fn test_only_deployments_are_touched() {
        let service = Manifest::from_value(json!({"kind": "Service", "metadata": {"name": "ws"}}))
            .unwrap();
        let mut resources = vec![service.clone()];
        inject_scripts_volume(&mut resources, "cm").unwrap();
        assert_eq!(resources, vec![service]);
    }
}
