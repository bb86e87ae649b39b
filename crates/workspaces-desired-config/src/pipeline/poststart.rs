//! postStart script synthesis and hook injection
//!
//! The devfile's `postStart` commands become shell scripts in the scripts
//! ConfigMap. A single lifecycle hook on the tooling container (the first
//! container) runs them with output captured under
//! `${GL_WORKSPACE_LOGS_DIR}`. Failing commands never stop the sequence.
//!
//! Devfiles that label commands `gl-internal-blocking` get two runner
//! scripts: blocking commands run synchronously inside the hook, the rest
//! run detached afterwards. Devfiles without the label get one runner.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::debug;

use super::CompilerStage;
use crate::context::DesiredConfigContext;
use crate::devfile::{DevfileCommand, DevfileCommandGraph};
use crate::error::{Error, Stage};
use crate::k8s::{Lifecycle, LifecycleHandler};
use crate::manifest::{Manifest, KIND_DEPLOYMENT};

/// Directory the scripts ConfigMap is mounted at
pub const SCRIPTS_MOUNT_PATH: &str = "/workspace-scripts";

/// Runner for internal blocking commands
pub const RUN_INTERNAL_BLOCKING_SCRIPT: &str = "gl-run-internal-blocking-poststart-commands.sh";

/// Runner for the remaining commands, launched in the background
pub const RUN_NON_BLOCKING_SCRIPT: &str = "gl-run-non-blocking-poststart-commands.sh";

/// Single runner used when no command is labelled blocking
pub const RUN_LEGACY_SCRIPT: &str = "gl-run-poststart-commands.sh";

const HOOK_SCRIPT: &str = include_str!("../../templates/poststart-hook.sh");
const LEGACY_HOOK_SCRIPT: &str = include_str!("../../templates/poststart-hook-legacy.sh");

/// Outcome of postStart synthesis
#[derive(Clone, Debug, PartialEq)]
pub enum PostStart {
    /// The devfile declares no postStart commands
    Skipped,
    /// Scripts to ship and the hook that runs them
    Scripts(PostStartScripts),
}

/// Which runner layout was generated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptShape {
    /// Separate blocking and non-blocking runners
    Modern,
    /// One runner for every command
    Legacy,
}

/// Synthesized postStart scripts
#[derive(Clone, Debug, PartialEq)]
pub struct PostStartScripts {
    /// Runner layout
    pub shape: ScriptShape,
    /// ConfigMap entries: runner scripts and one entry per command id
    pub files: BTreeMap<String, String>,
    /// Body of the lifecycle hook
    pub hook: String,
}

impl PostStartScripts {
    /// Command for `lifecycle.postStart.exec.command`
    pub fn hook_command(&self) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), self.hook.clone()]
    }
}

/// Builds postStart scripts and wires the hook into the tooling container
pub(crate) struct PostStartScriptSynthesizer;

impl CompilerStage for PostStartScriptSynthesizer {
    fn stage(&self) -> Stage {
        Stage::PostStart
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        let graph = DevfileCommandGraph::parse(&ctx.input().devfile)?;
        graph.validate_pre_start()?;

        let post_start = synthesize_post_start(&graph)?;
        if let PostStart::Scripts(scripts) = &post_start {
            debug!(
                shape = ?scripts.shape,
                commands = graph.post_start_ids().len(),
                "synthesized postStart scripts"
            );
            inject_post_start_hook(ctx.resources_mut()?, scripts)?;
        }
        ctx.set_post_start(post_start)
    }
}

/// Generate runner scripts for the devfile's `postStart` event
pub fn synthesize_post_start(graph: &DevfileCommandGraph) -> Result<PostStart, Error> {
    let commands = graph.post_start_commands()?;
    if commands.is_empty() {
        return Ok(PostStart::Skipped);
    }

    let mut files = BTreeMap::new();
    for command in &commands {
        let exec = command.exec().ok_or_else(|| Error::InvalidCommand {
            command_id: command.id.clone(),
            message: "postStart commands must be exec commands".to_string(),
        })?;
        files.insert(command.id.clone(), exec.command_line.clone());
    }

    let (shape, hook) = if commands.iter().any(|c| c.is_internal_blocking()) {
        let (blocking, non_blocking): (Vec<_>, Vec<_>) =
            commands.iter().copied().partition(|c| c.is_internal_blocking());
        files.insert(RUN_INTERNAL_BLOCKING_SCRIPT.to_string(), runner_script(&blocking));
        files.insert(RUN_NON_BLOCKING_SCRIPT.to_string(), runner_script(&non_blocking));
        (ScriptShape::Modern, HOOK_SCRIPT)
    } else {
        files.insert(RUN_LEGACY_SCRIPT.to_string(), runner_script(&commands));
        (ScriptShape::Legacy, LEGACY_HOOK_SCRIPT)
    };

    Ok(PostStart::Scripts(PostStartScripts {
        shape,
        files,
        hook: hook.to_string(),
    }))
}

/// Runner script executing each command in order, ignoring failures
pub fn runner_script(commands: &[&DevfileCommand]) -> String {
    let mut script = String::from("#!/bin/sh\n");
    for command in commands {
        let path = format!("{}/{}", SCRIPTS_MOUNT_PATH, command.id);
        let _ = write!(
            script,
            "echo \"$(date -Iseconds): ----------------------------------------\"\n\
             echo \"$(date -Iseconds): Running {path}...\"\n\
             {path} || true\n\
             echo \"$(date -Iseconds): Finished running {path}.\"\n"
        );
    }
    script
}

/// Set the postStart hook on the first container of each Deployment
pub fn inject_post_start_hook(
    resources: &mut [Manifest],
    scripts: &PostStartScripts,
) -> Result<(), Error> {
    for resource in resources
        .iter_mut()
        .filter(|r| r.is_kind(KIND_DEPLOYMENT))
    {
        let name = resource.name().unwrap_or_default().to_string();
        resource.update_pod_spec(|spec| {
            let tooling = spec.containers.first_mut().ok_or_else(|| {
                Error::invalid_resource(format!("{} '{}' has no containers", KIND_DEPLOYMENT, name))
            })?;
            tooling
                .lifecycle
                .get_or_insert_with(Lifecycle::default)
                .post_start = Some(LifecycleHandler::exec(scripts.hook_command()));
            Ok(())
        })?;
    }
    Ok(())
}
