//! Devfile command graph
//!
//! Only the parts of a processed devfile the script synthesis needs are read:
//! component names, the command table and the `preStart`/`postStart` event
//! lists. Everything else is the translator's business.

use serde::Deserialize;
use serde_json::Value;
use workspaces_common::yaml::parse_yaml;

use crate::error::Error;

/// Label marking commands that must finish before the workspace is usable
pub const INTERNAL_BLOCKING_COMMAND_LABEL: &str = "gl-internal-blocking";

/// Commands and lifecycle events of a processed devfile
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DevfileCommandGraph {
    components: Vec<String>,
    commands: Vec<DevfileCommand>,
    pre_start: Vec<String>,
    post_start: Vec<String>,
}

/// A devfile command
#[derive(Clone, Debug, PartialEq)]
pub struct DevfileCommand {
    /// Command id, unique within the devfile
    pub id: String,
    /// What the command does
    pub action: CommandAction,
}

/// Supported command types
#[derive(Clone, Debug, PartialEq)]
pub enum CommandAction {
    /// Run a command line in a component container
    Exec(ExecCommand),
    /// Apply a component, e.g. run it as an init container
    Apply {
        /// Component being applied
        component: String,
    },
    /// Composite and other command types
    Other,
}

/// An `exec` command
#[derive(Clone, Debug, PartialEq)]
pub struct ExecCommand {
    /// Shell command line
    pub command_line: String,
    /// Component the command runs in
    pub component: String,
    /// Optional label, used to mark internal blocking commands
    pub label: Option<String>,
}

impl DevfileCommand {
    /// The exec details, if this is an exec command
    pub fn exec(&self) -> Option<&ExecCommand> {
        match &self.action {
            CommandAction::Exec(exec) => Some(exec),
            _ => None,
        }
    }

    /// True for exec commands labelled as internal blocking
    pub fn is_internal_blocking(&self) -> bool {
        self.exec()
            .and_then(|exec| exec.label.as_deref())
            .is_some_and(|label| label == INTERNAL_BLOCKING_COMMAND_LABEL)
    }
}

impl DevfileCommandGraph {
    /// Parse a processed devfile document. Empty text yields an empty graph.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value = parse_yaml(text).map_err(|e| Error::invalid_devfile(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build the graph from an already parsed devfile
    pub fn from_value(value: Value) -> Result<Self, Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let raw: RawDevfile =
            serde_json::from_value(value).map_err(|e| Error::invalid_devfile(e.to_string()))?;
        let events = raw.events.unwrap_or_default();

        Ok(Self {
            components: raw
                .components
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.name)
                .collect(),
            commands: raw
                .commands
                .unwrap_or_default()
                .into_iter()
                .map(RawCommand::into_command)
                .collect(),
            pre_start: events.pre_start.unwrap_or_default(),
            post_start: events.post_start.unwrap_or_default(),
        })
    }

    /// Look up a command by id
    pub fn command(&self, id: &str) -> Result<&DevfileCommand, Error> {
        self.commands
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::CommandNotFound {
                command_id: id.to_string(),
            })
    }

    /// True when a component with this name exists
    pub fn has_component(&self, name: &str) -> bool {
        self.components.iter().any(|c| c == name)
    }

    /// Ids listed under `events.postStart`, in devfile order
    pub fn post_start_ids(&self) -> &[String] {
        &self.post_start
    }

    /// Resolve the `postStart` event list, in devfile order
    pub fn post_start_commands(&self) -> Result<Vec<&DevfileCommand>, Error> {
        self.post_start.iter().map(|id| self.command(id)).collect()
    }

    /// Check every `preStart` reference resolves, including the component
    /// behind each `apply` command
    pub fn validate_pre_start(&self) -> Result<(), Error> {
        for id in &self.pre_start {
            let command = self.command(id)?;
            if let CommandAction::Apply { component } = &command.action {
                if !self.has_component(component) {
                    return Err(Error::ComponentNotFound {
                        command_id: command.id.clone(),
                        component: component.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Raw devfile shape
// =============================================================================

#[derive(Deserialize)]
struct RawDevfile {
    #[serde(default)]
    components: Option<Vec<RawComponent>>,
    #[serde(default)]
    commands: Option<Vec<RawCommand>>,
    #[serde(default)]
    events: Option<RawEvents>,
}

#[derive(Deserialize)]
struct RawComponent {
    name: String,
}

#[derive(Deserialize)]
struct RawCommand {
    id: String,
    #[serde(default)]
    exec: Option<RawExec>,
    #[serde(default)]
    apply: Option<RawApply>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExec {
    #[serde(default)]
    command_line: String,
    #[serde(default)]
    component: String,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Deserialize)]
struct RawApply {
    component: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvents {
    #[serde(default)]
    pre_start: Option<Vec<String>>,
    #[serde(default)]
    post_start: Option<Vec<String>>,
}

impl RawCommand {
    fn into_command(self) -> DevfileCommand {
        let action = match (self.exec, self.apply) {
            (Some(exec), _) => CommandAction::Exec(ExecCommand {
                command_line: exec.command_line,
                component: exec.component,
                label: exec.label,
            }),
            (None, Some(apply)) => CommandAction::Apply {
                component: apply.component,
            },
            (None, None) => CommandAction::Other,
        };
        DevfileCommand {
            id: self.id,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVFILE: &str = r#"
schemaVersion: 2.2.0
components:
  - name: tooling-container
    attributes:
      gl/inject-editor: true
    container:
      image: registry.example/tooling:1
  - name: gl-project-cloner
    container:
      image: alpine/git:2.45.2
commands:
  - id: gl-start-sshd-command
    exec:
      commandLine: /workspace-scripts/start-sshd.sh
      component: tooling-container
      label: gl-internal-blocking
  - id: user-defined-command
    exec:
      commandLine: echo 'hello'
      component: tooling-container
  - id: gl-project-cloner-command
    apply:
      component: gl-project-cloner
events:
  preStart:
    - gl-project-cloner-command
  postStart:
    - gl-start-sshd-command
    - user-defined-command
"#;

    #[test]
    fn test_parse_commands_and_events() {
        let graph = DevfileCommandGraph::parse(DEVFILE).unwrap();

        assert!(graph.has_component("tooling-container"));
        assert_eq!(
            graph.post_start_ids(),
            ["gl-start-sshd-command", "user-defined-command"]
        );

        let commands = graph.post_start_commands().unwrap();
        assert!(commands[0].is_internal_blocking());
        assert!(!commands[1].is_internal_blocking());
        assert_eq!(commands[1].exec().unwrap().command_line, "echo 'hello'");

        assert_eq!(
            graph.command("gl-project-cloner-command").unwrap().action,
            CommandAction::Apply {
                component: "gl-project-cloner".to_string()
            }
        );
        graph.validate_pre_start().unwrap();
    }

    #[test]
    fn test_empty_devfile_has_no_events() {
        let graph = DevfileCommandGraph::parse("").unwrap();
        assert!(graph.post_start_ids().is_empty());
        assert!(graph.post_start_commands().unwrap().is_empty());

        let graph = DevfileCommandGraph::parse("schemaVersion: 2.2.0\nevents: null\n").unwrap();
        assert!(graph.post_start_ids().is_empty());
    }

    #[test]
    fn test_missing_post_start_command() {
        let graph = DevfileCommandGraph::parse(
            "commands: []\nevents:\n  postStart: [does-not-exist]\n",
        )
        .unwrap();
        assert_eq!(
            graph.post_start_commands().unwrap_err(),
            Error::CommandNotFound {
                command_id: "does-not-exist".to_string()
            }
        );
    }

    #[test]
    fn test_apply_command_with_unknown_component() {
        let graph = DevfileCommandGraph::parse(
            r#"
components: [{name: tooling}]
commands:
  - id: clone
    apply: {component: cloner}
events:
  preStart: [clone]
"#,
        )
        .unwrap();
        assert_eq!(
            graph.validate_pre_start().unwrap_err(),
            Error::ComponentNotFound {
                command_id: "clone".to_string(),
                component: "cloner".to_string()
            }
        );
    }

    #[test]
    fn test_pre_start_reference_must_exist() {
        let graph =
            DevfileCommandGraph::parse("events:\n  preStart: [missing]\n").unwrap();
        assert!(matches!(
            graph.validate_pre_start(),
            Err(Error::CommandNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_devfile() {
        assert!(matches!(
            DevfileCommandGraph::parse("commands: [{exec: {}}]"),
            Err(Error::InvalidDevfile { .. })
        ));
        assert!(matches!(
            DevfileCommandGraph::parse("commands: [unclosed"),
            Err(Error::InvalidDevfile { .. })
        ));
    }
}
