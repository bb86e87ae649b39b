//! Desired-configuration compilation errors
//!
//! `Error` is the cause of a failure; `CompileError` pairs it with the
//! pipeline stage that produced it so callers always know where compilation
//! stopped.

use std::fmt;

use thiserror::Error;

/// Pipeline stages, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Names, labels, annotations and the resource hash
    ConfigValues,
    /// External devfile-to-manifest translation
    Translate,
    /// Splitting translator output into resources
    ParseManifests,
    /// Security contexts, resource defaults and secret wiring
    Harden,
    /// postStart script synthesis and hook injection
    PostStart,
    /// Scripts volume and mounts
    ScriptsVolume,
    /// Inventories, ServiceAccount, NetworkPolicy, quota, secrets
    AuxiliaryResources,
}

impl Stage {
    /// Stable name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigValues => "config-values",
            Self::Translate => "translate",
            Self::ParseManifests => "parse-manifests",
            Self::Harden => "harden",
            Self::PostStart => "post-start",
            Self::ScriptsVolume => "scripts-volume",
            Self::AuxiliaryResources => "auxiliary-resources",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Causes of a failed compilation
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The base-manifest translator rejected the devfile or could not run
    #[error("translation failed for workspace {namespace}/{workspace}: {message}")]
    Translation {
        /// Workspace name
        workspace: String,
        /// Workspace namespace
        namespace: String,
        /// Underlying message
        message: String,
    },

    /// Translator output is not a valid manifest stream
    #[error("failed to parse manifests: {message}")]
    Parse {
        /// Underlying message
        message: String,
    },

    /// The processed devfile could not be read
    #[error("invalid devfile: {message}")]
    InvalidDevfile {
        /// Underlying message
        message: String,
    },

    /// An event references a command id missing from the command table
    #[error("command '{command_id}' referenced by an event is not defined")]
    CommandNotFound {
        /// The missing command id
        command_id: String,
    },

    /// A command references a component missing from the component table
    #[error("component '{component}' referenced by command '{command_id}' is not defined")]
    ComponentNotFound {
        /// Command holding the reference
        command_id: String,
        /// The missing component name
        component: String,
    },

    /// A command cannot be used where it is referenced
    #[error("command '{command_id}' is invalid: {message}")]
    InvalidCommand {
        /// Offending command id
        command_id: String,
        /// What is wrong with it
        message: String,
    },

    /// A stage ran without a value an earlier stage must have produced,
    /// or tried to produce a value twice
    #[error("pipeline contract violated: {field}")]
    ContractViolation {
        /// Context field involved
        field: String,
    },

    /// A resource does not have the shape the stage requires
    #[error("invalid resource: {message}")]
    InvalidResource {
        /// What is wrong with it
        message: String,
    },

    /// A typed resource could not be converted to or from its document form
    #[error("serialization error: {message}")]
    Serialization {
        /// Underlying message
        message: String,
    },
}

impl Error {
    /// Create a translation error for the given workspace
    pub fn translation(
        workspace: impl Into<String>,
        namespace: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Translation {
            workspace: workspace.into(),
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create an invalid devfile error
    pub fn invalid_devfile(message: impl Into<String>) -> Self {
        Self::InvalidDevfile {
            message: message.into(),
        }
    }

    /// Create a contract violation for the named context field
    pub fn contract_violation(field: impl Into<String>) -> Self {
        Self::ContractViolation {
            field: field.into(),
        }
    }

    /// Create an invalid resource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

/// A failed compilation: the stage that failed and why
#[derive(Debug, Error, PartialEq)]
#[error("stage {stage} failed: {cause}")]
pub struct CompileError {
    /// Stage that produced the failure
    pub stage: Stage,
    /// Underlying cause
    #[source]
    pub cause: Error,
}

impl CompileError {
    /// Wrap a cause with the stage it came from
    pub fn new(stage: Stage, cause: Error) -> Self {
        Self { stage, cause }
    }
}
