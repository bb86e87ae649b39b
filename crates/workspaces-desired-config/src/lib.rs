//! Desired-configuration compiler for remote development workspaces
//!
//! Turns a workspace record, its cluster agent's policy and the workspace's
//! processed devfile into the ordered list of Kubernetes resources the
//! in-cluster reconciler applies. The translation of devfile components into
//! a base Deployment, Service and PVCs is delegated to an external
//! [`ManifestTranslator`]; everything around it is computed here.
//!
//! # Usage
//!
//! ```rust,ignore
//! let translator = CommandTranslator::new("/usr/local/bin/devfile-translator");
//! let compiled = DesiredConfigCompiler::new(&input, &translator).compile()?;
//! print!("{}", compiled.to_yaml()?);
//! ```

mod compiled;
mod compiler;
pub mod context;
pub mod devfile;
pub mod error;
pub mod input;
pub mod k8s;
pub mod manifest;
pub mod pipeline;
pub mod resources;
pub mod translator;

pub use compiled::CompiledResult;
pub use compiler::DesiredConfigCompiler;
pub use error::{CompileError, Error, Stage};
pub use input::{
    AgentPolicy, CompileInput, DesiredState, ImagePullSecret, VariableType, WorkspaceIdentity,
    WorkspaceVariable,
};
pub use manifest::Manifest;
pub use resources::{ResourceLimitSpec, ResourceQuantity};
pub use translator::{CommandTranslator, ManifestTranslator, TranslationRequest};
