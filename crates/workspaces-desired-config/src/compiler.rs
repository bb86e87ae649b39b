//! DesiredConfigCompiler: orchestrates the full compilation pipeline
//!
//! This is the single entry point for turning a workspace, its agent policy
//! and its processed devfile into the ordered resource list the reconciler
//! applies.
//!
//! ```rust,ignore
//! let translator = CommandTranslator::new("/usr/local/bin/devfile-translator");
//! let compiled = DesiredConfigCompiler::new(&input, &translator).compile()?;
//! ```

use tracing::{debug, info, warn};

use crate::compiled::CompiledResult;
use crate::context::DesiredConfigContext;
use crate::error::{CompileError, Stage};
use crate::input::{CompileInput, DesiredState};
use crate::pipeline::auxiliary::AuxiliaryResourceSynthesizer;
use crate::pipeline::harden::ResourceHardener;
use crate::pipeline::parse::ManifestDocumentParser;
use crate::pipeline::poststart::PostStartScriptSynthesizer;
use crate::pipeline::scripts_volume::ScriptsVolumeInjector;
use crate::pipeline::translate::BaseManifestTranslator;
use crate::pipeline::values::ConfigValueDeriver;
use crate::pipeline::CompilerStage;
use crate::translator::ManifestTranslator;

/// Compiles one workspace into its desired configuration.
///
/// Stages run in a fixed order over a single context. The first failing
/// stage stops compilation and its error is returned together with the
/// stage name. Terminated workspaces skip straight from value derivation to
/// the inventories.
pub struct DesiredConfigCompiler<'a> {
    input: &'a CompileInput,
    translator: &'a dyn ManifestTranslator,
}

impl<'a> DesiredConfigCompiler<'a> {
    /// Create a compiler for the given input and translator
    pub fn new(input: &'a CompileInput, translator: &'a dyn ManifestTranslator) -> Self {
        Self { input, translator }
    }

    /// Run every stage and return the validated resource list
    pub fn compile(self) -> Result<CompiledResult, CompileError> {
        let workspace = &self.input.workspace;
        let mut ctx = DesiredConfigContext::new(self.input);

        for stage in self.stages() {
            debug!(
                workspace = %workspace.name,
                stage = %stage.stage(),
                "running compiler stage"
            );
            stage.run(&mut ctx).map_err(|cause| {
                warn!(
                    workspace = %workspace.name,
                    stage = %stage.stage(),
                    error = %cause,
                    "compiler stage failed"
                );
                CompileError::new(stage.stage(), cause)
            })?;
        }

        let last = Stage::AuxiliaryResources;
        let resources = ctx
            .into_resources()
            .map_err(|cause| CompileError::new(last, cause))?;
        let compiled =
            CompiledResult::new(resources).map_err(|cause| CompileError::new(last, cause))?;

        info!(
            workspace = %workspace.name,
            resources = compiled.len(),
            "compiled desired configuration"
        );
        Ok(compiled)
    }

    fn stages(&self) -> Vec<Box<dyn CompilerStage + 'a>> {
        if self.input.workspace.desired_state == DesiredState::Terminated {
            return vec![
                Box::new(ConfigValueDeriver),
                Box::new(AuxiliaryResourceSynthesizer),
            ];
        }
        vec![
            Box::new(ConfigValueDeriver),
            Box::new(BaseManifestTranslator::new(self.translator)),
            Box::new(ManifestDocumentParser),
            Box::new(ResourceHardener),
            Box::new(PostStartScriptSynthesizer),
            Box::new(ScriptsVolumeInjector),
            Box::new(AuxiliaryResourceSynthesizer),
        ]
    }
}
