//! Invocation of the base-manifest translator

use tracing::{debug, error};

use super::CompilerStage;
use crate::context::{ConfigValues, DesiredConfigContext};
use crate::error::{Error, Stage};
use crate::translator::{ManifestTranslator, TranslationRequest};

/// Asks the translator for the base Deployment and Service
pub(crate) struct BaseManifestTranslator<'t> {
    translator: &'t dyn ManifestTranslator,
}

impl<'t> BaseManifestTranslator<'t> {
    pub(crate) fn new(translator: &'t dyn ManifestTranslator) -> Self {
        Self { translator }
    }
}

impl CompilerStage for BaseManifestTranslator<'_> {
    fn stage(&self) -> Stage {
        Stage::Translate
    }

    fn run(&self, ctx: &mut DesiredConfigContext<'_>) -> Result<(), Error> {
        let request = translation_request(ctx.input().devfile.clone(), ctx.values()?);
        debug!(workspace = %request.name, namespace = %request.namespace, "translating devfile");

        let text = self.translator.translate(&request).map_err(|e| {
            error!(
                workspace = %request.name,
                namespace = %request.namespace,
                error = %e,
                "devfile translation failed"
            );
            e
        })?;
        ctx.set_manifest_text(text)
    }
}

/// Build the translator request from derived values.
///
/// The Deployment, its pod template, the Service and any PVCs are owned by
/// the workspace inventory, so they receive the workspace-owned annotations.
pub fn translation_request(devfile: String, values: &ConfigValues) -> TranslationRequest {
    TranslationRequest {
        devfile,
        labels: values.labels.clone(),
        annotations: values.annotations.workspace_owned.clone(),
        domain_template: values.names.domain_template.clone(),
        replicas: values.replicas,
        name: values.names.workspace_name.clone(),
        namespace: values.names.namespace.clone(),
    }
}
