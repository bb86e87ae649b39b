//! Base-manifest translator boundary
//!
//! The devfile-to-manifest translation is owned by an external component.
//! The compiler only sees [`ManifestTranslator`]; [`CommandTranslator`] is the
//! production implementation that runs the translator as a local program.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Error;

/// Everything the translator needs to render the base Deployment and Service
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslationRequest {
    /// Processed devfile text
    pub devfile: String,
    /// Labels for every rendered resource
    pub labels: BTreeMap<String, String>,
    /// Annotations for every rendered resource and the pod template
    pub annotations: BTreeMap<String, String>,
    /// `{{.port}}-<name>.<dns zone>`
    pub domain_template: String,
    /// Deployment replicas
    pub replicas: u32,
    /// Workspace name
    pub name: String,
    /// Target namespace
    pub namespace: String,
}

/// Turns a devfile into multi-document manifest text.
///
/// Implementations must be synchronous and must report every failure as
/// [`Error::Translation`]; the compiler never retries.
#[cfg_attr(test, automock)]
pub trait ManifestTranslator: Send + Sync {
    /// Render the base manifests for one workspace
    fn translate(&self, request: &TranslationRequest) -> Result<String, Error>;
}

// =============================================================================
// Real Implementation
// =============================================================================

/// Runs an external translator program.
///
/// The request is written to the program's stdin as JSON and the manifest
/// stream is read from its stdout. A non-zero exit status fails the
/// translation with the program's stderr as the message.
#[derive(Clone, Debug)]
pub struct CommandTranslator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTranslator {
    /// Translator running `program` with no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add arguments passed to the program
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl ManifestTranslator for CommandTranslator {
    fn translate(&self, request: &TranslationRequest) -> Result<String, Error> {
        let fail = |message: String| Error::translation(&request.name, &request.namespace, message);
        let payload = serde_json::to_vec(request)?;

        debug!(program = %self.program.display(), workspace = %request.name, "running translator");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("failed to run {}: {}", self.program.display(), e)))?;

        // Feed stdin from a separate thread so a translator that streams
        // output before draining its input cannot block on a full pipe.
        let writer = child
            .stdin
            .take()
            .map(|mut stdin| thread::spawn(move || stdin.write_all(&payload)));

        let output = child
            .wait_with_output()
            .map_err(|e| fail(format!("failed to wait for translator: {}", e)))?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(fail(format!(
                "translator exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Some(writer) = writer {
            let written = writer
                .join()
                .map_err(|_| fail("request writer panicked".to_string()))?;
            match written {
                Ok(()) => {}
                // A successful translator may finish without draining stdin.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(
                        workspace = %request.name,
                        "translator exited before reading the full request"
                    );
                }
                Err(e) => return Err(fail(format!("failed to write request: {}", e))),
            }
        }
        if !stderr.trim().is_empty() {
            warn!(workspace = %request.name, stderr = %stderr.trim(), "translator wrote to stderr");
        }

        String::from_utf8(output.stdout)
            .map_err(|e| fail(format!("translator output is not UTF-8: {}", e)))
    }
}
