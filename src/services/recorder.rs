use super::log_sink::{LogSink, LogSource};
use crate::{
    config::Config,
    core::registry::FunctionRegistry,
    error::{ActionError, Result},
    schemas::validate_build_request,
    types::ParameterSpec,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Launches the Playwright code generator and collects what it recorded
#[derive(Debug, Clone)]
pub struct Recorder {
    interpreter: String,
    scratch_path: PathBuf,
    sink: Arc<dyn LogSink>,
}

impl Recorder {
    pub fn new(
        interpreter: impl Into<String>,
        scratch_path: impl Into<PathBuf>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            scratch_path: scratch_path.into(),
            sink,
        }
    }

    pub fn from_config(config: &Config, sink: Arc<dyn LogSink>) -> Self {
        let registry = FunctionRegistry::from_config(config);
        Self::new(config.interpreter.clone(), registry.scratch_path(), sink)
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    /// Interpreter arguments for recording `url`
    pub fn command_args(&self, url: &str) -> Vec<String> {
        vec![
            "-m".to_string(),
            "playwright".to_string(),
            "codegen".to_string(),
            url.to_string(),
            "--target".to_string(),
            "python".to_string(),
            "--output".to_string(),
            self.scratch_path.display().to_string(),
        ]
    }

    /// Open a browser on `url` and wait until the user closes it.
    ///
    /// Returns the recorded script, or `None` if the recorder produced nothing.
    pub async fn record(&self, url: &str) -> Result<Option<String>> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ActionError::Validation("URL must not be empty".to_string()));
        }

        if let Some(parent) = self.scratch_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        remove_if_present(&self.scratch_path)?;

        self.sink
            .line(LogSource::App, &format!("Recording started: {}", url));
        self.sink.line(
            LogSource::App,
            "Close the browser window to save the recording",
        );

        let status = Command::new(&self.interpreter)
            .args(self.command_args(url))
            .status()
            .await
            .map_err(|err| {
                ActionError::ScriptLaunch(format!(
                    "failed to start recorder via {}: {}",
                    self.interpreter, err
                ))
            })?;
        if !status.success() {
            warn!(target: "action_gen::recorder", "Recorder exited with {}", status);
        }

        self.take_recording()
    }

    /// Read and delete the scratch file left by the recorder
    pub fn take_recording(&self) -> Result<Option<String>> {
        let text = match fs::read_to_string(&self.scratch_path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.sink
                    .line(LogSource::App, "Recorder exited without producing code");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        remove_if_present(&self.scratch_path)?;

        info!(
            target: "action_gen::recorder",
            "Captured {} bytes of recorded script",
            text.len()
        );
        Ok(Some(text))
    }
}

/// Form checks run before a browser is opened
pub fn validate_recording_request(
    url: &str,
    name: &str,
    description: &str,
    params: &[ParameterSpec],
) -> Result<()> {
    if url.trim().is_empty() {
        return Err(ActionError::Validation("URL must not be empty".to_string()));
    }
    validate_build_request(name, description.trim(), params)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
