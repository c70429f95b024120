use super::log_sink::{LogSink, LogSource};
use crate::{
    error::{ActionError, Result},
    types::{FunctionDescriptor, ParamKind},
};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How a launched script ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
}

/// Spawns generated scripts as child processes and streams their output to a [`LogSink`]
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    interpreter: String,
    sink: Arc<dyn LogSink>,
}

impl ScriptLauncher {
    pub fn new(interpreter: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            interpreter: interpreter.into(),
            sink,
        }
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Arguments passed to the interpreter: the script, then one `--variable=value` per pair.
    ///
    /// The joined form keeps argparse from reading a value such as `-rust` as an option.
    pub fn command_args(script: &Path, args: &[(String, String)]) -> Vec<String> {
        let mut command = vec![script.display().to_string()];
        command.extend(
            args.iter()
                .map(|(variable, value)| format!("--{}={}", variable, value)),
        );
        command
    }

    /// Start `script` and return immediately.
    ///
    /// Output lines are forwarded from background tasks, so this must be
    /// called inside a Tokio runtime.
    pub fn launch(&self, script: &Path, args: &[(String, String)]) -> Result<RunHandle> {
        if !script.is_file() {
            return Err(ActionError::ScriptLaunch(format!(
                "no script at {}",
                script.display()
            )));
        }

        let name = script
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        let command_args = Self::command_args(script, args);
        debug!(
            target: "action_gen::launcher",
            "Spawning {} {}",
            self.interpreter,
            command_args.join(" ")
        );

        let mut child = Command::new(&self.interpreter)
            .args(&command_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ActionError::ScriptLaunch(format!(
                    "failed to start {} with {}: {}",
                    script.display(),
                    self.interpreter,
                    err
                ))
            })?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                LogSource::Stdout,
                Arc::clone(&self.sink),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                LogSource::Stderr,
                Arc::clone(&self.sink),
            )));
        }

        self.sink
            .line(LogSource::App, &format!("Running {} (args: {:?})", name, args));
        info!(target: "action_gen::launcher", "Started {} (pid {:?})", name, child.id());

        Ok(RunHandle {
            name,
            child,
            readers,
            sink: Arc::clone(&self.sink),
        })
    }
}

/// A running script. Dropping the handle leaves the process running.
#[derive(Debug)]
pub struct RunHandle {
    name: String,
    child: Child,
    readers: Vec<JoinHandle<()>>,
    sink: Arc<dyn LogSink>,
}

impl RunHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for exit and for all output to be forwarded
    pub async fn wait(mut self) -> Result<RunOutcome> {
        let status = self.child.wait().await?;
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }

        let outcome = RunOutcome {
            code: status.code(),
            success: status.success(),
        };
        let message = match outcome.code {
            Some(code) => format!("{} finished (exit code {})", self.name, code),
            None => format!("{} terminated by signal", self.name),
        };
        self.sink.line(LogSource::App, &message);
        Ok(outcome)
    }

    /// Keep supervising in the background without blocking the caller
    pub fn detach(self) -> JoinHandle<Result<RunOutcome>> {
        tokio::spawn(self.wait())
    }

    /// Terminate the script
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

async fn forward_lines<R>(reader: R, source: LogSource, sink: Arc<dyn LogSink>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        sink.line(source, &line);
    }
}

/// Check manually entered values against a descriptor.
///
/// Every declared parameter needs a non-blank value and `number` values must
/// be integers. Returns `(variable, value)` pairs in declaration order.
pub fn collect_manual_args(
    descriptor: &FunctionDescriptor,
    provided: &[(String, String)],
) -> Result<Vec<(String, String)>> {
    if let Some((unknown, _)) = provided
        .iter()
        .find(|(variable, _)| descriptor.parameter(variable).is_none())
    {
        return Err(ActionError::Validation(format!(
            "Function '{}' has no parameter '{}'",
            descriptor.name, unknown
        )));
    }

    let mut args = Vec::with_capacity(descriptor.parameters.len());
    for param in &descriptor.parameters {
        let value = provided
            .iter()
            .rev()
            .find(|(variable, _)| *variable == param.variable)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ActionError::Validation(format!(
                    "Function '{}' requires a value for '{}'",
                    descriptor.name, param.variable
                ))
            })?;

        if param.kind == ParamKind::Number && value.parse::<i64>().is_err() {
            return Err(ActionError::Validation(format!(
                "Parameter '{}' of '{}' must be an integer, got '{}'",
                param.variable, descriptor.name, value
            )));
        }
        args.push((param.variable.clone(), value.to_string()));
    }
    Ok(args)
}
