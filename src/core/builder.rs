use super::{
    registry::FunctionRegistry,
    rewrite::{KeepAlive, ScriptRewriter},
};
use crate::{
    config::Config,
    error::{ActionError, Result},
    schemas::validate_build_request,
    types::{FunctionDescriptor, ParameterSpec},
};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// What a successful build produced
#[derive(Debug)]
pub struct BuildReport {
    pub descriptor: FunctionDescriptor,
    pub script_path: PathBuf,
    pub keep_alive: KeepAlive,
    /// Rewrite steps that found nothing to rewrite
    pub warnings: Vec<ActionError>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Turns recorded script text into a saved, parameterised function
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    registry: FunctionRegistry,
    rewriter: ScriptRewriter,
}

impl FunctionBuilder {
    pub fn new(registry: FunctionRegistry, rewriter: ScriptRewriter) -> Self {
        Self { registry, rewriter }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            FunctionRegistry::from_config(config),
            ScriptRewriter::new(config.entry_function.clone())?,
        ))
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Validate, rewrite, write `<name>.<ext>`, then upsert the descriptor.
    ///
    /// Nothing is written when validation fails, including a parameter that
    /// clashes with a name the recording already uses. The script write and the
    /// registry update are not atomic together: if the upsert fails the new
    /// script stays on disk.
    pub fn build(
        &self,
        raw_text: &str,
        name: &str,
        description: &str,
        params: &[ParameterSpec],
    ) -> Result<BuildReport> {
        let description = description.trim();
        validate_build_request(name, description, params)?;

        let script = self.rewriter.rewrite(raw_text, description, params)?;
        for warning in &script.warnings {
            warn!(target: "action_gen::builder", "{}: {}", name, warning);
        }

        fs::create_dir_all(self.registry.functions_dir())?;
        let script_path = self.registry.script_path(name);
        fs::write(&script_path, &script.source)?;
        info!(target: "action_gen::builder", "Wrote {}", script_path.display());

        let descriptor = FunctionDescriptor::new(name, description, params.to_vec());
        self.registry.upsert(descriptor.clone())?;
        info!(target: "action_gen::builder", "Saved function {}", name);

        Ok(BuildReport {
            descriptor,
            script_path,
            keep_alive: script.keep_alive,
            warnings: script.warnings,
        })
    }
}
