use crate::{
    config::Config,
    error::{ActionError, Result},
    schemas::{deserialize_with_path, validate_function_name},
    types::FunctionDescriptor,
};
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File stem the recorder writes its raw output to before a build
pub const SCRATCH_STEM: &str = "tmp_codegen";

/// Persisted set of function descriptors plus the directory of scripts they describe.
///
/// The registry file is the source of truth and is always rewritten whole.
/// There is no locking: concurrent writers race and the last `save` wins.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions_dir: PathBuf,
    registry_path: PathBuf,
    extension: String,
}

impl FunctionRegistry {
    pub fn new(
        functions_dir: impl Into<PathBuf>,
        registry_path: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            functions_dir: functions_dir.into(),
            registry_path: registry_path.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.functions_dir.clone(),
            config.registry_path(),
            config.script_extension.clone(),
        )
    }

    pub fn functions_dir(&self) -> &Path {
        &self.functions_dir
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `<functions_dir>/<name>.<ext>`
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.functions_dir
            .join(format!("{}.{}", name, self.extension))
    }

    /// Where the recorder leaves raw output
    pub fn scratch_path(&self) -> PathBuf {
        self.script_path(SCRATCH_STEM)
    }

    /// Read all descriptors, failing soft.
    ///
    /// A missing, unreadable or malformed registry yields an empty list.
    pub fn load(&self) -> Vec<FunctionDescriptor> {
        match self.try_load() {
            Ok(descriptors) => descriptors,
            Err(err) => {
                warn!(
                    target: "action_gen::registry",
                    "Failed to load registry {}: {}",
                    self.registry_path.display(),
                    err
                );
                Vec::new()
            }
        }
    }

    /// Strict variant of [`FunctionRegistry::load`]; only a missing file is not an error
    pub fn try_load(&self) -> Result<Vec<FunctionDescriptor>> {
        let content = match fs::read_to_string(&self.registry_path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let raw: Value = serde_json::from_str(&content)?;
        deserialize_with_path(raw)
    }

    /// Look up one descriptor by name
    pub fn get(&self, name: &str) -> Option<FunctionDescriptor> {
        self.load().into_iter().find(|d| d.name == name)
    }

    /// Overwrite the registry with `descriptors`.
    ///
    /// Written to a sibling temp file and renamed into place, so readers see
    /// either the old or the new list.
    pub fn save(&self, descriptors: &[FunctionDescriptor]) -> Result<()> {
        if let Some(parent) = self.registry_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut body = serde_json::to_string_pretty(descriptors)?;
        body.push('\n');

        let tmp_path = self.registry_path.with_extension("json.tmp");
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.registry_path)?;

        debug!(
            target: "action_gen::registry",
            "Saved {} functions to {}",
            descriptors.len(),
            self.registry_path.display()
        );
        Ok(())
    }

    /// Add `descriptor`, replacing any entry with the same name
    pub fn upsert(&self, descriptor: FunctionDescriptor) -> Result<()> {
        let mut descriptors = self.load();
        descriptors.retain(|d| d.name != descriptor.name);
        descriptors.push(descriptor);
        self.save(&descriptors)?;

        info!(
            target: "action_gen::registry",
            "Registry updated ({} functions)",
            descriptors.len()
        );
        Ok(())
    }

    /// Drop the descriptor and its script file.
    ///
    /// A missing script is not an error. Returns whether a descriptor was removed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        validate_function_name(name)?;
        let mut descriptors = self.load();
        let before = descriptors.len();
        descriptors.retain(|d| d.name != name);

        let script = self.script_path(name);
        match fs::remove_file(&script) {
            Ok(()) => debug!(target: "action_gen::registry", "Deleted {}", script.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        self.save(&descriptors)?;
        let removed = descriptors.len() != before;
        info!(target: "action_gen::registry", "Removed function {}", name);
        Ok(removed)
    }

    /// Re-derive the registry from the scripts present on disk.
    ///
    /// Each script's leading `#` comment becomes its description; parameters
    /// are not recoverable and come back empty.
    pub fn rebuild_from_directory(&self) -> Result<Vec<FunctionDescriptor>> {
        let mut descriptors = Vec::new();

        for entry in fs::read_dir(&self.functions_dir)? {
            let path = entry?.path();
            if !path.is_file() || path == self.registry_path {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if stem == SCRATCH_STEM {
                continue;
            }
            if let Err(err) = validate_function_name(stem) {
                warn!(target: "action_gen::registry", "Skipping {}: {}", path.display(), err);
                continue;
            }

            let description = leading_comment(&path).unwrap_or_default();
            descriptors.push(FunctionDescriptor::new(stem, description, Vec::new()));
        }

        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        self.save(&descriptors)?;

        info!(
            target: "action_gen::registry",
            "Rebuilt registry from {} ({} functions)",
            self.functions_dir.display(),
            descriptors.len()
        );
        Ok(descriptors)
    }

    /// Source of a saved function's script
    pub fn read_script(&self, name: &str) -> Result<String> {
        validate_function_name(name)?;
        let path = self.script_path(name);
        fs::read_to_string(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ActionError::FunctionNotFound(format!(
                "{} (no script at {})",
                name,
                path.display()
            )),
            _ => err.into(),
        })
    }

    /// Replace a saved function's script with edited source
    pub fn write_script(&self, name: &str, source: &str) -> Result<()> {
        validate_function_name(name)?;
        fs::create_dir_all(&self.functions_dir)?;
        let path = self.script_path(name);
        fs::write(&path, source)?;
        info!(target: "action_gen::registry", "Saved {}", path.display());
        Ok(())
    }
}

fn leading_comment(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line).ok()?;
    let comment = first_line.trim().strip_prefix('#')?;
    Some(comment.trim_start_matches('#').trim().to_string())
}
