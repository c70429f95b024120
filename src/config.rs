use crate::{
    error::{ActionError, Result},
    schemas::deserialize_with_path,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "action-gen.json";

const DEFAULT_REGISTRY_FILE: &str = "tools.json";

/// Application settings.
///
/// Every field has a default, so a config file only needs the keys it changes.
/// Precedence: CLI flags, then environment, then file, then defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one script per saved function
    pub functions_dir: PathBuf,
    /// Registry file; defaults to `tools.json` inside `functions_dir`
    pub registry_file: Option<PathBuf>,
    /// Interpreter used for generated scripts and the recorder
    pub interpreter: String,
    pub script_extension: String,
    /// Name of the recorded entry function that receives the parameters
    pub entry_function: String,
    pub default_url: String,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint; Ollama serves one under `/v1`
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            functions_dir: PathBuf::from("functions"),
            registry_file: None,
            interpreter: "python3".to_string(),
            script_extension: "py".to_string(),
            entry_function: "run".to_string(),
            default_url: "https://youtube.com".to_string(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl Config {
    /// Load `.env`, the config file (explicit path or [`DEFAULT_CONFIG_FILE`]
    /// if present) and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!(target: "action_gen::config", "No config file, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            ActionError::Config(format!("Failed to read {}: {}", path.display(), err))
        })?;
        let raw: Value = serde_json::from_str(&content).map_err(|err| {
            ActionError::Config(format!("Invalid JSON in {}: {}", path.display(), err))
        })?;
        let config = deserialize_with_path(raw).map_err(|err| {
            ActionError::Config(format!("Invalid config in {}: {}", path.display(), err))
        })?;

        info!(target: "action_gen::config", "Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = non_empty("ACTION_GEN_FUNCTIONS_DIR") {
            self.functions_dir = PathBuf::from(dir);
        }
        if let Some(interpreter) = non_empty("ACTION_GEN_INTERPRETER") {
            self.interpreter = interpreter;
        }
        if let Some(model) = non_empty("ACTION_GEN_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) =
            non_empty("OLLAMA_BASE_URL").or_else(|| non_empty("OPENAI_BASE_URL"))
        {
            self.llm.base_url = base_url;
        }
        if let Some(api_key) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(api_key);
        }
    }

    /// Location of the registry file
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.functions_dir.join(DEFAULT_REGISTRY_FILE))
    }

    /// Create the functions directory and an empty registry if absent
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.functions_dir)?;
        let registry_path = self.registry_path();
        if let Some(parent) = registry_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !registry_path.exists() {
            fs::write(&registry_path, "[]\n")?;
            info!(
                target: "action_gen::config",
                "Created empty registry at {}",
                registry_path.display()
            );
        }
        Ok(())
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
