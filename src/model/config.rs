use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const ENV_CONFIG_PATH: &str = "IOC_AGENT_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";

/// Model used when a request does not name one
pub const FALLBACK_MODEL: &str = "llama3.2";

const DEFAULT_MAX_ITERATIONS: u32 = 3;
const DEFAULT_DEADLINE_SECS: u64 = 300;
const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

/// Refinement workflow configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Upper bound on extract/evaluate attempts per category
    pub max_iterations: u32,
    /// Overall deadline for one extraction request, in seconds
    pub deadline_secs: u64,
    /// Model used when the caller does not select one
    pub default_model: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            deadline_secs: DEFAULT_DEADLINE_SECS,
            default_model: FALLBACK_MODEL.to_string(),
        }
    }
}

impl WorkflowConfig {
    /// Iteration budget, never below one attempt
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations.max(1)
    }

    /// Request deadline, capped at one day
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs.min(MAX_DEADLINE_SECS))
    }
}

/// Local inference runtime options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Base URL of the Ollama server. `OLLAMA_HOST` takes precedence.
    pub host: String,
    pub temperature: f32,
    pub num_ctx: u32,
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            temperature: 0.2,
            num_ctx: 8192,
            request_timeout_secs: 120,
        }
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub workflow: WorkflowConfig,
    pub inference: InferenceConfig,
    pub port: u16,
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig::default(),
            inference: InferenceConfig::default(),
            port: 8000,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file = Self::load_config_file(&config_path).unwrap_or_default();

        let mut inference = file.inference;
        if let Ok(ollama_host) = std::env::var(ENV_OLLAMA_HOST)
            && !ollama_host.trim().is_empty()
        {
            inference.host = ollama_host;
        }

        Self {
            workflow: file.workflow,
            inference,
            port,
            host,
        }
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => Self::parse_config(&contents, path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    fn parse_config(contents: &str, path: &Path) -> Option<ConfigFile> {
        let contents = contents.trim();
        if contents.is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Some(ConfigFile::default());
        }

        match serde_yaml::from_str(contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                None
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "workflow:\n  max_iterations: 5\n";
        let config = Config::parse_config(yaml, Path::new("config.yaml")).unwrap();

        assert_eq!(config.workflow.max_iterations(), 5);
        assert_eq!(config.workflow.deadline_secs, DEFAULT_DEADLINE_SECS);
        assert_eq!(config.workflow.default_model, FALLBACK_MODEL);
        assert_eq!(config.inference.num_ctx, 8192);
    }

    #[test]
    fn test_oversized_deadline_is_capped() {
        let yaml = "workflow:\n  deadline_secs: 18446744073709551615\n";
        let config = Config::parse_config(yaml, Path::new("config.yaml")).unwrap();

        assert_eq!(config.workflow.deadline(), Duration::from_secs(MAX_DEADLINE_SECS));
        assert!(tokio::time::Instant::now().checked_add(config.workflow.deadline()).is_some());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse_config("   \n", Path::new("config.yaml")).unwrap();
        assert_eq!(config.workflow.max_iterations(), DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(Config::parse_config("workflow: [", Path::new("config.yaml")).is_none());
    }

    #[test]
    fn test_zero_iterations_clamped() {
        let workflow = WorkflowConfig {
            max_iterations: 0,
            ..WorkflowConfig::default()
        };
        assert_eq!(workflow.max_iterations(), 1);
    }
}
