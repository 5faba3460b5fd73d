//! Configuration management for the arbiter
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::models::SamplingParams;
use crate::pipeline::ChunkGranularity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

/// Upper bound for `provider.upstream_timeout_seconds`
pub const MAX_UPSTREAM_TIMEOUT_SECONDS: u64 = 600;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    pub candidates: Vec<CandidateModel>,
    pub judge: JudgeConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream OpenAI-compatible provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Client-wide timeout for upstream calls; `None` keeps the HTTP client default
    #[serde(default)]
    pub upstream_timeout_seconds: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            upstream_timeout_seconds: None,
        }
    }
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable
    ///
    /// Called once at startup; the key is never re-read while serving.
    pub fn load_api_key(&self) -> AppResult<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AppError::Config(format!(
                "environment variable {} is not set or empty; it must hold the provider API key",
                self.api_key_env
            ))),
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

/// Settings shared by every candidate call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// System turn prepended to each candidate's private copy of the conversation
    #[serde(default = "default_system_directive")]
    pub system_directive: String,
    #[serde(default = "default_creative_temperature")]
    pub temperature: f64,
    #[serde(default = "default_candidate_max_tokens")]
    pub max_tokens: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            system_directive: default_system_directive(),
            temperature: default_creative_temperature(),
            max_tokens: default_candidate_max_tokens(),
        }
    }
}

impl PoolConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_system_directive() -> String {
    "You are a helpful assistant. If you are asked who you are, which model you are, \
     or who built you, answer that you are an AI assistant and do not name any \
     underlying model, vendor or provider. Otherwise answer the user directly."
        .to_string()
}

fn default_creative_temperature() -> f64 {
    1.0
}

fn default_candidate_max_tokens() -> u32 {
    1024
}

/// One candidate model in the arbitration pool
///
/// Fields are private; instances come from deserialization and are checked by
/// `Config::validate()`. Position in the list defines the `<response{i}>` tag
/// the judge uses for this model.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CandidateModel {
    name: String,
    label: String,
}

impl CandidateModel {
    /// Build a candidate directly (tests and programmatic setups)
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }

    /// Upstream model identifier
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable label used in verdict weights and logs
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Judge model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    pub model: String,
    /// Kept low so the tag grammar is followed consistently
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
    /// Fail the request when `<decision>` is neither `pick` nor `merge`
    #[serde(default)]
    pub reject_unknown_decision: bool,
}

impl JudgeConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_judge_max_tokens() -> u32 {
    2048
}

/// Response streaming configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    #[serde(default)]
    pub granularity: ChunkGranularity,
    /// Model used by `/stream/direct`; falls back to the first candidate
    #[serde(default)]
    pub direct_model: Option<String>,
    #[serde(default = "default_creative_temperature")]
    pub direct_temperature: f64,
    #[serde(default = "default_candidate_max_tokens")]
    pub direct_max_tokens: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            granularity: ChunkGranularity::default(),
            direct_model: None,
            direct_temperature: default_creative_temperature(),
            direct_max_tokens: default_candidate_max_tokens(),
        }
    }
}

impl StreamingConfig {
    pub fn direct_sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.direct_temperature,
            max_tokens: self.direct_max_tokens,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn validate_temperature(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || !(0.0..=2.0).contains(&value) {
        return Err(AppError::Config(format!(
            "{} must be a finite number between 0.0 and 2.0, got {}",
            field, value
        )));
    }
    Ok(())
}

fn validate_max_tokens(field: &str, value: u32) -> AppResult<()> {
    if value == 0 {
        return Err(AppError::Config(format!(
            "{} must be greater than 0",
            field
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Model used by the direct (non-arbitrated) streaming endpoint
    pub fn direct_model(&self) -> &str {
        match &self.streaming.direct_model {
            Some(model) => model,
            // validate() guarantees at least one candidate
            None => self
                .candidates
                .first()
                .map(CandidateModel::name)
                .unwrap_or_default(),
        }
    }

    /// Validate configuration after parsing
    ///
    /// Called automatically by `from_file()` and `from_str()`; call it
    /// explicitly when building a `Config` by hand.
    pub fn validate(&self) -> AppResult<()> {
        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "provider.base_url '{}' must start with 'http://' or 'https://'",
                self.provider.base_url
            )));
        }

        if self.provider.api_key_env.trim().is_empty() {
            return Err(AppError::Config(
                "provider.api_key_env cannot be empty".to_string(),
            ));
        }

        if let Some(timeout) = self.provider.upstream_timeout_seconds
            && (timeout == 0 || timeout > MAX_UPSTREAM_TIMEOUT_SECONDS)
        {
            return Err(AppError::Config(format!(
                "provider.upstream_timeout_seconds must be between 1 and {}, got {}",
                MAX_UPSTREAM_TIMEOUT_SECONDS, timeout
            )));
        }

        // The judge grammar needs at least one <response{i}> tag
        if self.candidates.is_empty() {
            return Err(AppError::Config(
                "at least one [[candidates]] entry is required.\n\n\
                Example fix - add to config.toml:\n\
                [[candidates]]\n\
                name = \"llama3-70b-8192\"\n\
                label = \"Llama 3 70B\""
                    .to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for (index, candidate) in self.candidates.iter().enumerate() {
            if candidate.name.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "candidates[{}].name cannot be empty",
                    index
                )));
            }
            if candidate.label.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "candidates[{}].label cannot be empty",
                    index
                )));
            }
            if !labels.insert(candidate.label.as_str()) {
                return Err(AppError::Config(format!(
                    "candidates[{}].label '{}' is used more than once; labels must be unique",
                    index, candidate.label
                )));
            }
        }

        if self.pool.system_directive.trim().is_empty() {
            return Err(AppError::Config(
                "pool.system_directive cannot be empty".to_string(),
            ));
        }
        validate_temperature("pool.temperature", self.pool.temperature)?;
        validate_max_tokens("pool.max_tokens", self.pool.max_tokens)?;

        if self.judge.model.trim().is_empty() {
            return Err(AppError::Config("judge.model cannot be empty".to_string()));
        }
        validate_temperature("judge.temperature", self.judge.temperature)?;
        validate_max_tokens("judge.max_tokens", self.judge.max_tokens)?;

        if let Some(model) = &self.streaming.direct_model
            && model.trim().is_empty()
        {
            return Err(AppError::Config(
                "streaming.direct_model cannot be empty when set".to_string(),
            ));
        }
        validate_temperature(
            "streaming.direct_temperature",
            self.streaming.direct_temperature,
        )?;
        validate_max_tokens("streaming.direct_max_tokens", self.streaming.direct_max_tokens)?;

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 8000

[provider]
base_url = "https://api.groq.com/openai/v1"
api_key_env = "GROQ_API_KEY"

[[candidates]]
name = "llama3-70b-8192"
label = "Llama 3 70B"

[[candidates]]
name = "mixtral-8x7b-32768"
label = "Mixtral 8x7B"

[[candidates]]
name = "gemma2-9b-it"
label = "Gemma 2 9B"

[judge]
model = "llama-3.3-70b-versatile"

[streaming]
granularity = "word"

[observability]
log_level = "debug"
"#;

    fn parse_with(extra: &str) -> AppResult<Config> {
        let base = r#"
[server]
host = "127.0.0.1"
port = 8000

[[candidates]]
name = "model-a"
label = "A"

[judge]
model = "judge"
"#;
        Config::from_str(&format!("{}\n{}", base, extra))
    }

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_candidates_keep_file_order() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        let names: Vec<&str> = config.candidates.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec!["llama3-70b-8192", "mixtral-8x7b-32768", "gemma2-9b-it"]
        );
        assert_eq!(config.candidates[1].label(), "Mixtral 8x7B");
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse_with("").expect("minimal config should parse");
        assert_eq!(config.provider.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.provider.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.provider.upstream_timeout_seconds, None);
        assert_eq!(config.judge.temperature, 0.0);
        assert_eq!(config.judge.max_tokens, 2048);
        assert!(!config.judge.reject_unknown_decision);
        assert_eq!(config.pool.max_tokens, 1024);
        assert_eq!(config.streaming.granularity, ChunkGranularity::Word);
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.pool.system_directive.is_empty());
    }

    #[test]
    fn test_direct_model_falls_back_to_first_candidate() {
        let config = parse_with("").unwrap();
        assert_eq!(config.direct_model(), "model-a");

        let config = parse_with("[streaming]\ndirect_model = \"llama3-8b-8192\"").unwrap();
        assert_eq!(config.direct_model(), "llama3-8b-8192");
    }

    #[test]
    fn test_validation_no_candidates_fails() {
        let toml = r#"
candidates = []

[server]
host = "127.0.0.1"
port = 8000

[judge]
model = "judge"
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("[[candidates]]"));
    }

    #[test]
    fn test_validation_duplicate_label_fails() {
        let err = parse_with("[[candidates]]\nname = \"model-b\"\nlabel = \"A\"").unwrap_err();
        assert!(err.to_string().contains("labels must be unique"));
    }

    #[test]
    fn test_validation_empty_candidate_name_fails() {
        let err = parse_with("[[candidates]]\nname = \"  \"\nlabel = \"B\"").unwrap_err();
        assert!(err.to_string().contains("candidates[1].name"));
    }

    #[test]
    fn test_validation_invalid_base_url_fails() {
        let err = parse_with("[provider]\nbase_url = \"api.groq.com\"").unwrap_err();
        assert!(err.to_string().contains("provider.base_url"));
    }

    #[test]
    fn test_validation_judge_temperature_out_of_range_fails() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 8000

[[candidates]]
name = "model-a"
label = "A"

[judge]
model = "judge"
temperature = 2.5
"#;
        let err = Config::from_str(toml).unwrap_err();
        assert!(err.to_string().contains("judge.temperature"));
    }

    #[test]
    fn test_validation_zero_timeout_fails() {
        let err = parse_with("[provider]\nupstream_timeout_seconds = 0").unwrap_err();
        assert!(err.to_string().contains("upstream_timeout_seconds"));
    }

    #[test]
    fn test_validation_excessive_timeout_fails() {
        let err = parse_with("[provider]\nupstream_timeout_seconds = 601").unwrap_err();
        assert!(err.to_string().contains("between 1 and 600"));
    }

    #[test]
    fn test_unknown_granularity_rejected_at_parse_time() {
        let err = parse_with("[streaming]\ngranularity = \"sentence\"").unwrap_err();
        assert!(matches!(err, AppError::ConfigParseFailed { .. }));
    }

    #[test]
    fn test_load_api_key_missing_env_fails() {
        let provider = ProviderConfig {
            api_key_env: "LLM_ARBITER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ProviderConfig::default()
        };
        let err = provider.load_api_key().unwrap_err();
        assert!(
            err.to_string()
                .contains("LLM_ARBITER_TEST_KEY_THAT_IS_NEVER_SET")
        );
    }
}
