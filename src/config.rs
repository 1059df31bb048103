//! Service configuration
//!
//! Loaded once at process start from TOML and passed by reference into the
//! extraction engine, classifier gateway and store clients. Secrets live in
//! environment variables named by the `*_env` fields.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main service configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficConfig {
    #[serde(default)]
    pub service: ServiceSection,
    pub store: StoreSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub clients: ClientsSection,
    #[serde(default)]
    pub replies: RepliesSection,
    #[serde(default)]
    pub wip: WipSection,
}

/// HTTP service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Service name reported by `/health`
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
        }
    }
}

fn default_service_name() -> String {
    "Dot Traffic".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Record store (spreadsheet database) settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    #[serde(default = "default_store_url")]
    pub base_url: String,
    /// Database/base identifier
    pub base_id: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    #[serde(default = "default_projects_table")]
    pub projects_table: String,
    #[serde(default = "default_traffic_table")]
    pub traffic_table: String,
    #[serde(default = "default_clients_table")]
    pub clients_table: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on pages read by one list query
    #[serde(default = "default_store_max_pages")]
    pub max_pages: usize,
}

fn default_store_url() -> String {
    "https://api.airtable.com/v0".to_string()
}

fn default_projects_table() -> String {
    "Projects".to_string()
}

fn default_traffic_table() -> String {
    "Traffic".to_string()
}

fn default_clients_table() -> String {
    "Clients".to_string()
}

fn default_store_max_pages() -> usize {
    20
}

fn default_store_timeout() -> u64 {
    10
}

/// Classifier (LLM oracle) settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name (only "anthropic" is wired up)
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    /// Environment variable containing API key
    pub api_key_env: String,
    /// Inline system instruction
    pub system_prompt: Option<String>,
    /// File holding the system instruction, relative to the config file
    pub prompt_file: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_llm_timeout() -> u64 {
    60
}

/// Client code registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientsSection {
    /// Valid three-letter client codes
    pub codes: Vec<String>,
    /// Free-text aliases, matched in listed order
    #[serde(default)]
    pub aliases: Vec<ClientAlias>,
    /// Sender email domains, matched in listed order
    #[serde(default)]
    pub domains: Vec<ClientDomain>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientAlias {
    pub alias: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientDomain {
    pub domain: String,
    pub code: String,
}

impl Default for ClientsSection {
    fn default() -> Self {
        let codes = [
            "ONE", "ONS", "ONB", "SKY", "TOW", "FIS", "FST", "HUN", "EON", "LAB", "WES", "WKA",
            "OTH",
        ];
        // Longer aliases first so "one nz business" wins over "one nz"
        let aliases = [
            ("one nz simplification", "ONS"),
            ("one nz - simplification", "ONS"),
            ("one nz (simplification)", "ONS"),
            ("one nz business", "ONB"),
            ("one nz - business", "ONB"),
            ("one nz (business)", "ONB"),
            ("one nz marketing", "ONE"),
            ("one nz - marketing", "ONE"),
            ("one nz (marketing)", "ONE"),
            ("one nz", "ONE"),
            ("sky tv", "SKY"),
            ("sky", "SKY"),
            ("tower insurance", "TOW"),
            ("tower", "TOW"),
            ("fisher funds", "FIS"),
            ("firestop", "FST"),
            ("whakarongorau", "WKA"),
            ("eon fibre", "EON"),
            ("labour", "LAB"),
            ("westpac", "WES"),
            ("hunch", "HUN"),
        ];
        let domains = [
            ("one.nz", "ONE"),
            ("sky.co.nz", "SKY"),
            ("tower.co.nz", "TOW"),
            ("fisherfunds.co.nz", "FIS"),
            ("firestop.co.nz", "FST"),
            ("whakarongorau.nz", "WKA"),
            ("labour.org.nz", "LAB"),
            ("eonfibre.co.nz", "EON"),
        ];

        Self {
            codes: codes.iter().map(|c| c.to_string()).collect(),
            aliases: aliases
                .iter()
                .map(|(alias, code)| ClientAlias {
                    alias: alias.to_string(),
                    code: code.to_string(),
                })
                .collect(),
            domains: domains
                .iter()
                .map(|(domain, code)| ClientDomain {
                    domain: domain.to_string(),
                    code: code.to_string(),
                })
                .collect(),
        }
    }
}

/// Vocabulary for interpreting replies to a clarification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepliesSection {
    /// Replies that ask for a new job to be opened
    pub new_job: Vec<String>,
    /// Replies that confirm the previously suggested job
    pub affirmative: Vec<String>,
}

impl Default for RepliesSection {
    fn default() -> Self {
        let new_job = [
            "triage",
            "new job",
            "new",
            "it's a new job",
            "its a new job",
            "this is a new job",
            "start a new job",
            "new job please",
        ];
        let affirmative = [
            "yes", "y", "yep", "yeah", "yup", "correct", "confirmed", "confirm", "that's right",
            "thats right", "that's the one", "sure", "ok", "okay",
        ];
        Self {
            new_job: new_job.iter().map(|s| s.to_string()).collect(),
            affirmative: affirmative.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Client WIP report settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WipSection {
    /// Completed jobs stay on the report for this many days
    #[serde(default = "default_completed_window_days")]
    pub completed_window_days: u32,
    /// Banner image shown at the top of the report
    #[serde(default)]
    pub header_url: Option<String>,
}

impl Default for WipSection {
    fn default() -> Self {
        Self {
            completed_window_days: default_completed_window_days(),
            header_url: None,
        }
    }
}

fn default_completed_window_days() -> u32 {
    42
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid client code: {0}")]
    InvalidClientCode(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TrafficConfig {
    /// Load configuration from a TOML file, resolving `prompt_file`
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        if config.llm.system_prompt.is_none() {
            if let Some(prompt_file) = &config.llm.prompt_file {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                let prompt = std::fs::read_to_string(base.join(prompt_file))?;
                config.llm.system_prompt = Some(prompt);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the filesystem; `prompt_file` stays unresolved
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        for code in &self.clients.codes {
            validate_client_code(code)?;
        }

        let registered = |code: &str| self.clients.codes.iter().any(|c| c == code);
        for alias in &self.clients.aliases {
            if !registered(&alias.code) {
                return Err(ConfigError::InvalidConfig(format!(
                    "alias '{}' points at unregistered client code '{}'",
                    alias.alias, alias.code
                )));
            }
        }
        for domain in &self.clients.domains {
            if !registered(&domain.code) {
                return Err(ConfigError::InvalidConfig(format!(
                    "domain '{}' points at unregistered client code '{}'",
                    domain.domain, domain.code
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidConfig(format!(
                "llm.temperature must be between 0.0 and 1.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.system_prompt.is_none() && self.llm.prompt_file.is_none() {
            return Err(ConfigError::InvalidConfig(
                "one of llm.system_prompt or llm.prompt_file is required".to_string(),
            ));
        }

        Ok(())
    }

    /// The classifier system instruction
    pub fn system_prompt(&self) -> Result<&str, ConfigError> {
        self.llm.system_prompt.as_deref().ok_or_else(|| {
            ConfigError::InvalidConfig("llm system prompt has not been loaded".to_string())
        })
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get record store API key from environment variable
    pub fn get_store_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.store.api_key_env)
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[store]
base_id = "appTEST"
api_key_env = "AIRTABLE_API_KEY"

[llm]
model = "claude-sonnet-4-20250514"
api_key_env = "ANTHROPIC_API_KEY"
system_prompt = "You route agency email."
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Client codes are exactly three ASCII uppercase letters
fn validate_client_code(code: &str) -> Result<(), ConfigError> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::InvalidClientCode(format!(
            "'{code}' must be three uppercase letters"
        )));
    }
    Ok(())
}
