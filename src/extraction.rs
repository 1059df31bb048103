//! Deterministic job number and client code extraction.
//!
//! Runs before the classifier so that explicit identifiers in a message
//! never depend on the model. The client registry is injected; new client
//! codes are a configuration change, not a code change.

use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::{ClientsSection, ConfigError};
use crate::model::{ClientCode, JobNumber};

/// Valid client codes plus the alias and sender-domain lookup tables
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    codes: BTreeSet<String>,
    /// (lowercased alias, code), in match order
    aliases: Vec<(String, ClientCode)>,
    /// (lowercased domain, code), in match order
    domains: Vec<(String, ClientCode)>,
}

impl ClientRegistry {
    pub fn from_config(clients: &ClientsSection) -> Result<Self, ConfigError> {
        let mut codes = BTreeSet::new();
        for code in &clients.codes {
            let parsed = ClientCode::parse(code)
                .filter(|c| c.as_str() == code)
                .ok_or_else(|| ConfigError::InvalidClientCode(code.clone()))?;
            codes.insert(parsed.as_str().to_string());
        }

        let lookup = |code: &str, context: &str| -> Result<ClientCode, ConfigError> {
            ClientCode::parse(code)
                .filter(|c| codes.contains(c.as_str()))
                .ok_or_else(|| {
                    ConfigError::InvalidConfig(format!(
                        "{context} points at unregistered client code '{code}'"
                    ))
                })
        };

        let aliases = clients
            .aliases
            .iter()
            .map(|a| Ok((a.alias.to_lowercase(), lookup(&a.code, &a.alias)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let domains = clients
            .domains
            .iter()
            .map(|d| Ok((d.domain.to_lowercase(), lookup(&d.code, &d.domain)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            codes,
            aliases,
            domains,
        })
    }

    pub fn is_valid_code(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// Resolve a caller-supplied client: a registered code in any case, or
    /// a client name that equals a configured alias
    pub fn resolve_client(&self, input: &str) -> Option<ClientCode> {
        let wanted = input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if let Some((_, code)) = self.aliases.iter().find(|(alias, _)| *alias == wanted) {
            return Some(code.clone());
        }

        ClientCode::parse(&wanted).filter(|code| self.is_valid_code(code.as_str()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

/// Job number and client code extraction over a fixed registry
#[derive(Debug, Clone)]
pub struct Extractor {
    registry: ClientRegistry,
    job_pattern: Regex,
    code_pattern: Regex,
}

impl Extractor {
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            registry,
            job_pattern: Regex::new(r"(?i)\b([a-z]{3})\s+([0-9]{3})\b").expect("job pattern is valid"),
            code_pattern: Regex::new(r"\b[A-Z]{3}\b").expect("code pattern is valid"),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// First job number in scan order whose prefix is a registered client code
    pub fn extract_job_number(&self, text: &str) -> Option<JobNumber> {
        for captures in self.job_pattern.captures_iter(text) {
            let prefix = captures[1].to_ascii_uppercase();
            if !self.registry.is_valid_code(&prefix) {
                continue;
            }

            let Some(job) = JobNumber::parse(&format!("{} {}", prefix, &captures[2])) else {
                continue;
            };
            debug!(job_number = %job, "Extracted job number");
            return Some(job);
        }
        None
    }

    /// Standalone client code first, then the alias table
    pub fn extract_client_code(&self, text: &str) -> Option<ClientCode> {
        if let Some(code) = self
            .code_pattern
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|candidate| self.registry.is_valid_code(candidate))
        {
            return ClientCode::parse(code);
        }

        let lowered = text.to_lowercase();
        self.registry
            .aliases
            .iter()
            .find(|(alias, _)| lowered.contains(alias.as_str()))
            .map(|(_, code)| code.clone())
    }

    /// Client inferred from the sender's email domain
    pub fn client_from_sender(&self, sender_email: &str) -> Option<ClientCode> {
        let domain = sender_email.rsplit_once('@')?.1.trim().to_lowercase();
        if domain.is_empty() {
            return None;
        }

        self.registry
            .domains
            .iter()
            .find(|(known, _)| domain.contains(known.as_str()))
            .map(|(_, code)| code.clone())
    }

    /// Try each text in order, returning the first job number found
    pub fn first_job_number<'a>(
        &self,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Option<JobNumber> {
        texts
            .into_iter()
            .find_map(|text| self.extract_job_number(text))
    }

    /// Try each text in order, returning the first client code found
    pub fn first_client_code<'a>(
        &self,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Option<ClientCode> {
        texts
            .into_iter()
            .find_map(|text| self.extract_client_code(text))
    }
}
