//! API key lookup
//!
//! The core only asks for a key by logical name. An empty string means the
//! source is unavailable and callers degrade instead of failing.

use std::collections::HashMap;
use std::env;

pub trait CredentialProvider: Send + Sync {
    fn api_key(&self, name: &str) -> String;
}

/// Reads keys from the environment, trying every known alias for a name.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    aliases: HashMap<String, Vec<String>>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        let mut aliases = HashMap::new();
        aliases.insert(
            "OPENROUTER".to_string(),
            vec!["OPENROUTER_KEY", "OPENROUTER_API_KEY", "OPENROUTER"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        aliases.insert(
            "NEWS_API".to_string(),
            vec!["NEWS_API_KEY", "NEWS_API"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        aliases.insert(
            "FRED".to_string(),
            vec!["FRED_API_KEY", "FRED_KEY", "FRED"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        Self { aliases }
    }

    pub fn with_alias(mut self, name: &str, variable: &str) -> Self {
        self.aliases
            .entry(name.to_string())
            .or_default()
            .push(variable.to_string());
        self
    }

    fn candidates(&self, name: &str) -> Vec<String> {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| vec![name.to_string()])
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentials {
    fn api_key(&self, name: &str) -> String {
        self.candidates(name)
            .iter()
            .filter_map(|variable| env::var(variable).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }
}

/// Fixed key table, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, key: &str) -> Self {
        self.keys.insert(name.to_string(), key.to_string());
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self, name: &str) -> String {
        self.keys.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_credentials_tries_aliases_in_order() {
        env::set_var("ALPHA_TEST_KEY_B", "from-b");
        let creds = EnvCredentials::new()
            .with_alias("ALPHA_TEST", "ALPHA_TEST_KEY_A")
            .with_alias("ALPHA_TEST", "ALPHA_TEST_KEY_B");

        assert_eq!(creds.api_key("ALPHA_TEST"), "from-b");

        env::set_var("ALPHA_TEST_KEY_A", "from-a");
        assert_eq!(creds.api_key("ALPHA_TEST"), "from-a");

        env::remove_var("ALPHA_TEST_KEY_A");
        env::remove_var("ALPHA_TEST_KEY_B");
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        env::set_var("ALPHA_BLANK_KEY", "   ");
        let creds = EnvCredentials::new().with_alias("ALPHA_BLANK", "ALPHA_BLANK_KEY");
        assert_eq!(creds.api_key("ALPHA_BLANK"), "");
        env::remove_var("ALPHA_BLANK_KEY");
    }

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials::new().with("FRED", "abc");
        assert_eq!(creds.api_key("FRED"), "abc");
        assert_eq!(creds.api_key("NEWS_API"), "");
    }
}
