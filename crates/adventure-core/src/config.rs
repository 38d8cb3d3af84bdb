use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::ai::{GenerateOptions, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::ai::ollama::DEFAULT_OLLAMA_URL;
use crate::ai::openai::DEFAULT_OPENAI_URL;
use crate::provider::Provider;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub ollama_url: String,
    pub openai_url: String,
    pub openai_api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some("ollama".to_string()),
            default_model: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openai_url: DEFAULT_OPENAI_URL.to_string(),
            openai_api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save()
    }

    /// Configured provider, falling back to Ollama for unknown names
    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Ollama)
    }

    /// `OPENAI_API_KEY` wins over the file
    pub fn resolved_openai_key(&self) -> Option<String> {
        self.openai_key_with(std::env::var("OPENAI_API_KEY").ok())
    }

    /// A blank environment key counts as unset
    fn openai_key_with(&self, env_key: Option<String>) -> Option<String> {
        env_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.openai_api_key.clone())
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature.clamp(0.0, 2.0),
            max_tokens: self.max_tokens.max(1),
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("text-adventure").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_openai_key_precedence() {
        let mut config = Config::new();
        assert_eq!(config.openai_key_with(None), None);
        assert_eq!(config.openai_key_with(Some("sk-env".into())).as_deref(), Some("sk-env"));

        config.openai_api_key = Some("sk-file".to_string());
        assert_eq!(config.openai_key_with(Some("sk-env".into())).as_deref(), Some("sk-env"));
        assert_eq!(config.openai_key_with(Some(String::new())).as_deref(), Some("sk-file"));
        assert_eq!(config.openai_key_with(Some("  ".into())).as_deref(), Some("sk-file"));
        assert_eq!(config.openai_key_with(None).as_deref(), Some("sk-file"));
    }

    #[test]
    fn test_openai_key_from_environment() {
        // The only test in this crate that touches OPENAI_API_KEY
        let previous = std::env::var("OPENAI_API_KEY").ok();
        let mut config = Config::new();
        config.openai_api_key = Some("sk-file".to_string());

        std::env::set_var("OPENAI_API_KEY", "sk-env");
        assert_eq!(config.resolved_openai_key().as_deref(), Some("sk-env"));
        std::env::set_var("OPENAI_API_KEY", "");
        assert_eq!(config.resolved_openai_key().as_deref(), Some("sk-file"));
        std::env::remove_var("OPENAI_API_KEY");
        assert_eq!(config.resolved_openai_key().as_deref(), Some("sk-file"));

        if let Some(key) = previous {
            std::env::set_var("OPENAI_API_KEY", key);
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Ollama);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.provider = Some("openai".to_string());
        config.default_model = Some("gpt-4o".to_string());
        config.max_tokens = 256;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.provider(), Provider::OpenAI);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"default_model":"mistral:7b"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_model.as_deref(), Some("mistral:7b"));
        assert_eq!(config.ollama_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_generate_options_are_clamped() {
        let mut config = Config::new();
        config.temperature = 9.0;
        config.max_tokens = 0;
        let options = config.generate_options();
        assert_eq!(options.temperature, 2.0);
        assert_eq!(options.max_tokens, 1);
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let mut config = Config::new();
        config.provider = Some("carrier-pigeon".to_string());
        assert_eq!(config.provider(), Provider::Ollama);
    }
}
