use std::{collections::HashSet, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ticket::{SlotRules, DEFAULT_MIN_CITY_LENGTH, DEFAULT_MIN_NAME_LENGTH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on turns processed at once across conversations; 0 disables it.
    #[serde(default)]
    pub max_concurrent: usize,
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_burst() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
        }
    }
}

fn default_min_name_length() -> usize {
    DEFAULT_MIN_NAME_LENGTH
}

fn default_min_city_length() -> usize {
    DEFAULT_MIN_CITY_LENGTH
}

fn default_suggested_queries() -> Vec<String> {
    vec![
        "Buy a ticket".to_string(),
        "My tickets".to_string(),
        "Help".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    #[serde(default = "default_min_name_length")]
    pub min_name_length: usize,
    #[serde(default = "default_min_city_length")]
    pub min_city_length: usize,
    #[serde(default)]
    pub admin_url: String,
    #[serde(default = "default_suggested_queries")]
    pub suggested_queries: Vec<String>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            min_name_length: default_min_name_length(),
            min_city_length: default_min_city_length(),
            admin_url: String::new(),
            suggested_queries: default_suggested_queries(),
        }
    }
}

impl DialogConfig {
    pub fn slot_rules(&self) -> SlotRules {
        SlotRules {
            min_name_length: self.min_name_length,
            min_city_length: self.min_city_length,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    pub app: AppConfig,
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub dialog: DialogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: String,
    #[serde(default)]
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Checked in order; the first rule with a matching phrase wins.
    #[serde(default)]
    pub intents: Vec<IntentRule>,
    #[serde(default)]
    pub yes_words: Vec<String>,
    #[serde(default)]
    pub no_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightdeskConfig {
    pub main: MainConfig,
    pub recognizer: RecognizerConfig,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

pub fn load_config(root: &Path) -> Result<FlightdeskConfig> {
    let mut main: MainConfig = read_yaml_file(&root.join("main.yaml"))?;
    let recognizer: RecognizerConfig = read_yaml_file(&root.join("recognizer.yaml"))?;

    resolve_main_env(&mut main);

    let config = FlightdeskConfig { main, recognizer };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &FlightdeskConfig) -> Result<()> {
    let dialog = &config.main.dialog;
    if dialog.min_name_length == 0 {
        return Err(anyhow!("dialog.min_name_length must be greater than zero"));
    }
    if dialog.min_city_length == 0 {
        return Err(anyhow!("dialog.min_city_length must be greater than zero"));
    }
    if dialog.suggested_queries.is_empty() {
        return Err(anyhow!("dialog.suggested_queries must not be empty"));
    }

    let rate = &config.main.rate_limit;
    if rate.requests_per_minute == 0 || rate.burst == 0 {
        return Err(anyhow!(
            "rate_limit values must be greater than zero (requests_per_minute={}, burst={})",
            rate.requests_per_minute,
            rate.burst
        ));
    }

    let mut seen = HashSet::new();
    for rule in &config.recognizer.intents {
        if !seen.insert(rule.intent.as_str()) {
            return Err(anyhow!("duplicate intent in recognizer: {}", rule.intent));
        }
        if rule.phrases.is_empty() {
            return Err(anyhow!("intent {} has no phrases", rule.intent));
        }
    }

    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_main_env(main: &mut MainConfig) {
    main.app.name = resolve_env_var(&main.app.name);
    main.app.env = resolve_env_var(&main.app.env);
    main.dialog.admin_url = resolve_env_var(&main.dialog.admin_url);
}
