use std::time::Duration;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const DEFAULT_MODEL: &str = "gpt-4-turbo";

/// Request settings that stay fixed for the life of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: chat_endpoint(DEFAULT_BASE_URL),
            model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            max_tokens: 4095,
            top_p: 1.0,
            timeout: Duration::from_secs(10),
        }
    }
}

impl CompletionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(base) = non_blank(lookup(BASE_URL_VAR)) {
            config.endpoint = chat_endpoint(&base);
        }
        config
    }
}

/// Reads the bearer credential. Blank values count as missing.
pub fn api_key_from_env() -> Option<String> {
    api_key_from_lookup(|name| std::env::var(name).ok())
}

pub fn api_key_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    non_blank(lookup(API_KEY_VAR))
}

fn chat_endpoint(base: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), CHAT_COMPLETIONS_PATH)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
