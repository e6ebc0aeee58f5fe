use serde::{Deserialize, Serialize};
use url::Url;

use super::ProviderDefaults;

/// Gemini-Business (reverse session) provider configuration managed by Figment (§4.9, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiBusinessConfig {
    /// Widget endpoint base URL override.
    /// TOML: `providers.gemini_business.api_url`.
    #[serde(default)]
    pub api_url: Option<Url>,

    /// Optional upstream HTTP proxy. Falls back to `providers.defaults.proxy`.
    /// TOML: `providers.gemini_business.proxy`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Max retry attempts (§4.6 fixes this at 3, overridable for testing).
    /// TOML: `providers.gemini_business.retry_max_times`.
    #[serde(default)]
    pub retry_max_times: Option<usize>,

    /// `GeminiBusiness:UserAgent` override sent to business endpoints.
    /// TOML: `providers.gemini_business.user_agent`.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// `GeminiBusiness:ImageGeneration:Enabled`. Default: `true`.
    /// TOML: `providers.gemini_business.image_generation_enabled`.
    #[serde(default = "default_image_generation_enabled")]
    pub image_generation_enabled: bool,

    /// `GeminiBusiness:ContextFiles:MaxBytes`. Default: 100 MB.
    /// TOML: `providers.gemini_business.context_files_max_bytes`.
    #[serde(default = "default_context_files_max_bytes")]
    pub context_files_max_bytes: u64,

    /// `GeminiBusiness:ContextFiles:DownloadTimeoutSeconds`. Default: 30.
    /// TOML: `providers.gemini_business.context_files_download_timeout_seconds`.
    #[serde(default = "default_context_files_download_timeout_seconds")]
    pub context_files_download_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct GeminiBusinessResolvedConfig {
    pub api_url: Option<Url>,
    pub proxy: Option<Url>,
    pub retry_max_times: usize,
    pub user_agent: Option<String>,
    pub image_generation_enabled: bool,
    pub context_files_max_bytes: u64,
    pub context_files_download_timeout_seconds: u64,
}

impl GeminiBusinessConfig {
    pub fn resolve(&self, defaults: &ProviderDefaults) -> GeminiBusinessResolvedConfig {
        GeminiBusinessResolvedConfig {
            api_url: self.api_url.clone(),
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
            retry_max_times: self.retry_max_times.unwrap_or(3),
            user_agent: self.user_agent.clone(),
            image_generation_enabled: self.image_generation_enabled,
            context_files_max_bytes: self.context_files_max_bytes,
            context_files_download_timeout_seconds: self.context_files_download_timeout_seconds,
        }
    }
}

impl Default for GeminiBusinessConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            proxy: None,
            retry_max_times: None,
            user_agent: None,
            image_generation_enabled: default_image_generation_enabled(),
            context_files_max_bytes: default_context_files_max_bytes(),
            context_files_download_timeout_seconds: default_context_files_download_timeout_seconds(),
        }
    }
}

fn default_image_generation_enabled() -> bool {
    true
}

fn default_context_files_max_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_context_files_download_timeout_seconds() -> u64 {
    30
}
