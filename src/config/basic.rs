use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Basic (core) configuration managed by Figment (§4.9).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// HTTP server listen address (e.g., "0.0.0.0", "127.0.0.1").
    /// TOML: `basic.listen_addr`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port.
    /// TOML: `basic.listen_port`. Default: `8188`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default)]
    pub loglevel: String,

    /// Authentication key for inbound request validation (required, non-empty).
    /// TOML: `basic.gateway_key`. Must be provided.
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_string_lax")]
    pub gateway_key: String,

    /// Upstream HTTP proxy shared by all providers unless overridden.
    /// TOML: `basic.proxy`.
    #[serde(default)]
    pub proxy: Option<url::Url>,

    /// Disables TLS certificate validation for the Anthropic-family client pool.
    /// Env: `ANTIGRAVITY_SKIP_TLS_VALIDATE`. Hazardous; debugging only.
    #[serde(default)]
    pub antigravity_skip_tls_validate: bool,

    /// Allow HTTP/2 multiplexing for reqwest clients; disabled forces HTTP/1.
    /// TOML: `basic.enable_multiplexing`. Default: `true`.
    #[serde(default = "default_enable_multiplexing")]
    pub enable_multiplexing: bool,
}

impl BasicConfig {
    /// Connection pool idle lifetime for the Anthropic-family client pool (§5).
    pub fn anthropic_pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(600)
    }

    /// Connection pool idle lifetime for the Kiro client pool (§5).
    pub fn kiro_pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(300)
    }
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            loglevel: "info".to_string(),
            // No insecure default. `Config::from_toml()` enforces non-empty.
            gateway_key: "".to_string(),
            proxy: None,
            antigravity_skip_tls_validate: false,
            enable_multiplexing: default_enable_multiplexing(),
        }
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected a string or a number for basic.gateway_key",
        )),
    }
}

fn default_enable_multiplexing() -> bool {
    true
}

/// Default IP address for the HTTP server listen address.
fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

/// Default port for the HTTP server.
fn default_listen_port() -> u16 {
    8188
}
