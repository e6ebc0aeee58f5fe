use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use url::Url;

pub const CLAUDE_API_BASE: &str = "https://api.anthropic.com";

const ANTHROPIC_BETA: &str =
    "oauth-2025-04-20,claude-code-20250219,interleaved-thinking-2025-05-14,fine-grained-tool-streaming-2025-05-14";

/// `{base}/v1/messages?beta=true`, base defaulting to the public Anthropic API.
pub fn claude_url(base_override: Option<&Url>) -> Url {
    let mut url = base_override
        .cloned()
        .unwrap_or_else(|| Url::parse(CLAUDE_API_BASE).expect("fixed Claude base URL"));
    url.set_path("/v1/messages");
    url.set_query(Some("beta=true"));
    url
}

/// Hand-assembled "Stainless SDK" header set Claude-Code OAuth expects from a
/// non-CLI caller (§6).
pub fn claude_headers(access_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("valid auth header"),
    );
    headers.insert(
        "anthropic-beta",
        HeaderValue::from_static(ANTHROPIC_BETA),
    );
    headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
    headers.insert("x-stainless-lang", HeaderValue::from_static("js"));
    headers.insert("x-stainless-package-version", HeaderValue::from_static("0.39.0"));
    headers.insert("x-stainless-os", HeaderValue::from_static("Linux"));
    headers.insert("x-stainless-arch", HeaderValue::from_static("x64"));
    headers.insert("x-stainless-runtime", HeaderValue::from_static("node"));
    headers.insert("x-stainless-runtime-version", HeaderValue::from_static("20.18.1"));
    headers.insert(
        "x-stainless-retry-count",
        HeaderValue::from_static("0"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_carries_beta_query() {
        let url = claude_url(None);
        assert_eq!(url.as_str(), "https://api.anthropic.com/v1/messages?beta=true");
    }

    #[test]
    fn base_override_keeps_fixed_path_and_query() {
        let base = Url::parse("https://proxy.internal").unwrap();
        let url = claude_url(Some(&base));
        assert_eq!(url.as_str(), "https://proxy.internal/v1/messages?beta=true");
    }

    #[test]
    fn headers_carry_bearer_and_beta_flags() {
        let headers = claude_headers("tok_123");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok_123");
        assert!(headers.get("anthropic-beta").unwrap().to_str().unwrap().contains("oauth-2025-04-20"));
    }
}
