use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

pub const ANTIGRAVITY_API_BASE: &str = "https://daily-cloudcode-pa.googleapis.com";

fn build_provider_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    url.set_path(path);
    url.set_query(query);
    url
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    stream: Url,
    no_stream: Url,
}

impl ProviderEndpoints {
    fn new(
        base: Url,
        stream_path: &str,
        stream_query: Option<&str>,
        no_stream_path: &str,
        no_stream_query: Option<&str>,
    ) -> Self {
        Self {
            stream: build_provider_url(&base, stream_path, stream_query),
            no_stream: build_provider_url(&base, no_stream_path, no_stream_query),
        }
    }

    pub fn select(&self, stream: bool) -> &Url {
        if stream {
            &self.stream
        } else {
            &self.no_stream
        }
    }
}

/// `{base}/v1internal:{generateContent|streamGenerateContent?alt=sse}` (§6).
pub fn antigravity_endpoints(base: Option<&Url>) -> ProviderEndpoints {
    let base = base
        .cloned()
        .unwrap_or_else(|| Url::parse(ANTIGRAVITY_API_BASE).expect("fixed Antigravity base URL"));
    ProviderEndpoints::new(
        base,
        "/v1internal:streamGenerateContent",
        Some("alt=sse"),
        "/v1internal:generateContent",
        None,
    )
}

pub fn antigravity_headers(access_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("valid auth header"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static("antigravity/1.16.5 linux/amd64"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints_use_fixed_base() {
        let endpoints = antigravity_endpoints(None);
        assert_eq!(
            endpoints.select(false).as_str(),
            "https://daily-cloudcode-pa.googleapis.com/v1internal:generateContent"
        );
        assert_eq!(
            endpoints.select(true).as_str(),
            "https://daily-cloudcode-pa.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn headers_carry_antigravity_user_agent() {
        let headers = antigravity_headers("tok");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "antigravity/1.16.5 linux/amd64");
    }
}
