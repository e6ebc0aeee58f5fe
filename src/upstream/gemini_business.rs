use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

const GEMINI_BUSINESS_BASE: &str = "https://cloudsearch.google.com/v1/widget";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// The four fixed widget endpoints the business-session transport exposes
/// (§6). JWT minting itself lives in `credential::business_jwt`; this module
/// only assembles the URL and the headers that carry the minted token.
pub enum WidgetEndpoint {
    CreateSession,
    StreamAssist,
    AddContextFile,
    ListSessionFileMetadata,
}

impl WidgetEndpoint {
    fn path_segment(&self) -> &'static str {
        match self {
            WidgetEndpoint::CreateSession => "widgetCreateSession",
            WidgetEndpoint::StreamAssist => "widgetStreamAssist",
            WidgetEndpoint::AddContextFile => "widgetAddContextFile",
            WidgetEndpoint::ListSessionFileMetadata => "widgetListSessionFileMetadata",
        }
    }
}

pub fn gemini_business_url(base_override: Option<&Url>, endpoint: WidgetEndpoint) -> Url {
    let base = base_override
        .cloned()
        .unwrap_or_else(|| Url::parse(GEMINI_BUSINESS_BASE).expect("fixed business base URL"));
    base.join(endpoint.path_segment())
        .expect("widget path segment is a valid relative URL")
}

/// `JWT` carries the minted token (§4.8); there is no `Authorization: Bearer`
/// for this transport.
pub fn gemini_business_headers(jwt: &str, user_agent_override: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "JWT",
        HeaderValue::from_str(jwt).expect("minted jwt is ascii, always a valid header value"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent_override.unwrap_or(DEFAULT_USER_AGENT))
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_resolves_each_widget_path() {
        assert_eq!(
            gemini_business_url(None, WidgetEndpoint::CreateSession).as_str(),
            "https://cloudsearch.google.com/v1/widgetCreateSession"
        );
        assert_eq!(
            gemini_business_url(None, WidgetEndpoint::StreamAssist).as_str(),
            "https://cloudsearch.google.com/v1/widgetStreamAssist"
        );
    }

    #[test]
    fn jwt_header_carries_raw_token_not_bearer_prefixed() {
        let headers = gemini_business_headers("header.payload.sig", None);
        assert_eq!(headers.get("JWT").unwrap(), "header.payload.sig");
        assert!(headers.get("Authorization").is_none());
    }

    #[test]
    fn user_agent_override_replaces_default() {
        let headers = gemini_business_headers("jwt", Some("custom-ua/1.0"));
        assert_eq!(headers.get(USER_AGENT).unwrap(), "custom-ua/1.0");
    }
}
