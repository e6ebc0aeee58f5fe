use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

/// `{Gemini:CodeAssistEndpoint}/v1internal:{generateContent|streamGenerateContent?alt=sse}` (§6).
pub fn gemini_codeassist_url(endpoint: &Url, stream: bool) -> Url {
    let mut url = endpoint.clone();
    if stream {
        url.set_path(&format!("{}/v1internal:streamGenerateContent", endpoint.path().trim_end_matches('/')));
        url.set_query(Some("alt=sse"));
    } else {
        url.set_path(&format!("{}/v1internal:generateContent", endpoint.path().trim_end_matches('/')));
    }
    url
}

pub fn gemini_codeassist_headers(access_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("valid auth header"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static("GeminiCLI/0.1.5 (linux; x64)"),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_carries_sse_query() {
        let endpoint = Url::parse("https://cloudcode-pa.googleapis.com").unwrap();
        let url = gemini_codeassist_url(&endpoint, true);
        assert_eq!(
            url.as_str(),
            "https://cloudcode-pa.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn non_stream_url_has_no_query() {
        let endpoint = Url::parse("https://cloudcode-pa.googleapis.com").unwrap();
        let url = gemini_codeassist_url(&endpoint, false);
        assert_eq!(
            url.as_str(),
            "https://cloudcode-pa.googleapis.com/v1internal:generateContent"
        );
    }
}
