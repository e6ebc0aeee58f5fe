use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, REFERER};
use uuid::Uuid;

pub const FACTORY_MESSAGES_URL: &str = "https://app.factory.ai/api/llm/a/v1/messages";

/// Factory/WorkOS upstream headers; `x-session-id` and
/// `x-assistant-message-id` are freshly generated per request (§6).
pub fn factory_headers(access_token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("valid auth header"),
    );
    headers.insert("x-factory-client", HeaderValue::from_static("cli"));
    headers.insert(
        "x-session-id",
        HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("uuid is valid header value"),
    );
    headers.insert(
        "x-assistant-message-id",
        HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("uuid is valid header value"),
    );
    headers.insert(REFERER, HeaderValue::from_static("https://app.factory.ai/"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_and_message_ids_are_distinct_per_call() {
        let first = factory_headers("tok");
        let second = factory_headers("tok");
        assert_ne!(
            first.get("x-session-id").unwrap(),
            second.get("x-session-id").unwrap()
        );
    }

    #[test]
    fn carries_fixed_client_and_referer() {
        let headers = factory_headers("tok");
        assert_eq!(headers.get("x-factory-client").unwrap(), "cli");
        assert_eq!(headers.get(REFERER).unwrap(), "https://app.factory.ai/");
    }
}
