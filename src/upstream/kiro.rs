use reqwest::header::{AUTHORIZATION, CONNECTION, HeaderMap, HeaderValue, USER_AGENT};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

const DEFAULT_MACHINE_ID_SEED: &str = "KIRO_DEFAULT_MACHINE";

/// `https://codewhisperer.{region}.amazonaws.com/{generateAssistantResponse|SendMessageStreaming}` (§6).
pub fn kiro_url(region: &str, is_amazon_q_model: bool) -> Url {
    let path = if is_amazon_q_model {
        "SendMessageStreaming"
    } else {
        "generateAssistantResponse"
    };
    Url::parse(&format!("https://codewhisperer.{region}.amazonaws.com/{path}"))
        .expect("region-interpolated Kiro URL must be valid")
}

/// SHA-256 hex of `uuid ?? profileArn ?? clientId ?? "KIRO_DEFAULT_MACHINE"` (§6).
pub fn kiro_machine_id(uuid: Option<&str>, profile_arn: Option<&str>, client_id: Option<&str>) -> String {
    let seed = uuid
        .or(profile_arn)
        .or(client_id)
        .unwrap_or(DEFAULT_MACHINE_ID_SEED);
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn kiro_headers(access_token: &str, machine_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("valid auth header"),
    );
    headers.insert(
        "amz-sdk-invocation-id",
        HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("uuid is valid header value"),
    );
    headers.insert(
        "amz-sdk-request",
        HeaderValue::from_static("attempt=1; max=1"),
    );
    headers.insert(
        "x-amzn-kiro-agent-mode",
        HeaderValue::from_static("vibe"),
    );
    headers.insert(
        "x-amz-user-agent",
        HeaderValue::from_str(&format!("aws-sdk-js/1.0.0 KiroIDE-0.7.5-{machine_id}"))
            .expect("machine id is hex, always a valid header value"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static("aws-sdk-js/1.0.0 linux/x64 node/20.18.1"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    headers
}

mod hex {
    pub(super) fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_picks_amazon_q_path() {
        assert_eq!(
            kiro_url("us-east-1", true).as_str(),
            "https://codewhisperer.us-east-1.amazonaws.com/SendMessageStreaming"
        );
        assert_eq!(
            kiro_url("us-east-1", false).as_str(),
            "https://codewhisperer.us-east-1.amazonaws.com/generateAssistantResponse"
        );
    }

    #[test]
    fn machine_id_prefers_uuid_over_other_seeds() {
        let from_uuid = kiro_machine_id(Some("abc"), Some("profile"), Some("client"));
        let from_profile = kiro_machine_id(None, Some("profile"), Some("client"));
        assert_ne!(from_uuid, from_profile);
    }

    #[test]
    fn machine_id_falls_back_to_default_seed() {
        let default_hash = kiro_machine_id(None, None, None);
        let explicit_hash = kiro_machine_id(Some("KIRO_DEFAULT_MACHINE"), None, None);
        assert_eq!(default_hash, explicit_hash);
        assert_eq!(default_hash.len(), 64);
    }

    #[test]
    fn headers_embed_machine_id_in_amz_user_agent() {
        let headers = kiro_headers("tok", "deadbeef");
        assert!(
            headers
                .get("x-amz-user-agent")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("KiroIDE-0.7.5-deadbeef")
        );
        assert_eq!(headers.get(CONNECTION).unwrap(), "close");
    }
}
