use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use moka::sync::Cache;
use relaygate_schema::geminibusiness::{JwtHeader, JwtPayload, XsrfTokenResponse};
use sha2::Sha256;
use tokio::sync::Mutex as AsyncMutex;

use crate::account::AccountId;
use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

const JWT_CACHE_TTL: Duration = Duration::from_secs(270);
const ANTI_HIJACKING_PREFIX: &str = ")]}'";

/// Mints and caches the per-call JWT the business-session transport requires
/// (§4.8). The encoding quirk here — per-UTF-16-code-unit byte splitting
/// before base64url — is a required bit-exact reproduction of the upstream,
/// not a stylistic choice.
pub struct BusinessJwtMinter {
    client: reqwest::Client,
    cache: Cache<AccountId, Arc<String>>,
    locks: Cache<AccountId, Arc<AsyncMutex<()>>>,
}

impl BusinessJwtMinter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: Cache::builder().time_to_live(JWT_CACHE_TTL).build(),
            locks: Cache::builder().build(),
        }
    }

    pub async fn mint_or_get(
        &self,
        account_id: AccountId,
        xsrf_endpoint: &str,
        cookie: &str,
        csesidx: &str,
        issuer: &str,
        audience: &str,
        issued_at: i64,
    ) -> Result<Arc<String>, GatewayError> {
        if let Some(cached) = self.cache.get(&account_id) {
            return Ok(cached);
        }

        let lock = self
            .locks
            .get_with(account_id, || Arc::new(AsyncMutex::new(())));
        let _guard = lock.lock().await;

        if let Some(cached) = self.cache.get(&account_id) {
            return Ok(cached);
        }

        let jwt = self
            .mint(xsrf_endpoint, cookie, csesidx, issuer, audience, issued_at)
            .await?;
        let jwt = Arc::new(jwt);
        self.cache.insert(account_id, jwt.clone());
        Ok(jwt)
    }

    async fn mint(
        &self,
        xsrf_endpoint: &str,
        cookie: &str,
        csesidx: &str,
        issuer: &str,
        audience: &str,
        issued_at: i64,
    ) -> Result<String, GatewayError> {
        let resp = self
            .client
            .get(xsrf_endpoint)
            .query(&[("csesidx", csesidx)])
            .header("Cookie", cookie)
            .send()
            .await?;
        let raw = resp.text().await?;
        let stripped = raw.strip_prefix(ANTI_HIJACKING_PREFIX).unwrap_or(&raw);
        let xsrf: XsrfTokenResponse = serde_json::from_str(stripped)
            .map_err(|e| GatewayError::StreamProtocol(format!("bad xsrf response: {e}")))?;

        let hmac_key = URL_SAFE_NO_PAD
            .decode(xsrf.xsrf_token.as_bytes())
            .map_err(|e| GatewayError::StreamProtocol(format!("bad xsrf token encoding: {e}")))?;

        let header = JwtHeader::hs256(xsrf.key_id);
        let payload = JwtPayload::for_session(issuer, audience, csesidx, issued_at);

        let header_b64 = encode_segment(&serde_json::to_string(&header)?);
        let payload_b64 = encode_segment(&serde_json::to_string(&payload)?);
        let signing_input = format!("{header_b64}.{payload_b64}");

        let mut mac = HmacSha256::new_from_slice(&hmac_key)
            .map_err(|e| GatewayError::StreamProtocol(format!("bad hmac key: {e}")))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }
}

/// Byte-safe encode + base64url(no padding) of a JSON string. For each UTF-16
/// code unit: values above 255 are split into low-byte then high-byte;
/// values at or below 255 are emitted as a single byte.
fn encode_segment(json: &str) -> String {
    let mut bytes = Vec::with_capacity(json.len());
    for unit in json.encode_utf16() {
        if unit > 0xFF {
            bytes.push((unit & 0xFF) as u8);
            bytes.push((unit >> 8) as u8);
        } else {
            bytes.push(unit as u8);
        }
    }
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_json_encodes_one_byte_per_char() {
        let encoded = encode_segment(r#"{"a":1}"#);
        let decoded = URL_SAFE_NO_PAD.decode(encoded).unwrap();
        assert_eq!(decoded, br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn non_ascii_code_unit_splits_into_two_bytes() {
        // U+0100 (256) must appear as low-byte 0x00 then high-byte 0x01.
        let encoded = encode_segment("\u{100}");
        let decoded = URL_SAFE_NO_PAD.decode(encoded).unwrap();
        assert_eq!(decoded, vec![0x00, 0x01]);
    }

    #[test]
    fn output_has_no_padding_characters() {
        let encoded = encode_segment("{}");
        assert!(!encoded.contains('='));
    }
}
