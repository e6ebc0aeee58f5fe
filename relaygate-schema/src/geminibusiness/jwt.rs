//! JWT header/payload shapes minted per request for the business-session
//! transport (see the credential module for the signing and byte-safe
//! base64url encoding this schema feeds into).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl JwtHeader {
    pub fn hs256(key_id: impl Into<String>) -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
            kid: key_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JwtPayload {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
}

impl JwtPayload {
    pub fn for_session(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        csesidx: &str,
        issued_at: i64,
    ) -> Self {
        Self {
            iss: issuer.into(),
            aud: audience.into(),
            sub: format!("csesidx/{csesidx}"),
            iat: issued_at,
            exp: issued_at + 300,
            nbf: issued_at,
        }
    }
}

/// `GET {xsrf endpoint}?csesidx=…` response, after stripping the
/// `)]}'` anti-JSON-hijacking prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XsrfTokenResponse {
    pub xsrf_token: String,
    pub key_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_payload_has_five_minute_expiry() {
        let payload = JwtPayload::for_session("relaygate", "gemini-business", "abc123", 1_000_000);
        assert_eq!(payload.sub, "csesidx/abc123");
        assert_eq!(payload.exp - payload.iat, 300);
        assert_eq!(payload.nbf, payload.iat);
    }

    #[test]
    fn header_is_hs256_jwt() {
        let header = JwtHeader::hs256("key-1");
        assert_eq!(header.alg, "HS256");
        assert_eq!(header.typ, "JWT");
    }
}
