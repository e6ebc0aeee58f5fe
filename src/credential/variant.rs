use serde::{Deserialize, Serialize};

/// Per-provider credential blob, modeled as a tagged variant rather than a
/// flat bag of optional fields. Exactly one variant matches an account's
/// provider tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// Plain OpenAI-compatible API key; no expiry to track.
    OpenAi { api_key: String },

    /// Shared shape for Claude-Code OAuth and Factory/WorkOS OAuth.
    OauthBearer {
        access_token: String,
        refresh_token: String,
        expires_at_unix: i64,
    },

    Gemini {
        token: String,
        refresh_token: String,
        /// RFC3339, UTC.
        expiry: String,
        project_id: String,
    },

    GeminiBusiness {
        secure_c_ses: String,
        csesidx: String,
        host_c_oses: Option<String>,
        config_id: String,
        disabled: bool,
    },

    Kiro {
        access_token: String,
        refresh_token: String,
        /// RFC3339.
        expires_at: String,
        region: String,
        profile_arn: String,
        auth_method: String,
        client_id: Option<String>,
        client_secret: Option<String>,
        machine_id_seed: String,
    },
}

impl Credential {
    /// The bearer-style token a provider's `Authorization` header expects.
    /// `GeminiBusiness` has no such token (it authenticates via cookie + a
    /// minted JWT instead), so it returns `None`.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Credential::OpenAi { api_key } => Some(api_key),
            Credential::OauthBearer { access_token, .. } => Some(access_token),
            Credential::Gemini { token, .. } => Some(token),
            Credential::Kiro { access_token, .. } => Some(access_token),
            Credential::GeminiBusiness { .. } => None,
        }
    }

    pub fn provider_matches(&self, provider: crate::account::ProviderTag) -> bool {
        use crate::account::ProviderTag as P;
        matches!(
            (self, provider),
            (Credential::OpenAi { .. }, P::OpenAi)
                | (Credential::OauthBearer { .. }, P::Claude | P::Factory)
                | (Credential::Gemini { .. }, P::Gemini | P::GeminiAntigravity)
                | (Credential::GeminiBusiness { .. }, P::GeminiBusiness)
                | (Credential::Kiro { .. }, P::Kiro)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ProviderTag;

    #[test]
    fn oauth_bearer_matches_claude_and_factory_only() {
        let cred = Credential::OauthBearer {
            access_token: "t".into(),
            refresh_token: "r".into(),
            expires_at_unix: 0,
        };
        assert!(cred.provider_matches(ProviderTag::Claude));
        assert!(cred.provider_matches(ProviderTag::Factory));
        assert!(!cred.provider_matches(ProviderTag::Kiro));
    }

    #[test]
    fn serializes_with_type_tag() {
        let cred = Credential::Kiro {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: "2026-01-01T00:00:00Z".into(),
            region: "us-east-1".into(),
            profile_arn: "arn:aws:x".into(),
            auth_method: "social".into(),
            client_id: None,
            client_secret: None,
            machine_id_seed: "seed".into(),
        };
        let v = serde_json::to_value(&cred).unwrap();
        assert_eq!(v["type"], "kiro");
    }
}
