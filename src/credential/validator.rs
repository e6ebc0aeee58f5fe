use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tokio::sync::Mutex as AsyncMutex;

use crate::account::{Account, AccountId, AccountPoolHandle, ProviderTag};

use super::refresh::CredentialRefresher;
use super::variant::Credential;

const CLAUDE_FACTORY_SKEW: Duration = Duration::from_secs(60);
const KIRO_SKEW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub enum ValidatorOutcome {
    Valid(Credential),
    Disabled(String),
}

/// §4.3: per-provider expiry check, single-flight refresh, disable-on-failure.
pub struct CredentialValidator {
    refreshers: HashMap<ProviderTag, Arc<dyn CredentialRefresher>>,
    locks: Cache<AccountId, Arc<AsyncMutex<()>>>,
}

impl CredentialValidator {
    pub fn new(refreshers: HashMap<ProviderTag, Arc<dyn CredentialRefresher>>) -> Self {
        Self {
            refreshers,
            locks: Cache::builder().build(),
        }
    }

    pub async fn ensure_valid(&self, pool: &AccountPoolHandle, account: &Account) -> ValidatorOutcome {
        if !credential_is_expired(&account.credential) {
            return ValidatorOutcome::Valid(account.credential.clone());
        }

        let lock = self
            .locks
            .get_with(account.id, || Arc::new(AsyncMutex::new(())));
        let _guard = lock.lock().await;

        // Another request may have refreshed while we waited for the lock.
        let current = pool
            .try_get(account.id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| account.clone());
        if !credential_is_expired(&current.credential) {
            return ValidatorOutcome::Valid(current.credential);
        }

        let Some(refresher) = self.refreshers.get(&current.provider) else {
            pool.disable(current.id).await;
            return ValidatorOutcome::Disabled("no refresher configured for provider".to_string());
        };

        match refresher.refresh(&current).await {
            Ok(credential) if credential_token_is_empty(&credential) => {
                pool.disable(current.id).await;
                ValidatorOutcome::Disabled("refresh returned an empty token".to_string())
            }
            Ok(credential) => {
                pool.update_credential(current.id, credential.clone()).await;
                ValidatorOutcome::Valid(credential)
            }
            Err(e) => {
                pool.disable(current.id).await;
                ValidatorOutcome::Disabled(e.to_string())
            }
        }
    }
}

fn credential_is_expired(credential: &Credential) -> bool {
    let now = Utc::now();
    match credential {
        Credential::OpenAi { .. } => false,
        Credential::OauthBearer {
            expires_at_unix, ..
        } => *expires_at_unix <= now.timestamp() + CLAUDE_FACTORY_SKEW.as_secs() as i64,
        Credential::Gemini { expiry, .. } => DateTime::parse_from_rfc3339(expiry)
            .map(|dt| dt.with_timezone(&Utc) <= now)
            .unwrap_or(true),
        Credential::GeminiBusiness { .. } => false,
        Credential::Kiro { expires_at, .. } => DateTime::parse_from_rfc3339(expires_at)
            .map(|dt| dt.with_timezone(&Utc) <= now + chrono::Duration::seconds(KIRO_SKEW.as_secs() as i64))
            .unwrap_or(true),
    }
}

fn credential_token_is_empty(credential: &Credential) -> bool {
    match credential {
        Credential::OpenAi { api_key } => api_key.trim().is_empty(),
        Credential::OauthBearer { access_token, .. } => access_token.trim().is_empty(),
        Credential::Gemini { token, .. } => token.trim().is_empty(),
        Credential::GeminiBusiness { secure_c_ses, .. } => secure_c_ses.trim().is_empty(),
        Credential::Kiro { access_token, .. } => access_token.trim().is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_factory_expired_within_skew_window() {
        let now = Utc::now().timestamp();
        let cred = Credential::OauthBearer {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at_unix: now + 30,
        };
        assert!(credential_is_expired(&cred));
    }

    #[test]
    fn claude_factory_valid_outside_skew_window() {
        let now = Utc::now().timestamp();
        let cred = Credential::OauthBearer {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at_unix: now + 3600,
        };
        assert!(!credential_is_expired(&cred));
    }

    #[test]
    fn gemini_business_never_expires_here() {
        let cred = Credential::GeminiBusiness {
            secure_c_ses: "s".into(),
            csesidx: "c".into(),
            host_c_oses: None,
            config_id: "cfg".into(),
            disabled: false,
        };
        assert!(!credential_is_expired(&cred));
    }

    #[test]
    fn kiro_unparsable_expiry_is_treated_as_expired() {
        let cred = Credential::Kiro {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: "not-a-date".into(),
            region: "us-east-1".into(),
            profile_arn: "arn".into(),
            auth_method: "social".into(),
            client_id: None,
            client_secret: None,
            machine_id_seed: "seed".into(),
        };
        assert!(credential_is_expired(&cred));
    }
}
