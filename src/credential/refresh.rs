use async_trait::async_trait;

use crate::account::Account;
use crate::error::GatewayError;

use super::Credential;

/// Per-provider token refresh. The OAuth exchange itself (device code,
/// authorization code, browser flow) is an external collaborator; this trait
/// is the seam the credential validator calls into on expiry.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, account: &Account) -> Result<Credential, GatewayError>;
}

/// A refresher that always fails; used for provider tags that have no
/// refresh flow wired up yet (e.g. the `OpenAi` api-key variant, which
/// never expires and is never refreshed).
pub struct NoRefresh;

#[async_trait]
impl CredentialRefresher for NoRefresh {
    async fn refresh(&self, _account: &Account) -> Result<Credential, GatewayError> {
        Err(GatewayError::CredentialRefreshFailed(
            "no refresh flow configured for this provider".to_string(),
        ))
    }
}
