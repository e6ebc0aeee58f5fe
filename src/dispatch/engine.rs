use std::future::Future;

use reqwest::StatusCode;

use crate::account::{Account, AccountId, AccountPoolHandle, ProviderTag, TriedSet};
use crate::credential::{Credential, CredentialValidator, ValidatorOutcome};
use crate::dispatch::classify::ActionForError;

/// What a single attempt's send closure reports back to the loop.
pub enum AttemptError {
    /// Classified as retryable; apply `action` to the account, then retry if
    /// the attempt budget allows.
    Retryable {
        action: ActionForError,
        status: StatusCode,
        message: String,
    },
    /// Classified as final (class-1/4 per §4.6 step 5); surface to the
    /// caller immediately with no further attempts.
    Terminal { status: StatusCode, message: String },
}

#[derive(Debug, Clone, Copy)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub account_id: AccountId,
}

pub struct DispatchOutcome<R> {
    pub result: Result<R, (StatusCode, String)>,
    pub attempts: Vec<AttemptRecord>,
}

/// Drives the per-request retry loop (§4.6): selects an account, validates
/// its credential, hands both to the caller's send closure, and classifies
/// the result to decide whether to retry with a different account.
///
/// Sticky-map bookkeeping and request logging are the caller's
/// responsibility — this engine only owns account selection, credential
/// validation, and the attempt budget.
pub struct DispatchEngine {
    pool: AccountPoolHandle,
    validator: CredentialValidator,
}

impl DispatchEngine {
    pub fn new(pool: AccountPoolHandle, validator: CredentialValidator) -> Self {
        Self { pool, validator }
    }

    pub async fn dispatch<F, Fut, R>(
        &self,
        providers: Vec<ProviderTag>,
        max_attempts: usize,
        sticky: Option<AccountId>,
        mut send: F,
    ) -> DispatchOutcome<R>
    where
        F: FnMut(Account, Credential) -> Fut,
        Fut: Future<Output = Result<R, AttemptError>>,
    {
        let mut tried = TriedSet::default();
        let mut attempts = Vec::new();
        let mut last_status = None;
        let mut last_message: Option<String> = None;

        for attempt_no in 1..=max_attempts {
            let account = match self
                .resolve_account(&providers, sticky, attempt_no, &tried)
                .await
            {
                Some(account) => account,
                None => break,
            };

            tried.mark(account.id);
            attempts.push(AttemptRecord {
                attempt: attempt_no,
                account_id: account.id,
            });

            let credential = match self.validator.ensure_valid(&self.pool, &account).await {
                ValidatorOutcome::Valid(c) => c,
                ValidatorOutcome::Disabled(reason) => {
                    last_status = Some(StatusCode::UNAUTHORIZED);
                    last_message = Some(reason);
                    continue;
                }
            };

            match send(account.clone(), credential).await {
                Ok(result) => {
                    return DispatchOutcome {
                        result: Ok(result),
                        attempts,
                    };
                }
                Err(AttemptError::Terminal { status, message }) => {
                    return DispatchOutcome {
                        result: Err((status, message)),
                        attempts,
                    };
                }
                Err(AttemptError::Retryable {
                    action,
                    status,
                    message,
                }) => {
                    self.apply_action(account.id, &action).await;
                    last_status = Some(status);
                    last_message = Some(message);
                }
            }
        }

        DispatchOutcome {
            result: Err((
                last_status.unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                last_message.unwrap_or_else(|| "all retries failed".to_string()),
            )),
            attempts,
        }
    }

    async fn resolve_account(
        &self,
        providers: &[ProviderTag],
        sticky: Option<AccountId>,
        attempt_no: usize,
        tried: &TriedSet,
    ) -> Option<Account> {
        if attempt_no == 1 {
            if let Some(sticky_id) = sticky {
                if let Ok(Some(account)) = self.pool.try_get(sticky_id).await {
                    if account.is_selectable() && providers.contains(&account.provider) {
                        return Some(account);
                    }
                }
            }
        }
        match self
            .pool
            .select_by_provider(providers.to_vec(), tried.clone())
            .await
        {
            Ok(account) => account,
            Err(err) => {
                tracing::error!(?err, "account pool selection failed");
                None
            }
        }
    }

    async fn apply_action(&self, account_id: AccountId, action: &ActionForError) {
        match action {
            ActionForError::RateLimit(duration) => {
                self.pool
                    .mark_rate_limited(account_id, duration.as_secs())
                    .await;
            }
            ActionForError::Ban | ActionForError::Invalid | ActionForError::ModelUnsupported => {
                self.pool.disable(account_id).await;
            }
            ActionForError::None => {}
        }
    }
}
