use std::collections::{HashMap, HashSet, VecDeque};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use super::model::{Account, AccountId, AccountSource, ProviderTag, now_unix};
use crate::error::GatewayError;

/// Request-scoped set of account ids already attempted in the current
/// dispatch loop. Deliberately not a global or thread-local: it is created
/// fresh per incoming request and threaded through the retry loop by value.
#[derive(Debug, Clone, Default)]
pub struct TriedSet(HashSet<AccountId>);

impl TriedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: AccountId) {
        self.0.insert(id);
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug)]
pub enum AccountPoolMsg {
    SelectByProvider(Vec<ProviderTag>, TriedSet, RpcReplyPort<Option<Account>>),
    TryGet(AccountId, RpcReplyPort<Option<Account>>),
    Disable {
        id: AccountId,
    },
    MarkRateLimited {
        id: AccountId,
        reset_seconds: u64,
    },
    RecordTokenUsage {
        id: AccountId,
        prompt: u64,
        completion: u64,
        cache: u64,
        cache_create: u64,
    },
    /// Not one of the pool's documented operations, but required for a
    /// refreshed credential to take effect for the rest of this process's
    /// lifetime: persistence is external, so the in-memory copy must be
    /// updated directly by the credential validator after a successful
    /// refresh.
    UpdateCredential {
        id: AccountId,
        credential: crate::credential::Credential,
    },
}

struct AccountPoolState {
    accounts: HashMap<AccountId, Account>,
    queues: HashMap<ProviderTag, VecDeque<AccountId>>,
}

impl AccountPoolState {
    fn load(accounts: Vec<Account>) -> Self {
        let mut queues: HashMap<ProviderTag, VecDeque<AccountId>> = HashMap::new();
        let mut by_id = HashMap::new();
        for account in accounts {
            queues.entry(account.provider).or_default().push_back(account.id);
            by_id.insert(account.id, account);
        }
        Self {
            accounts: by_id,
            queues,
        }
    }

    /// `selectByProvider`: providers tried in argument order; within a
    /// provider, least-recently-selected first via round-robin rotation.
    /// Every operation here is total — absence of a candidate is a `None`,
    /// never an error.
    fn select_by_provider(&mut self, providers: &[ProviderTag], tried: &TriedSet) -> Option<Account> {
        for provider in providers {
            let Some(queue) = self.queues.get_mut(provider) else {
                continue;
            };
            let attempts = queue.len();
            for _ in 0..attempts {
                let Some(id) = queue.pop_front() else {
                    break;
                };
                queue.push_back(id);

                if tried.contains(id) {
                    continue;
                }
                let Some(account) = self.accounts.get(&id) else {
                    continue;
                };
                if !account.is_selectable() {
                    continue;
                }
                return Some(account.clone());
            }
        }
        None
    }

    fn try_get(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).cloned()
    }

    fn disable(&mut self, id: AccountId) {
        if let Some(account) = self.accounts.get_mut(&id) {
            account.enabled = false;
        }
    }

    fn mark_rate_limited(&mut self, id: AccountId, reset_seconds: u64) {
        if let Some(account) = self.accounts.get_mut(&id) {
            account.rate_limited_until_unix = Some(now_unix() + reset_seconds);
        }
    }

    fn record_token_usage(
        &mut self,
        id: AccountId,
        prompt: u64,
        completion: u64,
        cache: u64,
        cache_create: u64,
    ) {
        if let Some(account) = self.accounts.get_mut(&id) {
            account.usage.record(prompt, completion, cache, cache_create);
        }
    }

    fn update_credential(&mut self, id: AccountId, credential: crate::credential::Credential) {
        if let Some(account) = self.accounts.get_mut(&id) {
            account.credential = credential;
        }
    }
}

pub struct AccountPool;

#[ractor::async_trait]
impl Actor for AccountPool {
    type Msg = AccountPoolMsg;
    type State = AccountPoolState;
    type Arguments = Vec<Account>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        accounts: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(AccountPoolState::load(accounts))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        msg: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match msg {
            AccountPoolMsg::SelectByProvider(providers, tried, reply) => {
                let account = state.select_by_provider(&providers, &tried);
                let _ = reply.send(account);
            }
            AccountPoolMsg::TryGet(id, reply) => {
                let _ = reply.send(state.try_get(id));
            }
            AccountPoolMsg::Disable { id } => state.disable(id),
            AccountPoolMsg::MarkRateLimited { id, reset_seconds } => {
                state.mark_rate_limited(id, reset_seconds)
            }
            AccountPoolMsg::RecordTokenUsage {
                id,
                prompt,
                completion,
                cache,
                cache_create,
            } => state.record_token_usage(id, prompt, completion, cache, cache_create),
            AccountPoolMsg::UpdateCredential { id, credential } => {
                state.update_credential(id, credential)
            }
        }
        Ok(())
    }
}

/// Handle for interacting with the account pool actor from request handlers.
#[derive(Clone)]
pub struct AccountPoolHandle {
    actor: ActorRef<AccountPoolMsg>,
}

impl AccountPoolHandle {
    pub async fn spawn(source: &dyn AccountSource) -> Result<Self, GatewayError> {
        let accounts = source.load_accounts();
        let (actor, _) = Actor::spawn(None, AccountPool, accounts)
            .await
            .map_err(|e| GatewayError::Actor(format!("failed to spawn account pool: {e}")))?;
        Ok(Self { actor })
    }

    pub async fn select_by_provider(
        &self,
        providers: Vec<ProviderTag>,
        tried: TriedSet,
    ) -> Result<Option<Account>, GatewayError> {
        ractor::call!(self.actor, AccountPoolMsg::SelectByProvider, providers, tried)
            .map_err(|e| GatewayError::Actor(format!("SelectByProvider RPC failed: {e}")))
    }

    pub async fn try_get(&self, id: AccountId) -> Result<Option<Account>, GatewayError> {
        ractor::call!(self.actor, AccountPoolMsg::TryGet, id)
            .map_err(|e| GatewayError::Actor(format!("TryGet RPC failed: {e}")))
    }

    pub async fn disable(&self, id: AccountId) {
        let _ = ractor::cast!(self.actor, AccountPoolMsg::Disable { id });
    }

    pub async fn mark_rate_limited(&self, id: AccountId, reset_seconds: u64) {
        let _ = ractor::cast!(
            self.actor,
            AccountPoolMsg::MarkRateLimited { id, reset_seconds }
        );
    }

    pub async fn record_token_usage(
        &self,
        id: AccountId,
        prompt: u64,
        completion: u64,
        cache: u64,
        cache_create: u64,
    ) {
        let _ = ractor::cast!(
            self.actor,
            AccountPoolMsg::RecordTokenUsage {
                id,
                prompt,
                completion,
                cache,
                cache_create
            }
        );
    }

    pub async fn update_credential(&self, id: AccountId, credential: crate::credential::Credential) {
        let _ = ractor::cast!(
            self.actor,
            AccountPoolMsg::UpdateCredential { id, credential }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;

    fn account(id: AccountId, provider: ProviderTag) -> Account {
        Account {
            id,
            display_name: format!("acct-{id}"),
            email: None,
            provider,
            base_url_override: None,
            enabled: true,
            rate_limited_until_unix: None,
            credential: Credential::OpenAi {
                api_key: "k".into(),
            },
            usage: Default::default(),
        }
    }

    #[test]
    fn round_robin_within_provider() {
        let mut state = AccountPoolState::load(vec![
            account(1, ProviderTag::Claude),
            account(2, ProviderTag::Claude),
        ]);
        let tried = TriedSet::new();
        let first = state.select_by_provider(&[ProviderTag::Claude], &tried).unwrap();
        let second = state.select_by_provider(&[ProviderTag::Claude], &tried).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn tried_set_excludes_account() {
        let mut state = AccountPoolState::load(vec![account(1, ProviderTag::Claude)]);
        let mut tried = TriedSet::new();
        tried.mark(1);
        assert!(state.select_by_provider(&[ProviderTag::Claude], &tried).is_none());
    }

    #[test]
    fn providers_tried_in_argument_order() {
        let mut state = AccountPoolState::load(vec![
            account(1, ProviderTag::Factory),
            account(2, ProviderTag::Claude),
        ]);
        let tried = TriedSet::new();
        let picked = state
            .select_by_provider(&[ProviderTag::Claude, ProviderTag::Factory], &tried)
            .unwrap();
        assert_eq!(picked.id, 2);
    }

    #[test]
    fn rate_limited_account_excluded_until_reset() {
        let mut state = AccountPoolState::load(vec![account(1, ProviderTag::Claude)]);
        state.mark_rate_limited(1, 3600);
        let tried = TriedSet::new();
        assert!(state.select_by_provider(&[ProviderTag::Claude], &tried).is_none());
    }

    #[test]
    fn disable_is_idempotent() {
        let mut state = AccountPoolState::load(vec![account(1, ProviderTag::Claude)]);
        state.disable(1);
        state.disable(1);
        assert!(!state.accounts.get(&1).unwrap().enabled);
    }
}
