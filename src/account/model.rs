use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub type AccountId = u64;

/// Which upstream backend an account authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderTag {
    OpenAi,
    Claude,
    Factory,
    Gemini,
    GeminiAntigravity,
    GeminiBusiness,
    Kiro,
}

impl ProviderTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderTag::OpenAi => "openai",
            ProviderTag::Claude => "claude",
            ProviderTag::Factory => "factory",
            ProviderTag::Gemini => "gemini",
            ProviderTag::GeminiAntigravity => "gemini_antigravity",
            ProviderTag::GeminiBusiness => "gemini_business",
            ProviderTag::Kiro => "kiro",
        }
    }
}

/// Running token/request counters for an account. Monotone non-decreasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cache_tokens: u64,
    pub cache_create_tokens: u64,
    pub request_count: u64,
    pub last_used_unix: Option<u64>,
}

impl UsageCounters {
    pub fn record(&mut self, prompt: u64, completion: u64, cache: u64, cache_create: u64) {
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.cache_tokens += cache;
        self.cache_create_tokens += cache_create;
        self.request_count += 1;
        self.last_used_unix = Some(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );
    }
}

/// One configured account: identity, provider tag, credential, and live state.
///
/// Mutated exclusively through the account pool actor; never mutate a clone
/// of this struct and expect it to be visible elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub email: Option<String>,
    pub provider: ProviderTag,
    pub base_url_override: Option<String>,
    pub enabled: bool,
    pub rate_limited_until_unix: Option<u64>,
    pub credential: crate::credential::Credential,
    pub usage: UsageCounters,
}

impl Account {
    /// `isEnabled ∧ ¬(isRateLimited ∧ now<resetTime)`.
    pub fn is_selectable(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.rate_limited_until_unix {
            Some(until) => now_unix() >= until,
            None => true,
        }
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// External collaborator the pool asks for the initial account set. Actual
/// storage/persistence lives outside the core (see the scope note excluding
/// persistent storage); this crate only needs read access plus the pool's
/// own mutation methods.
pub trait AccountSource: Send + Sync {
    fn load_accounts(&self) -> Vec<Account>;
}

/// An `AccountSource` backed by a fixed, in-memory list. Useful for tests and
/// for deployments that configure accounts directly in `config.toml`.
pub struct StaticAccountSource {
    accounts: Vec<Account>,
}

impl StaticAccountSource {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }
}

impl AccountSource for StaticAccountSource {
    fn load_accounts(&self) -> Vec<Account> {
        self.accounts.clone()
    }
}
