use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use super::{AccountId, ConversationStickyKey};

/// Rate-limit state lifted from upstream response headers
/// (`anthropic-ratelimit-*`, Kiro `getUsageLimits`). Overwritten wholesale on
/// each successful response; no merge semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub requests_limit: Option<u64>,
    pub requests_remaining: Option<u64>,
    pub tokens_limit: Option<u64>,
    pub tokens_remaining: Option<u64>,
    pub reset_unix: Option<u64>,
}

const STICKY_TTL: Duration = Duration::from_secs(60 * 60);

/// Process-wide conversation stickiness and per-account quota snapshots.
///
/// Both maps are unbounded in size but the sticky map expires entries 60
/// minutes after their last read (sliding TTL); the quota map has no expiry,
/// matching the "unbounded lifetime, overwritten on update" rule.
pub struct SessionCache {
    sticky: Cache<String, AccountId>,
    quota: Cache<AccountId, Arc<QuotaSnapshot>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            sticky: Cache::builder().time_to_idle(STICKY_TTL).build(),
            quota: Cache::builder().build(),
        }
    }

    /// Only ever called after a successful upstream response (P2).
    pub fn set_conversation_account(&self, key: &ConversationStickyKey, id: AccountId) {
        self.sticky.insert(key.as_str().to_string(), id);
    }

    /// Returns `None` on miss or after the sliding TTL has lapsed.
    pub fn get_conversation_account(&self, key: &ConversationStickyKey) -> Option<AccountId> {
        self.sticky.get(key.as_str())
    }

    pub fn set_quota(&self, id: AccountId, snapshot: QuotaSnapshot) {
        self.quota.insert(id, Arc::new(snapshot));
    }

    pub fn get_quota(&self, id: AccountId) -> Option<Arc<QuotaSnapshot>> {
        self.quota.get(&id)
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_round_trips() {
        let cache = SessionCache::new();
        let key = ConversationStickyKey::from_explicit("conv-1");
        assert!(cache.get_conversation_account(&key).is_none());
        cache.set_conversation_account(&key, 42);
        assert_eq!(cache.get_conversation_account(&key), Some(42));
    }

    #[test]
    fn quota_overwrites_wholesale() {
        let cache = SessionCache::new();
        cache.set_quota(
            1,
            QuotaSnapshot {
                requests_remaining: Some(10),
                ..Default::default()
            },
        );
        cache.set_quota(
            1,
            QuotaSnapshot {
                tokens_remaining: Some(5),
                ..Default::default()
            },
        );
        let snap = cache.get_quota(1).unwrap();
        assert_eq!(snap.requests_remaining, None);
        assert_eq!(snap.tokens_remaining, Some(5));
    }
}
