mod model;
mod pool;
mod session_cache;
mod sticky_key;

pub use model::{Account, AccountId, AccountSource, ProviderTag, StaticAccountSource, UsageCounters};
pub use pool::{AccountPool, AccountPoolHandle, AccountPoolMsg, TriedSet};
pub use session_cache::{QuotaSnapshot, SessionCache};
pub use sticky_key::ConversationStickyKey;
