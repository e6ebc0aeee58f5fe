//! Per-provider upstream URL and header assembly (§6). Pure functions: given
//! an access token and optional base-URL override, build the pieces a
//! dispatch-engine `send` closure needs to issue the HTTP call. Retry,
//! account selection, and response handling stay in `dispatch`.

mod antigravity;
mod claude;
mod factory;
mod gemini_business;
mod gemini_codeassist;
mod kiro;

pub use antigravity::{antigravity_endpoints, antigravity_headers};
pub use claude::{CLAUDE_API_BASE, claude_headers, claude_url};
pub use factory::{FACTORY_MESSAGES_URL, factory_headers};
pub use gemini_business::{WidgetEndpoint, gemini_business_headers, gemini_business_url};
pub use gemini_codeassist::{gemini_codeassist_headers, gemini_codeassist_url};
pub use kiro::{kiro_headers, kiro_machine_id, kiro_url};
