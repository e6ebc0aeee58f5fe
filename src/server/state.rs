use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};

use crate::account::{AccountPoolHandle, SessionCache};
use crate::config::{
    AntigravityResolvedConfig, Config, GeminiBusinessResolvedConfig, GeminiCliResolvedConfig,
};
use crate::credential::{BusinessJwtMinter, CredentialValidator};
use crate::dispatch::DispatchEngine;
use crate::tokenizer::{NaiveTokenizer, Tokenizer};

const ANTHROPIC_FAMILY_USER_AGENT: &str = "relaygate/0.1 (+anthropic-family)";
const KIRO_USER_AGENT: &str = "aws-sdk-js/1.0.0 linux/x64 node/20.18.1";
const GEMINI_BUSINESS_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Shared application state reachable from every route handler.
///
/// Mirrors the old `PolluxState`'s role (one state struct, cloned per
/// request) but is built around the dispatch/account/credential stack
/// instead of a per-provider `Providers` bundle.
#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<DispatchEngine>,
    pub pool: AccountPoolHandle,
    pub sessions: Arc<SessionCache>,
    pub gateway_key: Arc<str>,
    pub tokenizer: Arc<dyn Tokenizer>,

    /// Shared by Claude and Factory (both Anthropic-dialect upstreams) and
    /// by CodeAssist/Antigravity (Gemini-family, same TLS/timeout profile).
    pub anthropic_family_client: reqwest::Client,
    pub kiro_client: reqwest::Client,
    pub gemini_business_client: reqwest::Client,

    pub business_jwt: Arc<BusinessJwtMinter>,
    pub geminicli_cfg: GeminiCliResolvedConfig,
    pub antigravity_cfg: AntigravityResolvedConfig,
    pub gemini_business_cfg: GeminiBusinessResolvedConfig,
}

impl AppState {
    pub fn new(
        cfg: &Config,
        pool: AccountPoolHandle,
        validator: CredentialValidator,
    ) -> Self {
        let geminicli_cfg = cfg.geminicli();
        let antigravity_cfg = cfg.antigravity();
        let gemini_business_cfg = cfg.gemini_business();

        let anthropic_family_client = build_client(
            ANTHROPIC_FAMILY_USER_AGENT,
            cfg.basic.proxy.clone(),
            cfg.basic.enable_multiplexing,
            cfg.basic.antigravity_skip_tls_validate,
            cfg.basic.anthropic_pool_idle_timeout(),
        );
        let kiro_client = build_client(
            KIRO_USER_AGENT,
            cfg.basic.proxy.clone(),
            cfg.basic.enable_multiplexing,
            false,
            cfg.basic.kiro_pool_idle_timeout(),
        );
        let gemini_business_client = build_client(
            gemini_business_cfg
                .user_agent
                .as_deref()
                .unwrap_or(GEMINI_BUSINESS_USER_AGENT),
            gemini_business_cfg.proxy.clone(),
            cfg.basic.enable_multiplexing,
            false,
            cfg.basic.anthropic_pool_idle_timeout(),
        );

        let business_jwt = Arc::new(BusinessJwtMinter::new(gemini_business_client.clone()));
        let dispatch = Arc::new(DispatchEngine::new(pool.clone(), validator));

        Self {
            dispatch,
            pool,
            sessions: Arc::new(SessionCache::new()),
            gateway_key: Arc::from(cfg.basic.gateway_key.as_str()),
            tokenizer: Arc::new(NaiveTokenizer),
            anthropic_family_client,
            kiro_client,
            gemini_business_client,
            business_jwt,
            geminicli_cfg,
            antigravity_cfg,
            gemini_business_cfg,
        }
    }
}

fn build_client(
    user_agent: &str,
    proxy: Option<url::Url>,
    enable_multiplexing: bool,
    skip_tls_validate: bool,
    pool_idle_timeout: Duration,
) -> reqwest::Client {
    let mut headers = HeaderMap::new();

    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(10 * 60))
        .danger_accept_invalid_certs(skip_tls_validate);

    if let Some(proxy_url) = proxy {
        let proxy =
            reqwest::Proxy::all(proxy_url.as_str()).expect("invalid proxy url for reqwest client");
        builder = builder.proxy(proxy);
    }

    if !enable_multiplexing {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        builder = builder
            .http1_only()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0));
    } else {
        builder = builder
            .http2_adaptive_window(true)
            .pool_idle_timeout(pool_idle_timeout);
    }

    builder
        .default_headers(headers)
        .build()
        .expect("failed to build reqwest client")
}
