use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use url::Url;
use uuid::Uuid;

use relaygate_schema::anthropic::{MessagesRequest, MessagesResponse, StreamEvent, Usage};
use relaygate_schema::gemini::GeminiResponseBody;
use relaygate_schema::{AnthropicErrorBody, ContentBlock};

use crate::account::{Account, AccountId, ConversationStickyKey, ProviderTag};
use crate::config::{AntigravityResolvedConfig, GeminiCliResolvedConfig};
use crate::credential::Credential;
use crate::dispatch::{
    ActionForError, AttemptError, LogSink, RequestLog, StdoutLogSink, body_matches_client_error_keyword,
    classify_upstream_error,
};
use crate::error::{GoogleUpstreamErrorBody, anthropic_error_response};
use crate::server::routes::respond::{anthropic_sse_stream, passthrough_stream};
use crate::server::state::AppState;
use crate::streaming::AnthropicStreamEmitter;
use crate::transform::{anthropic_model_to_gemini, anthropic_to_gemini, extract_gemini_parts};
use crate::upstream::{
    FACTORY_MESSAGES_URL, antigravity_endpoints, antigravity_headers, claude_headers, claude_url,
    factory_headers, gemini_codeassist_headers, gemini_codeassist_url,
};
use crate::tokenizer::Tokenizer;
use crate::usage::{estimate_anthropic_input_tokens, estimate_gemini_input_tokens};

const MAX_ATTEMPTS: usize = 15;

/// §4.6 step 2: `Claude`/`GeminiAntigravity` ordered by the caller's declared
/// client, then `Factory`. Plain `Gemini` (CodeAssist) is reserved for the
/// dedicated Gemini endpoint (§6) and never appears in this dialect's
/// candidate list.
fn provider_chain_for(user_agent: &str) -> Vec<ProviderTag> {
    let mut chain = if user_agent.contains("claude-cli") {
        vec![ProviderTag::Claude, ProviderTag::GeminiAntigravity]
    } else {
        vec![ProviderTag::GeminiAntigravity, ProviderTag::Claude]
    };
    chain.push(ProviderTag::Factory);
    chain
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/messages", post(messages))
        .route("/v1/message", post(messages))
        .route("/v1/messages/count_tokens", post(count_tokens))
}

async fn count_tokens(
    State(state): State<AppState>,
    Json(req): Json<MessagesRequest>,
) -> Json<serde_json::Value> {
    let tokens = estimate_anthropic_input_tokens(&req, state.tokenizer.as_ref());
    Json(serde_json::json!({ "input_tokens": tokens }))
}

/// One upstream attempt's successful payload, still in its native shape;
/// converted to an Anthropic-dialect response only once the dispatch loop
/// has settled on a winner.
enum AttemptOutput {
    /// Claude/Factory forward the Anthropic dialect natively.
    Native(reqwest::Response),
    GeminiSingle(GeminiResponseBody, u64),
    /// Raw upstream SSE response plus the estimated prompt token count;
    /// consumed incrementally by [`gemini_stream_events`] rather than
    /// collected upfront.
    GeminiStream(reqwest::Response, u64),
}

fn sticky_key_for(req: &MessagesRequest) -> ConversationStickyKey {
    let earliest_user_text = req
        .messages
        .iter()
        .find(|m| m.role == "user")
        .map(|m| {
            m.content
                .as_blocks()
                .iter()
                .filter_map(|b| b.as_text().map(str::to_string))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let system_text = req.system.as_ref().map(|s| s.as_plain_text()).unwrap_or_default();
    let tool_names: Vec<String> = req
        .tools
        .iter()
        .flatten()
        .map(|t| t.name.clone())
        .collect();
    ConversationStickyKey::from_anthropic_seed(None, None, &earliest_user_text, &system_text, tool_names)
}

async fn messages(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<MessagesRequest>) -> Response {
    let model = req.model.clone();
    let stream = req.stream;
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model.clone(), stream, start_unix_ms);

    let sticky_key = sticky_key_for(&req);
    let sticky = state.sessions.get_conversation_account(&sticky_key);

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let providers = provider_chain_for(user_agent);

    let client = state.anthropic_family_client.clone();
    let geminicli_cfg = state.geminicli_cfg.clone();
    let antigravity_cfg = state.antigravity_cfg.clone();
    let tokenizer = state.tokenizer.clone();
    let req_ref = &req;

    let outcome = state
        .dispatch
        .dispatch(
            providers,
            MAX_ATTEMPTS,
            sticky,
            move |account, credential| {
                let client = client.clone();
                let geminicli_cfg = geminicli_cfg.clone();
                let antigravity_cfg = antigravity_cfg.clone();
                let tokenizer = tokenizer.clone();
                async move {
                    send_one(
                        &client,
                        &account,
                        &credential,
                        req_ref,
                        &geminicli_cfg,
                        &antigravity_cfg,
                        tokenizer.as_ref(),
                    )
                    .await
                }
            },
        )
        .await;

    for attempt in &outcome.attempts {
        log.record_attempt(attempt.attempt, attempt.account_id);
    }

    match outcome.result {
        Ok((account_id, output)) => {
            state.sessions.set_conversation_account(&sticky_key, account_id);
            build_success_response(&state, &model, stream, output, log).await
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            anthropic_error_response(status, message)
        }
    }
}

async fn build_success_response(
    state: &AppState,
    model: &str,
    stream: bool,
    output: AttemptOutput,
    mut log: RequestLog,
) -> Response {
    let now = chrono::Utc::now().timestamp_millis();

    match output {
        AttemptOutput::Native(resp) => {
            if stream {
                log.finalize(&StdoutLogSink, now, StatusCode::OK, None);
                passthrough_stream(resp)
            } else {
                let value: serde_json::Value = resp.json().await.unwrap_or_default();
                let prompt = value
                    .pointer("/usage/input_tokens")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                let completion = value
                    .pointer("/usage/output_tokens")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                log.record_usage(prompt, completion);
                log.finalize(&StdoutLogSink, now, StatusCode::OK, None);
                Json(value).into_response()
            }
        }
        AttemptOutput::GeminiSingle(body, prompt_tokens) => {
            let parts = extract_gemini_parts(&body);
            let output_tokens = state.tokenizer.count_tokens(&format!("{}{}", parts.thinking, parts.text));
            log.record_usage(prompt_tokens, output_tokens);
            log.finalize(&StdoutLogSink, now, StatusCode::OK, None);

            let mut content = Vec::new();
            if !parts.thinking.is_empty() {
                content.push(relaygate_schema::anthropic::ContentBlock::Thinking {
                    thinking: parts.thinking.clone(),
                    signature: parts.thinking_signature.clone(),
                });
            }
            if !parts.text.is_empty() {
                content.push(ContentBlock::text(parts.text.clone()));
            }
            for call in &parts.tool_calls {
                content.push(ContentBlock::ToolUse {
                    id: format!("toolu_{}", Uuid::new_v4().simple()),
                    name: call.name.clone(),
                    input: call.args.clone(),
                    cache_control: None,
                });
            }

            let stop_reason = gemini_stop_reason(&parts);
            let resp = MessagesResponse {
                id: format!("msg_{}", Uuid::new_v4().simple()),
                kind: "message".to_string(),
                role: "assistant".to_string(),
                content,
                model: model.to_string(),
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
                usage: Usage {
                    input_tokens: prompt_tokens,
                    output_tokens,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            };
            Json(resp).into_response()
        }
        AttemptOutput::GeminiStream(resp, prompt_tokens) => {
            let events = gemini_stream_events(resp, model.to_string(), prompt_tokens, state.tokenizer.clone(), log);
            anthropic_sse_stream(events)
        }
    }
}

fn gemini_stop_reason(parts: &crate::transform::GeminiExtractedParts) -> &'static str {
    if !parts.tool_calls.is_empty() {
        "tool_use"
    } else if parts.finish_reason.as_deref() == Some("MAX_TOKENS") {
        "max_tokens"
    } else {
        "end_turn"
    }
}

async fn send_one(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &MessagesRequest,
    geminicli_cfg: &GeminiCliResolvedConfig,
    antigravity_cfg: &AntigravityResolvedConfig,
    tokenizer: &dyn Tokenizer,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    match account.provider {
        ProviderTag::Claude | ProviderTag::Factory => {
            send_native(client, account, credential, req).await
        }
        ProviderTag::Gemini | ProviderTag::GeminiAntigravity => {
            send_gemini_family(
                client,
                account,
                credential,
                req,
                geminicli_cfg,
                antigravity_cfg,
                tokenizer,
            )
            .await
        }
        other => Err(AttemptError::Terminal {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{} is not dispatched by the anthropic-dialect route", other.as_str()),
        }),
    }
}

async fn send_native(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &MessagesRequest,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    let token = credential.access_token().ok_or_else(|| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "account credential carries no bearer token".to_string(),
    })?;

    let (url, headers) = if account.provider == ProviderTag::Claude {
        let base = account
            .base_url_override
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok());
        (claude_url(base.as_ref()), claude_headers(token))
    } else {
        (
            Url::parse(FACTORY_MESSAGES_URL).expect("fixed Factory url"),
            factory_headers(token),
        )
    };

    let resp = client
        .post(url)
        .headers(headers)
        .json(req)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if resp.status().is_success() {
        return Ok((account.id, AttemptOutput::Native(resp)));
    }

    Err(classify_anthropic_error(resp).await)
}

async fn classify_anthropic_error(resp: reqwest::Response) -> AttemptError {
    let status = resp.status();
    let (action, (message, raw_body)) = classify_upstream_error::<AnthropicErrorBody, _>(
        resp,
        |body| {
            let raw = body.error.kind.clone();
            (format!("{}: {}", body.error.kind, body.error.message), raw)
        },
        |_status, raw| (raw.clone(), raw),
    )
    .await;

    if body_matches_client_error_keyword(&raw_body) {
        AttemptError::Terminal { status, message }
    } else {
        AttemptError::Retryable { action, status, message }
    }
}

async fn send_gemini_family(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &MessagesRequest,
    geminicli_cfg: &GeminiCliResolvedConfig,
    antigravity_cfg: &AntigravityResolvedConfig,
    tokenizer: &dyn Tokenizer,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    let token = credential.access_token().ok_or_else(|| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "account credential carries no bearer token".to_string(),
    })?;

    let gemini_req = anthropic_to_gemini(req);
    let model_name = anthropic_model_to_gemini(&req.model);
    let prompt_tokens = estimate_gemini_input_tokens(&gemini_req, tokenizer);

    let stream = req.stream;

    let (url, headers, wire_body) = if account.provider == ProviderTag::Gemini {
        let url = gemini_codeassist_url(&geminicli_cfg.api_url, stream);
        let headers = gemini_codeassist_headers(token);
        let body = serde_json::json!({
            "model": model_name,
            "project": project_id_of(credential),
            "request": gemini_req,
        });
        (url, headers, body)
    } else {
        let base = account
            .base_url_override
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok());
        let endpoints = antigravity_endpoints(base.as_ref().or(Some(&antigravity_cfg.api_url)));
        let url = endpoints.select(stream).clone();
        let headers = antigravity_headers(token);
        (url, headers, serde_json::to_value(&gemini_req).unwrap_or_default())
    };

    let resp = client
        .post(url)
        .headers(headers)
        .json(&wire_body)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(classify_google_error(resp).await);
    }

    if stream {
        Ok((account.id, AttemptOutput::GeminiStream(resp, prompt_tokens)))
    } else {
        let bytes = resp.bytes().await.map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;
        let body = unwrap_codeassist_response(&String::from_utf8_lossy(&bytes)).ok_or_else(|| {
            AttemptError::Retryable {
                action: ActionForError::None,
                status: StatusCode::BAD_GATEWAY,
                message: "upstream returned an unparseable Gemini response body".to_string(),
            }
        })?;
        Ok((account.id, AttemptOutput::GeminiSingle(body, prompt_tokens)))
    }
}

fn project_id_of(credential: &Credential) -> &str {
    match credential {
        Credential::Gemini { project_id, .. } => project_id,
        _ => "",
    }
}

/// CodeAssist (and, by the same wrapper, Antigravity) nests every response
/// under a `response` key; unwrap it if present before deserializing.
fn unwrap_codeassist_response(raw: &str) -> Option<GeminiResponseBody> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let inner = value.get("response").cloned().unwrap_or(value);
    serde_json::from_value(inner).ok()
}

type UpstreamEvents =
    Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>> + Send>>;

struct GeminiStreamState {
    upstream: UpstreamEvents,
    emitter: AnthropicStreamEmitter,
    queue: VecDeque<StreamEvent>,
    full_text: String,
    model: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: Option<RequestLog>,
    start_unix_ms: i64,
    started: bool,
    first_byte_seen: bool,
    done: bool,
}

/// Converts a live Gemini-family SSE response into Anthropic stream events
/// one upstream chunk at a time. Nothing is produced until the corresponding
/// upstream chunk has actually arrived, and dropping the returned stream
/// (client disconnect) drops `upstream` and its underlying connection with
/// it, rather than draining it to completion first.
fn gemini_stream_events(
    resp: reqwest::Response,
    model: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: RequestLog,
) -> impl Stream<Item = StreamEvent> {
    use eventsource_stream::Eventsource;

    let start_unix_ms = log.start_time_unix_ms;
    let state = GeminiStreamState {
        upstream: Box::pin(resp.bytes_stream().eventsource()),
        emitter: AnthropicStreamEmitter::new(),
        queue: VecDeque::new(),
        full_text: String::new(),
        model,
        prompt_tokens,
        tokenizer,
        log: Some(log),
        start_unix_ms,
        started: false,
        first_byte_seen: false,
        done: false,
    };

    futures::stream::unfold(state, move |mut st| async move {
        loop {
            if let Some(event) = st.queue.pop_front() {
                return Some((event, st));
            }
            if st.done {
                return None;
            }
            if !st.started {
                st.started = true;
                let events = st.emitter.start(&st.model, st.prompt_tokens);
                st.queue.extend(events);
                continue;
            }

            match st.upstream.next().await {
                Some(Ok(ev)) => {
                    if ev.data.is_empty() {
                        continue;
                    }
                    if !st.first_byte_seen {
                        st.first_byte_seen = true;
                        if let Some(log) = st.log.as_mut() {
                            let elapsed = (chrono::Utc::now().timestamp_millis() - st.start_unix_ms).max(0) as u64;
                            log.record_first_byte(elapsed);
                        }
                    }
                    if let Some(body) = unwrap_codeassist_response(&ev.data) {
                        let parts = extract_gemini_parts(&body);
                        if !parts.thinking.is_empty() {
                            st.queue.extend(st.emitter.thinking_delta(parts.thinking.clone()));
                            if let Some(signature) = parts.thinking_signature.clone() {
                                st.queue.extend(st.emitter.signature_delta(signature));
                            }
                        }
                        if !parts.text.is_empty() {
                            st.full_text.push_str(&parts.text);
                            st.queue.extend(st.emitter.text_delta(parts.text.clone()));
                        }
                        for call in &parts.tool_calls {
                            let id = format!("toolu_{}", Uuid::new_v4().simple());
                            st.queue.extend(st.emitter.tool_use_start(id, call.name.clone()));
                            st.queue.extend(st.emitter.tool_use_input_delta(call.args.to_string()));
                        }
                        if let Some(reason) = parts.finish_reason {
                            st.emitter.set_finish_reason(reason);
                        }
                    }
                    continue;
                }
                Some(Err(_)) | None => {
                    let output_tokens = st.tokenizer.count_tokens(&st.full_text);
                    st.queue.extend(st.emitter.finish(output_tokens));
                    if let Some(mut log) = st.log.take() {
                        log.record_usage(st.prompt_tokens, output_tokens);
                        log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), StatusCode::OK, None);
                    }
                    st.done = true;
                    continue;
                }
            }
        }
    })
}

async fn classify_google_error(resp: reqwest::Response) -> AttemptError {
    let status = resp.status();
    let (action, (message, raw_body)) = classify_upstream_error::<GoogleUpstreamErrorBody, _>(
        resp,
        |body| {
            let raw = body.inner.status.clone().unwrap_or_default();
            (
                body.inner.message.clone().unwrap_or_else(|| "upstream error".to_string()),
                raw,
            )
        },
        |_status, raw| (raw.clone(), raw),
    )
    .await;

    if body_matches_client_error_keyword(&raw_body) {
        AttemptError::Terminal { status, message }
    } else {
        AttemptError::Retryable { action, status, message }
    }
}
