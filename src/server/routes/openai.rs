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

use relaygate_schema::anthropic::{AnthropicErrorBody, ContentBlock, MessagesResponse};
use relaygate_schema::openai::{
    ChatChoice, ChatChoiceMessage, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    OpenaiErrorBody, ToolCall, ToolCallFunction, Usage as OpenaiUsage,
};

use crate::account::{Account, AccountId, ConversationStickyKey, ProviderTag};
use crate::config::{AntigravityResolvedConfig, GeminiCliResolvedConfig};
use crate::credential::Credential;
use crate::dispatch::{
    ActionForError, AttemptError, LogSink, RequestLog, StdoutLogSink, body_matches_client_error_keyword,
    classify_upstream_error,
};
use crate::error::{GoogleUpstreamErrorBody, openai_error_response};
use crate::server::routes::respond::{openai_sse_response, openai_sse_stream, passthrough_stream};
use crate::server::state::AppState;
use crate::streaming::OpenAiStreamEmitter;
use crate::tokenizer::Tokenizer;
use crate::transform::{
    anthropic_model_to_gemini, anthropic_stop_reason_to_openai_finish_reason, anthropic_to_gemini,
    extract_gemini_parts, openai_to_anthropic,
};
use crate::upstream::{
    FACTORY_MESSAGES_URL, antigravity_endpoints, antigravity_headers, claude_headers, claude_url,
    factory_headers, gemini_codeassist_headers, gemini_codeassist_url,
};
use crate::usage::estimate_gemini_input_tokens;

const MAX_ATTEMPTS: usize = 15;
const OPENAI_API_BASE: &str = "https://api.openai.com";

/// §4.6 step 2, mirrored from the Anthropic-dialect route: native OpenAi
/// accounts first, then `Claude`/`GeminiAntigravity` ordered by the caller's
/// declared client, then `Factory`. Plain `Gemini` (CodeAssist) is reserved
/// for the dedicated Gemini endpoint (§6).
fn provider_chain_for(user_agent: &str) -> Vec<ProviderTag> {
    let mut chain = vec![ProviderTag::OpenAi];
    if user_agent.contains("claude-cli") {
        chain.push(ProviderTag::Claude);
        chain.push(ProviderTag::GeminiAntigravity);
    } else {
        chain.push(ProviderTag::GeminiAntigravity);
        chain.push(ProviderTag::Claude);
    }
    chain.push(ProviderTag::Factory);
    chain
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(responses))
}

/// One upstream attempt's settled content, already reduced to the fields an
/// OpenAI-dialect response needs. Claude/Factory/Gemini-family attempts are
/// always collected in full before this is built (no incremental passthrough
/// for those three; only native OpenAI accounts forward byte-for-byte).
enum AttemptOutput {
    Native(reqwest::Response),
    Transcoded {
        text: String,
        tool_calls: Vec<ToolCall>,
        finish_reason: &'static str,
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    /// Raw upstream SSE response from a Gemini-family account, plus the
    /// estimated prompt token count; consumed incrementally by
    /// [`gemini_stream_chat_chunks`] instead of collected upfront.
    GeminiStream(reqwest::Response, u64),
}

async fn chat_completions(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ChatCompletionRequest>) -> Response {
    dispatch_chat(state, headers, req).await
}

/// The Responses-API body shape differs from chat-completions, but this
/// gateway only ever forwards it to plain OpenAI-compatible accounts, so it
/// is carried as an opaque JSON value rather than modeled field-by-field.
async fn responses(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Response {
    let model = body.get("model").and_then(serde_json::Value::as_str).unwrap_or("").to_string();
    let stream = body.get("stream").and_then(serde_json::Value::as_bool).unwrap_or(false);
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model, stream, start_unix_ms);

    let client = state.anthropic_family_client.clone();
    let body_ref = &body;

    let outcome = state
        .dispatch
        .dispatch(
            vec![ProviderTag::OpenAi],
            MAX_ATTEMPTS,
            None,
            move |account, credential| {
                let client = client.clone();
                async move { send_openai_raw(&client, &account, &credential, body_ref).await }
            },
        )
        .await;

    for attempt in &outcome.attempts {
        log.record_attempt(attempt.attempt, attempt.account_id);
    }

    match outcome.result {
        Ok((_account_id, resp)) => {
            let now = chrono::Utc::now().timestamp_millis();
            if stream {
                log.finalize(&StdoutLogSink, now, StatusCode::OK, None);
                passthrough_stream(resp)
            } else {
                let value: serde_json::Value = resp.json().await.unwrap_or_default();
                log.finalize(&StdoutLogSink, now, StatusCode::OK, None);
                Json(value).into_response()
            }
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            openai_error_response(status, message)
        }
    }
}

fn sticky_key_for(req: &ChatCompletionRequest) -> Option<ConversationStickyKey> {
    req.prompt_cache_key.as_deref().map(ConversationStickyKey::from_explicit)
}

async fn dispatch_chat(state: AppState, headers: HeaderMap, req: ChatCompletionRequest) -> Response {
    let model = req.model.clone();
    let stream = req.stream;
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model.clone(), stream, start_unix_ms);

    let sticky_key = sticky_key_for(&req);
    let sticky = sticky_key
        .as_ref()
        .and_then(|key| state.sessions.get_conversation_account(key));

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
            if let Some(key) = &sticky_key {
                state.sessions.set_conversation_account(key, account_id);
            }
            build_success_response(&model, stream, output, state.tokenizer.clone(), log).await
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            openai_error_response(status, message)
        }
    }
}

async fn build_success_response(
    model: &str,
    stream: bool,
    output: AttemptOutput,
    tokenizer: Arc<dyn Tokenizer>,
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
                    .pointer("/usage/prompt_tokens")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                let completion = value
                    .pointer("/usage/completion_tokens")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                log.record_usage(prompt, completion);
                log.finalize(&StdoutLogSink, now, StatusCode::OK, None);
                Json(value).into_response()
            }
        }
        AttemptOutput::Transcoded {
            text,
            tool_calls,
            finish_reason,
            prompt_tokens,
            completion_tokens,
        } => {
            log.record_usage(prompt_tokens, completion_tokens);
            log.finalize(&StdoutLogSink, now, StatusCode::OK, None);

            if stream {
                let mut emitter = OpenAiStreamEmitter::new(model.to_string(), now / 1000);
                let mut chunks = vec![emitter.start()];
                if !text.is_empty() {
                    chunks.push(emitter.text_delta(text));
                }
                for call in tool_calls {
                    emitter.record_tool_call(call.id, call.function.name, call.function.arguments);
                }
                chunks.push(emitter.finish(prompt_tokens, completion_tokens));
                openai_sse_response(chunks)
            } else {
                let resp = ChatCompletionResponse {
                    id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
                    object: "chat.completion".to_string(),
                    created: now / 1000,
                    model: model.to_string(),
                    choices: vec![ChatChoice {
                        index: 0,
                        message: ChatChoiceMessage {
                            role: "assistant".to_string(),
                            content: (!text.is_empty()).then_some(text),
                            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        },
                        finish_reason: Some(finish_reason.to_string()),
                    }],
                    usage: Some(OpenaiUsage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    }),
                };
                Json(resp).into_response()
            }
        }
        AttemptOutput::GeminiStream(resp, prompt_tokens) => {
            let chunks = gemini_stream_chat_chunks(resp, model.to_string(), prompt_tokens, tokenizer, log);
            openai_sse_stream(chunks)
        }
    }
}

async fn send_one(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &ChatCompletionRequest,
    geminicli_cfg: &GeminiCliResolvedConfig,
    antigravity_cfg: &AntigravityResolvedConfig,
    tokenizer: &dyn Tokenizer,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    match account.provider {
        ProviderTag::OpenAi => send_native(client, account, credential, req).await,
        ProviderTag::Claude | ProviderTag::Factory => {
            send_via_anthropic(client, account, credential, req).await
        }
        ProviderTag::Gemini | ProviderTag::GeminiAntigravity => {
            send_via_gemini(client, account, credential, req, geminicli_cfg, antigravity_cfg, tokenizer).await
        }
        other => Err(AttemptError::Terminal {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{} is not dispatched by the chat-completions route", other.as_str()),
        }),
    }
}

fn openai_compatible_url(base_override: Option<&str>) -> Url {
    let base = base_override.unwrap_or(OPENAI_API_BASE).trim_end_matches('/').to_string();
    Url::parse(&format!("{base}/v1/chat/completions")).unwrap_or_else(|_| {
        Url::parse(&format!("{OPENAI_API_BASE}/v1/chat/completions")).expect("fixed OpenAI base URL")
    })
}

async fn send_native(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &ChatCompletionRequest,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    let token = credential.access_token().ok_or_else(|| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "account credential carries no bearer token".to_string(),
    })?;

    let url = openai_compatible_url(account.base_url_override.as_deref());
    let resp = client
        .post(url)
        .bearer_auth(token)
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

    Err(classify_openai_error(resp).await)
}

async fn send_openai_raw(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    body: &serde_json::Value,
) -> Result<(AccountId, reqwest::Response), AttemptError> {
    let token = credential.access_token().ok_or_else(|| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "account credential carries no bearer token".to_string(),
    })?;

    let base = account.base_url_override.as_deref().unwrap_or(OPENAI_API_BASE).trim_end_matches('/');
    let url = Url::parse(&format!("{base}/v1/responses")).map_err(|e| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })?;

    let resp = client
        .post(url)
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if resp.status().is_success() {
        return Ok((account.id, resp));
    }

    Err(classify_openai_error(resp).await)
}

async fn classify_openai_error(resp: reqwest::Response) -> AttemptError {
    let status = resp.status();
    let (action, (message, raw_body)) = classify_upstream_error::<OpenaiErrorBody, _>(
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

async fn send_via_anthropic(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &ChatCompletionRequest,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    let token = credential.access_token().ok_or_else(|| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "account credential carries no bearer token".to_string(),
    })?;

    let mut anthropic_req = openai_to_anthropic(req);
    // Always collect upstream in full; this route transcodes to OpenAI's own
    // streaming shape rather than forwarding Anthropic SSE frames.
    anthropic_req.stream = false;

    let (url, headers) = if account.provider == ProviderTag::Claude {
        let base = account.base_url_override.as_deref().and_then(|raw| Url::parse(raw).ok());
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
        .json(&anthropic_req)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(classify_anthropic_error(resp).await);
    }

    let body: MessagesResponse = resp.json().await.map_err(|e| AttemptError::Retryable {
        action: ActionForError::None,
        status: StatusCode::BAD_GATEWAY,
        message: e.to_string(),
    })?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in &body.content {
        match block {
            ContentBlock::Text { text: t, .. } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input, .. } => {
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            _ => {}
        }
    }

    let finish_reason =
        anthropic_stop_reason_to_openai_finish_reason(body.stop_reason.as_deref().unwrap_or("end_turn"));

    Ok((
        account.id,
        AttemptOutput::Transcoded {
            text,
            tool_calls,
            finish_reason,
            prompt_tokens: body.usage.input_tokens,
            completion_tokens: body.usage.output_tokens,
        },
    ))
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

async fn send_via_gemini(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &ChatCompletionRequest,
    geminicli_cfg: &GeminiCliResolvedConfig,
    antigravity_cfg: &AntigravityResolvedConfig,
    tokenizer: &dyn Tokenizer,
) -> Result<(AccountId, AttemptOutput), AttemptError> {
    let token = credential.access_token().ok_or_else(|| AttemptError::Terminal {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "account credential carries no bearer token".to_string(),
    })?;

    let anthropic_req = openai_to_anthropic(req);
    let gemini_req = anthropic_to_gemini(&anthropic_req);
    let model_name = anthropic_model_to_gemini(&anthropic_req.model);
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
        let base = account.base_url_override.as_deref().and_then(|raw| Url::parse(raw).ok());
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
        return Ok((account.id, AttemptOutput::GeminiStream(resp, prompt_tokens)));
    }

    let bytes = resp.bytes().await.map_err(|e| AttemptError::Retryable {
        action: ActionForError::None,
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: e.to_string(),
    })?;
    let body = unwrap_codeassist_response(&String::from_utf8_lossy(&bytes)).ok_or_else(|| AttemptError::Retryable {
        action: ActionForError::None,
        status: StatusCode::BAD_GATEWAY,
        message: "upstream returned an unparseable Gemini response body".to_string(),
    })?;

    let parts = extract_gemini_parts(&body);
    let completion_tokens = tokenizer.count_tokens(&format!("{}{}", parts.thinking, parts.text));
    let anthropic_stop_reason = if !parts.tool_calls.is_empty() {
        "tool_use"
    } else if parts.finish_reason.as_deref() == Some("MAX_TOKENS") {
        "max_tokens"
    } else {
        "end_turn"
    };
    let finish_reason = anthropic_stop_reason_to_openai_finish_reason(anthropic_stop_reason);

    let tool_calls = parts
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: format!("call_{}", Uuid::new_v4().simple()),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: call.name,
                arguments: call.args.to_string(),
            },
        })
        .collect();

    Ok((
        account.id,
        AttemptOutput::Transcoded {
            text: parts.text,
            tool_calls,
            finish_reason,
            prompt_tokens,
            completion_tokens,
        },
    ))
}

fn project_id_of(credential: &Credential) -> &str {
    match credential {
        Credential::Gemini { project_id, .. } => project_id,
        _ => "",
    }
}

fn unwrap_codeassist_response(raw: &str) -> Option<relaygate_schema::gemini::GeminiResponseBody> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let inner = value.get("response").cloned().unwrap_or(value);
    serde_json::from_value(inner).ok()
}

type UpstreamEvents =
    Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>> + Send>>;

struct GeminiStreamState {
    upstream: UpstreamEvents,
    emitter: OpenAiStreamEmitter,
    queue: VecDeque<ChatCompletionChunk>,
    full_text: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: Option<RequestLog>,
    start_unix_ms: i64,
    started: bool,
    first_byte_seen: bool,
    done: bool,
}

/// Converts a live Gemini-family SSE response into OpenAI-dialect chat chunks
/// one upstream chunk at a time, mirroring the anthropic-dialect route's
/// `gemini_stream_events`. Dropping the returned stream (client disconnect)
/// drops `upstream` and its underlying connection with it.
fn gemini_stream_chat_chunks(
    resp: reqwest::Response,
    model: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: RequestLog,
) -> impl Stream<Item = ChatCompletionChunk> {
    use eventsource_stream::Eventsource;

    let start_unix_ms = log.start_time_unix_ms;
    let state = GeminiStreamState {
        upstream: Box::pin(resp.bytes_stream().eventsource()),
        emitter: OpenAiStreamEmitter::new(model, start_unix_ms / 1000),
        queue: VecDeque::new(),
        full_text: String::new(),
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
            if let Some(chunk) = st.queue.pop_front() {
                return Some((chunk, st));
            }
            if st.done {
                return None;
            }
            if !st.started {
                st.started = true;
                st.queue.push_back(st.emitter.start());
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
                        if !parts.text.is_empty() {
                            st.full_text.push_str(&parts.text);
                            st.queue.push_back(st.emitter.text_delta(parts.text.clone()));
                        }
                        for call in &parts.tool_calls {
                            st.emitter.record_tool_call(
                                format!("call_{}", Uuid::new_v4().simple()),
                                call.name.clone(),
                                call.args.to_string(),
                            );
                        }
                    }
                    continue;
                }
                Some(Err(_)) | None => {
                    let completion_tokens = st.tokenizer.count_tokens(&st.full_text);
                    st.queue.push_back(st.emitter.finish(st.prompt_tokens, completion_tokens));
                    if let Some(mut log) = st.log.take() {
                        log.record_usage(st.prompt_tokens, completion_tokens);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_compatible_url_defaults_to_public_api() {
        let url = openai_compatible_url(None);
        assert_eq!(url.as_str(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn openai_compatible_url_honors_base_override() {
        let url = openai_compatible_url(Some("https://my-proxy.internal/"));
        assert_eq!(url.as_str(), "https://my-proxy.internal/v1/chat/completions");
    }
}
