use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use uuid::Uuid;

use relaygate_schema::gemini::{GeminiGenerateContentRequest, GeminiResponseBody};
use relaygate_schema::geminibusiness::{
    WidgetCreateSessionRequest, WidgetCreateSessionResponse, WidgetStreamAssistRequest,
};
use relaygate_schema::openai::{
    ChatChoice, ChatChoiceMessage, ChatCompletionRequest, ChatCompletionResponse, ToolCall, ToolCallFunction,
    Usage as OpenaiUsage,
};

use crate::account::{Account, AccountId, ConversationStickyKey, ProviderTag};
use crate::credential::{BusinessJwtMinter, Credential};
use crate::dispatch::{
    ActionForError, AttemptError, RequestLog, StdoutLogSink, body_matches_client_error_keyword,
    classify_upstream_error,
};
use crate::error::{GoogleUpstreamErrorBody, gemini_error_response, openai_error_response};
use crate::server::routes::respond::openai_sse_stream;
use crate::server::state::AppState;
use crate::streaming::OpenAiStreamEmitter;
use crate::tokenizer::Tokenizer;
use crate::transform::{anthropic_to_gemini, extract_gemini_parts, openai_to_anthropic};
use crate::upstream::{WidgetEndpoint, gemini_business_headers, gemini_business_url};
use crate::usage::estimate_gemini_input_tokens;

const MAX_ATTEMPTS: usize = 3;
const XSRF_ENDPOINT: &str = "https://cloudsearch.google.com/v1/xsrf";
const JWT_ISSUER: &str = "relaygate";
const JWT_AUDIENCE: &str = "gemini-business";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gemini-business/v1beta/models/{*path}", post(generate_content))
        .route("/gemini-business/v1/chat/completions", post(chat_completions))
}

/// `{*path}` carries `{model}:generateContent` or
/// `{model}:streamGenerateContent`; split on the rpc-name colon the way the
/// GeminiCLI/Antigravity routes already do.
fn model_and_stream_from_path(path: &str) -> (String, bool) {
    let stream = path.contains("streamGenerateContent");
    let model = path.split(':').next().unwrap_or(path).to_string();
    (model, stream)
}

async fn generate_content(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(req): Json<GeminiGenerateContentRequest>,
) -> Response {
    let (model, stream) = model_and_stream_from_path(&path);
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model.clone(), stream, start_unix_ms);

    let sticky_key = headers
        .get("conversation_id")
        .and_then(|v| v.to_str().ok())
        .map(ConversationStickyKey::from_explicit);
    let sticky = sticky_key.as_ref().and_then(|key| state.sessions.get_conversation_account(key));

    let tokenizer = state.tokenizer.clone();
    let prompt_estimate = estimate_gemini_input_tokens(&req, tokenizer.as_ref());

    let client = state.gemini_business_client.clone();
    let jwt_minter = state.business_jwt.clone();
    let req_ref = &req;

    let outcome = state
        .dispatch
        .dispatch(
            vec![ProviderTag::GeminiBusiness],
            MAX_ATTEMPTS,
            sticky,
            move |account, credential| {
                let client = client.clone();
                let jwt_minter = jwt_minter.clone();
                async move { send_business(&client, &jwt_minter, &account, &credential, req_ref, stream).await }
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
            build_gemini_response(output, prompt_estimate, tokenizer, log)
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            gemini_error_response(status, message)
        }
    }
}

async fn chat_completions(State(state): State<AppState>, Json(req): Json<ChatCompletionRequest>) -> Response {
    let stream = req.stream;
    let model = req.model.clone();
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model.clone(), stream, start_unix_ms);

    let sticky_key = req.prompt_cache_key.as_deref().map(ConversationStickyKey::from_explicit);
    let sticky = sticky_key.as_ref().and_then(|key| state.sessions.get_conversation_account(key));

    let anthropic_req = openai_to_anthropic(&req);
    let gemini_req = anthropic_to_gemini(&anthropic_req);
    let tokenizer = state.tokenizer.clone();
    let prompt_estimate = estimate_gemini_input_tokens(&gemini_req, tokenizer.as_ref());

    let client = state.gemini_business_client.clone();
    let jwt_minter = state.business_jwt.clone();
    let gemini_req_ref = &gemini_req;

    let outcome = state
        .dispatch
        .dispatch(
            vec![ProviderTag::GeminiBusiness],
            MAX_ATTEMPTS,
            sticky,
            move |account, credential| {
                let client = client.clone();
                let jwt_minter = jwt_minter.clone();
                async move { send_business(&client, &jwt_minter, &account, &credential, gemini_req_ref, stream).await }
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
            build_openai_response(&model, output, prompt_estimate, tokenizer, log)
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            openai_error_response(status, message)
        }
    }
}

fn build_gemini_response(
    output: BusinessOutput,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    mut log: RequestLog,
) -> Response {
    match output {
        BusinessOutput::Stream(resp) => {
            let values = gemini_business_stream_values(resp, prompt_tokens, tokenizer, log);
            gemini_sse_stream(values)
        }
        BusinessOutput::Buffered(value) => {
            let now = chrono::Utc::now().timestamp_millis();
            let mut full_text = String::new();
            if let Ok(body) = serde_json::from_value::<GeminiResponseBody>(value.clone()) {
                let parts = extract_gemini_parts(&body);
                full_text.push_str(&parts.thinking);
                full_text.push_str(&parts.text);
            }
            let completion_tokens = tokenizer.count_tokens(&full_text);
            log.record_usage(prompt_tokens, completion_tokens);
            log.finalize(&StdoutLogSink, now, StatusCode::OK, None);

            Json(value).into_response()
        }
    }
}

/// Native Gemini streaming is a bare `data: {json}\n\n` sequence with no
/// `event:` line and no terminating sentinel.
fn gemini_sse_stream(source: impl Stream<Item = serde_json::Value> + Send + 'static) -> Response {
    let events = source.map(|chunk| Event::default().json_data(&chunk).map_err(|e| std::io::Error::other(e.to_string())));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Converts a live Gemini-Business SSE response into its own unwrapped JSON
/// values one upstream event at a time, updating `log`'s first-byte mark and
/// usage totals as it goes. Dropping the returned stream drops `upstream`
/// and its underlying connection with it.
fn gemini_business_stream_values(
    resp: reqwest::Response,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: RequestLog,
) -> impl Stream<Item = serde_json::Value> {
    use eventsource_stream::Eventsource;

    let start_unix_ms = log.start_time_unix_ms;
    let state = BusinessStreamState {
        upstream: Box::pin(resp.bytes_stream().eventsource()),
        full_text: String::new(),
        prompt_tokens,
        tokenizer,
        log: Some(log),
        start_unix_ms,
        first_byte_seen: false,
    };

    futures::stream::unfold(state, move |mut st| async move {
        loop {
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
                    let Some(value) = unwrap_business_response(&ev.data) else { continue };
                    if let Ok(body) = serde_json::from_value::<GeminiResponseBody>(value.clone()) {
                        let parts = extract_gemini_parts(&body);
                        st.full_text.push_str(&parts.thinking);
                        st.full_text.push_str(&parts.text);
                    }
                    return Some((value, st));
                }
                Some(Err(_)) | None => {
                    if let Some(mut log) = st.log.take() {
                        let completion_tokens = st.tokenizer.count_tokens(&st.full_text);
                        log.record_usage(st.prompt_tokens, completion_tokens);
                        log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), StatusCode::OK, None);
                    }
                    return None;
                }
            }
        }
    })
}

struct BusinessStreamState {
    upstream: UpstreamEvents,
    full_text: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: Option<RequestLog>,
    start_unix_ms: i64,
    first_byte_seen: bool,
}

type UpstreamEvents =
    Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event, eventsource_stream::EventStreamError<reqwest::Error>>> + Send>>;

fn build_openai_response(
    model: &str,
    output: BusinessOutput,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    mut log: RequestLog,
) -> Response {
    match output {
        BusinessOutput::Stream(resp) => {
            let chunks = business_stream_chat_chunks(resp, model.to_string(), prompt_tokens, tokenizer, log);
            openai_sse_stream(chunks)
        }
        BusinessOutput::Buffered(value) => {
            debug_assert!(!stream, "BusinessOutput::Buffered only ever answers a non-streaming request");
            let now = chrono::Utc::now().timestamp_millis();
            let mut full_text = String::new();
            let mut tool_calls = Vec::new();

            if let Ok(body) = serde_json::from_value::<GeminiResponseBody>(value.clone()) {
                let parts = extract_gemini_parts(&body);
                full_text.push_str(&parts.text);
                for call in parts.tool_calls {
                    tool_calls.push(ToolCall {
                        id: format!("call_{}", Uuid::new_v4().simple()),
                        kind: "function".to_string(),
                        function: ToolCallFunction { name: call.name, arguments: call.args.to_string() },
                    });
                }
            }

            let completion_tokens = tokenizer.count_tokens(&full_text);
            log.record_usage(prompt_tokens, completion_tokens);
            log.finalize(&StdoutLogSink, now, StatusCode::OK, None);

            let has_tool_calls = !tool_calls.is_empty();
            let finish_reason = if has_tool_calls { "tool_calls" } else { "stop" };
            let resp = ChatCompletionResponse {
                id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
                object: "chat.completion".to_string(),
                created: now / 1000,
                model: model.to_string(),
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatChoiceMessage {
                        role: "assistant".to_string(),
                        content: (!full_text.is_empty()).then_some(full_text),
                        tool_calls: has_tool_calls.then_some(tool_calls),
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
}

/// Converts a live Gemini-Business SSE response into OpenAI-dialect chat
/// chunks one upstream event at a time, mirroring the chat-completions
/// route's own Gemini-family streaming fix.
fn business_stream_chat_chunks(
    resp: reqwest::Response,
    model: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: RequestLog,
) -> impl Stream<Item = relaygate_schema::openai::ChatCompletionChunk> {
    use eventsource_stream::Eventsource;

    let start_unix_ms = log.start_time_unix_ms;
    let state = BusinessChatStreamState {
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
                    let Some(value) = unwrap_business_response(&ev.data) else { continue };
                    if let Ok(body) = serde_json::from_value::<GeminiResponseBody>(value) {
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

struct BusinessChatStreamState {
    upstream: UpstreamEvents,
    emitter: OpenAiStreamEmitter,
    queue: VecDeque<relaygate_schema::openai::ChatCompletionChunk>,
    full_text: String,
    prompt_tokens: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: Option<RequestLog>,
    start_unix_ms: i64,
    started: bool,
    first_byte_seen: bool,
    done: bool,
}

/// One upstream attempt's settled content: a raw still-unconsumed SSE
/// response for a streaming caller, consumed incrementally by
/// [`gemini_business_stream_values`]/[`business_stream_chat_chunks`] rather
/// than collected upfront, or a single buffered JSON value for a
/// non-streaming caller.
enum BusinessOutput {
    Stream(reqwest::Response),
    Buffered(serde_json::Value),
}

/// Creates a widget session, then drives `widgetStreamAssist` with it. There
/// is no cross-request session cache (unlike the JWT, which is cheap to
/// reuse for 270 s): each attempt mints a fresh session, matching how little
/// the upstream's session lifetime is documented to be.
async fn send_business(
    client: &reqwest::Client,
    jwt_minter: &BusinessJwtMinter,
    account: &Account,
    credential: &Credential,
    req: &GeminiGenerateContentRequest,
    stream: bool,
) -> Result<(AccountId, BusinessOutput), AttemptError> {
    let Credential::GeminiBusiness {
        secure_c_ses,
        csesidx,
        host_c_oses,
        config_id,
        disabled,
    } = credential
    else {
        return Err(AttemptError::Terminal {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "account credential is not a Gemini-Business credential".to_string(),
        });
    };

    if *disabled {
        return Err(AttemptError::Terminal {
            status: StatusCode::FORBIDDEN,
            message: "account disabled".to_string(),
        });
    }

    let cookie = format!(
        "__Secure-C_SES={}; __Host-C_OSES={}",
        secure_c_ses,
        host_c_oses.as_deref().unwrap_or_default()
    );
    let issued_at = chrono::Utc::now().timestamp();
    let jwt = jwt_minter
        .mint_or_get(account.id, XSRF_ENDPOINT, &cookie, csesidx, JWT_ISSUER, JWT_AUDIENCE, issued_at)
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: e.terminal_status(),
            message: e.to_string(),
        })?;

    let mut headers = gemini_business_headers(&jwt, None);
    headers.insert(
        COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| AttemptError::Terminal {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?,
    );

    let session_req = WidgetCreateSessionRequest {
        config_id: config_id.clone(),
        extra: Default::default(),
    };
    let session_resp = client
        .post(gemini_business_url(None, WidgetEndpoint::CreateSession))
        .headers(headers.clone())
        .json(&session_req)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if !session_resp.status().is_success() {
        return Err(classify_business_error(session_resp).await);
    }

    let session_body: WidgetCreateSessionResponse =
        session_resp.json().await.map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        })?;

    let assist_req = WidgetStreamAssistRequest {
        config_id: config_id.clone(),
        session_id: session_body.session_id,
        request: serde_json::to_value(req).unwrap_or_default(),
        extra: Default::default(),
    };

    let resp = client
        .post(gemini_business_url(None, WidgetEndpoint::StreamAssist))
        .headers(headers)
        .json(&assist_req)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(classify_business_error(resp).await);
    }

    if stream {
        return Ok((account.id, BusinessOutput::Stream(resp)));
    }

    let bytes = resp.bytes().await.map_err(|e| AttemptError::Retryable {
        action: ActionForError::None,
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: e.to_string(),
    })?;
    let value = unwrap_business_response(&String::from_utf8_lossy(&bytes)).ok_or_else(|| AttemptError::Retryable {
        action: ActionForError::None,
        status: StatusCode::BAD_GATEWAY,
        message: "upstream returned an unparseable Gemini-Business response body".to_string(),
    })?;

    Ok((account.id, BusinessOutput::Buffered(value)))
}

/// The widget transport nests every response under a `response` key, the
/// same envelope shape CodeAssist/Antigravity use.
fn unwrap_business_response(raw: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    Some(value.get("response").cloned().unwrap_or(value))
}

async fn classify_business_error(resp: reqwest::Response) -> AttemptError {
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
    fn splits_model_and_stream_flag_from_wildcard_path() {
        let (model, stream) = model_and_stream_from_path("gemini-2.5-pro:generateContent");
        assert_eq!(model, "gemini-2.5-pro");
        assert!(!stream);

        let (model, stream) = model_and_stream_from_path("gemini-2.5-pro:streamGenerateContent");
        assert_eq!(model, "gemini-2.5-pro");
        assert!(stream);
    }

    #[test]
    fn unwraps_nested_response_envelope() {
        let value = unwrap_business_response(r#"{"response":{"candidates":[]}}"#).unwrap();
        assert_eq!(value, serde_json::json!({"candidates": []}));
    }

    #[test]
    fn passes_through_when_not_enveloped() {
        let value = unwrap_business_response(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(value, serde_json::json!({"candidates": []}));
    }
}
