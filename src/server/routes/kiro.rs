use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use uuid::Uuid;

use relaygate_schema::anthropic::{MessagesRequest, MessagesResponse, StreamEvent, Usage as AnthropicUsage};
use relaygate_schema::kiro::ConversationStateRequest;
use relaygate_schema::openai::{
    ChatChoice, ChatChoiceMessage, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ToolCall,
    ToolCallFunction, Usage as OpenaiUsage,
};
use relaygate_schema::ContentBlock;

use crate::account::{Account, AccountId, ConversationStickyKey, ProviderTag};
use crate::credential::Credential;
use crate::dispatch::{ActionForError, AttemptError, RequestLog, StdoutLogSink};
use crate::error::{anthropic_error_response, openai_error_response};
use crate::server::routes::respond::{anthropic_sse_stream, openai_sse_stream};
use crate::server::state::AppState;
use crate::streaming::{AnthropicStreamEmitter, KiroFrame, OpenAiStreamEmitter, ThinkChunk, ThinkTagSplitter, scan_frames};
use crate::tokenizer::Tokenizer;
use crate::transform::{anthropic_model_to_kiro, anthropic_to_openai, openai_to_kiro_conversation_state};
use crate::upstream::{kiro_headers, kiro_machine_id, kiro_url};
use crate::usage::{pricing_for, reconstruct_kiro_usage};

const MAX_ATTEMPTS: usize = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/kiro/v1/messages", post(kiro_messages))
        .route("/kiro/v1/chat/completions", post(kiro_chat_completions))
}

/// Everything this route needs out of a finished Kiro response, independent
/// of which wire event shape it started as.
#[derive(Default)]
struct KiroOutput {
    text: String,
    tool_calls: Vec<KiroToolCall>,
    context_usage_percentage: Option<f64>,
    usage_credits: Option<f64>,
}

struct KiroToolCall {
    id: String,
    name: String,
    input: String,
}

/// One upstream attempt's settled content: a raw still-unconsumed response
/// for a streaming caller, consumed incrementally by
/// [`kiro_stream_events`]/[`kiro_stream_chat_chunks`] as frames are scanned
/// off the wire, or a fully assembled output for a non-streaming caller.
enum KiroAttemptOutput {
    Stream(reqwest::Response),
    Buffered(KiroOutput),
}

async fn kiro_messages(State(state): State<AppState>, Json(req): Json<MessagesRequest>) -> Response {
    let stream = req.stream;
    let model = req.model.clone();
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model.clone(), stream, start_unix_ms);

    let sticky_key = sticky_key_for(&req);
    let sticky = state.sessions.get_conversation_account(&sticky_key);

    let openai_req = anthropic_to_openai(&req);
    let model_id = anthropic_model_to_kiro(&req.model);
    let tokenizer = state.tokenizer.clone();
    let prompt_estimate = estimate_prompt_tokens(&openai_req, tokenizer.as_ref());
    let thinking_enabled = thinking_is_enabled(&req);

    let client = state.kiro_client.clone();
    let openai_req_ref = &openai_req;
    let model_id_ref = model_id.as_str();
    let conversation_id = conversation_id_for(&sticky_key);

    let outcome = state
        .dispatch
        .dispatch(
            vec![ProviderTag::Kiro],
            MAX_ATTEMPTS,
            sticky,
            move |account, credential| {
                let client = client.clone();
                let conversation_id = conversation_id.clone();
                async move {
                    send_kiro(&client, &account, &credential, openai_req_ref, &conversation_id, model_id_ref, stream)
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
            build_anthropic_response(
                &model,
                output,
                prompt_estimate,
                &model_id,
                thinking_enabled,
                tokenizer,
                log,
            )
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            anthropic_error_response(status, message)
        }
    }
}

/// §4.4's `thinking: {"type": "enabled", ...}` toggle; gates whether
/// `<think>` spans in Kiro's plain-text output are split into dedicated
/// thinking blocks rather than left inline.
fn thinking_is_enabled(req: &MessagesRequest) -> bool {
    req.thinking
        .as_ref()
        .and_then(|v| v.get("type"))
        .and_then(serde_json::Value::as_str)
        == Some("enabled")
}

async fn kiro_chat_completions(State(state): State<AppState>, Json(req): Json<ChatCompletionRequest>) -> Response {
    let stream = req.stream;
    let model = req.model.clone();
    let start_unix_ms = chrono::Utc::now().timestamp_millis();
    let mut log = RequestLog::new(Uuid::new_v4().to_string(), model.clone(), stream, start_unix_ms);

    let sticky_key = req.prompt_cache_key.as_deref().map(ConversationStickyKey::from_explicit);
    let sticky = sticky_key.as_ref().and_then(|key| state.sessions.get_conversation_account(key));

    let model_id = anthropic_model_to_kiro(&model);
    let tokenizer = state.tokenizer.clone();
    let prompt_estimate = estimate_prompt_tokens(&req, tokenizer.as_ref());

    let client = state.kiro_client.clone();
    let req_ref = &req;
    let model_id_ref = model_id.as_str();
    let conversation_id = sticky_key
        .as_ref()
        .map(conversation_id_for)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .dispatch
        .dispatch(
            vec![ProviderTag::Kiro],
            MAX_ATTEMPTS,
            sticky,
            move |account, credential| {
                let client = client.clone();
                let conversation_id = conversation_id.clone();
                async move {
                    send_kiro(&client, &account, &credential, req_ref, &conversation_id, model_id_ref, stream).await
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
            build_openai_response(&model, output, prompt_estimate, &model_id, tokenizer, log)
        }
        Err((status, message)) => {
            log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), status, Some(message.clone()));
            openai_error_response(status, message)
        }
    }
}

fn plain_text_of(content: &relaygate_schema::anthropic::MessageContent) -> String {
    content
        .as_blocks()
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn sticky_key_for(req: &MessagesRequest) -> ConversationStickyKey {
    let earliest_user_text = req
        .messages
        .iter()
        .find(|m| m.role == "user")
        .map(|m| plain_text_of(&m.content))
        .unwrap_or_default();
    let system_text = req.system.as_ref().map(|s| s.as_plain_text()).unwrap_or_default();
    ConversationStickyKey::from_anthropic_seed(None, None, &earliest_user_text, &system_text, Vec::new())
}

/// CodeWhisperer wants a stable `conversationId` per logical thread; derive
/// one deterministically from the sticky fingerprint (the same one used for
/// account stickiness) so retries and follow-up turns land in the same
/// upstream conversation.
fn conversation_id_for(key: &ConversationStickyKey) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(key.as_str().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn estimate_prompt_tokens(req: &ChatCompletionRequest, tokenizer: &dyn Tokenizer) -> u64 {
    let text: String = req.messages.iter().map(|m| m.text_content()).collect::<Vec<_>>().join("\n");
    tokenizer.count_tokens(&text).max(1)
}

async fn send_kiro(
    client: &reqwest::Client,
    account: &Account,
    credential: &Credential,
    req: &ChatCompletionRequest,
    conversation_id: &str,
    model_id: &str,
    stream: bool,
) -> Result<(AccountId, KiroAttemptOutput), AttemptError> {
    let Credential::Kiro {
        access_token,
        region,
        profile_arn,
        auth_method,
        client_id,
        ..
    } = credential
    else {
        return Err(AttemptError::Terminal {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "account credential is not a Kiro credential".to_string(),
        });
    };

    let conversation_state = openai_to_kiro_conversation_state(req, conversation_id.to_string(), model_id)
        .map_err(|e| AttemptError::Terminal {
            status: e.terminal_status(),
            message: e.to_string(),
        })?;

    // `SendMessageStreaming` is CodeWhisperer's Identity-Center/Amazon-Q path;
    // social/OAuth Claude accounts use `generateAssistantResponse`.
    let is_amazon_q_model = auth_method == "IdC";
    let url = kiro_url(region, is_amazon_q_model);
    let machine_id = kiro_machine_id(None, Some(profile_arn.as_str()), client_id.as_deref());
    let headers = kiro_headers(access_token, &machine_id);

    let resp = client
        .post(url)
        .headers(headers)
        .json(&conversation_state)
        .send()
        .await
        .map_err(|e| AttemptError::Retryable {
            action: ActionForError::None,
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: e.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(classify_kiro_error(resp).await);
    }

    if stream {
        return Ok((account.id, KiroAttemptOutput::Stream(resp)));
    }

    let frames = collect_kiro_frames(resp).await.map_err(|e| AttemptError::Retryable {
        action: ActionForError::None,
        status: StatusCode::BAD_GATEWAY,
        message: e.to_string(),
    })?;

    Ok((account.id, KiroAttemptOutput::Buffered(assemble_kiro_output(frames))))
}

async fn classify_kiro_error(resp: reqwest::Response) -> AttemptError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let action = match status {
        StatusCode::TOO_MANY_REQUESTS => ActionForError::RateLimit(std::time::Duration::from_secs(60)),
        StatusCode::FORBIDDEN => ActionForError::Ban,
        StatusCode::UNAUTHORIZED => ActionForError::Invalid,
        StatusCode::NOT_FOUND => ActionForError::ModelUnsupported,
        _ => ActionForError::None,
    };
    let message = if body.is_empty() {
        format!("Kiro upstream returned {status}")
    } else {
        body
    };
    AttemptError::Retryable { action, status, message }
}

/// Reads the response body as it arrives, scanning each accumulated buffer
/// for complete frames and holding the unconsumed tail for the next chunk
/// (mirrors the scanning contract documented on `scan_frames`).
async fn collect_kiro_frames(resp: reqwest::Response) -> Result<Vec<KiroFrame>, reqwest::Error> {
    let mut pending = String::new();
    let mut frames = Vec::new();
    let mut bytes_stream = resp.bytes_stream();

    while let Some(chunk) = bytes_stream.next().await {
        pending.push_str(&String::from_utf8_lossy(&chunk?));
        let (found, rest) = scan_frames(&pending);
        frames.extend(found);
        pending = rest;
    }

    Ok(frames)
}

fn assemble_kiro_output(frames: Vec<KiroFrame>) -> KiroOutput {
    let mut out = KiroOutput::default();
    let mut last_content = String::new();
    let mut current_tool: Option<KiroToolCall> = None;

    for frame in frames {
        match frame {
            KiroFrame::Content(full_or_delta) => {
                let delta = full_or_delta
                    .strip_prefix(last_content.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| full_or_delta.clone());
                out.text.push_str(&delta);
                last_content = full_or_delta;
            }
            KiroFrame::ToolOpen { tool_use_id, name, input } => {
                current_tool = Some(KiroToolCall {
                    id: tool_use_id,
                    name,
                    input: input.unwrap_or_default(),
                });
            }
            KiroFrame::ToolInputContinuation(fragment) => {
                if let Some(tool) = current_tool.as_mut() {
                    tool.input.push_str(&fragment);
                }
            }
            KiroFrame::ToolStop => {
                if let Some(tool) = current_tool.take() {
                    out.tool_calls.push(tool);
                }
            }
            KiroFrame::Credits { usage, .. } => out.usage_credits = Some(usage),
            KiroFrame::ContextUsage(pct) => out.context_usage_percentage = Some(pct),
        }
    }

    out
}

/// Kiro never reports completion tokens directly; the credit/context-usage
/// pair only reconstructs the prompt side (§4.7). Completion tokens are
/// estimated from the assembled text the same way every other non-native
/// dialect here does.
fn usage_from_output(output: &KiroOutput, model_id: &str, fallback_prompt: u64, tokenizer: &dyn Tokenizer) -> (u64, u64) {
    let completion_tokens = tokenizer.count_tokens(&output.text);

    let prompt_tokens = match (pricing_for(model_id), output.context_usage_percentage, output.usage_credits) {
        (Some(pricing), Some(pct), Some(credits)) => {
            reconstruct_kiro_usage(pricing, pct, credits).input_tokens
        }
        _ => fallback_prompt,
    };

    (prompt_tokens, completion_tokens)
}

fn kiro_tool_calls_to_anthropic(tool_calls: &[KiroToolCall]) -> Vec<ContentBlock> {
    tool_calls
        .iter()
        .map(|call| ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: serde_json::from_str(&call.input).unwrap_or(serde_json::Value::Null),
            cache_control: None,
        })
        .collect()
}

fn kiro_tool_calls_to_openai(tool_calls: Vec<KiroToolCall>) -> Vec<ToolCall> {
    tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: call.name,
                arguments: call.input,
            },
        })
        .collect()
}

fn build_anthropic_response(
    model: &str,
    output: KiroAttemptOutput,
    fallback_prompt: u64,
    model_id: &str,
    thinking_enabled: bool,
    tokenizer: Arc<dyn Tokenizer>,
    mut log: RequestLog,
) -> Response {
    let output = match output {
        KiroAttemptOutput::Stream(resp) => {
            let events = kiro_stream_events(
                resp,
                model.to_string(),
                fallback_prompt,
                model_id.to_string(),
                thinking_enabled,
                tokenizer,
                log,
            );
            return anthropic_sse_stream(events);
        }
        KiroAttemptOutput::Buffered(output) => output,
    };

    let (prompt_tokens, completion_tokens) = usage_from_output(&output, model_id, fallback_prompt, tokenizer.as_ref());
    log.record_usage(prompt_tokens, completion_tokens);
    log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), StatusCode::OK, None);

    let stop_reason = if output.tool_calls.is_empty() { "end_turn" } else { "tool_use" };

    let mut content = Vec::new();
    if !output.text.is_empty() {
        content.push(ContentBlock::text(output.text.clone()));
    }
    content.extend(kiro_tool_calls_to_anthropic(&output.tool_calls));

    let resp = MessagesResponse {
        id: format!("msg_{}", Uuid::new_v4().simple()),
        kind: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: model.to_string(),
        stop_reason: Some(stop_reason.to_string()),
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        },
    };
    Json(resp).into_response()
}

fn build_openai_response(
    model: &str,
    output: KiroAttemptOutput,
    fallback_prompt: u64,
    model_id: &str,
    tokenizer: Arc<dyn Tokenizer>,
    mut log: RequestLog,
) -> Response {
    let output = match output {
        KiroAttemptOutput::Stream(resp) => {
            let chunks = kiro_stream_chat_chunks(resp, model.to_string(), fallback_prompt, model_id.to_string(), tokenizer, log);
            return openai_sse_stream(chunks);
        }
        KiroAttemptOutput::Buffered(output) => output,
    };

    let (prompt_tokens, completion_tokens) = usage_from_output(&output, model_id, fallback_prompt, tokenizer.as_ref());
    log.record_usage(prompt_tokens, completion_tokens);
    log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), StatusCode::OK, None);

    let finish_reason = if output.tool_calls.is_empty() { "stop" } else { "tool_calls" };
    let text = output.text.clone();
    let has_tool_calls = !output.tool_calls.is_empty();

    let resp = ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatChoiceMessage {
                role: "assistant".to_string(),
                content: (!text.is_empty()).then_some(text),
                tool_calls: has_tool_calls.then(|| kiro_tool_calls_to_openai(output.tool_calls)),
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

/// One upstream frame's effect, independent of which dialect consumes it.
/// [`step_kiro_frame`] extracts this from a raw `KiroFrame`; each streaming
/// generator below decides how to turn it into its own wire events.
enum KiroDelta {
    Text(String),
    ToolOpen { id: String, name: String, input: String },
    ToolInputDelta(String),
    ToolClose,
}

/// Mirrors `assemble_kiro_output`'s per-frame logic one frame at a time, so a
/// streaming generator can react as each frame is scanned off the wire
/// instead of waiting for the whole response.
fn step_kiro_frame(
    frame: KiroFrame,
    last_content: &mut String,
    context_usage_percentage: &mut Option<f64>,
    usage_credits: &mut Option<f64>,
) -> Option<KiroDelta> {
    match frame {
        KiroFrame::Content(full_or_delta) => {
            let delta = full_or_delta
                .strip_prefix(last_content.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| full_or_delta.clone());
            *last_content = full_or_delta;
            (!delta.is_empty()).then_some(KiroDelta::Text(delta))
        }
        KiroFrame::ToolOpen { tool_use_id, name, input } => Some(KiroDelta::ToolOpen {
            id: tool_use_id,
            name,
            input: input.unwrap_or_default(),
        }),
        KiroFrame::ToolInputContinuation(fragment) => Some(KiroDelta::ToolInputDelta(fragment)),
        KiroFrame::ToolStop => Some(KiroDelta::ToolClose),
        KiroFrame::Credits { usage, .. } => {
            *usage_credits = Some(usage);
            None
        }
        KiroFrame::ContextUsage(pct) => {
            *context_usage_percentage = Some(pct);
            None
        }
    }
}

/// Resolves final prompt tokens the same way `usage_from_output` does, from
/// whatever credit/context-usage frames were seen during the stream.
fn resolve_prompt_tokens(
    model_id: &str,
    fallback_prompt: u64,
    context_usage_percentage: Option<f64>,
    usage_credits: Option<f64>,
) -> u64 {
    match (pricing_for(model_id), context_usage_percentage, usage_credits) {
        (Some(pricing), Some(pct), Some(credits)) => reconstruct_kiro_usage(pricing, pct, credits).input_tokens,
        _ => fallback_prompt,
    }
}

type KiroByteStream = Pin<Box<dyn Stream<Item = Result<axum::body::Bytes, reqwest::Error>> + Send>>;

struct KiroAnthropicStreamState {
    bytes_stream: KiroByteStream,
    pending: String,
    frame_queue: VecDeque<KiroFrame>,
    emitter: AnthropicStreamEmitter,
    splitter: ThinkTagSplitter,
    thinking_enabled: bool,
    last_content: String,
    context_usage_percentage: Option<f64>,
    usage_credits: Option<f64>,
    full_text: String,
    queue: VecDeque<StreamEvent>,
    model_id: String,
    fallback_prompt: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: Option<RequestLog>,
    start_unix_ms: i64,
    started: bool,
    first_byte_seen: bool,
    upstream_done: bool,
    done: bool,
}

/// Scans Kiro's AWS-event-stream frames off the wire as they arrive and
/// drives an [`AnthropicStreamEmitter`] incrementally, splitting `<think>`
/// spans out of the text when `thinking_enabled`. Dropping the returned
/// stream (client disconnect) drops `bytes_stream` and its connection.
fn kiro_stream_events(
    resp: reqwest::Response,
    model: String,
    fallback_prompt: u64,
    model_id: String,
    thinking_enabled: bool,
    tokenizer: Arc<dyn Tokenizer>,
    log: RequestLog,
) -> impl Stream<Item = StreamEvent> {
    let start_unix_ms = log.start_time_unix_ms;
    let state = KiroAnthropicStreamState {
        bytes_stream: Box::pin(resp.bytes_stream()),
        pending: String::new(),
        frame_queue: VecDeque::new(),
        emitter: AnthropicStreamEmitter::new(),
        splitter: ThinkTagSplitter::new(),
        thinking_enabled,
        last_content: String::new(),
        context_usage_percentage: None,
        usage_credits: None,
        full_text: String::new(),
        queue: VecDeque::new(),
        model_id,
        fallback_prompt,
        tokenizer,
        log: Some(log),
        start_unix_ms,
        started: false,
        first_byte_seen: false,
        upstream_done: false,
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
                st.queue.extend(st.emitter.start(&model, st.fallback_prompt));
                continue;
            }
            if let Some(frame) = st.frame_queue.pop_front() {
                let delta = step_kiro_frame(
                    frame,
                    &mut st.last_content,
                    &mut st.context_usage_percentage,
                    &mut st.usage_credits,
                );
                match delta {
                    Some(KiroDelta::Text(text)) => {
                        if st.thinking_enabled {
                            for chunk in st.splitter.push(&text) {
                                match chunk {
                                    ThinkChunk::Thinking(t) => {
                                        st.full_text.push_str(&t);
                                        st.queue.extend(st.emitter.thinking_delta(t));
                                    }
                                    ThinkChunk::Plain(t) => {
                                        st.full_text.push_str(&t);
                                        st.queue.extend(st.emitter.text_delta(t));
                                    }
                                }
                            }
                        } else {
                            st.full_text.push_str(&text);
                            st.queue.extend(st.emitter.text_delta(text));
                        }
                    }
                    Some(KiroDelta::ToolOpen { id, name, input }) => {
                        st.queue.extend(st.emitter.tool_use_start(id, name));
                        if !input.is_empty() {
                            st.queue.extend(st.emitter.tool_use_input_delta(input));
                        }
                    }
                    Some(KiroDelta::ToolInputDelta(fragment)) => {
                        st.queue.extend(st.emitter.tool_use_input_delta(fragment));
                    }
                    Some(KiroDelta::ToolClose) | None => {}
                }
                continue;
            }
            if st.upstream_done {
                if st.thinking_enabled {
                    for chunk in st.splitter.flush() {
                        match chunk {
                            ThinkChunk::Thinking(t) => {
                                st.full_text.push_str(&t);
                                st.queue.extend(st.emitter.thinking_delta(t));
                            }
                            ThinkChunk::Plain(t) => {
                                st.full_text.push_str(&t);
                                st.queue.extend(st.emitter.text_delta(t));
                            }
                        }
                    }
                }
                let completion_tokens = st.tokenizer.count_tokens(&st.full_text);
                let prompt_tokens = resolve_prompt_tokens(
                    &st.model_id,
                    st.fallback_prompt,
                    st.context_usage_percentage,
                    st.usage_credits,
                );
                st.queue.extend(st.emitter.finish(completion_tokens));
                if let Some(mut log) = st.log.take() {
                    log.record_usage(prompt_tokens, completion_tokens);
                    log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), StatusCode::OK, None);
                }
                st.done = true;
                continue;
            }
            match st.bytes_stream.next().await {
                Some(Ok(bytes)) => {
                    if !st.first_byte_seen {
                        st.first_byte_seen = true;
                        if let Some(log) = st.log.as_mut() {
                            let elapsed = (chrono::Utc::now().timestamp_millis() - st.start_unix_ms).max(0) as u64;
                            log.record_first_byte(elapsed);
                        }
                    }
                    st.pending.push_str(&String::from_utf8_lossy(&bytes));
                    let (found, rest) = scan_frames(&st.pending);
                    st.frame_queue.extend(found);
                    st.pending = rest;
                    continue;
                }
                Some(Err(_)) | None => {
                    st.upstream_done = true;
                    continue;
                }
            }
        }
    })
}

struct KiroOpenAiStreamState {
    bytes_stream: KiroByteStream,
    pending: String,
    frame_queue: VecDeque<KiroFrame>,
    emitter: OpenAiStreamEmitter,
    last_content: String,
    current_tool: Option<KiroToolCall>,
    context_usage_percentage: Option<f64>,
    usage_credits: Option<f64>,
    full_text: String,
    queue: VecDeque<ChatCompletionChunk>,
    model_id: String,
    fallback_prompt: u64,
    tokenizer: Arc<dyn Tokenizer>,
    log: Option<RequestLog>,
    start_unix_ms: i64,
    started: bool,
    first_byte_seen: bool,
    upstream_done: bool,
    done: bool,
}

/// Same incremental frame scan as [`kiro_stream_events`], driving an
/// [`OpenAiStreamEmitter`] instead. OpenAI's wire format has no dedicated
/// thinking block, so `<think>` spans are left inline in the text rather
/// than split out.
fn kiro_stream_chat_chunks(
    resp: reqwest::Response,
    model: String,
    fallback_prompt: u64,
    model_id: String,
    tokenizer: Arc<dyn Tokenizer>,
    log: RequestLog,
) -> impl Stream<Item = ChatCompletionChunk> {
    let start_unix_ms = log.start_time_unix_ms;
    let state = KiroOpenAiStreamState {
        bytes_stream: Box::pin(resp.bytes_stream()),
        pending: String::new(),
        frame_queue: VecDeque::new(),
        emitter: OpenAiStreamEmitter::new(model, start_unix_ms / 1000),
        last_content: String::new(),
        current_tool: None,
        context_usage_percentage: None,
        usage_credits: None,
        full_text: String::new(),
        queue: VecDeque::new(),
        model_id,
        fallback_prompt,
        tokenizer,
        log: Some(log),
        start_unix_ms,
        started: false,
        first_byte_seen: false,
        upstream_done: false,
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
            if let Some(frame) = st.frame_queue.pop_front() {
                let delta = step_kiro_frame(
                    frame,
                    &mut st.last_content,
                    &mut st.context_usage_percentage,
                    &mut st.usage_credits,
                );
                match delta {
                    Some(KiroDelta::Text(text)) => {
                        st.full_text.push_str(&text);
                        st.queue.push_back(st.emitter.text_delta(text));
                    }
                    Some(KiroDelta::ToolOpen { id, name, input }) => {
                        st.current_tool = Some(KiroToolCall { id, name, input });
                    }
                    Some(KiroDelta::ToolInputDelta(fragment)) => {
                        if let Some(tool) = st.current_tool.as_mut() {
                            tool.input.push_str(&fragment);
                        }
                    }
                    Some(KiroDelta::ToolClose) => {
                        if let Some(tool) = st.current_tool.take() {
                            st.emitter.record_tool_call(tool.id, tool.name, tool.input);
                        }
                    }
                    None => {}
                }
                continue;
            }
            if st.upstream_done {
                let completion_tokens = st.tokenizer.count_tokens(&st.full_text);
                let prompt_tokens = resolve_prompt_tokens(
                    &st.model_id,
                    st.fallback_prompt,
                    st.context_usage_percentage,
                    st.usage_credits,
                );
                st.queue.push_back(st.emitter.finish(prompt_tokens, completion_tokens));
                if let Some(mut log) = st.log.take() {
                    log.record_usage(prompt_tokens, completion_tokens);
                    log.finalize(&StdoutLogSink, chrono::Utc::now().timestamp_millis(), StatusCode::OK, None);
                }
                st.done = true;
                continue;
            }
            match st.bytes_stream.next().await {
                Some(Ok(bytes)) => {
                    if !st.first_byte_seen {
                        st.first_byte_seen = true;
                        if let Some(log) = st.log.as_mut() {
                            let elapsed = (chrono::Utc::now().timestamp_millis() - st.start_unix_ms).max(0) as u64;
                            log.record_first_byte(elapsed);
                        }
                    }
                    st.pending.push_str(&String::from_utf8_lossy(&bytes));
                    let (found, rest) = scan_frames(&st.pending);
                    st.frame_queue.extend(found);
                    st.pending = rest;
                    continue;
                }
                Some(Err(_)) | None => {
                    st.upstream_done = true;
                    continue;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_cumulative_content_frames_into_deltas() {
        let frames = vec![
            KiroFrame::Content("Hel".to_string()),
            KiroFrame::Content("Hello".to_string()),
            KiroFrame::Content("Hello!".to_string()),
        ];
        let out = assemble_kiro_output(frames);
        assert_eq!(out.text, "Hello!");
    }

    #[test]
    fn assembles_tool_call_across_continuation_frames() {
        let frames = vec![
            KiroFrame::ToolOpen {
                tool_use_id: "t1".to_string(),
                name: "search".to_string(),
                input: Some("{\"q\":".to_string()),
            },
            KiroFrame::ToolInputContinuation("\"rust\"}".to_string()),
            KiroFrame::ToolStop,
        ];
        let out = assemble_kiro_output(frames);
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].input, "{\"q\":\"rust\"}");
    }

    #[test]
    fn captures_credit_and_context_usage_frames() {
        let frames = vec![
            KiroFrame::ContextUsage(50.0),
            KiroFrame::Credits { unit: "CREDIT".to_string(), usage: 0.1 },
        ];
        let out = assemble_kiro_output(frames);
        assert_eq!(out.context_usage_percentage, Some(50.0));
        assert_eq!(out.usage_credits, Some(0.1));
    }
}
