use reqwest::StatusCode;

use crate::account::AccountId;

#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt {
    pub attempt: usize,
    pub account_id: AccountId,
}

/// Append-only per-request record (§3, §4.10). Created at entry, mutated on
/// each attempt, finalized exactly once (P4).
#[derive(Debug)]
pub struct RequestLog {
    pub id: String,
    pub model: String,
    pub stream: bool,
    pub start_time_unix_ms: i64,
    pub first_byte_ms: Option<u64>,
    pub end_time_unix_ms: Option<i64>,
    pub status_code: Option<u16>,
    pub retries: Vec<RetryAttempt>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub error_message: Option<String>,
    finalized: bool,
}

impl RequestLog {
    pub fn new(id: impl Into<String>, model: impl Into<String>, stream: bool, start_time_unix_ms: i64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            stream,
            start_time_unix_ms,
            first_byte_ms: None,
            end_time_unix_ms: None,
            status_code: None,
            retries: Vec::new(),
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            error_message: None,
            finalized: false,
        }
    }

    pub fn record_attempt(&mut self, attempt: usize, account_id: AccountId) {
        self.retries.push(RetryAttempt { attempt, account_id });
    }

    /// Only the first call has an effect; time-to-first-byte is fixed at the
    /// handler's first chunk, not the full stream duration.
    pub fn record_first_byte(&mut self, elapsed_ms: u64) {
        if self.first_byte_ms.is_none() {
            self.first_byte_ms = Some(elapsed_ms);
        }
    }

    pub fn record_usage(&mut self, prompt: u64, completion: u64) {
        self.prompt_tokens = Some(prompt);
        self.completion_tokens = Some(completion);
        self.total_tokens = Some(prompt + completion);
    }

    /// Finalizes this record and hands it to the sink. Panics if called
    /// twice; the dispatch loop's single success/terminal-failure exit point
    /// is the only caller.
    pub fn finalize(
        mut self,
        sink: &dyn LogSink,
        end_time_unix_ms: i64,
        status: StatusCode,
        error_message: Option<String>,
    ) {
        assert!(!self.finalized, "RequestLog finalized twice for id {}", self.id);
        self.finalized = true;
        self.end_time_unix_ms = Some(end_time_unix_ms);
        self.status_code = Some(status.as_u16());
        self.error_message = error_message;
        sink.emit(&self);
    }
}

pub trait LogSink: Send + Sync {
    fn emit(&self, log: &RequestLog);
}

/// Emits each finalized record as a single structured `tracing` event.
pub struct StdoutLogSink;

impl LogSink for StdoutLogSink {
    fn emit(&self, log: &RequestLog) {
        let latency_ms = log
            .end_time_unix_ms
            .map(|end| (end - log.start_time_unix_ms).max(0) as u64);
        tracing::info!(
            request.id = %log.id,
            request.model = %log.model,
            request.stream = log.stream,
            request.status = log.status_code,
            request.latency_ms = latency_ms,
            request.first_byte_ms = log.first_byte_ms,
            request.retries = log.retries.len(),
            request.prompt_tokens = log.prompt_tokens,
            request.completion_tokens = log.completion_tokens,
            request.error = log.error_message.as_deref(),
            "request finalized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink(std::sync::Mutex<Vec<(String, u16)>>);

    impl LogSink for CollectingSink {
        fn emit(&self, log: &RequestLog) {
            self.0
                .lock()
                .unwrap()
                .push((log.id.clone(), log.status_code.unwrap()));
        }
    }

    #[test]
    fn finalize_emits_exactly_one_record() {
        let sink = CollectingSink(std::sync::Mutex::new(Vec::new()));
        let mut log = RequestLog::new("req-1", "claude-sonnet-4-5", false, 1000);
        log.record_attempt(1, 7);
        log.record_attempt(2, 9);
        log.finalize(&sink, 1200, StatusCode::OK, None);

        let emitted = sink.0.lock().unwrap();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0], ("req-1".to_string(), 200));
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn finalize_twice_panics() {
        let sink = CollectingSink(std::sync::Mutex::new(Vec::new()));
        let mut log = RequestLog::new("req-1", "gpt-4o", false, 0);
        log.finalized = true; // simulate a second finalize on an already-finalized record
        log.finalize(&sink, 10, StatusCode::OK, None);
    }
}
