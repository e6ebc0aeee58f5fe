use std::time::Duration;

use reqwest::StatusCode;
use relaygate_schema::{AnthropicErrorBody, OpenaiErrorBody};

use crate::dispatch::{ActionForError, MappingAction};

/// Anthropic's documented `error.type` values that map to an account action
/// beyond the generic status-code fallback.
impl MappingAction for AnthropicErrorBody {
    fn try_match_rule(&self, status: StatusCode) -> Option<ActionForError> {
        match self.error.kind.as_str() {
            "rate_limit_error" => Some(ActionForError::RateLimit(Duration::from_secs(60))),
            "authentication_error" => Some(ActionForError::Invalid),
            "permission_error" => Some(ActionForError::Ban),
            "not_found_error" => Some(ActionForError::ModelUnsupported),
            _ => Some(Self::action_from_status(status)),
        }
    }
}

/// OpenAI-compatible upstreams (OpenAi-tagged accounts, and the
/// OpenAI-dialect error shape Kiro/Claude wrappers sometimes fall back to)
/// use the same status-driven mapping; no documented `error.type` carries
/// more information than the status already does.
impl MappingAction for OpenaiErrorBody {
    fn try_match_rule(&self, _status: StatusCode) -> Option<ActionForError> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_error_maps_regardless_of_status() {
        let body = AnthropicErrorBody::new("rate_limit_error", "slow down");
        assert_eq!(
            body.try_match_rule(StatusCode::SERVICE_UNAVAILABLE),
            Some(ActionForError::RateLimit(Duration::from_secs(60)))
        );
    }

    #[test]
    fn permission_error_maps_to_ban() {
        let body = AnthropicErrorBody::new("permission_error", "no access");
        assert_eq!(
            body.try_match_rule(StatusCode::FORBIDDEN),
            Some(ActionForError::Ban)
        );
    }

    #[test]
    fn unrecognized_type_falls_back_to_status_mapping() {
        let body = AnthropicErrorBody::new("overloaded_error", "busy");
        assert_eq!(
            body.try_match_rule(StatusCode::TOO_MANY_REQUESTS),
            Some(ActionForError::RateLimit(Duration::from_secs(60)))
        );
    }

    #[test]
    fn openai_error_body_always_falls_back_to_status() {
        let body = OpenaiErrorBody::api_error("nope", 401);
        assert!(body.try_match_rule(StatusCode::UNAUTHORIZED).is_none());
    }
}
