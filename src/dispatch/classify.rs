use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::utils::logging::with_pretty_json_debug;

pub const UPSTREAM_BODY_PREVIEW_CHARS: usize = 300;

/// What the account pool should do in response to a classified upstream
/// failure. Drives which pool method the dispatch engine calls next.
#[derive(Debug, PartialEq, Eq)]
pub enum ActionForError {
    RateLimit(Duration),
    Ban,
    Invalid,
    ModelUnsupported,
    None,
}

/// Implemented by each provider's structured error-body type so the dispatch
/// engine can classify an upstream failure without string-matching, except
/// where the upstream contract itself requires matching known keywords in
/// the raw body (the "client-error keyword" rule, handled separately).
pub trait MappingAction: std::fmt::Debug + DeserializeOwned + Serialize {
    fn try_match_rule(&self, status: StatusCode) -> Option<ActionForError>;

    fn action_from_status(status: StatusCode) -> ActionForError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => ActionForError::RateLimit(Duration::from_secs(60)),
            StatusCode::FORBIDDEN => ActionForError::Ban,
            StatusCode::PAYMENT_REQUIRED => ActionForError::Ban,
            StatusCode::UNAUTHORIZED => ActionForError::Invalid,
            _ => ActionForError::None,
        }
    }
}

/// Deserializes the upstream error body into `E`; if a matching rule is
/// found, returns it, otherwise falls back to a status-only mapping. When
/// the body doesn't even parse as `E`, falls back the same way.
pub async fn classify_upstream_error<E, MappedError>(
    resp: reqwest::Response,
    map_raw: impl FnOnce(E) -> MappedError,
    map_status: impl FnOnce(StatusCode, String) -> MappedError,
) -> (ActionForError, MappedError)
where
    E: MappingAction,
{
    let status = resp.status();
    let bytes = resp.bytes().await.unwrap_or_default();
    let raw_body_owned = String::from_utf8_lossy(&bytes).into_owned();

    if let Ok(error) = serde_json::from_slice::<E>(&bytes) {
        if let Some(action) = error.try_match_rule(status) {
            with_pretty_json_debug(&error, |pretty_error| {
                tracing::debug!(
                    %status,
                    ?action,
                    ?error,
                    body = %pretty_error,
                    "Upstream structured error matched mapping rule"
                );
            });
            return (action, map_raw(error));
        }

        let action = E::action_from_status(status);
        with_pretty_json_debug(&error, |pretty_error| {
            tracing::debug!(
                %status,
                ?action,
                ?error,
                body = %pretty_error,
                "Upstream structured error fell back to status mapping"
            );
        });
        return (action, map_status(status, raw_body_owned));
    }

    let action = E::action_from_status(status);
    tracing::debug!(
        %status,
        ?action,
        body = %format!("{:.len$}", raw_body_owned, len = UPSTREAM_BODY_PREVIEW_CHARS),
        "Upstream unstructured error"
    );
    (action, map_status(status, raw_body_owned))
}

/// Keywords that identify an upstream body as a client error regardless of
/// provider dialect (§4.6). Matching means: surface verbatim, no retry.
pub const CLIENT_ERROR_KEYWORDS: &[&str] = &[
    "invalid_request_error",
    "invalid_argument",
    "permission_denied",
    "resource_exhausted",
    "INVALID_ARGUMENT",
    "missing_required_parameter",
];

pub fn body_matches_client_error_keyword(raw_body: &str) -> bool {
    CLIENT_ERROR_KEYWORDS
        .iter()
        .any(|keyword| raw_body.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_client_error_keywords() {
        assert!(body_matches_client_error_keyword(
            r#"{"error":{"type":"invalid_request_error"}}"#
        ));
        assert!(body_matches_client_error_keyword(
            r#"{"error":{"status":"INVALID_ARGUMENT"}}"#
        ));
        assert!(!body_matches_client_error_keyword(r#"{"error":"oops"}"#));
    }
}
