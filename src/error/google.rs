use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::dispatch::{ActionForError, MappingAction};

/// Google-style `{"error": {code, message, status, details}}` body shared by
/// the Gemini-CodeAssist, Antigravity, and Gemini-Business upstreams.
#[derive(Debug, Deserialize, Serialize)]
pub struct GoogleUpstreamErrorBody {
    #[serde(rename = "error")]
    pub inner: GoogleUpstreamErrorObject,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GoogleUpstreamErrorObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Value>>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GoogleUpstreamErrorBody {
    pub fn quota_reset_delay(&self) -> Option<u64> {
        let details = self.inner.details.as_ref()?;

        details
            .iter()
            .filter_map(|detail| {
                detail
                    .get("metadata")
                    .and_then(|m| m.get("quotaResetTimeStamp"))
                    .and_then(Value::as_str)
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            })
            .filter_map(|reset_dt| {
                let reset = reset_dt.with_timezone(&Utc);
                let diff_secs = (reset - Utc::now()).num_seconds();
                (diff_secs > 0).then_some((diff_secs as u64).saturating_add(1))
            })
            .next()
            .or_else(|| {
                details
                    .iter()
                    .any(|detail| {
                        detail.get("reason").and_then(Value::as_str)
                            == Some("MODEL_CAPACITY_EXHAUSTED")
                    })
                    .then_some(60 * 60)
            })
    }
}

impl MappingAction for GoogleUpstreamErrorBody {
    fn try_match_rule(&self, status: StatusCode) -> Option<ActionForError> {
        match (status, self) {
            (StatusCode::UNAUTHORIZED, body)
                if body.inner.status.as_deref() == Some("UNAUTHENTICATED") =>
            {
                Some(ActionForError::Invalid)
            }
            (StatusCode::FORBIDDEN, body)
                if body.inner.status.as_deref() == Some("PERMISSION_DENIED") =>
            {
                Some(ActionForError::Ban)
            }
            (StatusCode::NOT_FOUND, body) if body.inner.status.as_deref() == Some("NOT_FOUND") => {
                Some(ActionForError::ModelUnsupported)
            }
            (StatusCode::TOO_MANY_REQUESTS, body)
                if body.inner.status.as_deref() == Some("RESOURCE_EXHAUSTED") =>
            {
                Some(ActionForError::RateLimit(Duration::from_secs(
                    body.quota_reset_delay().unwrap_or(90).max(1),
                )))
            }
            _ => None,
        }
    }

    fn action_from_status(status: StatusCode) -> ActionForError {
        match status {
            StatusCode::UNAUTHORIZED => ActionForError::Invalid,
            StatusCode::FORBIDDEN => ActionForError::None,
            StatusCode::NOT_FOUND => ActionForError::ModelUnsupported,
            StatusCode::TOO_MANY_REQUESTS => ActionForError::RateLimit(Duration::from_secs(60)),
            _ => ActionForError::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rate_limit_uses_quota_reset_timestamp() {
        let raw = r#"{
            "error": {
                "code": 429,
                "message": "quota",
                "status": "RESOURCE_EXHAUSTED",
                "details": [
                    { "metadata": { "quotaResetTimeStamp": "2999-01-01T00:00:00Z" } }
                ]
            }
        }"#;
        let parsed: GoogleUpstreamErrorBody = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed.try_match_rule(StatusCode::TOO_MANY_REQUESTS),
            Some(ActionForError::RateLimit(_))
        ));
    }

    #[test]
    fn model_capacity_exhausted_falls_back_to_one_hour() {
        let body = GoogleUpstreamErrorBody {
            inner: GoogleUpstreamErrorObject {
                code: Some(429),
                message: Some("no capacity".into()),
                status: Some("RESOURCE_EXHAUSTED".into()),
                details: Some(vec![json!({"reason": "MODEL_CAPACITY_EXHAUSTED"})]),
                extra: BTreeMap::new(),
            },
        };
        assert_eq!(
            body.try_match_rule(StatusCode::TOO_MANY_REQUESTS),
            Some(ActionForError::RateLimit(Duration::from_secs(3600)))
        );
    }

    #[test]
    fn not_found_maps_to_model_unsupported() {
        let body = GoogleUpstreamErrorBody {
            inner: GoogleUpstreamErrorObject {
                code: Some(404),
                message: Some("not found".into()),
                status: Some("NOT_FOUND".into()),
                details: None,
                extra: BTreeMap::new(),
            },
        };
        assert_eq!(
            body.try_match_rule(StatusCode::NOT_FOUND),
            Some(ActionForError::ModelUnsupported)
        );
    }
}
