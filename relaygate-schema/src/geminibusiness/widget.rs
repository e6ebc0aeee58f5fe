//! Gemini-Business "widget" endpoint request/response shapes.
//!
//! These are fixed endpoints on the reverse-engineered business console
//! session transport, not a documented public API; fields beyond the ones
//! the gateway reads or writes are carried through via `extra`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetCreateSessionRequest {
    pub config_id: String,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetCreateSessionResponse {
    pub session_id: String,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStreamAssistRequest {
    pub config_id: String,
    pub session_id: String,
    pub request: Value,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetAddContextFileRequest {
    pub config_id: String,
    pub session_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetAddContextFileResponse {
    pub file_id: String,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetListSessionFileMetadataRequest {
    pub config_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSessionFileMetadata {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetListSessionFileMetadataResponse {
    pub files: Vec<WidgetSessionFileMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_session_request_carries_config_id() {
        let req = WidgetCreateSessionRequest {
            config_id: "cfg-1".to_string(),
            extra: BTreeMap::new(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"configId": "cfg-1"})
        );
    }
}
