use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 error codes used by the dispatcher.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const RATE_LIMITED: i64 = -32029;
    pub const TOOL_EXECUTION_ERROR: i64 = -32002;
    pub const PROMPT_GET_ERROR: i64 = -32003;
}

/// Request id: JSON-RPC allows numeric or string ids. `None` marks a
/// notification (no reply is ever produced for it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// `{prompt_name, prompt_arguments: {action_description, warning_message,
/// original_tool_name, original_tool_args_json}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArguments {
    pub action_description: String,
    pub warning_message: String,
    pub original_tool_name: String,
    pub original_tool_args_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationDetails {
    pub prompt_name: String,
    pub prompt_arguments: PromptArguments,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequiredResult {
    pub status: String,
    pub message: String,
    pub confirmation_details: ConfirmationDetails,
}

impl ConfirmationRequiredResult {
    pub fn new(
        message: impl Into<String>,
        original_tool_name: impl Into<String>,
        original_tool_args_json: String,
        action_description: impl Into<String>,
        warning_message: impl Into<String>,
    ) -> Self {
        Self {
            status: "confirmation_required".to_string(),
            message: message.into(),
            confirmation_details: ConfirmationDetails {
                prompt_name: "ksm_confirm_action".to_string(),
                prompt_arguments: PromptArguments {
                    action_description: action_description.into(),
                    warning_message: warning_message.into(),
                    original_tool_name: original_tool_name.into(),
                    original_tool_args_json,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_id_is_notification() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn request_id_round_trips_numeric_and_string() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::Number(7)));

        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"abc","method":"tools/list"}"#)
                .unwrap();
        assert_eq!(req.id, Some(RequestId::String("abc".to_string())));
    }
}
