//! Tool definitions and the HTTP MCP response envelope.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// A named, schema-validated RPC exposed by the tool server.
///
/// `parameters` is a JSON-Schema document carried as a plain
/// `serde_json::Value` rather than generated via a derive macro, so new
/// tools can be declared data-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Minimal structural validation: required top-level properties named
    /// in the schema's `required` array must be present in `params`.
    /// Type-level validation is left to each tool's own handler.
    pub fn validate_params(&self, params: &serde_json::Value) -> Result<(), String> {
        let Some(required) = self.parameters.get("required").and_then(|r| r.as_array()) else {
            return Ok(());
        };
        let obj = params.as_object();
        for req in required {
            let Some(name) = req.as_str() else { continue };
            let present = obj.is_some_and(|o| o.contains_key(name));
            if !present {
                return Err(format!("missing required parameter `{name}`"));
            }
        }
        Ok(())
    }
}

/// `POST /mcp/tools/{tool_name}` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvokeRequest {
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ToolErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            detail: None,
        }
    }
}

/// The bit-exact tool-call response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorBody>,
}

impl ToolResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolErrorBody::new(code, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_def() -> ToolDefinition {
        ToolDefinition::new(
            "feishu.v1.bitable.record.get",
            "fetch one record",
            serde_json::json!({
                "type": "object",
                "properties": {"table_id": {"type": "string"}, "record_id": {"type": "string"}},
                "required": ["table_id", "record_id"],
            }),
        )
    }

    #[test]
    fn validate_params_rejects_missing_required() {
        let def = sample_def();
        let err = def
            .validate_params(&serde_json::json!({"table_id": "tbl1"}))
            .unwrap_err();
        assert!(err.contains("record_id"));
    }

    #[test]
    fn validate_params_accepts_complete_payload() {
        let def = sample_def();
        assert!(def
            .validate_params(&serde_json::json!({"table_id": "tbl1", "record_id": "rec1"}))
            .is_ok());
    }

    #[test]
    fn ok_response_serializes_without_error_key() {
        let resp = ToolResponse::ok(serde_json::json!({"x": 1}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn err_response_carries_stable_code() {
        let resp = ToolResponse::err(ErrorCode::Mcp002, "record not found");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], "MCP_002");
    }
}
