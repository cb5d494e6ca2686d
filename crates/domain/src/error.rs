//! Shared error type and stable error-code taxonomy used across all
//! CaseWire crates.

use serde::Serialize;

/// Stable, wire-visible error codes.
///
/// These are returned verbatim in HTTP error envelopes and in run-log
/// rows, so renaming a variant's wire form is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Upstream tool call failed.
    Mcp001,
    /// Requested resource not found.
    Mcp002,
    /// Authorization/permission denied.
    Mcp003,
    /// LLM call timed out.
    Agent001,
    /// Tool execution failed inside a skill.
    Agent002,
    /// Webhook signature verification failed.
    Webhook001,
    /// Referenced field no longer exists on the table schema.
    Schema001,
    /// Action pipeline exhausted its retry budget.
    Automation001,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mcp001 => "MCP_001",
            Self::Mcp002 => "MCP_002",
            Self::Mcp003 => "MCP_003",
            Self::Agent001 => "AGENT_001",
            Self::Agent002 => "AGENT_002",
            Self::Webhook001 => "WEBHOOK_001",
            Self::Schema001 => "SCHEMA_001",
            Self::Automation001 => "AUTOMATION_001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared error type used across all CaseWire crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("[{code}] {message}")]
    Coded {
        code: ErrorCode,
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Coded {
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn coded_with_detail(
        code: ErrorCode,
        message: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self::Coded {
            code,
            message: message.into(),
            detail: Some(detail),
        }
    }

    /// The stable error code for this error, falling back to a best-guess
    /// classification for variants that don't carry one explicitly.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Coded { code, .. } => *code,
            Self::Timeout(_) => ErrorCode::Agent001,
            Self::Auth(_) => ErrorCode::Mcp003,
            _ => ErrorCode::Mcp001,
        }
    }

    pub fn detail(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Coded { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_as_str_matches_screaming_snake() {
        assert_eq!(ErrorCode::Mcp001.as_str(), "MCP_001");
        assert_eq!(ErrorCode::Automation001.as_str(), "AUTOMATION_001");
    }

    #[test]
    fn coded_error_carries_code_and_message() {
        let err = Error::coded(ErrorCode::Schema001, "field `status` no longer exists");
        assert_eq!(err.code(), ErrorCode::Schema001);
        assert!(err.to_string().contains("SCHEMA_001"));
    }

    #[test]
    fn uncoded_variants_classify_reasonably() {
        assert_eq!(Error::Timeout("slow".into()).code(), ErrorCode::Agent001);
        assert_eq!(Error::Auth("bad token".into()).code(), ErrorCode::Mcp003);
    }

    #[test]
    fn detail_roundtrips_through_coded_with_detail() {
        let err = Error::coded_with_detail(
            ErrorCode::Automation001,
            "retries exhausted",
            serde_json::json!({"attempts": 5}),
        );
        assert_eq!(err.detail().unwrap()["attempts"], 5);
    }
}
