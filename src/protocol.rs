//! Wire message types.
//!
//! Every frame on the socket is a single JSON object terminated by `\n`.
//!
//! ```text
//! Request:  {"command": "echo", "request_id": "r1", "data": {"message": "hi"}}
//! Response: {"type": "response", "success": true, "timestamp": "...",
//!            "request_id": "r1", "data": {"echo": "hi"}}
//! Error:    {"type": "response", "success": false, "timestamp": "...",
//!            "request_id": "r1", "error": {"code": "INVALID_INPUT", "message": "..."}}
//! ```

use chrono::{Local, SecondsFormat};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Handler input: the request's `data` object.
pub type Data = Map<String, Value>;

/// Classified error codes surfaced inside the `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    UnknownCommand,
    InvalidJson,
    InvalidInput,
    InvalidOperation,
    MathError,
    KeyNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::MathError => "MATH_ERROR",
            ErrorCode::KeyNotFound => "KEY_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A classified command failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<crate::storage::StorageError> for CommandError {
    fn from(e: crate::storage::StorageError) -> Self {
        CommandError::internal(e.to_string())
    }
}

/// Outcome of a command handler.
pub type CommandResult = Result<Value, CommandError>;

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Response envelope.
///
/// Exactly one of `data` and `error` is present, gated by `success`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: String,
    pub success: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Build a success envelope
    pub fn success(data: Value, request_id: Option<Value>) -> Self {
        Self {
            kind: "response".to_string(),
            success: true,
            timestamp: now_iso8601(),
            request_id,
            data: Some(data),
            error: None,
        }
    }

    /// Build an error envelope
    pub fn error(error: CommandError, request_id: Option<Value>) -> Self {
        Self {
            kind: "response".to_string(),
            success: false,
            timestamp: now_iso8601(),
            request_id,
            data: None,
            error: Some(ErrorBody {
                code: error.code,
                message: error.message,
            }),
        }
    }

    /// Wrap a handler outcome
    pub fn from_result(result: CommandResult, request_id: Option<Value>) -> Self {
        match result {
            Ok(data) => Self::success(data, request_id),
            Err(e) => Self::error(e, request_id),
        }
    }

    /// Serialize as one newline-terminated frame
    pub fn to_frame(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(b'\n');
        Ok(frame)
    }
}

/// Current local time as an ISO-8601 string with microseconds.
pub fn now_iso8601() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Decode one frame into a request object.
///
/// Anything that is not a JSON object is rejected with `INVALID_JSON`.
pub fn decode_frame(frame: &str) -> Result<Data, CommandError> {
    match serde_json::from_str::<Value>(frame) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CommandError::new(
            ErrorCode::InvalidJson,
            "Message must be a JSON object",
        )),
        Err(e) => Err(CommandError::new(
            ErrorCode::InvalidJson,
            format!("Invalid JSON: {e}"),
        )),
    }
}
