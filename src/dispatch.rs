//! Request dispatch.
//!
//! Turns one decoded request object into one response envelope. Every
//! failure below this point becomes an error envelope; nothing propagates
//! to the connection as a raw error.

use crate::commands::{CommandHandler, Context, Registry};
use crate::protocol::{CommandError, CommandResult, Data, ErrorCode, Response};
use crate::storage::Storage;
use serde_json::Value;
use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Longest panic description included in an `INTERNAL_ERROR` message.
const MAX_DIAGNOSTIC_LEN: usize = 120;

/// Routes requests to command handlers.
pub struct Dispatcher {
    storage: Arc<Storage>,
    registry: Registry,
}

impl Dispatcher {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Dispatch one request, preserving its `request_id`.
    pub fn dispatch(&self, message: &Data, conn: &str) -> Response {
        let request_id = message.get("request_id").filter(|v| !v.is_null()).cloned();
        let result = self.execute(message, conn);
        Response::from_result(result, request_id)
    }

    fn execute(&self, message: &Data, conn: &str) -> CommandResult {
        let name = match message.get("command") {
            Some(Value::String(name)) if !name.is_empty() => name.as_str(),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(CommandError::new(
                    ErrorCode::InvalidRequest,
                    "Missing 'command' field",
                ));
            }
            Some(_) => {
                return Err(CommandError::new(
                    ErrorCode::InvalidRequest,
                    "'command' field must be a string",
                ));
            }
        };

        let (_, handler) = self.registry.get(name).ok_or_else(|| {
            CommandError::new(
                ErrorCode::UnknownCommand,
                format!("Unknown command '{name}'. Use 'help' to see available commands"),
            )
        })?;

        let data = match message.get("data") {
            None | Some(Value::Null) => Cow::Owned(Data::new()),
            Some(Value::Object(data)) => Cow::Borrowed(data),
            Some(_) => {
                return Err(CommandError::new(
                    ErrorCode::InvalidRequest,
                    "'data' field must be a JSON object",
                ));
            }
        };

        trace!(conn, command = name, "Dispatching command");
        let ctx = Context {
            storage: &self.storage,
            registry: &self.registry,
        };
        run_handler(name, handler, &data, &ctx, conn)
    }
}

/// Invoke a handler, converting panics into `INTERNAL_ERROR`.
fn run_handler(
    name: &str,
    handler: &dyn CommandHandler,
    data: &Data,
    ctx: &Context<'_>,
    conn: &str,
) -> CommandResult {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(data, ctx))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.code == ErrorCode::InternalError => {
            error!(conn, command = name, error = %e.message, "Command failed internally");
            Err(CommandError::internal(format!(
                "Internal error while executing '{name}': {}",
                e.message
            )))
        }
        Ok(Err(e)) => {
            debug!(conn, command = name, code = %e.code, message = %e.message, "Command rejected");
            Err(e)
        }
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            error!(conn, command = name, panic = %detail, "Command handler panicked");
            Err(CommandError::internal(format!(
                "Internal error while executing '{name}': {}",
                truncate(&detail, MAX_DIAGNOSTIC_LEN)
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> Data {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn dispatch(dispatcher: &Dispatcher, value: Value) -> Response {
        dispatcher.dispatch(&request(value), "conn-test")
    }

    #[test]
    fn test_success_preserves_request_id() {
        let dispatcher = Dispatcher::new(Storage::new());
        let response = dispatch(
            &dispatcher,
            json!({"command": "echo", "request_id": "abc", "data": {"message": "hi"}}),
        );

        assert!(response.success);
        assert_eq!(response.request_id, Some(json!("abc")));
        assert_eq!(response.data, Some(json!({"echo": "hi"})));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_missing_command() {
        let dispatcher = Dispatcher::new(Storage::new());
        for value in [
            json!({"request_id": 5}),
            json!({"command": "", "request_id": 5}),
            json!({"command": null, "request_id": 5}),
            json!({"command": 3, "request_id": 5}),
        ] {
            let response = dispatch(&dispatcher, value);
            assert!(!response.success);
            assert_eq!(response.error.unwrap().code, ErrorCode::InvalidRequest);
            assert_eq!(response.request_id, Some(json!(5)));
        }
    }

    #[test]
    fn test_unknown_command() {
        let dispatcher = Dispatcher::new(Storage::new());
        let response = dispatch(&dispatcher, json!({"command": "nope"}));

        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::UnknownCommand);
        assert!(error.message.contains("nope"));
        assert!(error.message.contains("help"));
        assert!(response.request_id.is_none());
    }

    #[test]
    fn test_absent_data_defaults_to_empty_object() {
        let dispatcher = Dispatcher::new(Storage::new());
        let response = dispatch(&dispatcher, json!({"command": "list_keys"}));

        assert!(response.success);
        assert_eq!(response.data, Some(json!({"keys": [], "count": 0})));
    }

    #[test]
    fn test_non_object_data_rejected() {
        let dispatcher = Dispatcher::new(Storage::new());
        let response = dispatch(&dispatcher, json!({"command": "ping", "data": [1]}));

        assert_eq!(response.error.unwrap().code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_handler_error_keeps_code_and_message() {
        let dispatcher = Dispatcher::new(Storage::new());
        let response = dispatch(
            &dispatcher,
            json!({"command": "calculate", "request_id": "r", "data": {"operation": "divide", "a": 1, "b": 0}}),
        );

        assert_eq!(response.request_id, Some(json!("r")));
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::MathError);
        assert_eq!(error.message, "Division by zero");
    }

    #[test]
    fn test_poisoned_storage_is_internal_error() {
        let storage = Storage::new();
        storage.poison();
        let dispatcher = Dispatcher::new(storage);

        let response = dispatch(
            &dispatcher,
            json!({"command": "store", "request_id": "x", "data": {"key": "k", "value": 1}}),
        );

        assert_eq!(response.request_id, Some(json!("x")));
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::InternalError);
        assert!(error.message.contains("store"));
    }

    struct Exploding;

    impl CommandHandler for Exploding {
        fn description(&self) -> &'static str {
            "always panics"
        }

        fn handle(&self, _data: &Data, _ctx: &Context<'_>) -> CommandResult {
            panic!("kaboom");
        }
    }

    #[test]
    fn test_handler_panic_is_internal_error() {
        let storage = Storage::new();
        let registry = Registry::new();
        let ctx = Context {
            storage: &storage,
            registry: &registry,
        };

        let err = run_handler("boom", &Exploding, &Data::new(), &ctx, "conn-test").unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("kaboom"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 100), "short");
    }
}
