//! `echo`: return the client's message unchanged.

use super::{field, CommandHandler, Context};
use crate::protocol::{CommandError, CommandResult, Data};
use serde_json::json;

pub struct Echo;

impl CommandHandler for Echo {
    fn description(&self) -> &'static str {
        "Echo back the provided message"
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("message", "Message to echo back (non-empty string)")]
    }

    fn handle(&self, data: &Data, _ctx: &Context<'_>) -> CommandResult {
        match field(data, "message").and_then(|v| v.as_str()) {
            Some(message) if !message.is_empty() => Ok(json!({ "echo": message })),
            _ => Err(CommandError::invalid_input(
                "'message' field is required and must be a non-empty string",
            )),
        }
    }
}
