//! Key-value commands over the shared storage: `store`, `retrieve`,
//! `list_keys` and `delete`.

use super::{field, CommandHandler, Context};
use crate::protocol::{CommandError, CommandResult, Data, ErrorCode};
use crate::storage::DeleteResult;
use serde_json::{json, Value};

/// Extract the `key` field as a storage key.
///
/// Strings are used as-is; numbers and booleans use their JSON text.
fn key(data: &Data) -> Result<String, CommandError> {
    match field(data, "key") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
        Some(_) => Err(CommandError::invalid_input(
            "'key' must be a string, number or boolean",
        )),
        None => Err(CommandError::invalid_input("'key' field is required")),
    }
}

fn not_found(key: &str) -> CommandError {
    CommandError::new(ErrorCode::KeyNotFound, format!("Key '{key}' not found"))
}

pub struct Store;

impl CommandHandler for Store {
    fn description(&self) -> &'static str {
        "Store a value under a key"
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("key", "Key to store the value under"),
            ("value", "Value to store (any JSON value)"),
        ]
    }

    fn handle(&self, data: &Data, ctx: &Context<'_>) -> CommandResult {
        let key = key(data)?;
        let value = data.get("value").cloned().unwrap_or(Value::Null);
        ctx.storage.set(&key, value)?;
        Ok(json!({
            "key": key,
            "stored": true,
            "message": format!("Value stored for key '{key}'"),
        }))
    }
}

pub struct Retrieve;

impl CommandHandler for Retrieve {
    fn description(&self) -> &'static str {
        "Retrieve the value stored under a key"
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("key", "Key to look up")]
    }

    fn handle(&self, data: &Data, ctx: &Context<'_>) -> CommandResult {
        let key = key(data)?;
        let value = ctx.storage.get(&key)?.ok_or_else(|| not_found(&key))?;
        Ok(json!({ "key": key, "value": value }))
    }
}

pub struct ListKeys;

impl CommandHandler for ListKeys {
    fn description(&self) -> &'static str {
        "List all stored keys"
    }

    fn handle(&self, _data: &Data, ctx: &Context<'_>) -> CommandResult {
        let keys = ctx.storage.keys()?;
        Ok(json!({ "count": keys.len(), "keys": keys }))
    }
}

pub struct Delete;

impl CommandHandler for Delete {
    fn description(&self) -> &'static str {
        "Delete the value stored under a key"
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("key", "Key to delete")]
    }

    fn handle(&self, data: &Data, ctx: &Context<'_>) -> CommandResult {
        let key = key(data)?;
        match ctx.storage.delete(&key)? {
            DeleteResult::Deleted => Ok(json!({
                "key": key,
                "deleted": true,
                "message": format!("Key '{key}' deleted"),
            })),
            DeleteResult::NotFound => Err(not_found(&key)),
        }
    }
}
