//! `time`: current server time.

use super::{CommandHandler, Context};
use crate::protocol::{CommandResult, Data};
use chrono::{Local, SecondsFormat};
use serde_json::json;

pub struct Time;

impl CommandHandler for Time {
    fn description(&self) -> &'static str {
        "Get the current server time"
    }

    fn handle(&self, _data: &Data, _ctx: &Context<'_>) -> CommandResult {
        let now = Local::now();
        Ok(json!({
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Micros, false),
            "unix_timestamp": now.timestamp_micros() as f64 / 1_000_000.0,
            "formatted": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        }))
    }
}
