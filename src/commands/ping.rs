//! `ping`: liveness check reporting the storage size.

use super::{CommandHandler, Context};
use crate::protocol::{now_iso8601, CommandResult, Data};
use serde_json::json;

pub struct Ping;

impl CommandHandler for Ping {
    fn description(&self) -> &'static str {
        "Check that the server is alive"
    }

    fn handle(&self, _data: &Data, ctx: &Context<'_>) -> CommandResult {
        Ok(json!({
            "status": "ok",
            "server_time": now_iso8601(),
            "storage_size": ctx.storage.len()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::test_support::run;
    use crate::commands::CommandKind;
    use crate::storage::Storage;
    use serde_json::json;

    #[test]
    fn test_ping_reports_storage_size() {
        let storage = Storage::new();
        storage.set("a", json!(1)).unwrap();
        storage.set("b", json!(2)).unwrap();

        let result = run(&storage, CommandKind::Ping, json!({})).unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["storage_size"], 2);
        assert!(result["server_time"].is_string());
    }
}
