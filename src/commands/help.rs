//! `help`: describe every registered command.

use super::{CommandHandler, Context};
use crate::protocol::{CommandResult, Data};
use serde_json::{json, Map, Value};

pub struct Help;

impl CommandHandler for Help {
    fn description(&self) -> &'static str {
        "List all available commands"
    }

    fn handle(&self, _data: &Data, ctx: &Context<'_>) -> CommandResult {
        let commands: Map<String, Value> = ctx
            .registry
            .iter()
            .map(|(kind, handler)| {
                let parameters: Map<String, Value> = handler
                    .parameters()
                    .iter()
                    .map(|(name, desc)| (name.to_string(), Value::from(*desc)))
                    .collect();
                (
                    kind.name().to_string(),
                    json!({
                        "description": handler.description(),
                        "parameters": parameters,
                    }),
                )
            })
            .collect();

        Ok(json!({ "commands": commands }))
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::test_support::run;
    use crate::commands::{CommandKind, Registry};
    use crate::storage::Storage;
    use serde_json::json;

    #[test]
    fn test_help_lists_exactly_the_registry() {
        let storage = Storage::new();
        let result = run(&storage, CommandKind::Help, json!({})).unwrap();

        let commands = result["commands"].as_object().unwrap();
        assert_eq!(commands.len(), 9);
        for name in Registry::new().names() {
            let entry = &commands[name];
            assert!(entry["description"].is_string(), "{name}");
            assert!(entry["parameters"].is_object(), "{name}");
        }
        assert!(commands["calculate"]["parameters"]["operation"].is_string());
    }
}
