//! Command handlers and the fixed command registry.
//!
//! ## Commands
//! - `echo`: return the given message
//! - `time`: current server time in several formats
//! - `calculate`: binary arithmetic on two numbers
//! - `store`, `retrieve`, `list_keys`, `delete`: shared key-value storage
//! - `ping`: liveness and storage size
//! - `help`: describe every registered command
//!
//! The set is closed: the registry is built once at startup from
//! [`CommandKind::ALL`] and never changes while serving.

pub mod calculate;
pub mod echo;
pub mod help;
pub mod kv;
pub mod ping;
pub mod time;

use crate::protocol::{CommandResult, Data};
use crate::storage::Storage;
use serde_json::Value;

/// Identifier of a registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Echo,
    Time,
    Calculate,
    Store,
    Retrieve,
    ListKeys,
    Delete,
    Ping,
    Help,
}

impl CommandKind {
    /// Every command, in registry order.
    pub const ALL: [CommandKind; 9] = [
        CommandKind::Echo,
        CommandKind::Time,
        CommandKind::Calculate,
        CommandKind::Store,
        CommandKind::Retrieve,
        CommandKind::ListKeys,
        CommandKind::Delete,
        CommandKind::Ping,
        CommandKind::Help,
    ];

    /// Wire name of the command
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Echo => "echo",
            CommandKind::Time => "time",
            CommandKind::Calculate => "calculate",
            CommandKind::Store => "store",
            CommandKind::Retrieve => "retrieve",
            CommandKind::ListKeys => "list_keys",
            CommandKind::Delete => "delete",
            CommandKind::Ping => "ping",
            CommandKind::Help => "help",
        }
    }

    /// Look up a command by wire name (exact, case-sensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn handler(self) -> Box<dyn CommandHandler> {
        match self {
            CommandKind::Echo => Box::new(echo::Echo),
            CommandKind::Time => Box::new(time::Time),
            CommandKind::Calculate => Box::new(calculate::Calculate),
            CommandKind::Store => Box::new(kv::Store),
            CommandKind::Retrieve => Box::new(kv::Retrieve),
            CommandKind::ListKeys => Box::new(kv::ListKeys),
            CommandKind::Delete => Box::new(kv::Delete),
            CommandKind::Ping => Box::new(ping::Ping),
            CommandKind::Help => Box::new(help::Help),
        }
    }
}

/// Shared state a handler may read.
pub struct Context<'a> {
    pub storage: &'a Storage,
    pub registry: &'a Registry,
}

/// Common interface of every command.
pub trait CommandHandler: Send + Sync {
    /// One-line human description, shown by `help`
    fn description(&self) -> &'static str;

    /// Parameter name to description, shown by `help`
    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Execute the command against validated input
    fn handle(&self, data: &Data, ctx: &Context<'_>) -> CommandResult;
}

/// Fixed mapping from command identifier to handler.
pub struct Registry {
    handlers: Vec<(CommandKind, Box<dyn CommandHandler>)>,
}

impl Registry {
    /// Build the registry containing every command in [`CommandKind::ALL`].
    pub fn new() -> Self {
        Self {
            handlers: CommandKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.handler()))
                .collect(),
        }
    }

    /// Find the handler registered under `name`
    pub fn get(&self, name: &str) -> Option<(CommandKind, &dyn CommandHandler)> {
        let kind = CommandKind::from_name(name)?;
        self.handlers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(k, handler)| (*k, handler.as_ref()))
    }

    /// Registered command names, in registry order
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|(kind, _)| kind.name()).collect()
    }

    /// Iterate over registered commands
    pub fn iter(&self) -> impl Iterator<Item = (CommandKind, &dyn CommandHandler)> {
        self.handlers
            .iter()
            .map(|(kind, handler)| (*kind, handler.as_ref()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a field, treating JSON `null` as absent.
pub(crate) fn field<'a>(data: &'a Data, name: &str) -> Option<&'a Value> {
    data.get(name).filter(|value| !value.is_null())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_all_commands() {
        let registry = Registry::new();
        assert_eq!(
            registry.names(),
            vec![
                "echo",
                "time",
                "calculate",
                "store",
                "retrieve",
                "list_keys",
                "delete",
                "ping",
                "help"
            ]
        );
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = Registry::new();

        let (kind, _) = registry.get("list_keys").unwrap();
        assert_eq!(kind, CommandKind::ListKeys);

        assert!(registry.get("LIST_KEYS").is_none());
        assert!(registry.get("nope").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn test_name_round_trip() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_every_command_is_described() {
        let registry = Registry::new();
        for (kind, handler) in registry.iter() {
            assert!(!handler.description().is_empty(), "{kind:?}");
        }
    }
}
