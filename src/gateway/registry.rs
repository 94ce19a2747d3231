//! The command tree the gateway invokes.
//!
//! [`CommandRegistry`] is the capability set the runner relies on: clear
//! previous flags, take a fresh argument vector, execute against an explicit
//! output sink, and describe a node by path. [`ClapRegistry`] provides it on
//! top of a `clap::Command` tree with actions registered per command path.
//!
//! String values arrive as separate tokens and may start with `-`. Args that
//! take free-form text need `allow_hyphen_values` (numbers
//! `allow_negative_numbers`), otherwise clap reads such a value as a flag.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::errors::ActionError;

/// Handler run when its command path is invoked.
pub type Action = Arc<dyn Fn(&ArgMatches, &mut dyn Write) -> anyhow::Result<()> + Send + Sync>;

/// A flag declared on a command node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagInfo {
    pub id: String,
    pub long: Option<String>,
    pub short: Option<char>,
    pub takes_value: bool,
}

impl FlagInfo {
    fn from_arg(arg: &Arg) -> Self {
        Self {
            id: arg.get_id().as_str().to_string(),
            long: arg.get_long().map(str::to_string),
            short: arg.get_short(),
            takes_value: arg.get_action().takes_values(),
        }
    }
}

/// Description of one node in the command tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub path: Vec<String>,
    pub about: Option<String>,
    pub flags: Vec<FlagInfo>,
    pub subcommands: Vec<String>,
    /// Whether an action is registered for this node
    pub runnable: bool,
}

impl NodeInfo {
    pub fn flag(&self, id: &str) -> Option<&FlagInfo> {
        self.flags.iter().find(|flag| flag.id == id)
    }
}

/// Capabilities the invocation runner needs from a command tree.
pub trait CommandRegistry: Send {
    /// Forget any flag values and arguments from the previous invocation.
    fn reset_flags(&mut self);

    /// Set the raw tokens for the next `execute`, without the program name.
    fn set_args(&mut self, args: Vec<String>);

    /// Run the command selected by the current arguments.
    ///
    /// Everything the command prints, including help and error text, goes
    /// to `out`. An `Err` has already been rendered there.
    fn execute(&mut self, out: &mut dyn Write) -> Result<(), ActionError>;

    /// Find the node at `path` (subcommand names below the root).
    fn lookup(&self, path: &[String]) -> Option<NodeInfo>;
}

/// [`CommandRegistry`] backed by a clap command tree.
pub struct ClapRegistry {
    command: Command,
    actions: HashMap<Vec<String>, Action>,
    pending: Vec<String>,
}

impl std::fmt::Debug for ClapRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut paths: Vec<String> = self.actions.keys().map(|path| path.join(" ")).collect();
        paths.sort();
        f.debug_struct("ClapRegistry")
            .field("command", &self.command.get_name())
            .field("actions", &paths)
            .field("pending", &self.pending)
            .finish()
    }
}

impl ClapRegistry {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            actions: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Register `action` for the subcommand path (empty for the root).
    pub fn action<F>(mut self, path: &[&str], action: F) -> Self
    where
        F: Fn(&ArgMatches, &mut dyn Write) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let path = path.iter().map(|segment| segment.to_string()).collect();
        self.actions.insert(path, Arc::new(action));
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn pending_args(&self) -> &[String] {
        &self.pending
    }

    fn render_help(&self, path: &[String]) -> String {
        let mut node = &self.command;
        for segment in path {
            match node.find_subcommand(segment) {
                Some(sub) => node = sub,
                None => break,
            }
        }
        // Parsing has already built the nodes it walked through, so the
        // clone carries the full `cmdgate fct1 ...` usage line.
        node.clone().render_help().to_string()
    }
}

impl CommandRegistry for ClapRegistry {
    fn reset_flags(&mut self) {
        self.pending.clear();
    }

    fn set_args(&mut self, args: Vec<String>) {
        self.pending = args;
    }

    fn execute(&mut self, out: &mut dyn Write) -> Result<(), ActionError> {
        let argv: Vec<String> = std::iter::once(self.command.get_name().to_string())
            .chain(self.pending.iter().cloned())
            .collect();

        let matches = match self.command.try_get_matches_from_mut(argv) {
            Ok(matches) => matches,
            Err(err) => {
                let rendered = err.to_string();
                out.write_all(rendered.as_bytes())?;
                return match err.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Ok(()),
                    _ => {
                        let summary = rendered.lines().next().unwrap_or_default();
                        Err(ActionError::Usage(
                            summary.trim_start_matches("error: ").to_string(),
                        ))
                    }
                };
            }
        };

        let mut path = Vec::new();
        let mut leaf = &matches;
        while let Some((name, sub)) = leaf.subcommand() {
            path.push(name.to_string());
            leaf = sub;
        }

        let Some(action) = self.actions.get(&path).cloned() else {
            let help = self.render_help(&path);
            out.write_all(help.as_bytes())?;
            return Ok(());
        };

        if let Err(err) = action(leaf, &mut *out) {
            writeln!(out, "Error: {:#}", err)?;
            return Err(ActionError::Failed(err));
        }
        Ok(())
    }

    fn lookup(&self, path: &[String]) -> Option<NodeInfo> {
        let mut node = &self.command;
        for segment in path {
            node = node.find_subcommand(segment)?;
        }

        let flags = node
            .get_arguments()
            .filter(|arg| !arg.is_positional())
            .filter(|arg| {
                !matches!(
                    arg.get_action(),
                    ArgAction::Help | ArgAction::HelpShort | ArgAction::HelpLong | ArgAction::Version
                )
            })
            .map(FlagInfo::from_arg)
            .collect();

        Some(NodeInfo {
            path: path.to_vec(),
            about: node.get_about().map(|about| about.to_string()),
            flags,
            subcommands: node
                .get_subcommands()
                .map(|sub| sub.get_name().to_string())
                .collect(),
            runnable: self.actions.contains_key(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn registry() -> ClapRegistry {
        let command = Command::new("tool")
            .about("Test tool")
            .subcommand(
                Command::new("greet")
                    .about("Say hello")
                    .arg(Arg::new("name").long("name").default_value("world"))
                    .arg(Arg::new("loud").short('l').action(ArgAction::SetTrue)),
            )
            .subcommand(Command::new("fail").about("Always fails"))
            .subcommand(Command::new("group").subcommand(Command::new("leaf")));

        ClapRegistry::new(command)
            .action(&["greet"], |m, out| {
                let name = m.get_one::<String>("name").map(String::as_str).unwrap_or("?");
                let greeting = format!("hello {}", name);
                if m.get_flag("loud") {
                    writeln!(out, "{}", greeting.to_uppercase())?;
                } else {
                    writeln!(out, "{}", greeting)?;
                }
                Ok(())
            })
            .action(&["fail"], |_, out| {
                writeln!(out, "about to fail")?;
                anyhow::bail!("nothing works")
            })
            .action(&["group", "leaf"], |_, out| {
                writeln!(out, "leaf ran")?;
                Ok(())
            })
    }

    fn run(registry: &mut ClapRegistry, tokens: &[&str]) -> (Result<(), ActionError>, String) {
        registry.reset_flags();
        registry.set_args(args(tokens));
        let mut out = Vec::new();
        let result = registry.execute(&mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_execute_runs_registered_action() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["greet", "--name", "gateway", "-l"]);
        assert!(result.is_ok());
        assert_eq!(out, "HELLO GATEWAY\n");
    }

    #[test]
    fn test_flags_do_not_leak_between_invocations() {
        let mut registry = registry();
        let (_, first) = run(&mut registry, &["greet", "--name", "once", "-l"]);
        assert_eq!(first, "HELLO ONCE\n");

        let (_, second) = run(&mut registry, &["greet"]);
        assert_eq!(second, "hello world\n");
    }

    #[test]
    fn test_nested_action() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["group", "leaf"]);
        assert!(result.is_ok());
        assert_eq!(out, "leaf ran\n");
    }

    #[test]
    fn test_node_without_action_prints_help() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["group"]);
        assert!(result.is_ok());
        assert!(out.contains("leaf"), "help output: {}", out);
        assert!(out.contains("Usage: tool group"), "help output: {}", out);

        let (_, again) = run(&mut registry, &["group"]);
        assert_eq!(out, again);
    }

    #[test]
    fn test_root_without_args_prints_help() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &[]);
        assert!(result.is_ok());
        assert!(out.contains("Test tool"));
        assert!(out.contains("greet"));
    }

    #[test]
    fn test_help_flag_is_success() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["greet", "--help"]);
        assert!(result.is_ok());
        assert!(out.contains("Say hello"));
        assert!(out.contains("--name"));
    }

    #[test]
    fn test_unknown_command_is_rendered_as_usage_error() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["nope"]);
        match result {
            Err(ActionError::Usage(summary)) => assert!(summary.contains("nope"), "{}", summary),
            other => panic!("Expected Usage error, got {:?}", other),
        }
        assert!(out.starts_with("error:"), "output: {}", out);
        assert!(out.contains("nope"));
    }

    #[test]
    fn test_unknown_flag_is_rendered_as_usage_error() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["greet", "--colour", "red"]);
        assert!(matches!(result, Err(ActionError::Usage(_))));
        assert!(out.contains("--colour"));
    }

    #[test]
    fn test_action_failure_is_written_to_output() {
        let mut registry = registry();
        let (result, out) = run(&mut registry, &["fail"]);
        assert!(matches!(result, Err(ActionError::Failed(_))));
        assert_eq!(out, "about to fail\nError: nothing works\n");
    }

    #[test]
    fn test_lookup_describes_node() {
        let registry = registry();
        let node = registry.lookup(&args(&["greet"])).unwrap();
        assert_eq!(node.path, args(&["greet"]));
        assert_eq!(node.about.as_deref(), Some("Say hello"));
        assert!(node.runnable);

        let name = node.flag("name").unwrap();
        assert_eq!(name.long.as_deref(), Some("name"));
        assert!(name.takes_value);

        let loud = node.flag("loud").unwrap();
        assert_eq!(loud.short, Some('l'));
        assert!(!loud.takes_value);
        assert!(node.flag("help").is_none());
    }

    #[test]
    fn test_lookup_root_and_missing() {
        let registry = registry();
        let root = registry.lookup(&[]).unwrap();
        assert_eq!(root.subcommands, args(&["greet", "fail", "group"]));
        assert!(!root.runnable);

        assert!(registry.lookup(&args(&["group", "missing"])).is_none());
        assert!(!registry.lookup(&args(&["group"])).unwrap().runnable);
    }

    #[test]
    fn test_reset_clears_pending_args() {
        let mut registry = registry();
        registry.set_args(args(&["greet"]));
        assert_eq!(registry.pending_args().len(), 1);
        registry.reset_flags();
        assert!(registry.pending_args().is_empty());
    }
}
