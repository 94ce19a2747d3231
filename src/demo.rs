//! Demo command tree served by the `cmdgate` binary.
//!
//! ```text
//! cmdgate
//! ├── fct1            prints "Executing function 1"
//! │   └── sf11        prints its --p1 / --p2 / --p3 values
//! └── fct2            prints "Executing function 2"
//! ```
//!
//! Example request against `cmdgate server`:
//!
//! ```text
//! POST http://localhost:8111/api/fct1/sf11   {"p2": 255, "p3": "Hi there!", "p1": true}
//! ```

use std::io::Write;

use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::gateway::registry::ClapRegistry;

#[derive(Parser, Debug)]
#[command(name = "cmdgate", version, about = "Command gateway demo")]
pub struct DemoCli {
    #[command(subcommand)]
    pub command: Option<DemoCommands>,
}

#[derive(Subcommand, Debug)]
pub enum DemoCommands {
    /// Execute function 1
    Fct1 {
        #[command(subcommand)]
        command: Option<Fct1Commands>,
    },
    /// Execute function 2
    Fct2,
}

#[derive(Subcommand, Debug)]
pub enum Fct1Commands {
    /// Subfunction 1.1
    Sf11(Sf11Args),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Sf11Args {
    /// Test bool parameter
    #[arg(long)]
    pub p1: bool,

    /// Test int parameter
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub p2: i64,

    /// Test string parameter
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub p3: String,
}

/// The demo tree as a plain clap command.
pub fn command() -> clap::Command {
    DemoCli::command()
}

/// The demo tree with its actions attached.
pub fn registry() -> ClapRegistry {
    ClapRegistry::new(command())
        .action(&["fct1"], |_, out| {
            writeln!(out, "Executing function 1")?;
            Ok(())
        })
        .action(&["fct2"], |_, out| {
            writeln!(out, "Executing function 2")?;
            Ok(())
        })
        .action(&["fct1", "sf11"], |matches, out| {
            let args = Sf11Args::from_arg_matches(matches)?;
            writeln!(out, "Executing sub function 2")?;
            writeln!(out, "P1: {}\nP2: {}\nP3: {}", args.p1, args.p2, args.p3)?;
            Ok(())
        })
}
