use anyhow::Result;

use cmdgate::demo;
use cmdgate::gateway::server::{SERVER_COMMAND, server_args, with_server_command};

mod cmd;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = with_server_command(demo::command()).get_matches();

    match matches.subcommand() {
        Some((SERVER_COMMAND, server_matches)) => {
            let args = server_args(server_matches)?;
            cmd::cmd_server(&args, demo::registry()).await?;
        }
        _ => {
            // Already validated above; the registry re-parses without `server`.
            let args = std::env::args_os()
                .skip(1)
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect();
            cmd::cmd_local(demo::registry(), args)?;
        }
    }

    Ok(())
}
