use clap::Parser;
use homesync::config::{Cli, Command};
use homesync::{commands, logging, Config};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let command = cli.command.clone();
    // Convert CLI args to Config - this validates immediately
    let config = Config::try_from(cli)?;

    match command {
        Command::Scan { index_out, tree } => {
            commands::scan::run(&config, index_out.as_deref(), tree)?;
        }
        Command::Status => {
            commands::status::run(&config)?;
        }
        Command::Sync => {
            commands::sync::run(&config)?;
        }
    }

    Ok(())
}
