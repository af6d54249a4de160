mod cli_interface;
mod commands;
mod console;

use bulk_upsert::{metrics::init_build_info, parse_log_level, setup_logger, LevelFilter};
use clap::Parser;

use crate::{
    cli_interface::{Commands, CLI},
    commands::upsert::handle_upsert_command,
    console::print_warn_message,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::parse();

    let log_level = parse_log_level(&cli.log_level).unwrap_or_else(|| {
        print_warn_message(&format!("Unknown log level '{}', using info", cli.log_level));
        LevelFilter::INFO
    });
    setup_logger(log_level);
    init_build_info(env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Upsert(args) => handle_upsert_command(args).await,
    }
}
