use clap::Parser;
use ct_core::Result;

mod cli;
mod logging;
mod tables;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let logger = logging::init_logging(cli.verbose);
    cli::handle_command(cli, logger).await
}
