use anyhow::{Context, Result};
use stratad::cli::parse_cli;
use stratad::commands::run_command;

fn main() -> Result<()> {
    let cli = parse_cli();
    strata_observe::init_tracing(cli.log_format).context("failed to initialize logging")?;
    run_command(&cli.workspace, &cli.command, &mut std::io::stdout())
}
