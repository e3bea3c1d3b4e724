use anyhow::Result;
use clap::Parser;
use quality_ledger::cli::{self, Cli, CommandContext};
use quality_ledger::config::LedgerConfig;
use quality_ledger::{CancellationToken, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_guard = logging::init_logging(cli.debug, cli.quiet, cli.log_file.clone())?;

    let project_dir = cli.dir.as_deref();
    let config = LedgerConfig::load(project_dir, cli.config.as_deref())?;
    let database = match &cli.database {
        Some(path) => path.clone(),
        None => config.database_path(project_dir)?,
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cli::setup_signal_handlers(cancel.clone()));

    let ctx = CommandContext::open(config, database, cancel)?;
    let handler = cli::create_handler(cli.output_mode(), cli.debug);

    let code = match cli::execute(cli.command, &ctx, handler.as_ref()).await {
        Ok(code) => code,
        Err(e) => {
            let code = cli::error_exit_code(&e);
            match code {
                cli::EXIT_CANCELLED => eprintln!("Cancelled"),
                cli::EXIT_RETRY_LATER => eprintln!("Error: {:#} (try again later)", e),
                _ => eprintln!("Error: {:#}", e),
            }
            code
        }
    };

    if code != 0 {
        drop(log_guard);
        std::process::exit(code);
    }
    Ok(())
}
