use clap::Parser;
use dexsprite::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dexsprite::logging::init_logging(cli.verbose, cli.quiet);

    match dexsprite::run_app(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("{err:?}");
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        },
    }
}
