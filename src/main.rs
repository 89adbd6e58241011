use std::io;
use std::process::ExitCode;

use assume_role::cli::Cli;
use assume_role::error::Error;
use clap::Parser;
use tracing::{error, subscriber, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[::tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<Error>() {
            // The child has already written its own diagnostics.
            Some(Error::ChildProcess(code)) => ExitCode::from(u8::try_from(*code).unwrap_or(1)),
            _ => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_logging(debug: bool) -> anyhow::Result<()> {
    let level = if debug { Level::DEBUG } else { Level::INFO };

    // RUST_LOG overrides --debug; SDK crates stay at warn unless asked for.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,assume_role={level}")));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(debug)
        .without_time()
        .compact()
        .finish();

    subscriber::set_global_default(subscriber)?;

    Ok(())
}
