use clap::Parser;
use tracing_subscriber::EnvFilter;
use vaultask::cli::commands::Cli;
use vaultask::cli::handlers;

/// Log to stderr, filtered by `VT_LOG` (warnings only by default).
fn init_logging() {
    let filter = EnvFilter::try_from_env("VT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = handlers::dispatch(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
