//! GraphGate CLI entry point.
//!
//! `graphgate stdio` serves one MCP session over stdin/stdout. Logs go to
//! stderr; stdout carries protocol traffic only.

use clap::{Parser, Subcommand};

use graphgate::cli::StdioArgs;
use graphgate::stdio::run_stdio;

/// GraphGate: MCP access to the partner and manager GraphQL APIs.
#[derive(Parser)]
#[command(name = "graphgate", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one MCP session over newline-delimited JSON on stdin/stdout.
    Stdio(StdioArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Stdio(args) => {
            init_tracing(args.verbose);
            match run_stdio(args).await {
                Ok(()) => 0,
                Err(e) => {
                    tracing::error!(error = %e, "stdio failed");
                    eprintln!("graphgate stdio: {e}");
                    1
                }
            }
        }
    };

    std::process::exit(code);
}

/// Stderr-only subscriber. `verbose` forces `debug`, otherwise `RUST_LOG`
/// applies.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
