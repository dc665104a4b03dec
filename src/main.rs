mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_convert, run_serve, ConvertArgs};
use settings::ConvertOverrides;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Convert {
            html,
            output,
            page_ids,
            viewport,
            scale,
            element_timeout,
            nav_timeout,
            format,
            report,
            fail_on_missing,
        } => {
            run_convert(
                args.config,
                ConvertArgs {
                    html,
                    output,
                    page_ids,
                    overrides: ConvertOverrides {
                        viewport,
                        scale,
                        element_timeout,
                        nav_timeout,
                    },
                    format,
                    report,
                    fail_on_missing,
                },
            )
            .await
        }
        Commands::Serve { bind } => run_serve(args.config, bind).await,
    }
}

/// Logs go to stderr so stdout carries only the JSON output.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
