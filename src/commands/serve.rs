use std::path::PathBuf;
use std::process::ExitCode;

use tracing::debug;

use crate::cli::OutputFormat;
use crate::formatting::render_error;
use crate::settings::{format_effective_config, load_config};

/// Run the HTTP service until interrupted.
pub async fn run_serve(config_path: Option<PathBuf>, bind: Option<String>) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, OutputFormat::Json, None),
    };
    debug!("{}", format_effective_config(&config, config_path.as_deref()));

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    match pagecap_lib::server::serve(&config, &addr).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => render_error(err, OutputFormat::Json, None),
    }
}
