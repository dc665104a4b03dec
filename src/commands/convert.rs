use std::path::PathBuf;
use std::process::ExitCode;

use pagecap_lib::output::ConvertOutput;
use pagecap_lib::{Converter, PagecapOutput};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_convert, render_error, write_output};
use crate::settings::{format_effective_config, load_config, resolve_convert_settings, ConvertOverrides};

/// Arguments of `pagecap convert`.
pub struct ConvertArgs {
    pub html: PathBuf,
    pub output: PathBuf,
    pub page_ids: String,
    pub overrides: ConvertOverrides,
    pub format: OutputFormat,
    pub report: Option<PathBuf>,
    pub fail_on_missing: bool,
}

/// Run the convert command.
pub async fn run_convert(config_path: Option<PathBuf>, args: ConvertArgs) -> ExitCode {
    let report_path = args.report.as_deref();
    let config = match load_config(config_path.as_deref())
        .and_then(|cfg| resolve_convert_settings(cfg, &args.overrides))
    {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, args.format, report_path),
    };
    debug!("{}", format_effective_config(&config, config_path.as_deref()));

    let page_ids = split_page_ids(&args.page_ids);
    debug!(html = %args.html.display(), ids = ?page_ids, "starting conversion");

    let converter = Converter::from_config(&config);
    let report = match converter.convert(&args.html, &args.output, page_ids).await {
        Ok(report) => report,
        Err(err) => return render_error(err, args.format, report_path),
    };

    let complete = report.is_complete();
    let capture = &converter.options().capture;
    let body = PagecapOutput::Convert(ConvertOutput::from_report(
        &args.html,
        capture.viewport,
        capture.device_scale_factor,
        report,
    ));
    if let Err(err) = write_output(&body, args.format, report_path) {
        eprintln!("Failed to write output: {err}");
        return ExitCode::from(2);
    }
    exit_code_for_convert(complete, args.fail_on_missing)
}

/// Comma-separated ids, trimmed, blanks dropped. An empty result is left to the converter.
fn split_page_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}
