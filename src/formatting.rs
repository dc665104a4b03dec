use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::Path;
use std::process::ExitCode;

use pagecap_lib::output::ErrorOutput;
use pagecap_lib::types::SkipReason;
use pagecap_lib::{PagecapError, PagecapOutput};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &PagecapOutput,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output)?,
        OutputFormat::Pretty => write_pretty_output(body, output)?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: PagecapError, format: OutputFormat, output: Option<&Path>) -> ExitCode {
    let payload = PagecapOutput::Error(ErrorOutput::new(err.to_payload()));

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Exit code 2 is reserved for fatal errors; skipped pages use 1.
    ExitCode::from(2)
}

/// Write JSON output to file or stdout.
fn write_json_output(body: &PagecapOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(body: &PagecapOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &PagecapOutput, colorize: bool) -> String {
    match body {
        PagecapOutput::Convert(out) => {
            let mut buf = String::new();
            let (status, code) = if out.is_complete() {
                ("DONE", "32")
            } else {
                ("PARTIAL", "33")
            };
            writeln!(
                buf,
                "{} Wrote {} of {} pages to {}",
                color(status, code, colorize),
                out.pages_written,
                out.requested,
                out.output_path.display()
            )
            .ok();
            writeln!(
                buf,
                "Source: {} (viewport {}, scale {})",
                out.html.display(),
                out.viewport,
                out.device_scale_factor
            )
            .ok();
            if !out.pages.is_empty() {
                writeln!(buf, "Pages: {}", out.pages.join(", ")).ok();
            }
            if !out.skipped.is_empty() {
                writeln!(buf, "Skipped:").ok();
                for skip in &out.skipped {
                    let reason = match &skip.reason {
                        SkipReason::NotFound => "not found".to_string(),
                        SkipReason::TimedOut { waited_ms } => {
                            format!("timed out after {:.1}s", *waited_ms as f64 / 1000.0)
                        }
                        SkipReason::Failed { message } => format!("failed: {message}"),
                    };
                    writeln!(buf, "- #{} (position {}): {}", skip.page_id, skip.position + 1, reason)
                        .ok();
                }
            }
            writeln!(buf, "Elapsed: {:.2}s", out.elapsed_ms as f64 / 1000.0).ok();
            buf
        }
        PagecapOutput::Error(out) => {
            let mut buf = String::new();
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or(out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            buf
        }
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Determine exit code for the convert command.
pub fn exit_code_for_convert(complete: bool, fail_on_missing: bool) -> ExitCode {
    if complete || !fail_on_missing {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
