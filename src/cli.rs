use clap::{Parser, Subcommand, ValueEnum};
use pagecap_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagecap")]
#[command(
    version,
    about = "Pagecap - Capture HTML elements as the pages of a PDF",
    long_about = "Pagecap\n\nRenders a local HTML document in headless Chromium, screenshots the elements whose ids you list (in that order) and writes them as consecutive pages of one PDF.\n\nModes:\n- convert: one document to one PDF from the command line.\n- serve: HTTP upload service exposing the same conversion.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) for viewport/scale/timeouts/pdf/server defaults; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture elements of an HTML document as pages of a PDF
    Convert {
        #[arg(long, value_name = "PATH", help = "Local HTML document to render")]
        html: PathBuf,

        #[arg(long, short, value_name = "PDF", help = "Where to write the PDF")]
        output: PathBuf,

        #[arg(
            long,
            value_name = "IDS",
            help = "Element ids to capture, comma-separated, in page order (e.g. pf1,pf2,pf3)"
        )]
        page_ids: String,

        #[arg(long, help = "Viewport dimensions (WIDTHxHEIGHT) [config default: 1686x1205]")]
        viewport: Option<Viewport>,

        #[arg(long, value_name = "FACTOR", help = "Device scale factor [config default: 4]")]
        scale: Option<f64>,

        #[arg(
            long,
            value_name = "SECS",
            help = "Seconds to wait for each element to attach [config default: 60]"
        )]
        element_timeout: Option<u64>,

        #[arg(
            long,
            value_name = "SECS",
            help = "Seconds to wait for the document to reach network idle [config default: 60]"
        )]
        nav_timeout: Option<u64>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(
            long,
            value_name = "PATH",
            help = "Write the conversion report to this file instead of stdout"
        )]
        report: Option<PathBuf>,

        #[arg(long, help = "Exit with status 1 when any requested id produced no page")]
        fail_on_missing: bool,
    },

    /// Run the HTTP conversion service
    Serve {
        #[arg(long, value_name = "ADDR", help = "Listen address [config default: 0.0.0.0:8000]")]
        bind: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
