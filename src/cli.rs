use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reconflow")]
#[command(about = "Reconnaissance pipeline: port discovery, service detection, enrichment and reporting")]
#[command(long_about = r#"
Reconflow chains a port discovery scanner and a service detection scanner,
normalizes their output, enriches open ports with banners and HTTP metadata,
maps the results to vulnerability candidates and renders an HTML report.

Only scan systems you own or have explicit permission to test.

Usage Examples:
  reconflow run 10.0.0.5                          # Full pipeline
  reconflow normalize raw.json 10.0.0.5           # Single stage
  reconflow merge-xml normalized.json nmap.xml
  reconflow enrich normalized_enriched.json 10.0.0.5
  reconflow map                                   # Latest run's enriched output
  reconflow report --run <RUN_ID>
"#)]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Base directory for raw/, nmap/ and final/
    #[arg(long, value_name = "DIR", global = true, env = "RECONFLOW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert raw discovery JSON into a normalized document
    Normalize {
        /// Raw discovery scanner JSON
        raw: PathBuf,

        /// Target the scan was run against
        target: String,

        /// Service detection XML to reference from each discovery
        #[arg(long, value_name = "FILE")]
        nmap_xml: Option<PathBuf>,

        /// Output path (defaults to <final>/normalized_<target>.json)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Fill empty service and banner fields from service detection XML
    MergeXml {
        normalized: PathBuf,
        xml: PathBuf,
    },

    /// Probe every discovery for banners, HTTP metadata and robots.txt
    Enrich {
        normalized: PathBuf,
        target: String,
    },

    /// Attach vulnerability candidates to each discovery
    Map {
        /// HTTP-enriched document (defaults to the run's enrich output)
        source: Option<PathBuf>,

        /// Run id to resolve the input from
        #[arg(long, value_name = "RUN_ID")]
        run: Option<String>,
    },

    /// Render the HTML report
    Report {
        /// Mapped document (defaults to the run's map output)
        source: Option<PathBuf>,

        /// Run id to resolve the input from
        #[arg(long, value_name = "RUN_ID")]
        run: Option<String>,
    },

    /// Run every stage against one target
    Run {
        target: String,
    },

    /// List the active vulnerability rule table
    Rules,

    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "reconflow.toml")]
        path: PathBuf,
    },
}
