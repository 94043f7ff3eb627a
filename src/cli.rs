//! Command-line interface for tfaot-compile.

use clap::Parser;
use std::path::PathBuf;

/// Compile a TensorFlow model ahead-of-time and package the artifacts for
/// production deployment.
#[derive(Parser, Debug)]
#[command(name = "tfaot-compile")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the AOT configuration file (YAML or JSON).
    #[arg(short = 'c', long = "aot-config")]
    pub aot_config: PathBuf,

    /// Output directory for compile targets.
    #[arg(short = 'o', long = "output-directory")]
    pub output_directory: PathBuf,

    /// Name of the tool; defaults to "tfaot-model-<model-name>".
    #[arg(long)]
    pub tool_name: Option<String>,

    /// Base directory of the tool; no default.
    #[arg(long)]
    pub tool_base: Option<String>,

    /// Activate the development workflow, laying out artifacts like an
    /// installed tool and setting some variables to sensible defaults.
    #[arg(long)]
    pub dev: bool,

    /// AOT compiler executable to invoke.
    #[arg(long)]
    pub compiler: Option<PathBuf>,

    /// Additional flags to be passed to the underlying compiler invocation.
    #[arg(long)]
    pub additional_flags: Option<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
