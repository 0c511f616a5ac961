//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stacksmith - declarative compose-to-cloud synthesis.
#[derive(Parser, Debug)]
#[command(name = "stacksmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a compose file; repeat for override files.
    #[arg(short = 'f', long = "compose-file", global = true)]
    pub files: Vec<PathBuf>,

    /// Name of the stack / deployment.
    #[arg(short, long, global = true, env = "STACKSMITH_STACK_NAME")]
    pub name: Option<String>,

    /// Target region.
    #[arg(long, global = true, env = "AWS_DEFAULT_REGION")]
    pub region: Option<String>,

    /// Seed for synthesized rule priorities and name suffixes.
    #[arg(long, global = true, env = "STACKSMITH_SEED")]
    pub seed: Option<u64>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output formats for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Rendered template formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderFormat {
    /// JSON template document.
    Json,
    /// YAML template document.
    Yaml,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new Stacksmith project.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the compose document.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Synthesize the resource graph and write the template.
    Render {
        /// Directory to write the template to.
        #[arg(short = 'd', long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Template format.
        #[arg(long, default_value = "json")]
        format: RenderFormat,
    },

    /// Create a change set, show the diff, and prompt to apply.
    Plan {
        /// Apply without prompting.
        #[arg(short, long)]
        yes: bool,

        /// Keep the change set instead of deleting it when not applied.
        #[arg(long)]
        keep: bool,

        /// Bucket for templates over the direct-submission limit.
        #[arg(short, long, env = "STACKSMITH_BUCKET")]
        bucket: Option<String>,

        /// Disable rollback on deployment failure.
        #[arg(long)]
        disable_rollback: bool,
    },

    /// Synthesize and deploy the stack directly.
    Up {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Bucket for templates over the direct-submission limit.
        #[arg(short, long, env = "STACKSMITH_BUCKET")]
        bucket: Option<String>,

        /// Disable rollback on deployment failure.
        #[arg(long)]
        disable_rollback: bool,
    },
}
