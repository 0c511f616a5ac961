//! CLI module for the Stacksmith tool.
//!
//! This module provides the command-line interface for synthesizing and
//! deploying compose documents.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, RenderFormat};
pub use output::OutputFormatter;
