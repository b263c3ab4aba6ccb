//! Utils - Common Utilities for CLI Commands
//!
//! Shared utility functions used across CLI commands.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use colored::Colorize;
use gridmp_distributed::ParallelConfig;

use crate::cli::GridArgs;
use crate::error::CliResult;

// =============================================================================
// Output Formatting
// =============================================================================

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a header
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// =============================================================================
// Configuration
// =============================================================================

/// Resolves the grid layout: config file, then environment, then flags.
pub fn resolve_config(args: &GridArgs) -> CliResult<ParallelConfig> {
    let mut config = match &args.config {
        Some(path) => ParallelConfig::load_from_path(path)?,
        None => ParallelConfig::default(),
    };
    config.apply_env()?;

    if let Some(mp) = args.mp {
        config.mp_size = mp;
    }
    if let Some(dp) = args.dp {
        config.dp_size = dp;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }

    config.validate()?;
    Ok(config)
}

/// Formats a shape as `[a, b]`.
pub fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("[{}]", dims.join(", "))
}

// =============================================================================
// Tests
// =============================================================================
