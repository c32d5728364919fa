//! Status lines printed by the `lens` commands

use colored::Colorize;
use std::fmt::Display;

pub fn success(msg: impl Display) {
    println!("{} {}", "✓".green(), msg);
}

/// Errors go to stderr so they survive output redirection.
pub fn error(msg: impl Display) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn info(msg: impl Display) {
    println!("{} {}", "ℹ".blue(), msg);
}

pub fn warning(msg: impl Display) {
    println!("{} {}", "⚠".yellow(), msg);
}
