//! Display utilities for CLI output formatting
//!
//! Provides formatted output for requests, bindings, and refresh outcomes

use colored::Colorize;
use tokenbind::{AddressingMode, BinderSettings, BindingConfig, HttpRequest, RefreshOutcome};

/// Maximum body characters shown for a request.
const BODY_DISPLAY_CHARS: usize = 200;

/// Display a request the way it would go on the wire
pub fn display_request(request: &HttpRequest) {
    println!("{} {}", request.method.bold(), request.url);
    for header in &request.headers {
        println!("{}: {}", header.name.cyan(), header.value);
    }
    if !request.body.is_empty() {
        println!();
        println!("{}", truncate(&request.body, BODY_DISPLAY_CHARS));
    }
}

/// Display a one-line match verdict
pub fn display_match(url: &str, pattern: &str, matched: bool) {
    let verdict = if matched {
        "match".green().bold()
    } else {
        "no match".red().bold()
    };
    println!("{verdict}  {} ~ {}", url.dimmed(), pattern);
}

/// Display the outcome of a refresh attempt
pub fn display_outcome(outcome: &RefreshOutcome) {
    let label = if outcome.is_refreshed() {
        "ok".green().bold()
    } else {
        "skipped".yellow().bold()
    };
    println!("{label}  {outcome}");
}

/// Display an applied binding and its settings
pub fn display_binding(binding: &BindingConfig, settings: &BinderSettings) {
    match &binding.mode {
        AddressingMode::Pattern { source, targets } => {
            println!("{} pattern", "mode:".bold());
            println!("{} {source}", "source:".bold());
            for target in targets {
                println!("{} {target}", "target:".bold());
            }
        }
        AddressingMode::FlowId { source, targets } => {
            println!("{} flow id", "mode:".bold());
            println!("{} #{source}", "source:".bold());
            for target in targets {
                println!("{} #{target}", "target:".bold());
            }
        }
    }
    println!("{} {}", "token path:".bold(), binding.token_path);
    println!(
        "{} {} {} ({})",
        "inject:".bold(),
        binding.injection_location,
        binding.injection_key,
        binding.token_format
    );
    println!("{} {}", "auto-fetch:".bold(), binding.auto_fetch_enabled);
    println!(
        "{} {} ms, reverse containment {}, tool {}",
        "settings:".bold(),
        settings.auto_fetch_timeout_ms,
        settings.reverse_containment,
        settings.addressed_tool
    );
}

fn truncate(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}... ({count} chars)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd... (10 chars)");
    }
}
