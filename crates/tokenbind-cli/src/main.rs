//! tokenbind CLI - helpers for building and testing token bindings
//!
//! The offline commands (`match`, `extract`, `inject`) exercise one stage of
//! the pipeline at a time. `fetch` replays the configured source request over
//! the network once and reports the extracted token; `check` validates a
//! config file without sending anything.
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use secrecy::ExposeSecret;
use tracing::debug;

use tokenbind::extract::TokenPath;
use tokenbind::inject::inject;
use tokenbind::matcher::matches_with;
use tokenbind::{
    ConfigFile, HttpRequest, InjectionLocation, RefreshOutcome, TokenBinder, TokenFormat,
    mask_token,
};
use tokenbind_client::{ClientSettings, ReqwestSurface};

mod display;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test a URL against a source/target pattern
    Match {
        /// Observed request URL
        url: String,
        /// Pattern, with `*` as wildcard
        pattern: String,
        /// Do not accept a pattern that contains the URL
        #[arg(long)]
        no_reverse: bool,
    },

    /// Extract a token from a response body
    Extract {
        /// `$.key` for lite JSON, anything else is a regex
        #[arg(long)]
        path: String,
        /// File holding the body; reads stdin when omitted or `-`
        body: Option<PathBuf>,
        /// Print the token unmasked
        #[arg(long)]
        reveal: bool,
    },

    /// Inject a token into a request and print the result
    Inject {
        /// Request URL
        url: String,
        #[arg(long)]
        token: String,
        /// header, query, json or form
        #[arg(long, default_value = "header")]
        location: String,
        /// Header, parameter or field name
        #[arg(long, default_value = "Authorization")]
        key: String,
        #[arg(long, default_value = "Bearer {token}")]
        format: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request header as `Name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(short, long, default_value = "")]
        data: String,
    },

    /// Replay the configured source request and report the extracted token
    Fetch {
        /// Config file; defaults to ~/.config/tokenbind/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
        /// Whole-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Retries for transient network failures
        #[arg(long, default_value_t = 1)]
        retries: u32,
        /// Accept invalid TLS certificates
        #[arg(long)]
        insecure: bool,
        /// Print the token unmasked
        #[arg(long)]
        reveal: bool,
    },

    /// Validate a config file
    Check {
        /// Config file; defaults to ~/.config/tokenbind/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let format = std::env::var("TOKENBIND_LOG_FORMAT")
        .unwrap_or_else(|_| "pretty".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tokenbind=info,tokenbind_client=info"));

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Match {
            url,
            pattern,
            no_reverse,
        } => {
            let matched = matches_with(&url, &pattern, !no_reverse);
            display::display_match(&url, &pattern, matched);
        }
        Command::Extract { path, body, reveal } => {
            let body = read_body(body.as_deref())?;
            let token_path = TokenPath::parse(&path)?;
            debug!(grammar = token_path.grammar(), "Parsed token path");
            let token = token_path.extract(&body)?;
            println!("{}", render_token(&token, reveal));
        }
        Command::Inject {
            url,
            token,
            location,
            key,
            format,
            method,
            headers,
            data,
        } => {
            let location: InjectionLocation = location.parse()?;
            let mut request = HttpRequest::new(method, url).with_body(data);
            for raw in &headers {
                let (name, value) = parse_header(raw)?;
                request = request.with_added_header(name, value);
            }
            let injected = inject(&request, &token, location, &key, &TokenFormat::new(format))?;
            display::display_request(&injected);
        }
        Command::Fetch {
            config,
            timeout,
            retries,
            insecure,
            reveal,
        } => {
            let settings = ClientSettings::builder()
                .timeout_seconds(Some(timeout))
                .max_retries(retries)
                .accept_invalid_certs(insecure)
                .build();
            fetch(config.as_deref(), settings, reveal).await?;
        }
        Command::Check { config } => {
            let file = load_config(config.as_deref())?;
            let binding = file.binding()?;
            display::display_binding(&binding, &file.settings);
            if file.source_request.is_none() {
                println!(
                    "{}",
                    "no [source_request]; `tokenbind fetch` needs one".yellow()
                );
            }
            println!("{}", "config ok".green().bold());
        }
    }

    Ok(())
}

async fn fetch(path: Option<&Path>, client: ClientSettings, reveal: bool) -> Result<()> {
    let file = load_config(path)?;
    let source_request = file
        .source_request
        .clone()
        .context("Config has no [source_request] to replay")?;

    let surface = ReqwestSurface::new(client)?;
    let binder = TokenBinder::new(surface).with_settings(file.settings.clone());
    binder.apply(file.binding()?)?;
    binder.set_source_request(source_request);

    let outcome = binder.refresh().await;
    display::display_outcome(&outcome);

    match (outcome, binder.current_token()) {
        (RefreshOutcome::Refreshed { .. }, Some(token)) => {
            println!("{}", render_token(token.expose_secret(), reveal));
            Ok(())
        }
        (outcome, _) => bail!("No token fetched: {outcome}"),
    }
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    let config = match path {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::load().context("Failed to load default config")?,
    };
    Ok(config)
}

fn read_body(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read body from {}", path.display())),
        _ => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read body from stdin")?;
            Ok(body)
        }
    }
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Header must look like 'Name: value', got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Header name is empty in '{raw}'");
    }
    Ok((name, value.trim()))
}

fn render_token(token: &str, reveal: bool) -> String {
    if reveal {
        token.to_string()
    } else {
        mask_token(token)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "tokenbind",
            "inject",
            "https://api.test/",
            "--token",
            "abc",
            "--location",
            "query",
            "-H",
            "Accept: */*",
        ])
        .unwrap();

        match args.command {
            Command::Inject {
                location, headers, ..
            } => {
                assert_eq!(location, "query");
                assert_eq!(headers, vec!["Accept: */*".to_string()]);
            }
            other => unreachable!("parsed {other:?}"),
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Content-Type: application/json").unwrap(),
            ("Content-Type", "application/json")
        );
        assert_eq!(parse_header("X-Empty:").unwrap(), ("X-Empty", ""));
        assert!(parse_header("no colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_render_token() {
        assert_eq!(render_token("abcdefghijklmnop", false), "abcd...mnop");
        assert_eq!(render_token("abcdefghijklmnop", true), "abcdefghijklmnop");
    }

    #[test]
    fn test_read_body_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"token":"abc"}"#).unwrap();

        assert_eq!(read_body(Some(file.path())).unwrap(), r#"{"token":"abc"}"#);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
