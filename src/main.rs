// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Bridle CLI.
//!
//! Runs the adapter headlessly against a configured language server so a
//! server setup can be checked without an editor.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]
#![allow(clippy::print_stderr, reason = "CLI tool needs to output to stderr")]

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use bridle::adapter::{LspAdapter, MARKER_OWNER};
use bridle::config::{AdapterConfig, AdapterOptions, ServerConfig};
use bridle::editor::{Marker, MarkerSeverity, MemoryEditor, uri_from_path};
use bridle::transport::StdioTransport;

/// Command-line arguments for Bridle.
#[derive(Parser, Debug)]
#[command(name = "bridle")]
#[command(about = "Editor-side LSP adapter with a headless check mode")]
#[command(version = env!("BRIDLE_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Command,

    /// LSP servers in "lang:command" format (e.g., "rust:rust-analyzer").
    /// Can be specified multiple times. These override the config file.
    #[arg(short, long = "lsp", global = true)]
    lsps: Vec<String>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

/// Subcommands supported by Bridle.
#[derive(Subcommand, Debug)]
enum Command {
    /// Open a file, wait for the server's diagnostics and print them.
    Check {
        /// File to check.
        file: PathBuf,

        /// Language ID of the file (defaults to the configured one).
        #[arg(long)]
        language: Option<String>,

        /// Print markers as JSON.
        #[arg(long)]
        json: bool,

        /// Seconds to wait for the first diagnostics batch.
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Print the effective configuration as JSON.
    Config,
}

/// Entry point for the Bridle binary.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bridle=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match args.command {
        Command::Check {
            file,
            language,
            json,
            timeout,
        } => {
            let markers = run_check(
                config,
                &file,
                language,
                Duration::from_secs(timeout),
            )
            .await?;
            print_markers(&file, &markers, json)?;
            if markers
                .iter()
                .any(|marker| marker.severity == MarkerSeverity::Error)
            {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<AdapterConfig> {
    let mut config = AdapterConfig::load(args.config.clone())?;

    for lsp_spec in &args.lsps {
        let (lang, command_str) = parse_lsp_spec(lsp_spec)?;
        let mut parts = command_str.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| anyhow!("Empty command in LSP spec: {lsp_spec}"))?
            .to_string();
        let args = parts.map(str::to_string).collect();

        debug!("Server for {lang} from the command line: {command}");
        config.server.insert(
            lang,
            ServerConfig {
                command,
                args,
                initialization_options: None,
            },
        );
    }

    Ok(config)
}

fn parse_lsp_spec(spec: &str) -> Result<(String, &str)> {
    let (lang, command_str) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid LSP spec: {spec}. Expected 'lang:command'"))?;
    let lang = lang.trim();
    if lang.is_empty() {
        bail!("Invalid LSP spec: {spec}. Language is empty");
    }
    Ok((lang.to_string(), command_str.trim()))
}

async fn run_check(
    config: AdapterConfig,
    file: &Path,
    language: Option<String>,
    timeout: Duration,
) -> Result<Vec<Marker>> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let absolute = std::fs::canonicalize(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let uri = uri_from_path(&absolute)?;

    let mut options = AdapterOptions::from_config(&config).with_status_observer(|status, detail| {
        info!("status: {status}{}", detail.map(|d| format!(" ({d})")).unwrap_or_default());
    });
    if let Some(language) = language {
        options.language_id = language;
    }

    let editor = Arc::new(MemoryEditor::new(uri.clone(), text));
    let transport = Arc::new(StdioTransport::new(config.server));
    let adapter = LspAdapter::new(options, transport, editor.clone(), Some(editor.clone()));

    let mut updates = editor.marker_updates();
    let outcome = adapter.start().await;
    if !outcome.connected {
        bail!("Language server did not start; see the log above");
    }

    let waited = tokio::time::timeout(timeout, updates.changed()).await;
    let markers = editor.markers(&uri, MARKER_OWNER);
    adapter.dispose().await;

    match waited {
        Ok(_) => Ok(markers),
        Err(_) => bail!(
            "No diagnostics within {}s from the language server",
            timeout.as_secs()
        ),
    }
}

fn print_markers(file: &Path, markers: &[Marker], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(markers)?);
        return Ok(());
    }

    if markers.is_empty() {
        println!("{}: no diagnostics", file.display());
        return Ok(());
    }
    for marker in markers {
        let source = marker
            .source
            .as_deref()
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        println!(
            "{}:{}:{}: {}: {}{source}",
            file.display(),
            marker.range.start_line_number,
            marker.range.start_column,
            severity_label(marker.severity),
            marker.message,
        );
    }
    Ok(())
}

const fn severity_label(severity: MarkerSeverity) -> &'static str {
    match severity {
        MarkerSeverity::Error => "error",
        MarkerSeverity::Warning => "warning",
        MarkerSeverity::Info => "info",
        MarkerSeverity::Hint => "hint",
    }
}
