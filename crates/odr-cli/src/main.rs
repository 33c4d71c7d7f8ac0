//! `odr-replay`: feeds a captured tap log through the recorder
//!
//! Each line of the events file is one JSON-encoded [`TapResponse`].

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use odr_core::{Recorder, RecorderConfig, RecorderHandle, TapResponse};
use odr_edm::{JsonSchemaReader, SchemaReader};
use odr_store::{FsStorage, SaveMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("odr-replay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Replay captured OData responses into deduplicated JSON fixtures")
        .arg(
            Arg::new("config")
                .long("config")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Recorder configuration (.yaml, .yml or .json)"),
        )
        .arg(
            Arg::new("events")
                .long("events")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("JSON-lines file of captured responses"),
        )
        .arg(
            Arg::new("schema")
                .long("schema")
                .action(ArgAction::Append)
                .value_parser(parse_schema_arg)
                .help("Pre-parsed schema for a service, as alias=path.json (repeatable)"),
        )
        .arg(
            Arg::new("recording-id")
                .long("recording-id")
                .help("Recording id used as file suffix"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_parser(value_parser!(SaveMode))
                .help("Save mode: stream or onStop"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG is set"),
        )
}

fn parse_schema_arg(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((alias, path)) if !alias.is_empty() && !path.is_empty() => {
            Ok((alias.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected alias=path, got '{value}'")),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &Path) -> Result<RecorderConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;

    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("parsing YAML config {}", path.display()))?,
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("parsing JSON config {}", path.display()))?,
        _ => bail!("unsupported config format: {}", path.display()),
    };
    Ok(config)
}

fn read_events(path: &Path) -> Result<Vec<TapResponse>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading events {}", path.display()))?;

    let mut events = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TapResponse>(line) {
            Ok(event) => events.push(event),
            Err(err) => warn!(line = number + 1, %err, "skipping unreadable event"),
        }
    }
    Ok(events)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("debug"));

    let config_path = matches
        .get_one::<PathBuf>("config")
        .context("--config is required")?;
    let events_path = matches
        .get_one::<PathBuf>("events")
        .context("--events is required")?;
    let config = load_config(config_path)?;
    let events = read_events(events_path)?;

    let reader = Arc::new(JsonSchemaReader);
    let recorder = Recorder::new(config, Arc::new(FsStorage::new()), reader.clone());
    let handle = RecorderHandle::spawn(recorder);

    for (alias, path) in matches
        .get_many::<(String, PathBuf)>("schema")
        .into_iter()
        .flatten()
    {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading schema {}", path.display()))?;
        let schema = reader
            .read(&text)
            .with_context(|| format!("parsing schema {}", path.display()))?;
        let index = handle.load_schema(alias.clone(), schema).await?;
        debug!(alias = %alias, entity_sets = index.entity_set_count(), "schema loaded");
    }

    let recording_id = matches.get_one::<String>("recording-id").cloned();
    let mode = matches.get_one::<SaveMode>("mode").copied();
    let (recording_id, mode) = handle.start(recording_id, mode).await?;
    info!(events = events.len(), recording_id = ?recording_id, %mode, "replaying");

    for event in events {
        handle.submit(event)?;
    }
    let written = handle.stop().await?;
    handle.shutdown().await?;

    println!("{written} entity sets written");
    Ok(())
}
