//! Command line configuration and the seed manifest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::apis::{Managed, ProviderConfig, Secret};
use crate::controller::ControllerOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConnectorKind {
    /// Build engines without looking at credentials.
    Noop,
    /// Resolve each resource's provider config and credentials first.
    ProviderConfig,
}

#[derive(Debug, Parser)]
#[command(name = "provider-bork")]
#[command(about = "Reconciles BorkResources against a no-op external system")]
pub struct Args {
    /// Manifest with resources, provider configs and secrets to seed the store
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// How engines are connected
    #[arg(long, value_enum, default_value = "noop")]
    pub connector: ConnectorKind,

    /// Interval between reconciles of an in-sync resource (e.g. 500ms, 30s, 1m)
    #[arg(long, default_value = "60s", value_parser = parse_duration)]
    pub poll_interval: Duration,

    /// Concurrent reconciles
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// First retry delay after a failed reconcile
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub backoff_base: Duration,

    /// Upper bound for the retry delay
    #[arg(long, default_value = "60s", value_parser = parse_duration)]
    pub backoff_max: Duration,

    /// Reconciles per second across all workers (0 = unlimited)
    #[arg(long, default_value_t = 10)]
    pub max_reconcile_rate: u32,

    /// Upper bound for a single reconcile
    #[arg(long, default_value = "60s", value_parser = parse_duration)]
    pub reconcile_timeout: Duration,

    /// Run a competing writer of contendedValue at this interval
    #[arg(long, value_parser = parse_duration)]
    pub contend_every: Option<Duration>,

    /// Value the competing writer sets
    #[arg(long, default_value_t = 9, allow_negative_numbers = true)]
    pub contend_value: i64,
}

impl Args {
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            poll_interval: self.poll_interval,
            workers: self.workers,
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
            max_reconcile_rate: self.max_reconcile_rate,
            reconcile_timeout: self.reconcile_timeout,
        }
    }
}

/// Parse `<n>ms`, `<n>s`, `<n>m` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {s}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => n
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Duration too large: {s}")),
        _ => Err(format!("Invalid duration unit in {s}, expected ms, s or m")),
    }
}

/// Objects to seed the in-memory stores with at startup.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<Managed>,
    #[serde(default)]
    pub provider_configs: Vec<ProviderConfig>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}
