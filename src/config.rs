use crate::services::{
    chunk_store::Backend, ingest::DEFAULT_CHUNK_SIZE, shard::DEFAULT_IDLE_TIMEOUT,
};
use anyhow::{Context, Result, anyhow, ensure};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub backend: Backend,
    pub chunk_size: usize,
    pub mailbox_capacity: usize,
    pub idle_timeout_secs: u64,
    pub default_location_hint: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked blob store over HTTP")]
pub struct Args {
    /// Host to bind to (overrides CHUNK_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNK_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where chunks are stored (overrides CHUNK_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Persistence backend (overrides CHUNK_STORE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Bytes per streamed chunk (overrides CHUNK_STORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Queued requests per object before callers wait (overrides CHUNK_STORE_MAILBOX_CAPACITY)
    #[arg(long)]
    pub mailbox_capacity: Option<usize>,

    /// Seconds an object's actor may sit idle before it exits (overrides CHUNK_STORE_IDLE_TIMEOUT_SECS)
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Location hint used when a request carries none (overrides CHUNK_STORE_LOCATION_HINT)
    #[arg(long)]
    pub location_hint: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("CHUNK_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("CHUNK_STORE_PORT", 3000u16)?;
        let env_storage =
            env::var("CHUNK_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/chunks".into());
        let env_backend = match env::var("CHUNK_STORE_BACKEND") {
            Ok(value) => <Backend as ValueEnum>::from_str(&value, true)
                .map_err(|err| anyhow!(err))
                .with_context(|| format!("parsing CHUNK_STORE_BACKEND value `{}`", value))?,
            Err(env::VarError::NotPresent) => Backend::Sql,
            Err(err) => return Err(err).context("reading CHUNK_STORE_BACKEND"),
        };
        let env_chunk_size = env_parse("CHUNK_STORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_mailbox = env_parse("CHUNK_STORE_MAILBOX_CAPACITY", 64usize)?;
        let env_idle = env_parse(
            "CHUNK_STORE_IDLE_TIMEOUT_SECS",
            DEFAULT_IDLE_TIMEOUT.as_secs(),
        )?;
        let env_hint = env::var("CHUNK_STORE_LOCATION_HINT").unwrap_or_else(|_| "enam".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            backend: args.backend.unwrap_or(env_backend),
            chunk_size: args.chunk_size.unwrap_or(env_chunk_size),
            mailbox_capacity: args.mailbox_capacity.unwrap_or(env_mailbox),
            idle_timeout_secs: args.idle_timeout_secs.unwrap_or(env_idle),
            default_location_hint: args.location_hint.unwrap_or(env_hint),
        };

        ensure!(cfg.chunk_size > 0, "chunk size must be positive");
        ensure!(cfg.mailbox_capacity > 0, "mailbox capacity must be positive");
        ensure!(cfg.idle_timeout_secs > 0, "idle timeout must be positive");

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an environment variable, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
