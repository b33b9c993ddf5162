use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use fpl_tonic_core::types::{CHUNK_BYTES, PARTICIPANT_CAP, PERIOD_MAX, Period};
use reqwest::Url;
use std::path::PathBuf;

/// Runtime configuration for the `fpl-tonic-server` binary.
///
/// These settings control where picks are fetched from, how many league
/// members and gameweeks are aggregated, and how the resulting CSV is
/// streamed. All values are parsed from CLI arguments or environment
/// variables, with defaults matching the public FPL API.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fpl-tonic-server",
    version,
    about = "A gRPC service streaming per-gameweek pick occurrences for a league"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/fpl-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Base URL of the remote Data Source.
    ///
    /// Environment variable: `SOURCE_BASE_URL`
    #[arg(long, env = "SOURCE_BASE_URL", default_value_t = String::from("https://fantasy.premierleague.com/drf"))]
    pub source_base_url: String,

    /// Timeout applied to every individual HTTP fetch, in seconds.
    ///
    /// Environment variable: `HTTP_TIMEOUT_SECS`
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Deadline for a whole request (catalog, membership, every gameweek and
    /// the artifact write), in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Number of league members (from the top of the standings) whose picks
    /// are counted.
    ///
    /// Environment variable: `PARTICIPANT_CAP`
    #[arg(long, env = "PARTICIPANT_CAP", default_value_t = PARTICIPANT_CAP)]
    pub participant_cap: usize,

    /// Highest gameweek scheduled by the fan-out.
    ///
    /// Environment variable: `PERIOD_MAX`
    #[arg(long, env = "PERIOD_MAX", default_value_t = PERIOD_MAX)]
    pub period_max: Period,

    /// Size of each streamed CSV chunk in bytes.
    ///
    /// Environment variable: `CHUNK_BYTES`
    #[arg(long, env = "CHUNK_BYTES", default_value_t = CHUNK_BYTES)]
    pub chunk_bytes: usize,

    /// Directory where temporary CSV artifacts are written. Defaults to the
    /// system temp directory.
    ///
    /// Environment variable: `ARTIFACT_DIR`
    #[arg(long, env = "ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Capacity of the response buffer between the emitter and the gRPC
    /// stream.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub source_base_url: Url,
    pub http_timeout: Duration,
    pub request_timeout: Duration,
    pub participant_cap: usize,
    pub period_max: Period,
    pub chunk_bytes: usize,
    pub artifact_dir: PathBuf,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.participant_cap == 0 {
            bail!("PARTICIPANT_CAP must be greater than 0");
        }

        if args.period_max == 0 {
            bail!("PERIOD_MAX must be greater than 0");
        }

        if args.chunk_bytes == 0 {
            bail!("CHUNK_BYTES must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.http_timeout_secs == 0 || args.request_timeout_secs == 0 {
            bail!("HTTP_TIMEOUT_SECS and REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        // Endpoint paths are appended to the base, so it must not end in '/'.
        let trimmed = args.source_base_url.trim_end_matches('/');
        let source_base_url = Url::parse(trimmed)
            .with_context(|| format!("invalid SOURCE_BASE_URL `{}`", args.source_base_url))?;

        if source_base_url.cannot_be_a_base() {
            bail!("SOURCE_BASE_URL `{}` cannot be a base URL", trimmed);
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            source_base_url,
            http_timeout: Duration::from_secs(args.http_timeout_secs),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            participant_cap: args.participant_cap,
            period_max: args.period_max,
            chunk_bytes: args.chunk_bytes,
            artifact_dir: args.artifact_dir.unwrap_or_else(std::env::temp_dir),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
