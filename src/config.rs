use crate::{services::retry::RetryPolicy, storage::ErrorKind};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr, time::Duration};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once in `main`
/// and handed to constructors.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket: String,
    pub cdn_endpoint: String,
    pub s3: S3Settings,
    pub retry: RetryPolicy,
    pub save_mode: SaveMode,
    pub max_upload_bytes: usize,
    pub reporter: Option<ReporterSettings>,
}

/// Connection settings for the S3-compatible backend.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: Secret,
    /// Address buckets as `endpoint/bucket` rather than `bucket.endpoint`.
    pub path_style: bool,
}

#[derive(Debug, Clone)]
pub struct ReporterSettings {
    pub url: String,
    pub token: Option<Secret>,
}

/// String that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Whether `POST /save-file` waits for the backend write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SaveMode {
    /// Reply after the object is stored; failures reach the client.
    Wait,
    /// Reply immediately; failures go to the event reporter.
    Detach,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP gateway for an S3-compatible bucket")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Backend endpoint URL (overrides STORAGE_S3_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Public base URL used to build file links (overrides STORAGE_S3_CDN_ENDPOINT)
    #[arg(long)]
    pub cdn_endpoint: Option<String>,

    /// Bucket holding all files (overrides STORAGE_S3_BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Backend region (overrides STORAGE_S3_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Use virtual-hosted bucket addressing instead of path-style
    #[arg(long)]
    pub virtual_hosted: bool,

    /// Attempts for retried operations (overrides STORAGE_RETRY_MAX_ATTEMPTS)
    #[arg(long)]
    pub retry_max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds (overrides STORAGE_RETRY_DELAY_MS)
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Comma-separated error kinds to retry (overrides STORAGE_RETRY_ON)
    #[arg(long)]
    pub retry_on: Option<String>,

    /// Save mode for uploads (overrides GATEWAY_SAVE_MODE)
    #[arg(long, value_enum)]
    pub save_mode: Option<SaveMode>,

    /// Upload size limit in bytes (overrides GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Event collector URL (overrides REPORTER_URL)
    #[arg(long)]
    pub reporter_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge `args` over values obtained from `lookup` (normally the
    /// process environment).
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{name} must be set"))
        };

        // --- Environment fallback ---
        let env_host = lookup("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_env::<u16>(&lookup, "GATEWAY_PORT")?.unwrap_or(8080);

        let endpoint = match args.endpoint {
            Some(endpoint) => endpoint,
            None => required("STORAGE_S3_ENDPOINT")?,
        };
        let bucket = match args.bucket {
            Some(bucket) => bucket,
            None => required("STORAGE_S3_BUCKET_NAME")?,
        };
        let cdn_endpoint = args
            .cdn_endpoint
            .or_else(|| lookup("STORAGE_S3_CDN_ENDPOINT"))
            .unwrap_or_else(|| endpoint.clone());
        let region = args
            .region
            .or_else(|| lookup("STORAGE_S3_REGION"))
            .unwrap_or_else(|| "us-east-1".into());
        let virtual_hosted = args.virtual_hosted
            || parse_env::<bool>(&lookup, "STORAGE_S3_VIRTUAL_HOSTED")?.unwrap_or(false);

        let s3 = S3Settings {
            endpoint,
            region,
            access_key: required("STORAGE_S3_ACCESS_KEY")?,
            secret_key: Secret::new(required("STORAGE_S3_SECRET_KEY")?),
            path_style: !virtual_hosted,
        };

        let max_attempts = match args.retry_max_attempts {
            Some(n) => n,
            None => parse_env::<u32>(&lookup, "STORAGE_RETRY_MAX_ATTEMPTS")?
                .unwrap_or(RetryPolicy::DEFAULT_MAX_ATTEMPTS),
        };
        let delay = match args.retry_delay_ms {
            Some(ms) => Duration::from_millis(ms),
            None => parse_env::<u64>(&lookup, "STORAGE_RETRY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(RetryPolicy::DEFAULT_DELAY),
        };
        let retry_on = match args.retry_on.or_else(|| lookup("STORAGE_RETRY_ON")) {
            Some(list) => parse_kinds(&list)?,
            None => RetryPolicy::DEFAULT_RETRY_ON.to_vec(),
        };

        let save_mode = match args.save_mode {
            Some(mode) => mode,
            None => match lookup("GATEWAY_SAVE_MODE") {
                Some(value) => <SaveMode as ValueEnum>::from_str(&value, true)
                    .map_err(|err| anyhow!("parsing GATEWAY_SAVE_MODE value `{value}`: {err}"))?,
                None => SaveMode::Wait,
            },
        };

        let max_upload_bytes = match args.max_upload_bytes {
            Some(n) => n,
            None => parse_env::<usize>(&lookup, "GATEWAY_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        let reporter = args
            .reporter_url
            .or_else(|| lookup("REPORTER_URL"))
            .map(|url| ReporterSettings {
                url,
                token: lookup("REPORTER_TOKEN").map(Secret::new),
            });

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            bucket,
            cdn_endpoint,
            s3,
            retry: RetryPolicy::new(max_attempts, delay, retry_on),
            save_mode,
            max_upload_bytes,
            reporter,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {name} value `{value}`"))
        })
        .transpose()
}

fn parse_kinds(list: &str) -> Result<Vec<ErrorKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ErrorKind>().context("parsing retryable error kinds"))
        .collect()
}
