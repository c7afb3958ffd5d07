//! Configuration management for the edge-layer service.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `EDGE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use edge_layers::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Process(config) => println!("Processing {}", config.input.display()),
//!     Command::Check(config) => println!("Checking {:?}", config.s3.s3_bucket),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `EDGE_HOST` - Server bind address (default: 0.0.0.0)
//! - `EDGE_PORT` - Server port (default: 5000)
//! - `EDGE_STORAGE` - Storage backend, `s3` or `memory` (default: s3)
//! - `EDGE_S3_BUCKET` - S3 bucket name (required for s3 storage)
//! - `EDGE_S3_PREFIX` - Key prefix inside the bucket
//! - `EDGE_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `EDGE_S3_REGION` - AWS region (default: us-east-1)
//! - `EDGE_CORS_ORIGINS` - Comma-separated allowed origins (default: any)
//! - `EDGE_CACHE_BLOBS` - Blob read cache size in bytes (default: 64MB)
//! - `EDGE_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `EDGE_MAX_UPLOAD_BYTES` - Upload body limit in bytes (default: 20MB)

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::server::DEFAULT_MAX_UPLOAD_BYTES;
use crate::store::DEFAULT_BLOB_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default age in seconds before an unreferenced blob counts as orphaned
pub const DEFAULT_ORPHAN_MIN_AGE: u64 = 600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Edge Layers - derive colorized edge-map layers from uploaded images.
#[derive(Parser, Debug, Clone)]
#[command(name = "edge-layers")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeConfig),

    /// Run the edge pipeline on a local file and write the layers to disk
    Process(ProcessConfig),

    /// Check S3 connectivity and store consistency
    Check(CheckConfig),
}

/// Where blobs and metadata records are kept.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3 or an S3-compatible service
    S3,

    /// Process memory; contents are lost on exit
    Memory,
}

// =============================================================================
// S3 Configuration
// =============================================================================

/// S3 connection settings shared by `serve` and `check`.
#[derive(Args, Debug, Clone)]
pub struct S3Args {
    /// S3 bucket holding blobs and metadata records.
    #[arg(long, env = "EDGE_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix inside the bucket (e.g. "edge-layers/").
    #[arg(long, env = "EDGE_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    ///
    /// If not specified, uses the default AWS S3 endpoint.
    #[arg(long, env = "EDGE_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "EDGE_S3_REGION")]
    pub s3_region: String,
}

impl S3Args {
    /// Validate the S3 settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.bucket()?;

        if let Some(ref endpoint) = self.s3_endpoint {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| format!("Invalid S3 endpoint '{}': {}", endpoint, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!(
                    "Invalid S3 endpoint '{}': scheme must be http or https",
                    endpoint
                ));
            }
        }

        if self.s3_region.trim().is_empty() {
            return Err("S3 region must not be empty".to_string());
        }

        Ok(())
    }

    /// The configured bucket, or an error message explaining how to set it.
    pub fn bucket(&self) -> Result<&str, String> {
        match self.s3_bucket.as_deref().map(str::trim) {
            Some(bucket) if !bucket.is_empty() => Ok(bucket),
            _ => Err("S3 bucket name is required. Set --s3-bucket or EDGE_S3_BUCKET".to_string()),
        }
    }
}

// =============================================================================
// Serve Configuration
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "EDGE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "EDGE_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Storage backend for blobs and metadata records.
    #[arg(long, value_enum, default_value_t = StorageBackend::S3, env = "EDGE_STORAGE")]
    pub storage: StorageBackend,

    #[command(flatten)]
    pub s3: S3Args,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum bytes of blob content kept in the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOB_CACHE_CAPACITY, env = "EDGE_CACHE_BLOBS")]
    pub cache_blobs: usize,

    /// HTTP Cache-Control max-age in seconds for served blobs.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "EDGE_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // Request Configuration
    // =========================================================================
    /// Maximum upload request body size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "EDGE_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "EDGE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage == StorageBackend::S3 {
            self.s3.validate()?;
        }

        if self.cache_blobs == 0 {
            return Err("cache_blobs must be greater than 0".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Process Configuration
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ProcessConfig {
    /// Image file to process.
    pub input: PathBuf,

    /// Directory the layers are written to.
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.input.is_file() {
            return Err(format!("Input file not found: {}", self.input.display()));
        }
        if self.out_dir.exists() && !self.out_dir.is_dir() {
            return Err(format!(
                "Output path is not a directory: {}",
                self.out_dir.display()
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Check Configuration
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub s3: S3Args,

    /// List blobs that no metadata record references.
    #[arg(long, default_value_t = false)]
    pub orphans: bool,

    /// Delete the unreferenced blobs found by --orphans.
    #[arg(long, default_value_t = false, requires = "orphans")]
    pub delete: bool,

    /// Only blobs older than this many seconds count as orphans.
    ///
    /// Uploads still being committed have blobs without a record, so this
    /// should exceed the longest upload.
    #[arg(long, default_value_t = DEFAULT_ORPHAN_MIN_AGE, env = "EDGE_ORPHAN_MIN_AGE")]
    pub min_age: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    /// Upload time after which unreferenced blobs are left alone.
    pub fn orphan_cutoff(&self) -> DateTime<Utc> {
        let min_age = i64::try_from(self.min_age).unwrap_or(i64::MAX);
        let min_age = Duration::try_seconds(min_age).unwrap_or(Duration::MAX);
        Utc::now()
            .checked_sub_signed(min_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

// =============================================================================
// Tests
// =============================================================================
