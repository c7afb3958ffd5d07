//! Edge Layers - derive colorized edge-map layers from uploaded images.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_layers::{
    config::{CheckConfig, Cli, Command, ProcessConfig, ServeConfig, StorageBackend},
    create_router, create_s3_client, delete_orphans, find_orphans, ArtifactRole, BlobStore,
    EdgePipeline, ImageService, MemoryBlobStore, MemoryMetadataStore, MetadataStore,
    RouterConfig, S3BlobStore, S3MetadataStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Process(config) => run_process(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    // Print startup banner and info
    print_banner();

    info!("Configuration:");
    info!(
        "  Cache: {}MB blobs, max-age {}s",
        config.cache_blobs / (1024 * 1024),
        config.cache_max_age
    );
    info!(
        "  Upload limit: {}MB",
        config.max_upload_bytes / (1024 * 1024)
    );

    match config.storage {
        StorageBackend::Memory => {
            warn!("  Storage: MEMORY - uploads are lost when the server stops");
            let service = ImageService::with_cache_capacity(
                Arc::new(MemoryBlobStore::new()),
                Arc::new(MemoryMetadataStore::new()),
                config.cache_blobs,
            );
            serve(service, &config).await
        }
        StorageBackend::S3 => {
            // validate() guarantees a bucket for S3 storage
            let bucket = match config.s3.bucket() {
                Ok(b) => b.to_string(),
                Err(e) => {
                    error!("Configuration error: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            info!("  Storage: S3");
            info!("  S3 bucket: {}", bucket);
            if let Some(ref prefix) = config.s3.s3_prefix {
                info!("  S3 prefix: {}", prefix);
            }
            if let Some(ref endpoint) = config.s3.s3_endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", config.s3.s3_region);

            let s3_client =
                create_s3_client(config.s3.s3_endpoint.as_deref(), &config.s3.s3_region).await;

            // Test S3 connectivity
            info!("");
            info!("Connecting to S3...");
            if let Err(e) = test_s3_connection(&s3_client, &bucket).await {
                error!("  Failed to connect to S3: {}", e);
                error!("");
                error!("  Please check:");
                error!("    - Your AWS credentials are configured correctly");
                error!("    - The bucket '{}' exists and is accessible", bucket);
                error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
                return ExitCode::FAILURE;
            }
            info!("  Connected successfully");

            let prefix = config.s3.s3_prefix.as_deref();
            let blobs = S3BlobStore::new(s3_client.clone(), bucket.as_str(), prefix);
            let metadata = S3MetadataStore::new(s3_client, bucket.as_str(), prefix);
            let service = ImageService::with_cache_capacity(
                Arc::new(blobs),
                Arc::new(metadata),
                config.cache_blobs,
            );
            serve(service, &config).await
        }
    }
}

/// Build the router for a service and run it until the listener fails.
async fn serve<B, M>(service: ImageService<B, M>, config: &ServeConfig) -> ExitCode
where
    B: BlobStore + 'static,
    M: MetadataStore + 'static,
{
    let router = create_router(service, build_router_config(config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl -F image=@photo.jpg http://{}/upload", addr);
    info!("    curl http://{}/image/latest", addr);
    info!("    curl http://{}/images", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("███████╗██████╗  ██████╗ ███████╗");
    info!("██╔════╝██╔══██╗██╔════╝ ██╔════╝");
    info!("█████╗  ██║  ██║██║  ███╗█████╗  ");
    info!("██╔══╝  ██║  ██║██║   ██║██╔══╝  ");
    info!("███████╗██████╔╝╚██████╔╝███████╗");
    info!("╚══════╝╚═════╝  ╚═════╝ ╚══════╝");
    info!("");
    info!("██╗      █████╗ ██╗   ██╗███████╗██████╗ ███████╗");
    info!("██║     ██╔══██╗╚██╗ ██╔╝██╔════╝██╔══██╗██╔════╝");
    info!("██║     ███████║ ╚████╔╝ █████╗  ██████╔╝███████╗");
    info!("██║     ██╔══██║  ╚██╔╝  ██╔══╝  ██╔══██╗╚════██║");
    info!("███████╗██║  ██║   ██║   ███████╗██║  ██║███████║");
    info!("╚══════╝╚═╝  ╚═╝   ╚═╝   ╚══════╝╚═╝  ╚═╝╚══════╝");
    info!("");
    info!("                   v{}", version);
}

/// Test that the bucket exists and is reachable.
async fn test_s3_connection(client: &aws_sdk_s3::Client, bucket: &str) -> Result<(), String> {
    client
        .head_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| format!("{}", e))?;
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "edge_layers=debug,tower_http=debug"
    } else {
        "edge_layers=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_max_upload_bytes(config.max_upload_bytes);

    // Apply CORS origins
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    // Apply tracing setting
    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Process Command
// =============================================================================

async fn run_process(config: ProcessConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let data = match tokio::fs::read(&config.input).await {
        Ok(data) => Bytes::from(data),
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let filename = config
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let artifacts = match tokio::task::spawn_blocking(move || {
        EdgePipeline::default().run(&filename, None, data)
    })
    .await
    {
        Ok(Ok(artifacts)) => artifacts,
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: processing task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.out_dir).await {
        eprintln!(
            "Error: failed to create {}: {}",
            config.out_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    for artifact in artifacts.iter() {
        if artifact.role == ArtifactRole::Original {
            continue;
        }
        let path = config.out_dir.join(&artifact.filename);
        if let Err(e) = tokio::fs::write(&path, &artifact.data).await {
            eprintln!("Error: failed to write {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        println!("✓ {} ({} bytes)", path.display(), artifact.data.len());
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    // Initialize minimal logging for check command
    if config.verbose {
        init_logging(true);
    }

    println!("Edge Layers Configuration Check");
    println!("═══════════════════════════════");
    println!();

    if let Err(e) = config.s3.validate() {
        println!("✗ {}", e);
        return ExitCode::FAILURE;
    }

    // validate() already checked the bucket
    let bucket = config.s3.bucket().unwrap_or_default().to_string();
    println!("✓ Bucket: {}", bucket);
    if let Some(ref prefix) = config.s3.s3_prefix {
        println!("✓ Prefix: {}", prefix);
    }
    if let Some(ref endpoint) = config.s3.s3_endpoint {
        println!("✓ Endpoint: {}", endpoint);
    }
    println!("✓ Region: {}", config.s3.s3_region);
    println!();

    // Test S3 connectivity
    print!("Testing S3 connection... ");

    let s3_client = create_s3_client(config.s3.s3_endpoint.as_deref(), &config.s3.s3_region).await;

    if let Err(e) = test_s3_connection(&s3_client, &bucket).await {
        println!("✗ failed");
        println!();
        println!("Error: {}", e);
        println!();
        println!("Please check:");
        println!("  - Your AWS credentials are configured correctly");
        println!("  - The bucket '{}' exists and is accessible", bucket);
        if config.s3.s3_endpoint.is_some() {
            println!("  - The S3 endpoint is correct and reachable");
        }
        return ExitCode::FAILURE;
    }
    println!("✓ success");

    let prefix = config.s3.s3_prefix.as_deref();
    let blobs = S3BlobStore::new(s3_client.clone(), bucket.as_str(), prefix);
    let metadata = S3MetadataStore::new(s3_client, bucket.as_str(), prefix);

    match metadata.list(usize::MAX).await {
        Ok(records) => println!("✓ Records: {}", records.len()),
        Err(e) => {
            println!("✗ Could not list records: {}", e);
            return ExitCode::FAILURE;
        }
    }

    // Scan for unreferenced blobs if requested
    if config.orphans {
        println!();
        println!("Unreferenced blobs:");
        println!("───────────────────");

        let cutoff = config.orphan_cutoff();
        let report = match find_orphans(&blobs, &metadata, cutoff).await {
            Ok(report) => report,
            Err(e) => {
                println!("  Error scanning stores: {}", e);
                return ExitCode::FAILURE;
            }
        };

        if report.is_clean() {
            println!("  (none)");
        } else {
            for orphan in &report.orphans {
                println!(
                    "  {}  {}  {} bytes",
                    orphan.id, orphan.filename, orphan.length
                );
            }
        }
        println!();
        println!(
            "Scanned {} blob(s) against {} record(s), {} unreferenced",
            report.blobs_scanned,
            report.records_scanned,
            report.orphans.len()
        );
        if report.skipped_recent > 0 {
            println!(
                "Skipped {} unreferenced blob(s) newer than {}s",
                report.skipped_recent, config.min_age
            );
        }

        if config.delete && !report.is_clean() {
            let failed = delete_orphans(&blobs, &report).await;
            if failed.is_empty() {
                println!("✓ Deleted {} blob(s)", report.orphans.len());
            } else {
                println!("✗ Failed to delete {} blob(s):", failed.len());
                for id in &failed {
                    println!("  {}", id);
                }
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═══════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
