use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use catalog_runtime::adapters::content_store::S3ContentStore;
use catalog_runtime::handlers::manifest::PublishManifest;
use catalog_runtime::handlers::publish::{
    discover_source_trees, publish_artifacts, PublishConfig, RetryPolicy,
};
use catalog_runtime::handlers::render::{load_base_template, render_template};
use catalog_runtime::telemetry::init_cli_logging;
use chrono::Utc;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "publish_product",
    about = "Package the seed repositories, upload them and render the product template"
)]
struct Args {
    /// Bucket that receives the packaged artifacts
    #[arg(long, env = "CATALOG_ASSET_BUCKET")]
    bucket: String,
    /// Key prefix under which artifacts are stored
    #[arg(long, env = "CATALOG_ASSET_PREFIX", default_value = "product-assets")]
    key_prefix: String,
    /// Directory whose subdirectories are published as catalog artifacts
    #[arg(long, default_value = "repos")]
    repos_dir: PathBuf,
    /// Seed workspace published alongside the catalog
    #[arg(long, default_value = "demo-workspace")]
    workspace_dir: PathBuf,
    /// Base template with {{Artifact}} placeholders
    #[arg(long, env = "CATALOG_BASE_TEMPLATE")]
    base_template: PathBuf,
    /// Where the rendered template is written
    #[arg(long, default_value = "build/product-template.json")]
    template_out: PathBuf,
    /// Optional hand-off manifest for product assembly
    #[arg(long)]
    manifest_out: Option<PathBuf>,
    /// Product version recorded in the manifest
    #[arg(long, default_value = "1.0")]
    product_version: String,
    #[arg(long, default_value_t = 3)]
    max_upload_attempts: u32,
    #[arg(long, default_value_t = 200)]
    initial_backoff_ms: u64,
    #[arg(long, default_value_t = 5000)]
    max_backoff_ms: u64,
}

impl Args {
    fn publish_config(&self) -> PublishConfig {
        PublishConfig {
            container: self.bucket.clone(),
            key_prefix: self.key_prefix.clone(),
            retry: RetryPolicy {
                max_attempts: self.max_upload_attempts,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_cli_logging();
    let args = Args::parse();

    // Retries are driven by the publisher so that only transient failures
    // are repeated.
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::disabled())
        .load()
        .await;
    let store = S3ContentStore::new(aws_sdk_s3::Client::new(&aws_config));

    // Fail on a bad base template before anything is uploaded.
    let base_shape = load_base_template(&args.base_template).with_context(|| {
        format!(
            "failed to load base template '{}'",
            args.base_template.display()
        )
    })?;

    let sources = discover_source_trees(&args.repos_dir).context("failed to discover sources")?;
    let published = publish_artifacts(
        &sources,
        &args.workspace_dir,
        &args.publish_config(),
        &store,
    )
    .context("failed to publish artifacts")?;

    let rendered = render_template(
        &published.catalog,
        &published.workspace,
        &base_shape,
        &args.template_out,
    )
    .context("failed to render product template")?;

    if let Some(path) = &args.manifest_out {
        PublishManifest::new(
            &args.product_version,
            &published,
            &rendered,
            Utc::now().to_rfc3339(),
        )
        .write_to(path)
        .map_err(anyhow::Error::msg)?;
        tracing::info!(path = %path.display(), "publish_manifest_written");
    }

    println!("{}", rendered.path.display());
    Ok(())
}
