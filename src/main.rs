use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use sitestack::deployment::AssetDeployment;
use sitestack::outputs::DeploymentOutputs;
use sitestack::pipeline::{self, DeployOptions, DEFAULT_ASSETS_DIR, DEFAULT_STACK_NAME};
use sitestack::resources::Route53ZoneLookup;
use sitestack::variables::{DeployEnv, SiteConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "sitestack")]
#[command(about = "Deploy a static website to S3, optionally behind cloudfront", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the site configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or write the cloudformation templates without deploying
    Synth {
        #[arg(long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Write one template file per stack into this directory instead of printing
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Deploy the stacks, then sync the assets and invalidate the cache
    Deploy {
        #[arg(long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Local directory mirrored into the bucket
        #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
        assets: PathBuf,

        /// Report what the sync would change without changing it
        #[arg(long)]
        dry_run_sync: bool,
    },

    /// Only mirror assets into an existing bucket
    Sync {
        #[arg(long)]
        bucket: String,

        #[arg(long, default_value = DEFAULT_ASSETS_DIR)]
        assets: PathBuf,

        /// Invalidate this distribution when something changed
        #[arg(long)]
        distribution_id: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },
}

async fn run(cli: Cli) -> sitestack::Result<()> {
    let env = DeployEnv::from_env()?;
    match cli.command {
        Commands::Synth { stack_name, out_dir } => {
            let config = SiteConfig::load(&cli.config)?;
            let lookup = Route53ZoneLookup::from_env().await;
            let plan = pipeline::plan_site(&config, &env, &stack_name, &lookup).await?;
            pipeline::emit_templates(&plan.stacks, out_dir.as_deref())?;
        }
        Commands::Deploy { stack_name, assets, dry_run_sync } => {
            let config = SiteConfig::load(&cli.config)?;
            let options = DeployOptions { stack_name, assets_dir: assets, dry_run_sync };
            let outputs = pipeline::deploy(&config, &env, &options).await?;
            outputs.emit();
        }
        Commands::Sync { bucket, assets, distribution_id, dry_run } => {
            let mut deployment = AssetDeployment::new(assets, bucket).dry_run(dry_run);
            if let Some(id) = distribution_id {
                deployment = deployment.with_distribution(id);
            }
            let report = pipeline::sync_only(&deployment, &env.region).await?;
            let mut outputs = DeploymentOutputs::new();
            outputs.record_sync(&report);
            outputs.emit();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("{e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
