//! Entry point for the provisioner binary

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use azure::{RealArmClient, RealHealthProbe, RealTokenSource, RealZipDeployer, TokenSource};
use provisioner::{DatabaseCredentials, Packages, ProvisionPlan, ProvisionRequest, Provisioner, generate_password};
use shared::logging::{self, Component};
use shared::{AppSettings, CONFIG_FILE_NAME, HarnessConfig, ResourceSet};

const DATABASE_USER: &str = "marketinguser";
const DATABASE_NAME: &str = "marketingdb";

/// Provisions the sample App Service environment used by the failure scenarios
#[derive(Parser)]
#[command(name = "provisioner")]
#[command(about = "Provisions (or tears down) the App Service + PostgreSQL test environment")]
pub struct Args {
    /// Azure subscription id
    pub subscription_id: String,

    /// Azure region, e.g. brazilsouth
    pub region: String,

    /// Directory containing zip/SampleMarketingApp.zip and friends
    pub base_dir: PathBuf,

    /// Run name; resources are named rg-{name}, webapp-{name}, ...
    pub resource_name: String,

    /// Delete rg-{name} instead of provisioning
    #[arg(long)]
    pub teardown: bool,

    /// Configuration file
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    dotenv::dotenv().ok();
    logging::init_tracing(Component::Provisioner, args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let resources = ResourceSet::new(args.subscription_id.trim(), &args.resource_name)?;
    let config = HarnessConfig::load(&args.config);
    let timing = config.timing.clone();

    let tokens: Arc<dyn TokenSource> = Arc::new(RealTokenSource::new());
    tokens
        .token(azure::arm_client::MANAGEMENT_SCOPE)
        .await
        .context("Azure authentication failed; run `az login` or set AZURE_ACCESS_TOKEN")?;
    info!("✓ Azure authentication successful");

    let arm = RealArmClient::new(tokens.clone(), &timing)?;
    let deployer = RealZipDeployer::new(tokens, &timing);
    let provisioner = Provisioner::new(arm, deployer, RealHealthProbe::new(), resources, timing);

    if args.teardown {
        provisioner.teardown().await?;
        return Ok(());
    }

    if !args.base_dir.is_dir() {
        bail!("Base directory does not exist: {}", args.base_dir.display());
    }

    let password = generate_password(&mut rand::thread_rng());
    let request = ProvisionRequest {
        location: args.region.trim().to_string(),
        plan: ProvisionPlan::full(),
        database: DatabaseCredentials {
            admin_user: DATABASE_USER.to_string(),
            admin_password: password.clone(),
            database_name: DATABASE_NAME.to_string(),
        },
        secret_key: password,
        packages: Packages::from_base_dir(&args.base_dir),
        extra_settings: AppSettings::new(),
    };

    let environment = provisioner.provision(&request).await?;

    info!("📋 Deployment summary");
    info!("  Resource group: {}", environment.resources.resource_group);
    info!("  Web app:        {}", environment.web_app_url);
    if let Some(url) = &environment.web_api_url {
        info!("  Web API:        {}", url);
    }
    info!("  Database:       {}", environment.resources.db_host(true));
    info!("  Database user:  {}", request.database.admin_user);
    info!("  Database password: {}", request.database.admin_password);
    Ok(())
}
