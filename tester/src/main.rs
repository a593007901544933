//! Scenario runner
//!
//! `tester scenarios` walks the failure catalogue against an environment built
//! by the provisioner, interactively or in batch. `tester sequence` runs one
//! provision-to-teardown sequence.

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use azure::{
    ArmApi, RealArmClient, RealHealthProbe, RealMonitor, RealTokenSource, RealZipDeployer, TokenSource,
};
use shared::logging::{self, Component};
use shared::{CONFIG_FILE_NAME, HarnessConfig, ResourceSet};
use tester::driver::{self, MenuChoice};
use tester::{RunContext, Sequence, SequenceKind, SequenceServices, scenarios};

const SUBSCRIPTION_VAR: &str = "AZURE_SUBSCRIPTION_ID";

#[derive(Parser)]
#[command(name = "tester")]
#[command(about = "Breaks and repairs App Service apps to exercise failure diagnosis")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run failure scenarios against a provisioned environment
    Scenarios {
        subscription_id: String,

        /// Run name given to the provisioner
        resource_name: String,

        /// Directory holding the scenario zip packages
        zip_dir: PathBuf,

        /// Scenario name or `all`; omit for the interactive menu
        #[arg(long)]
        scenario: Option<String>,
    },

    /// Provision, break, repair and delete a throwaway environment
    Sequence {
        #[arg(value_enum)]
        kind: SequenceKind,

        /// Zip package deployed to the web app
        zip_path: PathBuf,

        /// Falls back to AZURE_SUBSCRIPTION_ID
        subscription_id: Option<String>,
    },
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
    logging::init_tracing(Component::Tester, args.verbose);
    let config = HarnessConfig::load(&args.config);

    let result = match args.command {
        Command::Scenarios {
            subscription_id,
            resource_name,
            zip_dir,
            scenario,
        } => run_scenarios(config, &subscription_id, &resource_name, zip_dir, scenario).await,
        Command::Sequence {
            kind,
            zip_path,
            subscription_id,
        } => run_sequence(config, kind, zip_path, subscription_id).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn authenticate() -> anyhow::Result<Arc<dyn TokenSource>> {
    let tokens: Arc<dyn TokenSource> = Arc::new(RealTokenSource::new());
    tokens
        .token(azure::arm_client::MANAGEMENT_SCOPE)
        .await
        .context("Azure authentication failed; run `az login` or set AZURE_ACCESS_TOKEN")?;
    info!("✓ Azure authentication successful");
    Ok(tokens)
}

async fn run_scenarios(
    config: HarnessConfig,
    subscription_id: &str,
    resource_name: &str,
    zip_dir: PathBuf,
    selection: Option<String>,
) -> anyhow::Result<bool> {
    driver::require_dir(&zip_dir)?;
    let resources = ResourceSet::new(subscription_id.trim(), resource_name)?;
    let timing = config.timing.clone();

    let tokens = authenticate().await?;
    let arm: Arc<dyn ArmApi> = Arc::new(RealArmClient::new(tokens.clone(), &timing)?);
    let monitor = RealMonitor::new(arm.clone(), tokens.clone(), resources.clone())?;
    let run = Arc::new(RunContext {
        arm,
        probe: Arc::new(RealHealthProbe::new()),
        deployer: Arc::new(RealZipDeployer::new(tokens, &timing)),
        monitor: Arc::new(monitor),
        resources,
        zip_dir,
        timing,
    });

    if let Some(name) = selection {
        let selected = driver::resolve_selection(&name)?;
        let summary = driver::run_batch(run, &selected).await;
        summary.log();
        return Ok(summary.all_passed());
    }

    interactive_menu(run).await?;
    Ok(true)
}

/// Prompt until the user exits; invalid input re-prompts
async fn interactive_menu(run: Arc<RunContext>) -> anyhow::Result<()> {
    let menu = scenarios::sorted_by_description();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(driver::render_menu(&menu).as_bytes()).await?;
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match driver::parse_menu_choice(&line, &menu) {
            Some(MenuChoice::Exit) => return Ok(()),
            Some(MenuChoice::All) => driver::run_batch(run.clone(), &menu).await.log(),
            Some(MenuChoice::Scenario(def)) => {
                driver::run_scenario(run.clone(), def).await;
            }
            None => info!("Invalid selection '{}', try again", line.trim()),
        }
    }
}

async fn run_sequence(
    config: HarnessConfig,
    kind: SequenceKind,
    zip_path: PathBuf,
    subscription_id: Option<String>,
) -> anyhow::Result<bool> {
    let Some(subscription_id) = subscription_id
        .or_else(|| std::env::var(SUBSCRIPTION_VAR).ok())
        .filter(|id| !id.trim().is_empty())
    else {
        bail!("No subscription id given and {SUBSCRIPTION_VAR} is not set");
    };
    if !zip_path.is_file() {
        bail!("Zip file not found: {}", zip_path.display());
    }

    let resources = ResourceSet::timestamped(subscription_id.trim(), kind.tag(), Local::now())?;
    let tokens = authenticate().await?;
    let services = SequenceServices {
        arm: Arc::new(RealArmClient::new(tokens.clone(), &config.timing)?),
        probe: Arc::new(RealHealthProbe::new()),
        deployer: Arc::new(RealZipDeployer::new(tokens, &config.timing)),
    };

    let outcome = Sequence::new(kind, services, resources, config, zip_path).run().await?;
    if !outcome.cleaned_up {
        info!("Resource group {} still exists", outcome.resource_group);
    }
    Ok(true)
}
