//! Faults injected through app settings

use azure::web_apps::STARTUP_COMMAND_SETTING;
use futures_util::FutureExt;
use shared::{ProbeExpectation, logging};
use tracing::{info, warn};

use super::{PhaseFuture, Phases};
use crate::context::ScenarioContext;
use crate::error::{TesterError, TesterResult};
use crate::log_patterns::{self, MissingSetting, SettingNameExtractor};

pub const SECRET_KEY: &str = "SECRET_KEY";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const PRODUCTS_ENABLED: &str = "PRODUCTS_ENABLED";

const INVALID_DB_HOST: &str = "invalid-host-name";
const BOGUS_STARTUP_COMMAND: &str = "bogus_command_line";
const MISSING_ENTRY_POINT: &str = "python aaa.py";
const PRODUCTS_PATH: &str = "/products";
const LOG_WINDOW_MINUTES: u32 = 10;
const STARTUP_LOG_WINDOW_MINUTES: u32 = 15;

pub const NO_ENV_VAR: Phases = Phases {
    setup: remove_secret_key,
    recover: restore_secret_key,
    ..Phases::DEFAULT
};

pub const NO_CONN: Phases = Phases {
    setup: remove_database_url,
    recover: restore_database_url,
    ..Phases::DEFAULT
};

pub const BAD_CONN: Phases = Phases {
    setup: corrupt_database_host,
    recover: restore_database_host,
    ..Phases::DEFAULT
};

pub const BAD_PATHS: Phases = Phases {
    prevalidate: expect_products_healthy,
    setup: disable_products,
    validate: expect_products_missing,
    recover: enable_products,
    finalize: expect_products_healthy,
};

pub const BAD_START_CMD: Phases = Phases {
    setup: set_bogus_startup_command,
    recover: repair_startup_command,
    ..Phases::DEFAULT
};

pub const BAD_ENTRY: Phases = Phases {
    setup: set_missing_entry_point,
    recover: restore_entry_point,
    ..Phases::DEFAULT
};

fn remove_secret_key(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    remove_required(ctx, SECRET_KEY).boxed()
}

fn restore_secret_key(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    restore_missing(ctx, SECRET_KEY, MissingSetting::EnvironmentVariable).boxed()
}

fn remove_database_url(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    remove_required(ctx, DATABASE_URL).boxed()
}

fn restore_database_url(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    restore_missing(ctx, DATABASE_URL, MissingSetting::ConnectionString).boxed()
}

async fn remove_required(ctx: &mut ScenarioContext, key: &str) -> TesterResult<()> {
    ctx.save_and_remove(key).await?;
    ctx.settle(ctx.timing().settle).await;
    Ok(())
}

/// Identify the missing setting from the app's logs and put the saved value back
async fn restore_missing(ctx: &mut ScenarioContext, key: &str, kind: MissingSetting) -> TesterResult<()> {
    info!("Testing application state to identify the missing setting");
    if ctx.probe("", ProbeExpectation::Healthy).await.is_ok() {
        warn!("⚠️  Application already answers; restoring {} anyway", key);
        return ctx.restore_setting(key).await;
    }

    let logs = ctx.console_logs(LOG_WINDOW_MINUTES).await;
    match SettingNameExtractor::new(kind, key).find(&logs) {
        Some(name) if name == key => info!("✓ Logs identify missing setting {}", name),
        Some(name) => warn!("⚠️  Logs point at {}, but this scenario removed {}", name, key),
        None => warn!("⚠️  Could not identify the missing setting from logs, restoring {}", key),
    }

    ctx.restore_setting(key).await?;
    ctx.settle(ctx.timing().settle).await;
    ctx.probe_with_retry("", ProbeExpectation::Healthy)
        .await
        .map_err(|e| TesterError::recovery(format!("application still failing after restoring {key}: {e}")))?;
    logging::log_success(&format!("Application recovered after restoring {key}"));
    Ok(())
}

fn corrupt_database_host(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let original = ctx
            .save_setting(DATABASE_URL)
            .await?
            .ok_or_else(|| TesterError::setup(format!("{DATABASE_URL} app setting not found")))?;
        let broken = original.replace(&ctx.run.resources.db_server, INVALID_DB_HOST);
        if broken == original {
            warn!("⚠️  {} does not mention {}", DATABASE_URL, ctx.run.resources.db_server);
        }
        ctx.settings().set(DATABASE_URL, &broken).await?;
        info!("Updated {} with an invalid host name", DATABASE_URL);
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn restore_database_host(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.restore_setting(DATABASE_URL).await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn expect_products_healthy(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.probe(PRODUCTS_PATH, ProbeExpectation::Healthy).await?;
        Ok(())
    }
    .boxed()
}

fn expect_products_missing(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.probe(PRODUCTS_PATH, ProbeExpectation::Status(404)).await?;
        Ok(())
    }
    .boxed()
}

fn disable_products(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.save_and_remove(PRODUCTS_ENABLED).await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn enable_products(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let value = ctx.saved_setting(PRODUCTS_ENABLED).unwrap_or("1").to_string();
        ctx.settings().set(PRODUCTS_ENABLED, &value).await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn set_bogus_startup_command(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.save_and_set(STARTUP_COMMAND_SETTING, BOGUS_STARTUP_COMMAND).await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

/// Put back a working startup command: the staging slot's, the saved one, or none
fn repair_startup_command(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let logs = ctx.console_logs(STARTUP_LOG_WINDOW_MINUTES).await;
        let failure = logs.iter().find(|line| log_patterns::indicates_startup_failure(line));
        match failure {
            Some(line) => info!("🔴 Startup command failure confirmed: {}", line),
            None => info!("No startup command failures found in logs"),
        }

        let staging = match ctx.site().staging_startup_command().await {
            Ok(command) => command,
            Err(e) => {
                logging::log_warning("Reading the staging slot startup command", &e);
                None
            }
        };
        let command = staging.or_else(|| ctx.saved_setting(STARTUP_COMMAND_SETTING).map(str::to_string));

        match &command {
            Some(command) => {
                info!("Using startup command '{}'", command);
                ctx.settings().set(STARTUP_COMMAND_SETTING, command).await?;
            }
            None => {
                info!("No known-good startup command, removing {}", STARTUP_COMMAND_SETTING);
                ctx.settings().update(STARTUP_COMMAND_SETTING, None).await?;
            }
        }

        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;

        if failure.is_some() {
            if let Err(e) = ctx.probe("", ProbeExpectation::Healthy).await {
                return Err(TesterError::recovery(format!(
                    "application still failing after correcting the startup command: {e}"
                )));
            }
        }
        Ok(())
    }
    .boxed()
}

fn set_missing_entry_point(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.save_and_set(STARTUP_COMMAND_SETTING, MISSING_ENTRY_POINT).await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn restore_entry_point(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.restore_setting(STARTUP_COMMAND_SETTING).await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}
