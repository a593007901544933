//! Failure scenario registry
//!
//! Every scenario is a [`ScenarioKind`] plus a table of five phase functions.
//! Scenarios override only the phases that differ from [`Phases::DEFAULT`]:
//! healthy before, broken after setup, healthy again after recovery.

pub mod load;
pub mod network;
pub mod platform;
pub mod runtime;
pub mod settings;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use shared::ProbeExpectation;
use std::fmt;

use crate::context::ScenarioContext;
use crate::error::{TesterError, TesterResult};

pub type PhaseFuture<'a> = BoxFuture<'a, TesterResult<()>>;

/// One lifecycle phase of a scenario
pub type PhaseFn = for<'a> fn(&'a mut ScenarioContext) -> PhaseFuture<'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    NoEnvVar,
    NoConn,
    BadConn,
    BadPaths,
    BadStartCmd,
    BadEntry,
    HighMem,
    Snat,
    HighCpu,
    VnetBreak,
    BadDns,
    SqlReject,
    SqlDead,
    FwBlock,
    DepMiss,
    BadDocker,
    AutoHeal,
    PoorHeal,
    ColdStart,
    BrokenZip,
    BadWrite,
    BadTls,
    SlowCall,
}

impl ScenarioKind {
    /// Short prefix; also the prefix of the scenario's web app name
    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::NoEnvVar => "noenvvar",
            ScenarioKind::NoConn => "noconn",
            ScenarioKind::BadConn => "badconn",
            ScenarioKind::BadPaths => "badpaths",
            ScenarioKind::BadStartCmd => "badstartcmd",
            ScenarioKind::BadEntry => "badentry",
            ScenarioKind::HighMem => "highmem",
            ScenarioKind::Snat => "snat",
            ScenarioKind::HighCpu => "highcpu",
            ScenarioKind::VnetBreak => "vnetbreak",
            ScenarioKind::BadDns => "baddns",
            ScenarioKind::SqlReject => "sqlreject",
            ScenarioKind::SqlDead => "sqldead",
            ScenarioKind::FwBlock => "fwblock",
            ScenarioKind::DepMiss => "depmiss",
            ScenarioKind::BadDocker => "baddocker",
            ScenarioKind::AutoHeal => "autoheal",
            ScenarioKind::PoorHeal => "poorheal",
            ScenarioKind::ColdStart => "coldstart",
            ScenarioKind::BrokenZip => "brokenzip",
            ScenarioKind::BadWrite => "badwrite",
            ScenarioKind::BadTls => "badtls",
            ScenarioKind::SlowCall => "slowcall",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ScenarioKind::NoEnvVar => "Missing environment variable (SECRET_KEY)",
            ScenarioKind::NoConn => "Missing connection string (DATABASE_URL)",
            ScenarioKind::BadConn => "Misconfigured connection string (wrong host name)",
            ScenarioKind::BadPaths => "Specific API paths failing due to misconfigured app settings",
            ScenarioKind::BadStartCmd => "Incorrect startup command",
            ScenarioKind::BadEntry => "Missing entry point (incorrect startup command)",
            ScenarioKind::HighMem => "High memory usage",
            ScenarioKind::Snat => "SNAT port exhaustion",
            ScenarioKind::HighCpu => "High CPU usage",
            ScenarioKind::VnetBreak => "VNET integration breaks connectivity to internal resources",
            ScenarioKind::BadDns => "Misconfigured DNS",
            ScenarioKind::SqlReject => "SQL connection rejected (private endpoint)",
            ScenarioKind::SqlDead => "SQL server not responding (server stopped)",
            ScenarioKind::FwBlock => "Firewall blocks SQL connection",
            ScenarioKind::DepMiss => "Missing dependency (deployment slot swap)",
            ScenarioKind::BadDocker => "Incorrect Docker image",
            ScenarioKind::AutoHeal => "App restarts triggered by auto-heal rules",
            ScenarioKind::PoorHeal => "Poorly tuned auto-heal rules cause instability",
            ScenarioKind::ColdStart => "Cold starts after scale-out",
            ScenarioKind::BrokenZip => "Publish broken zip file",
            ScenarioKind::BadWrite => "Incorrect write access",
            ScenarioKind::BadTls => "App uses outdated TLS version for outbound connections",
            ScenarioKind::SlowCall => "External API latency causes user-visible slowness",
        }
    }

    /// App setting that stands in for a fault the control plane could not inject
    pub fn marker(self) -> Option<&'static str> {
        match self {
            ScenarioKind::VnetBreak => Some("_SCENARIO_VNET_DISCONNECTED"),
            ScenarioKind::BadDns => Some("_SCENARIO_DNS_MISCONFIGURED"),
            ScenarioKind::SqlReject => Some("_SCENARIO_SQL_PRIVATE_ENDPOINT_REJECTED"),
            ScenarioKind::SqlDead => Some("_SCENARIO_SQL_SERVER_STOPPED"),
            ScenarioKind::FwBlock => Some("_SCENARIO_SQL_FIREWALL_BLOCKED"),
            ScenarioKind::DepMiss => Some("_SCENARIO_DEPENDENCY_MISSING"),
            ScenarioKind::BadDocker => Some("_SCENARIO_DOCKER_IMAGE_CHANGED"),
            ScenarioKind::AutoHeal => Some("_SCENARIO_AUTOHEAL_MEMORY_ENABLED"),
            ScenarioKind::PoorHeal => Some("_SCENARIO_AUTOHEAL_ERRORS_ENABLED"),
            ScenarioKind::ColdStart => Some("_SCENARIO_SCALED_OUT"),
            _ => None,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The five lifecycle phases of a scenario
#[derive(Clone, Copy)]
pub struct Phases {
    pub prevalidate: PhaseFn,
    pub setup: PhaseFn,
    pub validate: PhaseFn,
    pub recover: PhaseFn,
    pub finalize: PhaseFn,
}

impl Phases {
    pub const DEFAULT: Phases = Phases {
        prevalidate: expect_healthy,
        setup: no_op,
        validate: expect_broken,
        recover: no_op,
        finalize: expect_healthy,
    };
}

/// Registry entry
#[derive(Clone, Copy)]
pub struct ScenarioDef {
    pub kind: ScenarioKind,
    pub phases: Phases,
}

impl ScenarioDef {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn description(&self) -> &'static str {
        self.kind.description()
    }
}

impl fmt::Debug for ScenarioDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioDef").field("kind", &self.kind).finish()
    }
}

pub static REGISTRY: [ScenarioDef; 23] = [
    ScenarioDef { kind: ScenarioKind::NoEnvVar, phases: settings::NO_ENV_VAR },
    ScenarioDef { kind: ScenarioKind::NoConn, phases: settings::NO_CONN },
    ScenarioDef { kind: ScenarioKind::BadConn, phases: settings::BAD_CONN },
    ScenarioDef { kind: ScenarioKind::BadPaths, phases: settings::BAD_PATHS },
    ScenarioDef { kind: ScenarioKind::BadStartCmd, phases: settings::BAD_START_CMD },
    ScenarioDef { kind: ScenarioKind::BadEntry, phases: settings::BAD_ENTRY },
    ScenarioDef { kind: ScenarioKind::HighMem, phases: load::HIGH_MEM },
    ScenarioDef { kind: ScenarioKind::Snat, phases: load::SNAT },
    ScenarioDef { kind: ScenarioKind::HighCpu, phases: load::HIGH_CPU },
    ScenarioDef { kind: ScenarioKind::VnetBreak, phases: network::VNET_BREAK },
    ScenarioDef { kind: ScenarioKind::BadDns, phases: network::BAD_DNS },
    ScenarioDef { kind: ScenarioKind::SqlReject, phases: SIMULATED },
    ScenarioDef { kind: ScenarioKind::SqlDead, phases: SIMULATED },
    ScenarioDef { kind: ScenarioKind::FwBlock, phases: SIMULATED },
    ScenarioDef { kind: ScenarioKind::DepMiss, phases: SIMULATED },
    ScenarioDef { kind: ScenarioKind::BadDocker, phases: platform::BAD_DOCKER },
    ScenarioDef { kind: ScenarioKind::AutoHeal, phases: platform::AUTO_HEAL },
    ScenarioDef { kind: ScenarioKind::PoorHeal, phases: platform::POOR_HEAL },
    ScenarioDef { kind: ScenarioKind::ColdStart, phases: platform::COLD_START },
    ScenarioDef { kind: ScenarioKind::BrokenZip, phases: platform::BROKEN_ZIP },
    ScenarioDef { kind: ScenarioKind::BadWrite, phases: runtime::BAD_WRITE },
    ScenarioDef { kind: ScenarioKind::BadTls, phases: runtime::BAD_TLS },
    ScenarioDef { kind: ScenarioKind::SlowCall, phases: runtime::SLOW_CALL },
];

/// Look up a scenario by its short name
pub fn find(name: &str) -> TesterResult<&'static ScenarioDef> {
    REGISTRY
        .iter()
        .find(|def| def.name().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| TesterError::UnknownScenario { name: name.to_string() })
}

/// Registry in menu order
pub fn sorted_by_description() -> Vec<&'static ScenarioDef> {
    let mut defs: Vec<_> = REGISTRY.iter().collect();
    defs.sort_by_key(|def| def.description());
    defs
}

/// Scenarios whose fault is represented by a marker setting only
pub const SIMULATED: Phases = Phases {
    setup: simulated_setup,
    recover: simulated_recover,
    ..Phases::DEFAULT
};

pub fn no_op(_ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async { Ok(()) }.boxed()
}

pub fn expect_healthy(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.probe("", ProbeExpectation::Healthy).await?;
        Ok(())
    }
    .boxed()
}

pub fn expect_broken(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.probe("", ProbeExpectation::Broken).await?;
        Ok(())
    }
    .boxed()
}

fn simulated_setup(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.set_marker("true").await?;
        ctx.settle(ctx.timing().simulated_delay).await;
        Ok(())
    }
    .boxed()
}

fn simulated_recover(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.clear_marker().await?;
        ctx.settle(ctx.timing().simulated_delay).await;
        Ok(())
    }
    .boxed()
}
