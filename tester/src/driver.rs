//! Scenario driver
//!
//! Runs the five phases of a scenario in order, stopping at the first error,
//! and collects per-scenario reports for a batch. Also parses the
//! interactive menu.

use shared::logging;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::context::{RunContext, ScenarioContext};
use crate::error::{TesterError, TesterResult};
use crate::scenarios::{self, PhaseFn, ScenarioDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prevalidate,
    Setup,
    Validate,
    Recover,
    Finalize,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Prevalidate,
        Phase::Setup,
        Phase::Validate,
        Phase::Recover,
        Phase::Finalize,
    ];

    pub fn step(self) -> u8 {
        match self {
            Phase::Prevalidate => 1,
            Phase::Setup => 2,
            Phase::Validate => 3,
            Phase::Recover => 4,
            Phase::Finalize => 5,
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Phase::Prevalidate => "Prevalidate it is GOOD",
            Phase::Setup => "Turning mode to BAD",
            Phase::Validate => "Validate it is BAD",
            Phase::Recover => "Turning mode to GOOD",
            Phase::Finalize => "Validate it is GOOD",
        }
    }

    fn select(self, def: &ScenarioDef) -> PhaseFn {
        match self {
            Phase::Prevalidate => def.phases.prevalidate,
            Phase::Setup => def.phases.setup,
            Phase::Validate => def.phases.validate,
            Phase::Recover => def.phases.recover,
            Phase::Finalize => def.phases.finalize,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.step(), self.headline())
    }
}

/// Where a scenario failed and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    pub phase: Phase,
    pub message: String,
}

/// Outcome of one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub description: &'static str,
    pub app: String,
    pub failure: Option<PhaseFailure>,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Run all five phases of `def` against a fresh scenario context
pub async fn run_scenario(run: Arc<RunContext>, def: &ScenarioDef) -> ScenarioReport {
    let started = Instant::now();
    let mut ctx = ScenarioContext::new(run, def.kind);
    info!("🚀 Running scenario '{}' against {}", def.description(), ctx.app);

    let mut failure = None;
    for phase in Phase::ALL {
        info!("{}", phase);
        if let Err(e) = (phase.select(def))(&mut ctx).await {
            logging::log_error(&phase.to_string(), &e);
            failure = Some(PhaseFailure {
                phase,
                message: e.to_string(),
            });
            break;
        }
    }

    match &failure {
        None => info!("✓ Scenario '{}' completed successfully!", def.description()),
        Some(failure) => error!("✗ Scenario '{}' failed at {}", def.description(), failure.phase),
    }

    ScenarioReport {
        name: def.name(),
        description: def.description(),
        app: ctx.app,
        failure,
        elapsed: started.elapsed(),
    }
}

/// Reports of a batch, in execution order
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub reports: Vec<ScenarioReport>,
}

impl BatchSummary {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|report| report.passed()).count()
    }

    pub fn failed(&self) -> Vec<&ScenarioReport> {
        self.reports.iter().filter(|report| !report.passed()).collect()
    }

    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(ScenarioReport::passed)
    }

    pub fn log(&self) {
        info!("📊 Scenario summary: {} passed, {} failed", self.passed(), self.failed().len());
        for report in &self.reports {
            match &report.failure {
                None => info!("  ✓ {} ({}s)", report.name, report.elapsed.as_secs()),
                Some(failure) => info!(
                    "  ✗ {} - {} ({})",
                    report.name, failure.phase, failure.message
                ),
            }
        }
    }
}

/// Run scenarios one after another; a failure never stops the batch
pub async fn run_batch(run: Arc<RunContext>, defs: &[&ScenarioDef]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for def in defs {
        summary.reports.push(run_scenario(run.clone(), def).await);
    }
    summary
}

/// Scenarios named on the command line; `all` selects the whole menu
pub fn resolve_selection(name: &str) -> TesterResult<Vec<&'static ScenarioDef>> {
    if name.trim().eq_ignore_ascii_case("all") {
        return Ok(scenarios::sorted_by_description());
    }
    Ok(vec![scenarios::find(name)?])
}

#[derive(Debug, Clone, Copy)]
pub enum MenuChoice {
    Exit,
    All,
    Scenario(&'static ScenarioDef),
}

/// Interpret one line of menu input; `None` means re-prompt
pub fn parse_menu_choice(input: &str, menu: &[&'static ScenarioDef]) -> Option<MenuChoice> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Some(MenuChoice::All);
    }
    match input.parse::<usize>().ok()? {
        0 => Some(MenuChoice::Exit),
        n => menu.get(n - 1).copied().map(MenuChoice::Scenario),
    }
}

pub fn render_menu(menu: &[&ScenarioDef]) -> String {
    let mut text = String::from("Select a scenario to run:\n");
    for (index, def) in menu.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", index + 1, def.description()));
    }
    text.push_str("all. Run all scenarios\n0. Exit\n");
    text
}

/// Reject a zip directory that does not exist
pub fn require_dir(path: &std::path::Path) -> TesterResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(TesterError::InvalidInput {
            field: "zip-directory".to_string(),
            reason: format!("directory not found: {}", path.display()),
        })
    }
}
