//! App Service failure-scenario harness
//!
//! Each scenario drives one web app through five phases (healthy, inject the
//! fault, observe it, recover, healthy again) against a live subscription.
//! The step A-F sequences provision a throwaway environment, break it, repair
//! it and delete it.
//!
//! ```rust,ignore
//! use tester::{RunContext, driver, scenarios};
//!
//! let run = Arc::new(RunContext { /* control-plane services */ });
//! let report = driver::run_scenario(run, scenarios::find("noenvvar")?).await;
//! assert!(report.passed());
//! ```

pub mod context;
pub mod driver;
pub mod error;
pub mod log_patterns;
pub mod scenarios;
pub mod sequences;

pub use context::{RunContext, SavedState, ScenarioContext};
pub use driver::{BatchSummary, MenuChoice, Phase, ScenarioReport, run_batch, run_scenario};
pub use error::{TesterError, TesterResult};
pub use scenarios::{REGISTRY, ScenarioDef, ScenarioKind};
pub use sequences::{Sequence, SequenceKind, SequenceOutcome, SequenceServices};
