//! HTTP probe results and their classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

/// What a probe is expected to observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeExpectation {
    /// Any 2xx
    Healthy,
    /// 500 or above, or a transport failure
    Broken,
    /// Exactly this status
    Status(u16),
}

impl fmt::Display for ProbeExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeExpectation::Healthy => write!(f, "success (2xx)"),
            ProbeExpectation::Broken => write!(f, "server error (500+)"),
            ProbeExpectation::Status(code) => write!(f, "status {code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Status(u16),
    TransportFailure(String),
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Status(code) => write!(f, "status {code}"),
            ProbeOutcome::TransportFailure(reason) => write!(f, "request failure ({reason})"),
        }
    }
}

/// One GET against a target, consumed immediately by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpProbeResult {
    pub url: String,
    pub outcome: ProbeOutcome,
    pub latency: Duration,
    pub body: Option<String>,
}

impl HttpProbeResult {
    pub fn status(&self) -> Option<u16> {
        match self.outcome {
            ProbeOutcome::Status(code) => Some(code),
            ProbeOutcome::TransportFailure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status(), Some(code) if (200..300).contains(&code))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(code) if code >= 500)
    }

    pub fn is_transport_failure(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::TransportFailure(_))
    }

    pub fn latency_ms(&self) -> u128 {
        self.latency.as_millis()
    }

    /// Check this result against an expectation
    ///
    /// A transport failure satisfies `Broken` and exact-status expectations,
    /// never `Healthy`.
    pub fn check(&self, expected: ProbeExpectation) -> SharedResult<()> {
        let satisfied = match (expected, &self.outcome) {
            (ProbeExpectation::Healthy, _) => self.is_success(),
            (ProbeExpectation::Broken, ProbeOutcome::Status(code)) => *code >= 500,
            (ProbeExpectation::Status(wanted), ProbeOutcome::Status(code)) => *code == wanted,
            (_, ProbeOutcome::TransportFailure(_)) => true,
        };

        if satisfied {
            Ok(())
        } else {
            Err(SharedError::ProbeMismatch {
                url: self.url.clone(),
                expected: expected.to_string(),
                actual: self.outcome.to_string(),
            })
        }
    }

    /// `AppValue` field of the JSON config echo served at `/`
    pub fn app_value(&self) -> Option<String> {
        let body = self.body.as_deref()?;
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        json.get("AppValue")?.as_str().map(str::to_string)
    }

    /// Require a healthy response echoing `expected` as its `AppValue`
    pub fn expect_app_value(&self, expected: &str) -> SharedResult<()> {
        self.check(ProbeExpectation::Healthy)?;
        match self.app_value() {
            Some(value) if value == expected => Ok(()),
            Some(value) => Err(SharedError::BodyMismatch {
                message: format!("expected AppValue '{expected}', got '{value}'"),
            }),
            None => Err(SharedError::BodyMismatch {
                message: "response has no AppValue field".to_string(),
            }),
        }
    }
}
