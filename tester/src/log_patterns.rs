//! Fault signatures in application logs
//!
//! Used to identify which setting a failing app is missing and to confirm
//! load and startup faults when platform metrics are unavailable. All
//! matching is case-insensitive.

use regex::Regex;

/// What kind of setting a failing app reports as missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSetting {
    EnvironmentVariable,
    ConnectionString,
}

const ENV_PATTERNS: &[&str] = &[
    r"environment variable['\s]*([A-Z_]+)['\s]*not found",
    r"([A-Z_]+)['\s]*environment variable['\s]*not found",
    r"missing['\s]*environment variable['\s]*([A-Z_]+)",
    r"([A-Z_]+)['\s]*is['\s]*not['\s]*set",
    r"ArgumentNullException.*parameter['\s]*([A-Z_]+)",
    r"variable['\s]*([A-Z_]+)['\s]*is['\s]*null",
];

const CONNECTION_PATTERNS: &[&str] = &[
    r"database connection string['\s]*([A-Z_]+)['\s]*missing",
    r"missing['\s]*database connection string['\s]*([A-Z_]+)",
    r"connection string['\s]*([A-Z_]+)['\s]*not found",
    r"([A-Z_]+)['\s]*connection string['\s]*not found",
    r"([A-Z_]+)['\s]*database['\s]*connection['\s]*missing",
    r"database['\s]*([A-Z_]+)['\s]*not found",
    r"([A-Z_]+)['\s]*is['\s]*null['\s]*or['\s]*empty",
];

const CONNECTION_LITERALS: &[&str] = &["DATABASE_URL", "CONNECTION_STRING", "DB_CONNECTION"];

/// Extracts the name of a missing setting from log lines
pub struct SettingNameExtractor {
    kind: MissingSetting,
    patterns: Vec<Regex>,
    literals: Vec<String>,
}

impl SettingNameExtractor {
    /// `removed_key` is matched literally as a last resort
    pub fn new(kind: MissingSetting, removed_key: &str) -> Self {
        let sources = match kind {
            MissingSetting::EnvironmentVariable => ENV_PATTERNS,
            MissingSetting::ConnectionString => CONNECTION_PATTERNS,
        };
        let patterns = sources
            .iter()
            .filter_map(|pattern| Regex::new(&format!("(?i){pattern}")).ok())
            .collect();

        let mut literals = vec![removed_key.to_uppercase()];
        if kind == MissingSetting::ConnectionString {
            literals.extend(CONNECTION_LITERALS.iter().map(|literal| literal.to_string()));
        }
        literals.dedup();

        Self { kind, patterns, literals }
    }

    /// Name of the missing setting reported by the first relevant line
    pub fn find<S: AsRef<str>>(&self, lines: &[S]) -> Option<String> {
        lines
            .iter()
            .map(AsRef::as_ref)
            .filter(|line| self.is_relevant(line))
            .find_map(|line| self.extract(line))
    }

    /// Name of the missing setting in one log line
    pub fn extract(&self, line: &str) -> Option<String> {
        for pattern in &self.patterns {
            if let Some(name) = pattern.captures(line).and_then(|captures| captures.get(1)) {
                let name = name.as_str().trim_matches(|c| c == '\'' || c == '"' || c == ' ').to_uppercase();
                if is_valid_setting_name(&name) {
                    return Some(name);
                }
            }
        }

        let upper = line.to_uppercase();
        self.literals.iter().find(|literal| upper.contains(literal.as_str())).cloned()
    }

    fn is_relevant(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        let complains = contains_any(&lower, &["not found", "missing", "null", "empty", "not set"]);
        match self.kind {
            MissingSetting::EnvironmentVariable => {
                (lower.contains("environment variable") && complains)
                    || (lower.contains("argumentnullexception") && lower.contains("environment"))
                    || (self.mentions_literal(&lower) && complains)
            }
            MissingSetting::ConnectionString => {
                ((lower.contains("database") || lower.contains("connection")) && complains)
                    || (self.mentions_literal(&lower) && complains)
                    || (lower.contains("postgres")
                        && lower.contains("connect")
                        && contains_any(&lower, &["failed", "error", "unable"]))
            }
        }
    }

    fn mentions_literal(&self, lower: &str) -> bool {
        self.literals
            .iter()
            .any(|literal| lower.contains(&literal.to_lowercase()))
    }
}

/// Upper-case identifier starting with a letter, longer than one character
pub fn is_valid_setting_name(name: &str) -> bool {
    name.len() > 1
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

const SEVERITY_WORDS: &[&str] = &["90%", "85%", "high", "exceeded", "critical"];

/// Memory pressure reported by the app or the platform
pub fn indicates_high_memory(line: &str) -> bool {
    let lower = line.to_lowercase();
    (lower.contains("memory") && contains_any(&lower, SEVERITY_WORDS))
        || contains_any(&lower, &["outofmemoryexception", "out of memory", "memory pressure", "low memory"])
        || (lower.contains("gc") && lower.contains("pressure"))
}

pub fn indicates_high_cpu(line: &str) -> bool {
    let lower = line.to_lowercase();
    (lower.contains("cpu") && contains_any(&lower, SEVERITY_WORDS))
        || contains_any(&lower, &["cpu throttling", "cpu pressure", "high load"])
}

/// Outbound connection exhaustion
pub fn indicates_snat_exhaustion(line: &str) -> bool {
    let lower = line.to_lowercase();
    contains_any(
        &lower,
        &[
            "snat",
            "socket exhaustion",
            "address already in use",
            "only one usage of each socket address",
            "too many open connections",
        ],
    ) || (lower.contains("port") && lower.contains("exhaust"))
}

/// Container or startup command failures
pub fn indicates_startup_failure(line: &str) -> bool {
    let lower = line.to_lowercase();
    (lower.contains("docker")
        && contains_any(
            &lower,
            &["failed to start", "container start failed", "startup command failed", "command not found"],
        ))
        || ((lower.contains("startup") || lower.contains("start command"))
            && contains_any(&lower, &["error", "failed", "not found"]))
        || (lower.contains("process")
            && contains_any(&lower, &["exited", "terminated", "crashed"])
            && contains_any(&lower, &["code", "error"]))
        || contains_any(&lower, &["command not found", "no such file or directory"])
}
