//! Configuration validation.
//!
//! Checks values that deserialize fine but cannot work at runtime (an
//! unparsable handler pattern, port 0) and flags risky-but-legal settings.

use crate::schema::AlyaConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "sidecar.port"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a loaded configuration.
pub fn validate(config: &AlyaConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.handlers.is_empty() {
        result.push(Severity::Error, "handlers", "handler pattern must not be empty");
    } else if let Err(e) = regex::Regex::new(&config.handlers) {
        result.push(
            Severity::Error,
            "handlers",
            format!("not a valid regular expression: {e}"),
        );
    }

    if config.sidecar.port == 0 {
        result.push(Severity::Error, "sidecar.port", "port must be non-zero");
    }

    if config.sudo.is_empty() {
        result.push(
            Severity::Warning,
            "sudo",
            "no sudo numbers configured; owner-only commands only answer the bot's own messages",
        );
    }

    for (i, number) in config.sudo.iter().enumerate() {
        if !number.chars().all(|c| c.is_ascii_digit()) {
            result.push(
                Severity::Warning,
                &format!("sudo[{i}]"),
                format!("\"{number}\" is not a bare phone number and will never match"),
            );
        }
    }

    result
}
