//! Triage configuration loading.
//!
//! Parses the YAML configuration file into immutable engine types: a
//! compiled [`RuleSet`] plus one [`StaleConfig`] per item kind. Loading is
//! all-or-nothing: any malformed pattern, duplicate label, or invalid
//! threshold fails startup with a [`ConfigError`] and nothing is partially
//! applied. The loaded configuration is read-only shared state for the
//! lifetime of the process.
//!
//! ```yaml
//! rules:
//!   documentation:
//!     - '**/*.md'
//!     - 'wiki/**/*'
//!   core: 'signal_messenger/*.py'
//! issues:
//!   days_before_stale: 60
//!   days_before_close: 7
//!   stale_label: stale
//!   exempt_labels: [pinned, security]
//!   stale_message: "..."
//! pull_requests:
//!   days_before_stale: 30
//! ```

use engine::{ItemKind, RuleError, RuleSet, StaleConfig};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Errors that prevent the configuration from loading.
///
/// All of these are fatal at startup; the triage engine never runs with a
/// partially-applied configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file was not valid YAML (including duplicate mapping keys).
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A rule label was not a plain string.
    #[error("rule labels must be strings")]
    NonStringRuleLabel,

    /// A rule's patterns were neither a string nor a sequence of strings.
    #[error("rule '{label}': patterns must be a string or a sequence of strings")]
    InvalidRulePatterns {
        /// The label whose patterns were malformed.
        label: String,
    },

    /// A rule failed to compile (empty label, no patterns, duplicate
    /// label, malformed glob).
    #[error(transparent)]
    Rules(#[from] RuleError),

    /// A day threshold was outside its valid range.
    #[error("{section}: {field} must be {requirement}, got {value}")]
    InvalidThreshold {
        /// Which staleness section the field belongs to.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// What the field requires.
        requirement: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// The stale label was empty.
    #[error("{section}: stale_label must not be empty")]
    EmptyStaleLabel {
        /// Which staleness section the label belongs to.
        section: &'static str,
    },

    /// The stale label was also listed as exempt, which would make the
    /// close transition unreachable.
    #[error("{section}: stale_label '{label}' must not appear in exempt_labels")]
    ExemptStaleLabel {
        /// Which staleness section the label belongs to.
        section: &'static str,
        /// The conflicting label.
        label: String,
    },
}

/// Default inactivity window before an item is marked stale.
const DEFAULT_DAYS_BEFORE_STALE: i64 = 60;
/// Default window between the stale mark and closure.
const DEFAULT_DAYS_BEFORE_CLOSE: i64 = 7;
/// Default stale label.
const DEFAULT_STALE_LABEL: &str = "stale";
/// Default comment posted when marking an item stale.
const DEFAULT_STALE_MESSAGE: &str =
    "This item has been automatically marked as stale because it has not had \
     recent activity. It will be closed if no further activity occurs.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    rules: serde_yaml::Mapping,
    #[serde(default)]
    issues: RawStaleConfig,
    #[serde(default)]
    pull_requests: RawStaleConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawStaleConfig {
    days_before_stale: i64,
    days_before_close: i64,
    exempt_labels: BTreeSet<String>,
    stale_label: String,
    stale_message: String,
    close_message: Option<String>,
}

impl Default for RawStaleConfig {
    fn default() -> Self {
        Self {
            days_before_stale: DEFAULT_DAYS_BEFORE_STALE,
            days_before_close: DEFAULT_DAYS_BEFORE_CLOSE,
            exempt_labels: BTreeSet::new(),
            stale_label: DEFAULT_STALE_LABEL.to_string(),
            stale_message: DEFAULT_STALE_MESSAGE.to_string(),
            close_message: None,
        }
    }
}

impl RawStaleConfig {
    fn validate(self, section: &'static str) -> Result<StaleConfig, ConfigError> {
        if self.days_before_stale < 1 {
            return Err(ConfigError::InvalidThreshold {
                section,
                field: "days_before_stale",
                requirement: "positive",
                value: self.days_before_stale,
            });
        }
        if self.days_before_close < 0 {
            return Err(ConfigError::InvalidThreshold {
                section,
                field: "days_before_close",
                requirement: "zero or positive",
                value: self.days_before_close,
            });
        }
        if self.stale_label.trim().is_empty() {
            return Err(ConfigError::EmptyStaleLabel { section });
        }
        if self.exempt_labels.contains(&self.stale_label) {
            return Err(ConfigError::ExemptStaleLabel {
                section,
                label: self.stale_label,
            });
        }

        Ok(StaleConfig {
            days_before_stale: self.days_before_stale,
            days_before_close: self.days_before_close,
            exempt_labels: self.exempt_labels,
            stale_label: self.stale_label,
            stale_message: self.stale_message,
            close_message: self.close_message,
        })
    }
}

/// The fully-validated triage configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Compiled labeling rules, in file order.
    pub rules: RuleSet,
    /// Staleness settings for issues.
    pub issues: StaleConfig,
    /// Staleness settings for pull requests.
    pub pull_requests: StaleConfig,
}

impl TriageConfig {
    /// Load and validate the configuration file at `path`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the file cannot be read, parsed, or
    /// validated. Nothing is partially applied on failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        info!(
            rules = config.rules.len(),
            path = %path.display(),
            "Loaded triage configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on any parse or validation failure.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;

        let mut pairs = Vec::with_capacity(raw.rules.len());
        for (key, value) in raw.rules {
            let label = key
                .as_str()
                .ok_or(ConfigError::NonStringRuleLabel)?
                .to_string();
            let patterns = patterns_from_value(&label, value)?;
            pairs.push((label, patterns));
        }
        let rules = RuleSet::compile(pairs)?;

        Ok(Self {
            rules,
            issues: raw.issues.validate("issues")?,
            pull_requests: raw.pull_requests.validate("pull_requests")?,
        })
    }

    /// The staleness settings for one item kind.
    #[must_use]
    pub fn stale_config(&self, kind: ItemKind) -> &StaleConfig {
        match kind {
            ItemKind::Issue => &self.issues,
            ItemKind::PullRequest => &self.pull_requests,
        }
    }
}

/// Accept either a single pattern string or a sequence of pattern strings,
/// the same shorthand the original labeler configuration allowed.
fn patterns_from_value(
    label: &str,
    value: serde_yaml::Value,
) -> Result<Vec<String>, ConfigError> {
    match value {
        serde_yaml::Value::String(pattern) => Ok(vec![pattern]),
        serde_yaml::Value::Sequence(entries) => entries
            .into_iter()
            .map(|entry| match entry {
                serde_yaml::Value::String(pattern) => Ok(pattern),
                _ => Err(ConfigError::InvalidRulePatterns {
                    label: label.to_string(),
                }),
            })
            .collect(),
        _ => Err(ConfigError::InvalidRulePatterns {
            label: label.to_string(),
        }),
    }
}
