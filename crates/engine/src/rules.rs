//! # Label Rule Matching
//!
//! Path-based labeling rules. Each rule maps one label to an ordered list
//! of glob patterns; a rule matches a pull request when any of its patterns
//! matches any changed path.
//!
//! Glob dialect: `*` matches within a single path segment, `?` matches one
//! non-separator character, and `**` matches zero or more whole segments.
//! Brackets have no special meaning. Patterns are translated to anchored
//! regexes when the rule set is built, so malformed globs surface at
//! configuration-load time, never during matching.

use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Errors produced while compiling a single glob pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The pattern string was empty.
    #[error("empty glob pattern")]
    Empty,

    /// The pattern contained an empty path segment (leading, trailing, or
    /// doubled `/`).
    #[error("empty path segment in glob pattern '{pattern}'")]
    EmptySegment {
        /// The offending pattern.
        pattern: String,
    },

    /// `**` was fused with other characters inside one segment.
    #[error("'**' must stand alone in its path segment in glob pattern '{pattern}'")]
    FusedDoubleStar {
        /// The offending pattern.
        pattern: String,
    },

    /// The translated regex failed to compile.
    #[error("glob pattern '{pattern}' did not compile: {source}")]
    Compile {
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Errors produced while building a [`RuleSet`].
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule had an empty label.
    #[error("rule has an empty label")]
    EmptyLabel,

    /// A rule listed no patterns.
    #[error("rule '{label}' has no patterns")]
    NoPatterns {
        /// The label with the empty pattern list.
        label: String,
    },

    /// Two rules used the same label.
    #[error("duplicate rule for label '{label}'")]
    DuplicateLabel {
        /// The repeated label.
        label: String,
    },

    /// One of the rule's patterns was malformed.
    #[error("rule '{label}': {source}")]
    Pattern {
        /// The label whose pattern failed.
        label: String,
        /// The pattern failure.
        #[source]
        source: PatternError,
    },
}

/// A glob pattern compiled to an anchored regex, retaining its source text.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    raw: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Compile a glob pattern.
    ///
    /// # Errors
    /// Returns a [`PatternError`] describing the malformed pattern.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let regex_text = glob_to_regex(pattern)?;
        let regex = Regex::new(&regex_text).map_err(|source| PatternError::Compile {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// The original glob text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this pattern matches a repo-relative path.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Translate a glob pattern into an anchored regex string.
///
/// `**` handling: as a leading or interior segment it consumes zero or more
/// segments including their trailing separator; as a trailing segment it
/// consumes zero or more additional `/segment` suffixes, so `a/**` matches
/// `a` itself as well as everything below it.
fn glob_to_regex(pattern: &str) -> Result<String, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }

    let segments: Vec<&str> = pattern.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(PatternError::EmptySegment {
            pattern: pattern.to_string(),
        });
    }

    let mut regex = String::from("^");
    // Whether a separator must be emitted before the next literal segment.
    let mut pending_separator = false;

    let last_index = segments.len() - 1;
    for (index, segment) in segments.iter().enumerate() {
        if *segment == "**" {
            if index == last_index {
                if pending_separator {
                    regex.push_str("(?:/[^/]+)*");
                } else {
                    // The whole pattern is `**` (or collapses to it).
                    regex.push_str(".*");
                }
            } else {
                if pending_separator {
                    regex.push('/');
                }
                regex.push_str("(?:[^/]+/)*");
                pending_separator = false;
            }
            continue;
        }

        if segment.contains("**") {
            return Err(PatternError::FusedDoubleStar {
                pattern: pattern.to_string(),
            });
        }

        if pending_separator {
            regex.push('/');
        }
        for ch in segment.chars() {
            match ch {
                '*' => regex.push_str("[^/]*"),
                '?' => regex.push_str("[^/]"),
                other => regex.push_str(&regex::escape(&other.to_string())),
            }
        }
        pending_separator = true;
    }

    regex.push('$');
    Ok(regex)
}

/// One labeling rule: a label plus the patterns that trigger it.
///
/// Invariant, enforced at construction: the label is non-empty and at least
/// one pattern is present. Immutable once built.
#[derive(Debug, Clone)]
pub struct LabelRule {
    label: String,
    patterns: Vec<CompiledPattern>,
}

impl LabelRule {
    /// Build a rule from a label and its glob patterns.
    ///
    /// # Errors
    /// Returns a [`RuleError`] when the label is empty, the pattern list is
    /// empty, or a pattern fails to compile.
    pub fn compile(label: impl Into<String>, patterns: &[String]) -> Result<Self, RuleError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(RuleError::EmptyLabel);
        }
        if patterns.is_empty() {
            return Err(RuleError::NoPatterns { label });
        }

        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            compiled.push(CompiledPattern::compile(pattern).map_err(|source| {
                RuleError::Pattern {
                    label: label.clone(),
                    source,
                }
            })?);
        }

        Ok(Self {
            label,
            patterns: compiled,
        })
    }

    /// The label this rule applies.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The rule's compiled patterns, in configuration order.
    #[must_use]
    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Whether any pattern matches any of the changed paths.
    #[must_use]
    pub fn matches_any(&self, changed_paths: &BTreeSet<String>) -> bool {
        self.patterns
            .iter()
            .any(|pattern| changed_paths.iter().any(|path| pattern.matches(path)))
    }
}

/// An immutable, validated set of labeling rules in configuration order.
///
/// Loaded once at startup and shared read-only across item workers.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<LabelRule>,
}

impl RuleSet {
    /// Compile a rule set from `(label, patterns)` pairs, preserving order.
    ///
    /// # Errors
    /// Returns a [`RuleError`] on empty labels, empty pattern lists,
    /// duplicate labels, or malformed patterns.
    pub fn compile<I>(rules: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut compiled = Vec::new();
        for (label, patterns) in rules {
            if !seen.insert(label.clone()) {
                return Err(RuleError::DuplicateLabel { label });
            }
            compiled.push(LabelRule::compile(label, &patterns)?);
        }
        Ok(Self { rules: compiled })
    }

    /// Labels whose rules match at least one changed path.
    ///
    /// Rules are evaluated in configuration order for determinism; the
    /// result is a union, so rule order never changes the outcome. An empty
    /// result is a normal outcome, not an error.
    #[must_use]
    pub fn matching_labels(&self, changed_paths: &BTreeSet<String>) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|rule| rule.matches_any(changed_paths))
            .map(|rule| rule.label.clone())
            .collect()
    }

    /// The universe of labels this rule set owns.
    ///
    /// Only these labels are ever eligible for automatic removal; see
    /// [`crate::reconcile::reconcile`].
    #[must_use]
    pub fn managed_labels(&self) -> BTreeSet<String> {
        self.rules.iter().map(|rule| rule.label.clone()).collect()
    }

    /// The rules in configuration order.
    #[must_use]
    pub fn rules(&self) -> &[LabelRule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the rule set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
