//! Milestone table: mapping backend log phrases to coarse progress
//!
//! The backend reports progress only as human-readable log text, so the
//! relay infers a percentage by matching each message against an ordered
//! table of known phrases. Matching is literal and case-sensitive and
//! therefore tied to the backend's exact wording; the table is versioned and
//! can be replaced from configuration without touching the relay.

use crate::error::{RelayError, RelayResult};
use ringq_common::config::{MilestoneConfig, MilestoneTableConfig};

/// Wildcard standing for any run of text inside a pattern
pub const WILDCARD: &str = "...";

/// Outcome of classifying one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Message carries the error sentinel
    Error,
    /// Message matched a milestone with this percentage
    Milestone(u8),
    /// Ordinary log line
    Plain,
}

/// Maps a log message to a progress signal
///
/// The relay only depends on this trait, so a table keyed on structured
/// backend tags can replace text matching later.
pub trait ProgressClassifier: Send + Sync {
    fn classify(&self, message: &str) -> Classification;
}

/// Literal pattern with optional `...` wildcards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestonePattern {
    source: String,
    segments: Vec<String>,
}

impl MilestonePattern {
    pub fn new(pattern: &str) -> RelayResult<Self> {
        let segments = literal_segments(pattern);
        if segments.is_empty() {
            return Err(RelayError::Config(format!(
                "Milestone pattern has no literal text: {:?}",
                pattern
            )));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// True when every literal segment occurs in `message`, in order
    pub fn matches(&self, message: &str) -> bool {
        let mut rest = message;
        for segment in &self.segments {
            match rest.find(segment.as_str()) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
        true
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn literal_segments(pattern: &str) -> Vec<String> {
    pattern
        .split(WILDCARD)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// One table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub pattern: MilestonePattern,
    pub percent: u8,
}

/// Ordered, versioned milestone table plus error sentinel
///
/// First matching row in declaration order wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneTable {
    version: u32,
    error_token: String,
    milestones: Vec<Milestone>,
}

/// Built-in table rows (version 1)
const BUILTIN_MILESTONES: &[(&str, u8)] = &[
    ("Connecting to Google API", 10),
    ("Starting parallel data loading", 20),
    ("Starting merge", 50),
    ("Copying ... records to DB", 70),
    ("Updating existing records", 85),
    ("Inserting new records", 95),
    ("Migration completed successfully!", 100),
];

const BUILTIN_VERSION: u32 = 1;
const BUILTIN_ERROR_TOKEN: &str = "ERROR";

impl MilestoneTable {
    pub fn new(
        version: u32,
        error_token: impl Into<String>,
        rows: &[(&str, u8)],
    ) -> RelayResult<Self> {
        let error_token = error_token.into();
        if error_token.is_empty() {
            return Err(RelayError::Config(
                "Milestone error token must not be empty".to_string(),
            ));
        }

        let mut milestones = Vec::with_capacity(rows.len());
        for (pattern, percent) in rows {
            if *percent > 100 {
                return Err(RelayError::Config(format!(
                    "Milestone {:?} has percent {} (must be 0-100)",
                    pattern, percent
                )));
            }
            milestones.push(Milestone {
                pattern: MilestonePattern::new(pattern)?,
                percent: *percent,
            });
        }

        Ok(Self {
            version,
            error_token,
            milestones,
        })
    }

    /// The table matching current backend wording
    pub fn builtin() -> Self {
        let milestones = BUILTIN_MILESTONES
            .iter()
            .map(|(pattern, percent)| Milestone {
                pattern: MilestonePattern {
                    source: pattern.to_string(),
                    segments: literal_segments(pattern),
                },
                percent: *percent,
            })
            .collect();

        Self {
            version: BUILTIN_VERSION,
            error_token: BUILTIN_ERROR_TOKEN.to_string(),
            milestones,
        }
    }

    /// Build from the `[milestones]` TOML section
    pub fn from_config(config: &MilestoneTableConfig) -> RelayResult<Self> {
        let rows: Vec<(&str, u8)> = config
            .milestones
            .iter()
            .map(|m| (m.pattern.as_str(), m.percent))
            .collect();
        Self::new(config.version, config.error_token.clone(), &rows)
    }

    /// Configured table if present, built-in otherwise
    pub fn resolve(config: Option<&MilestoneTableConfig>) -> RelayResult<Self> {
        match config {
            Some(config) => Self::from_config(config),
            None => Ok(Self::builtin()),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn error_token(&self) -> &str {
        &self.error_token
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    /// TOML form of this table, as written by `init-config`
    pub fn to_config(&self) -> MilestoneTableConfig {
        MilestoneTableConfig {
            version: self.version,
            error_token: self.error_token.clone(),
            milestones: self
                .milestones
                .iter()
                .map(|m| MilestoneConfig {
                    pattern: m.pattern.as_str().to_string(),
                    percent: m.percent,
                })
                .collect(),
        }
    }
}

impl Default for MilestoneTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProgressClassifier for MilestoneTable {
    fn classify(&self, message: &str) -> Classification {
        if message.contains(self.error_token.as_str()) {
            return Classification::Error;
        }

        self.milestones
            .iter()
            .find(|m| m.pattern.matches(message))
            .map(|m| Classification::Milestone(m.percent))
            .unwrap_or(Classification::Plain)
    }
}
