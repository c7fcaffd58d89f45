use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Which part of the sweep the series/shunt resistance slopes are taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeBranch {
    /// The untrimmed raw sweep, both directions.
    #[default]
    Full,
    /// The forward branch only.
    Forward,
}

/// How acquisition timestamps are recognised inside file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampFormat {
    /// Characters accepted between date and time components.
    pub separators: String,
    /// Time of day used when a name carries only a date.
    pub default_time: (u32, u32, u32),
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self {
            separators: "-_".to_string(),
            default_time: (9, 0, 0),
        }
    }
}

/// Settings shared by every request. Missing keys fall back to defaults.
///
/// ```json
/// { "slope_branch": "forward", "timestamp": { "separators": "-_/" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub slope_branch: SlopeBranch,
    pub timestamp: TimestampFormat,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing engine config")
    }
}
