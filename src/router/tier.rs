//! Cost Tiers
//!
//! Maps caller complexity hints and model identifiers onto cost tiers.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Caller-supplied hint about how demanding a request is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Economy-tier models only, when any are available
    #[default]
    Normal,

    /// Any tier may serve the request
    High,
}

impl Complexity {
    /// Parse a hint. Anything other than "high" is treated as normal.
    pub fn parse(hint: &str) -> Self {
        if hint.trim().eq_ignore_ascii_case("high") {
            Complexity::High
        } else {
            Complexity::Normal
        }
    }
}

impl FromStr for Complexity {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Complexity {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Normal => write!(f, "normal"),
            Complexity::High => write!(f, "high"),
        }
    }
}

/// Cost tier of a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheap models, preferred for normal requests
    Economy,

    /// Expensive models, reserved for high-complexity requests
    Premium,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Economy => write!(f, "economy"),
            ModelTier::Premium => write!(f, "premium"),
        }
    }
}

/// Classifies model identifiers by substring markers
#[derive(Debug, Clone)]
pub struct TierPolicy {
    economy_markers: Vec<String>,
}

impl TierPolicy {
    /// Create a policy; markers are matched case-insensitively
    pub fn new(markers: &[String]) -> Self {
        Self {
            economy_markers: markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Tier of a model identifier.
    ///
    /// Markers match anywhere in the id, so a short marker such as `"mini"`
    /// also claims every `gemini-*` model.
    pub fn classify(&self, model: &str) -> ModelTier {
        let model = model.to_lowercase();
        if self.economy_markers.iter().any(|m| model.contains(m.as_str())) {
            ModelTier::Economy
        } else {
            ModelTier::Premium
        }
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::new(&["flash".to_string()])
    }
}
