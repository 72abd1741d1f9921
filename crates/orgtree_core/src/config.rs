//! Engine configuration.
//!
//! # Responsibility
//! - Hold the color palette and the neutral color used by node creation.
//! - Load overrides from JSON and validate them before use.
//!
//! # Invariants
//! - A validated config has a non-empty palette of distinct, valid colors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Color given to organizations and unaffiliated employees.
pub const NEUTRAL_COLOR: &str = "white";

/// Round-robin palette for new locations and departments, in order.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#4f46e5", "#0891b2", "#059669", "#ca8a04", "#dc2626", "#db2777", "#7c3aed", "#ea580c",
    "#0d9488", "#65a30d",
];

static COLOR_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#[0-9a-fA-F]{6}|[a-z]+)$").expect("valid color regex"));

/// Returns whether `value` is a `#rrggbb` hex token or a lowercase color name.
pub fn is_valid_color(value: &str) -> bool {
    COLOR_TOKEN_RE.is_match(value)
}

/// Configuration rejected by validation or parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// JSON could not be parsed into a config.
    Parse(serde_json::Error),
    EmptyPalette,
    DuplicatePaletteColor(String),
    InvalidColor(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid tree config: {err}"),
            Self::EmptyPalette => write!(f, "palette must contain at least one color"),
            Self::DuplicatePaletteColor(color) => {
                write!(f, "palette color `{color}` appears more than once")
            }
            Self::InvalidColor(color) => write!(f, "invalid color token `{color}`"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Tree engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Ordered palette for round-robin assignment.
    pub palette: Vec<String>,
    /// Default color for organizations and employees.
    pub neutral_color: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.iter().map(|color| color.to_string()).collect(),
            neutral_color: NEUTRAL_COLOR.to_string(),
        }
    }
}

impl TreeConfig {
    /// Parses and validates a JSON config. Missing fields take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks palette and neutral color.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.palette.is_empty() {
            return Err(ConfigError::EmptyPalette);
        }
        let mut seen = HashSet::new();
        for color in &self.palette {
            if !is_valid_color(color) {
                return Err(ConfigError::InvalidColor(color.clone()));
            }
            if !seen.insert(color.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicatePaletteColor(color.clone()));
            }
        }
        if !is_valid_color(&self.neutral_color) {
            return Err(ConfigError::InvalidColor(self.neutral_color.clone()));
        }
        Ok(())
    }
}
