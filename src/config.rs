//! Scan range limits per field, loaded from TOML.
//!
//! ```toml
//! [default]
//! x = [-100.0, 100.0]
//! y = [-100.0, 100.0]
//!
//! [[field]]
//! id = 1
//! x = [-50.0, 50.0]
//! y = [-50.0, 50.0]
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Rectangular scan area in millimetres, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanRange {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

impl ScanRange {
    pub fn new(x: [f64; 2], y: [f64; 2]) -> Self {
        Self { x, y }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x[0] && x <= self.x[1] && y >= self.y[0] && y <= self.y[1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRange {
    pub id: u32,
    #[serde(flatten)]
    pub range: ScanRange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanLimits {
    #[serde(default)]
    pub default: Option<ScanRange>,
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldRange>,
}

impl ScanLimits {
    /// Limits without any range: every spot position is rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same range for every field.
    pub fn uniform(range: ScanRange) -> Self {
        Self {
            default: Some(range),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, id: u32, range: ScanRange) -> Self {
        self.fields.retain(|field| field.id != id);
        self.fields.push(FieldRange { id, range });
        self
    }

    /// Range for `field_id`, falling back to the default range.
    pub fn range_for(&self, field_id: u32) -> Option<&ScanRange> {
        self.fields
            .iter()
            .find(|field| field.id == field_id)
            .map(|field| &field.range)
            .or(self.default.as_ref())
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let limits: ScanLimits = toml::from_str(content)?;
        limits.validate()?;
        Ok(limits)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let limits = Self::from_toml(&content)?;
        log::debug!(
            "loaded scan limits for {} fields from {}",
            limits.fields.len(),
            path.display()
        );
        Ok(limits)
    }

    fn validate(&self) -> ConfigResult<()> {
        let ranges = self
            .default
            .iter()
            .map(|range| ("default".to_string(), range))
            .chain(self.fields.iter().map(|field| (format!("field {}", field.id), &field.range)));
        for (name, range) in ranges {
            for (axis, bounds) in [("x", range.x), ("y", range.y)] {
                if !(bounds[0].is_finite() && bounds[1].is_finite() && bounds[0] <= bounds[1]) {
                    return Err(ConfigError::InvalidValue(format!(
                        "{} {} range [{}, {}]",
                        name, axis, bounds[0], bounds[1]
                    )));
                }
            }
        }

        let mut ids: Vec<u32> = self.fields.iter().map(|field| field.id).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::InvalidValue(format!("field {} listed twice", pair[0])));
        }
        Ok(())
    }
}
