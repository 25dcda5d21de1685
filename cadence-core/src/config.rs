use std::path::Path;

use chrono::{FixedOffset, Offset, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    pub calendar: CalendarSection,
    pub palette: PaletteSection,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalendarSection {
    /// Offset applied when projecting session instants onto calendar dates.
    pub utc_offset_minutes: i32,
}

impl CalendarSection {
    pub fn offset(&self) -> FixedOffset {
        match FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)) {
            Some(offset) => offset,
            None => {
                warn!(
                    target: "config",
                    utc_offset_minutes = self.utc_offset_minutes,
                    "utc offset out of range, using UTC"
                );
                Utc.fix()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaletteSection {
    pub planned: String,
    pub completed: String,
    pub unlinked: String,
    pub goal: String,
    pub goal_completed: String,
    pub block_default: String,
    pub text: String,
    pub band_text: String,
}

impl Default for PaletteSection {
    fn default() -> Self {
        Self {
            planned: "#3b82f6".to_string(),
            completed: "#16a34a".to_string(),
            unlinked: "#f59e0b".to_string(),
            goal: "#a855f7".to_string(),
            goal_completed: "#15803d".to_string(),
            block_default: "#64748b".to_string(),
            text: "#ffffff".to_string(),
            band_text: "#0f172a".to_string(),
        }
    }
}

pub fn load_engine_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
