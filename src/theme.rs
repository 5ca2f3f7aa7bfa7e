// src/theme.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Light/dark selector shared by the page and the particle background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    #[default]
    Dark,
}

impl ThemeMode {
    /// Only the exact stored value `"light"` selects the light theme.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("light") => ThemeMode::Light,
            _ => ThemeMode::Dark,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            ThemeMode::Dark => Palette {
                background: Color::from((15, 23, 42)),
                particle: Color::from((255, 255, 255)),
                connection: Color::from((226, 232, 240)),
            },
            ThemeMode::Light => Palette {
                background: Color::from((248, 250, 252)),
                particle: Color::from((59, 130, 246)),
                connection: Color::from((37, 99, 235)),
            },
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse for values coming from callers rather than from storage.
impl FromStr for ThemeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => anyhow::bail!("Unknown theme {:?}, expected \"light\" or \"dark\"", other),
        }
    }
}

/// Colors for one theme. Alphas are applied per draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub background: Color,
    pub particle: Color,
    pub connection: Color,
}
