//! Display preferences persisted alongside the records.

use crate::db::{DurableSlot, DARK_MODE_KEY};
use crate::error::TrackerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Light,
    Dark,
}

impl DisplayMode {
    pub fn from_dark(dark: bool) -> Self {
        if dark { DisplayMode::Dark } else { DisplayMode::Light }
    }

    pub fn is_dark(&self) -> bool {
        *self == DisplayMode::Dark
    }

    pub fn toggled(&self) -> Self {
        Self::from_dark(!self.is_dark())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Light => "light",
            DisplayMode::Dark => "dark",
        }
    }

    /// Missing or unparsable preference means light mode.
    pub fn load(slot: &impl DurableSlot) -> Self {
        match slot.read(DARK_MODE_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<bool>(&json) {
                Ok(dark) => Self::from_dark(dark),
                Err(e) => {
                    log::warn!("Ignoring unreadable display preference: {}", e);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Could not read display preference: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, slot: &impl DurableSlot) {
        let json = serde_json::Value::Bool(self.is_dark()).to_string();
        match slot.write(DARK_MODE_KEY, &json) {
            Ok(()) => log::info!("Display mode set to {}", self.as_str()),
            Err(e) => {
                let err = TrackerError::PersistenceWrite {
                    key: DARK_MODE_KEY.to_string(),
                    message: format!("{:#}", e),
                };
                log::error!("{}", err);
            }
        }
    }
}
