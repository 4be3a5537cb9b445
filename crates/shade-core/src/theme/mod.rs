//! Light/dark theme preference with optional system following.
//!
//! A stored value pins the theme; without one the preference tracks the
//! system theme. Every transition yields a payload for the caller to capture,
//! so the recorder stays unaware of themes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::event::{into_event_data, EventData};
use crate::storage::KeyValueStore;

pub const THEME_INITIALIZED: &str = "theme_initialized";
pub const THEME_CHANGED: &str = "theme_changed";
pub const THEME_RESET_TO_SYSTEM: &str = "theme_reset_to_system";

#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    #[error("unknown theme: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = ThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(ThemeError::Unknown(other.to_string())),
        }
    }
}

/// What caused a theme change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    UserToggle,
    SystemChange,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::UserToggle => "user_toggle",
            Trigger::SystemChange => "system_change",
        }
    }
}

/// A completed theme transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeChange {
    pub old_theme: Theme,
    pub new_theme: Theme,
    pub trigger: Trigger,
}

impl ThemeChange {
    /// Payload for a `theme_changed` event.
    pub fn to_event_data(&self) -> EventData {
        into_event_data(json!({
            "old_theme": self.old_theme.as_str(),
            "new_theme": self.new_theme.as_str(),
            "trigger": self.trigger.as_str(),
            "automatic": self.trigger == Trigger::SystemChange,
        }))
    }
}

/// The page's theme state, persisted under one store key.
#[derive(Debug, Clone)]
pub struct ThemePreference {
    key: String,
    current: Theme,
    system: Theme,
    user_override: bool,
}

impl ThemePreference {
    /// Resolve the starting theme: a valid stored value wins, otherwise the
    /// system theme. Unreadable or unknown stored values are ignored.
    pub fn load(key: impl Into<String>, store: &dyn KeyValueStore, system: Theme) -> Self {
        let key = key.into();
        let stored = match store.get(&key) {
            Ok(Some(raw)) => match raw.parse::<Theme>() {
                Ok(theme) => Some(theme),
                Err(e) => {
                    debug!(error = %e, "ignoring stored theme");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "failed to read theme preference");
                None
            }
        };

        Self {
            key,
            current: stored.unwrap_or(system),
            system,
            user_override: stored.is_some(),
        }
    }

    pub fn current(&self) -> Theme {
        self.current
    }

    pub fn system(&self) -> Theme {
        self.system
    }

    pub fn is_following_system(&self) -> bool {
        !self.user_override
    }

    /// Payload for the `theme_initialized` event.
    pub fn initialized_data(&self) -> EventData {
        into_event_data(json!({
            "theme": self.current.as_str(),
            "system_theme": self.system.as_str(),
            "user_override": self.user_override,
        }))
    }

    /// Flip the theme and pin it in the store.
    pub fn toggle(&mut self, store: &mut dyn KeyValueStore) -> ThemeChange {
        let change = ThemeChange {
            old_theme: self.current,
            new_theme: self.current.opposite(),
            trigger: Trigger::UserToggle,
        };
        self.current = change.new_theme;
        self.user_override = true;
        if let Err(e) = store.set(&self.key, self.current.as_str()) {
            warn!(error = %e, "failed to save theme preference");
        }
        change
    }

    /// Drop the pinned theme and follow the system again. Returns the
    /// `theme_reset_to_system` payload.
    pub fn reset_to_system_preference(&mut self, store: &mut dyn KeyValueStore) -> EventData {
        let previous = self.current;
        self.current = self.system;
        self.user_override = false;
        if let Err(e) = store.remove(&self.key) {
            warn!(error = %e, "failed to clear theme preference");
        }
        into_event_data(json!({
            "system_theme": self.system.as_str(),
            "previous_theme": previous.as_str(),
        }))
    }

    /// The system theme changed. When following the system and the visible
    /// theme actually moves, returns the change to capture.
    pub fn on_system_change(&mut self, system: Theme) -> Option<ThemeChange> {
        self.system = system;
        if self.user_override || self.current == system {
            return None;
        }
        let change = ThemeChange {
            old_theme: self.current,
            new_theme: system,
            trigger: Trigger::SystemChange,
        };
        self.current = system;
        Some(change)
    }
}
