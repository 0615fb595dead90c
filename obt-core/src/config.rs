//! Builder configuration types
//!
//! This module defines the small set of switches the chain builder reads.
//! Everything else (instruction tables, node finder, event hub) is passed in
//! as explicit collaborators.

use serde::{Deserialize, Serialize};

/// Configuration for the chain builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Route chain rejections to the diagnostic sink (false = drop silently)
    #[serde(default = "default_true")]
    pub debug: bool,

    /// Abort a build at the first configuration error (false = skip the group)
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Event name the host fires on a node once its chains are bound
    #[serde(default = "default_done_event")]
    pub done_event: String,
}

fn default_true() -> bool {
    true
}

fn default_done_event() -> String {
    "obted".to_string()
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            debug: true,
            strict: true,
            done_event: default_done_event(),
        }
    }
}

impl BuilderConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable rejection routing
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Builder method: strict or lenient group handling
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Builder method: set the build-done event name
    pub fn with_done_event(mut self, name: impl Into<String>) -> Self {
        self.done_event = name.into();
        self
    }
}
