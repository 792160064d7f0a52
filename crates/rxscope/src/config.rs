#![forbid(unsafe_code)]

//! Configuration for controllers and the reference host scope.

#[cfg(feature = "serde")]
use serde::Deserialize;

/// Slot label used when none is configured.
pub const DEFAULT_LABEL: &str = "$rx";

/// Default number of flush passes before a flush is declared runaway.
pub const DEFAULT_FLUSH_TTL: usize = 10;

/// Per-controller settings, read once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct ControllerConfig {
    /// Name of the slot written in the owning scope.
    pub label: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Config writing to `label`.
    #[must_use]
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// The effective label. An empty label falls back to [`DEFAULT_LABEL`];
    /// anything else is used verbatim.
    #[must_use]
    pub fn resolved_label(&self) -> &str {
        if self.label.is_empty() {
            DEFAULT_LABEL
        } else {
            &self.label
        }
    }
}

/// Settings for [`ViewScope`](crate::scope::ViewScope) trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct ScopeConfig {
    /// Maximum number of passes a single flush may take while mutators keep
    /// scheduling more work. Values below 1 are treated as 1.
    pub flush_ttl: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            flush_ttl: DEFAULT_FLUSH_TTL,
        }
    }
}

impl ScopeConfig {
    #[must_use]
    pub fn with_flush_ttl(mut self, ttl: usize) -> Self {
        self.flush_ttl = ttl.max(1);
        self
    }
}
