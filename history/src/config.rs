//! Tracker configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the execution tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Master switch; disabled tracking produces inert stubs
    pub enabled: bool,
    /// Per-subscriber event buffer before drops
    pub stream_buffer_size: usize,
    /// Maximum decisions recorded per execution
    pub decision_limit: usize,
    pub capture_input: bool,
    pub capture_output: bool,
    pub capture_context: bool,
    pub stream_events: bool,
    pub store_decisions: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stream_buffer_size: 1000,
            decision_limit: 500,
            capture_input: true,
            capture_output: true,
            capture_context: true,
            stream_events: true,
            store_decisions: true,
        }
    }
}

impl TrackerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Tracking without streaming or decision capture
    pub fn minimal() -> Self {
        Self {
            stream_events: false,
            store_decisions: false,
            capture_input: false,
            capture_output: false,
            capture_context: false,
            ..Default::default()
        }
    }
}
