//! Execution options and their TOML form.

use serde::{Deserialize, Serialize};

use crate::error::{ExecError, Result};

/// Rows per output block unless a stage expects fewer.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Tuning knobs of the driver loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    /// Maximum rows per output block.
    pub batch_size: usize,
    /// Driver state transitions between two polls of the kill flag.
    pub kill_check_interval: usize,
    /// Maximum number of recycled block buffers kept around.
    pub pool_capacity: usize,
    /// Whether every upstream block is checked for shadow-row consistency.
    pub validate_shadow_rows: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            kill_check_interval: 64,
            pool_capacity: 64,
            validate_shadow_rows: cfg!(debug_assertions),
        }
    }
}

impl ExecOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from a TOML fragment; missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let options: ExecOptions = toml::from_str(input)
            .map_err(|err| ExecError::InvalidOptions(err.to_string()))?;
        let (rows, transitions) = (options.batch_size, options.kill_check_interval);
        Ok(options.batch_size(rows).kill_check_interval(transitions))
    }

    /// Sets the maximum rows per output block, at least 1.
    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    /// Sets how often the kill flag is polled, at least every transition.
    pub fn kill_check_interval(mut self, transitions: usize) -> Self {
        self.kill_check_interval = transitions.max(1);
        self
    }

    /// Sets how many recycled buffers the block pool retains.
    pub fn pool_capacity(mut self, buffers: usize) -> Self {
        self.pool_capacity = buffers;
        self
    }

    /// Enables or disables shadow-row validation of upstream blocks.
    pub fn validate_shadow_rows(mut self, enabled: bool) -> Self {
        self.validate_shadow_rows = enabled;
        self
    }
}
