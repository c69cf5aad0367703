/*!
 * Arena Configuration
 * Serializable settings, loaded from the environment or JSON
 *
 * Environment variables:
 * - MEMPOOL_MIN_SLAB_SIZE: minimum slab size in bytes (default: 0, pooling off)
 * - MEMPOOL_SERIAL_THRESHOLD: serial that triggers the threshold log hook
 */

use super::manager::{Arena, SerialTrigger};
use super::types::{MemoryError, MemoryResult};
use crate::core::limits::DEFAULT_MINIMUM_SLAB_SIZE;
use crate::core::types::{Serial, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

pub const ENV_MIN_SLAB_SIZE: &str = "MEMPOOL_MIN_SLAB_SIZE";
pub const ENV_SERIAL_THRESHOLD: &str = "MEMPOOL_SERIAL_THRESHOLD";

/// Arena settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// 0 disables slab pooling
    pub minimum_slab_size: Size,
    /// Log the allocation that receives this serial
    pub serial_threshold: Option<Serial>,
    /// Log every allocation; overrides `serial_threshold`
    pub log_every_allocation: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            minimum_slab_size: DEFAULT_MINIMUM_SLAB_SIZE,
            serial_threshold: None,
            log_every_allocation: false,
        }
    }
}

impl ArenaConfig {
    /// Defaults overridden by `MEMPOOL_*` variables
    pub fn from_env() -> MemoryResult<Self> {
        let mut config = Self::default();
        if let Some(size) = read_var::<Size>(ENV_MIN_SLAB_SIZE)? {
            config.minimum_slab_size = size;
        }
        config.serial_threshold = read_var(ENV_SERIAL_THRESHOLD)?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> MemoryResult<Self> {
        serde_json::from_str(json).map_err(|e| MemoryError::InvalidConfig(e.to_string()))
    }

    pub fn with_minimum_slab_size(mut self, size: Size) -> Self {
        self.minimum_slab_size = size;
        self
    }

    /// Serial-threshold trigger this configuration asks for
    pub fn trigger(&self) -> Option<SerialTrigger> {
        if self.log_every_allocation {
            Some(SerialTrigger::Always)
        } else {
            self.serial_threshold.map(SerialTrigger::At)
        }
    }
}

fn read_var<T>(name: &str) -> MemoryResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|e| {
            warn!(name, value = %value, error = %e, "rejecting invalid environment value");
            MemoryError::InvalidConfig(format!("{}={}: {}", name, value, e))
        }),
        Err(_) => Ok(None),
    }
}

impl Arena {
    /// Arena over the process heap configured from `config`
    ///
    /// A serial trigger installs a hook that logs the matching allocations.
    pub fn from_config(config: &ArenaConfig) -> MemoryResult<Self> {
        let mut arena = Arena::new();
        arena.set_minimum_slab_size(config.minimum_slab_size)?;
        if let Some(trigger) = config.trigger() {
            arena.set_on_serial_threshold(
                trigger,
                Box::new(|serial, block| {
                    info!(
                        serial,
                        address = format_args!("0x{:x}", block.address),
                        user_bytes = block.user_bytes,
                        actual_bytes = block.actual_bytes,
                        "serial threshold reached"
                    );
                }),
            );
        }
        Ok(arena)
    }
}
