//! # Runtime Configuration
//!
//! Tunables for one world, loaded once at startup. Every field has a
//! default, so an empty TOML document is a valid configuration.
//!
//! ```toml
//! initial_zone_bytes = 1048576
//! entity_expand_step = 1024
//! bulk_destroy_threshold = 32
//! ```

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::memory::{BLOCK_ALIGN, MAX_ZONE_BYTES};

/// Configuration for a world and its allocator.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Size of the zone when the allocator is created.
    pub initial_zone_bytes: usize,
    /// Multiplier applied to the zone size on growth.
    pub zone_growth_factor: usize,
    /// Hard ceiling for the zone; growth past it is `OutOfMemory`.
    pub max_zone_bytes: usize,
    /// Number of entity ids added whenever the free pool runs dry.
    pub entity_expand_step: u32,
    /// Dense capacity of a freshly created component set.
    pub initial_component_capacity: u32,
    /// Dying members of one set at which the bulk destroy path is used.
    pub bulk_destroy_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initial_zone_bytes: 64 * 1024,
            zone_growth_factor: 2,
            max_zone_bytes: MAX_ZONE_BYTES,
            entity_expand_step: 256,
            initial_component_capacity: 16,
            bulk_destroy_threshold: 8,
        }
    }
}

impl RuntimeConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the text is not valid TOML,
    /// names an unknown field, or fails [`RuntimeConfig::validate`].
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> CoreResult<()> {
        if self.initial_zone_bytes < 4 * BLOCK_ALIGN {
            return Err(CoreError::InvalidConfig(format!(
                "initial_zone_bytes must be at least {}",
                4 * BLOCK_ALIGN
            )));
        }
        if self.max_zone_bytes > MAX_ZONE_BYTES {
            return Err(CoreError::InvalidConfig(format!(
                "max_zone_bytes cannot exceed {MAX_ZONE_BYTES}"
            )));
        }
        if self.initial_zone_bytes > self.max_zone_bytes {
            return Err(CoreError::InvalidConfig(
                "initial_zone_bytes exceeds max_zone_bytes".to_string(),
            ));
        }
        if self.zone_growth_factor < 2 {
            return Err(CoreError::InvalidConfig(
                "zone_growth_factor must be at least 2".to_string(),
            ));
        }
        if self.entity_expand_step == 0 {
            return Err(CoreError::InvalidConfig(
                "entity_expand_step must be non-zero".to_string(),
            ));
        }
        if self.initial_component_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "initial_component_capacity must be non-zero".to_string(),
            ));
        }
        if self.bulk_destroy_threshold == 0 {
            return Err(CoreError::InvalidConfig(
                "bulk_destroy_threshold must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
