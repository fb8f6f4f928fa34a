//! Collision space configuration
//!
//! Selects the bounding-volume representation of mesh primitives, the
//! broad-phase algorithm of every index, and the geometry group used when
//! caches are rebuilt. Loadable from TOML or RON through [`Config`].

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::broadphase::{BroadPhaseAlgorithm, IndexSettings};
use crate::collision::BoundingVolumeKind;

/// Default associated-data key under which caches are attached to bodies
pub const DEFAULT_USER_DATA_KEY: &str = "collision_space";

/// Configuration of a [`SpaceManager`](crate::space::SpaceManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Key of the associated-data slot used on each body
    pub user_data_key: String,

    /// Geometry group used when building caches (empty = default geometry)
    pub geometry_group: String,

    /// Bounding-volume representation of mesh primitives
    pub bounding_volume: BoundingVolumeKind,

    /// Algorithm of the environment, body and link indices
    pub broad_phase: BroadPhaseAlgorithm,

    /// Cell edge length of the spatial-hash algorithm
    pub spatial_hash_cell_size: f32,

    /// Margin added around leaves of the dynamic tree algorithms
    pub tree_margin: f32,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        let settings = IndexSettings::default();
        Self {
            user_data_key: DEFAULT_USER_DATA_KEY.to_string(),
            geometry_group: String::new(),
            bounding_volume: BoundingVolumeKind::Obb,
            broad_phase: BroadPhaseAlgorithm::DynamicAabbTree,
            spatial_hash_cell_size: settings.spatial_hash_cell_size,
            tree_margin: settings.tree_margin,
        }
    }
}

impl Config for SpaceConfig {}

impl SpaceConfig {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_data_key.is_empty() {
            return Err(ConfigError::Invalid("user_data_key must not be empty".to_string()));
        }
        if !(self.spatial_hash_cell_size > 0.0) || !self.spatial_hash_cell_size.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "spatial_hash_cell_size must be positive, got {}",
                self.spatial_hash_cell_size
            )));
        }
        if !(self.tree_margin >= 0.0) || !self.tree_margin.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "tree_margin must be non-negative, got {}",
                self.tree_margin
            )));
        }
        Ok(())
    }

    /// Index parameters derived from this configuration
    pub fn index_settings(&self) -> IndexSettings {
        IndexSettings {
            spatial_hash_cell_size: self.spatial_hash_cell_size,
            tree_margin: self.tree_margin,
        }
    }
}
