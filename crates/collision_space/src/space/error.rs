//! Collision space errors

use crate::config::ConfigError;
use crate::scene::BodyId;

/// Errors reported by the collision space
///
/// Skippable geometry problems never show up here; they are logged and the
/// geometry is left out of the cache.
#[derive(thiserror::Error, Debug)]
pub enum SpaceError {
    /// A bounding-volume name that does not exist
    #[error("Unknown bounding volume kind '{0}'")]
    UnknownBoundingVolume(String),

    /// A broad-phase algorithm name that does not exist
    #[error("Unknown broad-phase algorithm '{0}'")]
    UnknownBroadPhaseAlgorithm(String),

    /// The body has no collision cache in this space
    #[error("Body {0:?} has no collision cache")]
    BodyNotInitialized(BodyId),

    /// Link index past the end of the cached link list
    #[error("Body {body:?} has no link {link}")]
    LinkOutOfRange {
        /// Body that was queried
        body: BodyId,
        /// Requested link index
        link: usize,
    },

    /// The scene dropped a body that still has a cache
    #[error("Body {0:?} was dropped while its collision cache was alive")]
    BodyExpired(BodyId),

    /// Configuration could not be loaded or is out of range
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
