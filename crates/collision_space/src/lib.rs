//! # Collision Space
//!
//! Collision-geometry cache and hierarchical broad-phase synchronization for
//! kinematic scenes.
//!
//! ## Features
//!
//! - **Lazy primitive caches**: per body and per link, built from scene geometry
//! - **Three index scopes**: environment, body and link, kept in step with link poses
//! - **Swappable broad phase**: naive, sweep and prune, spatial hash, interval tree, dynamic AABB trees
//! - **Scoped views**: borrow, wrap or exclude bodies for a single query
//!
//! ## Quick Start
//!
//! ```rust
//! use collision_space::prelude::*;
//!
//! let mut scene = Scene::new();
//! let body = scene.add_body(
//!     "crate",
//!     vec![Link::new("base", vec![GeometryInfo::cuboid(Vec3::new(1.0, 1.0, 1.0), Transform::identity())])],
//! );
//!
//! let mut space = SpaceManager::default();
//! space.init_body(&body);
//!
//! body.set_link_transform(0, Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));
//! assert_eq!(space.synchronize()?, 1);
//!
//! let query = Aabb::from_center_extents(Vec3::new(5.0, 0.0, 0.0), Vec3::repeat(0.5));
//! assert_eq!(space.environment_index().query_aabb(&query).len(), 1);
//! # Ok::<(), SpaceError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod scene;
pub mod collision;
pub mod broadphase;
pub mod space;

/// Common imports for collision space users
pub mod prelude {
    pub use crate::{
        foundation::math::{Quat, Transform, Vec3},
        config::{Config, SpaceConfig},
        scene::{BodyId, GeometryInfo, KinBody, Link, Scene, Shape, TriMesh},
        collision::{Aabb, BoundingVolumeKind, CollisionPrimitive, PrimitiveKey},
        broadphase::{BroadPhaseAlgorithm, BroadPhaseIndex},
        space::{SpaceError, SpaceManager, ScopedIndexView, ViewPolicy},
    };
}
