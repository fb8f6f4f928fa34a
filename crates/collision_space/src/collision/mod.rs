//! Collision primitive layer
//!
//! Turns host shapes into collision geometry, fits bounding volumes around
//! meshes and tracks world poses of the resulting primitives. Pairwise
//! narrow-phase tests are not part of this layer; it only produces what the
//! broad phase indexes.

mod aabb;
mod bounding_volume;
mod factory;
mod geometry;
mod primitive;

pub use aabb::Aabb;
pub use bounding_volume::{
    BoundingVolume, BoundingVolumeKind, KDop, KDop16, KDop18, KDop24, KIos, MeshBound, Obb, ObbRss, Rss,
};
pub use factory::PrimitiveFactory;
pub use geometry::{build_mesh, CollisionGeometry, MeshFactory, MeshModel};
pub use primitive::{CollisionPrimitive, LinkRef, PrimitiveArena, PrimitiveKey};
