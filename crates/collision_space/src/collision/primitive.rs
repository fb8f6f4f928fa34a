//! Collision primitives
//!
//! A primitive is one geometry placed in the world. Primitives live in a
//! [`PrimitiveArena`] owned by the space manager and are addressed by
//! [`PrimitiveKey`]; each link cache owns the keys it created, and indices
//! only ever hold copies of keys.

use slotmap::SlotMap;

use super::aabb::Aabb;
use super::geometry::CollisionGeometry;
use crate::foundation::math::{Quat, Transform, Vec3};
use crate::scene::BodyId;

slotmap::new_key_type! {
    /// Handle of a collision primitive
    pub struct PrimitiveKey;
}

/// Storage of every live primitive
pub type PrimitiveArena = SlotMap<PrimitiveKey, CollisionPrimitive>;

/// Back-reference from a primitive to the link that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkRef {
    /// Owning body
    pub body: BodyId,
    /// Index of the link within the body
    pub link: usize,
}

/// A geometry with a world pose and a cached world box
#[derive(Debug, Clone)]
pub struct CollisionPrimitive {
    geometry: CollisionGeometry,
    translation: Vec3,
    rotation: Quat,
    aabb: Aabb,
    owner: LinkRef,
    name: String,
}

impl CollisionPrimitive {
    /// Create a primitive at the identity pose
    ///
    /// The pose is left for the next synchronization to fill in.
    pub fn new(geometry: CollisionGeometry, owner: LinkRef, name: impl Into<String>) -> Self {
        let aabb = geometry.local_aabb();
        Self {
            geometry,
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            aabb,
            owner,
            name: name.into(),
        }
    }

    /// Geometry in the primitive's frame
    pub fn geometry(&self) -> &CollisionGeometry {
        &self.geometry
    }

    /// Link this primitive was built for
    pub fn owner(&self) -> LinkRef {
        self.owner
    }

    /// `body/link` name, for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World translation
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// World orientation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// World pose
    pub fn pose(&self) -> Transform {
        Transform::from_position_rotation(self.translation, self.rotation)
    }

    /// Cached world box, valid as of the last [`compute_aabb`](Self::compute_aabb)
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// Set the world translation; call [`compute_aabb`](Self::compute_aabb) afterwards
    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
    }

    /// Set the world orientation; call [`compute_aabb`](Self::compute_aabb) afterwards
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    /// Refresh the cached world box from the current pose
    pub fn compute_aabb(&mut self) -> Aabb {
        self.aabb = self.geometry.world_aabb(&self.pose());
        self.aabb
    }
}
