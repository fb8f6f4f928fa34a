//! Per-link collision cache

use crate::broadphase::{BroadPhaseIndex, IndexFactory, Proxy};
use crate::collision::{CollisionPrimitive, LinkRef, PrimitiveArena, PrimitiveKey};
use crate::foundation::math::Transform;
use crate::scene::{KinBody, Link};

use super::CacheContext;

/// One geometry element turned into a primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedGeometry {
    /// Pose of the geometry in the link frame
    pub local: Transform,
    /// Primitive built for it
    pub key: PrimitiveKey,
}

/// Primitives of one link and the index holding exactly them
#[derive(Debug)]
pub struct LinkCache {
    link: usize,
    name: String,
    geometries: Vec<CachedGeometry>,
    index: Box<dyn BroadPhaseIndex>,
}

impl LinkCache {
    /// Build primitives for every geometry of `link` in the context's group
    ///
    /// Geometry the factory rejects is skipped. New primitives are only
    /// registered in this link's own index; the body cache forwards them to
    /// the wider scopes.
    pub(super) fn build(body: &KinBody, link: &Link, ctx: &mut CacheContext<'_>) -> Self {
        let mut cache = Self {
            link: link.index(),
            name: link.name().to_string(),
            geometries: Vec::new(),
            index: ctx.index_factory.create(),
        };

        let owner = LinkRef {
            body: body.id(),
            link: link.index(),
        };
        for (slot, info) in link.geometries_for_group(ctx.group).iter().enumerate() {
            let Some(geometry) = ctx.factory.build(&info.shape) else {
                log::debug!(
                    "Skipping {} geometry {} of link '{}/{}'",
                    info.shape.type_name(),
                    slot,
                    body.name(),
                    link.name()
                );
                continue;
            };
            let primitive = CollisionPrimitive::new(geometry, owner, format!("{}/{}", body.name(), link.name()));
            let aabb = primitive.aabb();
            let key = ctx.primitives.insert(primitive);
            cache.index.register(Proxy::new(key, aabb));
            cache.geometries.push(CachedGeometry { local: info.local, key });
        }
        cache
    }

    /// Index of the shadowed link within its body
    pub fn link_index(&self) -> usize {
        self.link
    }

    /// Name of the shadowed link
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached geometry, in geometry order
    pub fn geometries(&self) -> &[CachedGeometry] {
        &self.geometries
    }

    /// Keys of this link's primitives, in geometry order
    pub fn keys(&self) -> Vec<PrimitiveKey> {
        self.geometries.iter().map(|g| g.key).collect()
    }

    /// The link-level index
    pub fn index(&self) -> &dyn BroadPhaseIndex {
        self.index.as_ref()
    }

    /// Place every primitive at `link_transform * local` and refresh this index
    ///
    /// Returns the new boxes so the wider scopes can be updated too.
    pub(super) fn synchronize(&mut self, link_transform: &Transform, primitives: &mut PrimitiveArena) -> Vec<Proxy> {
        let mut updated = Vec::with_capacity(self.geometries.len());
        for geometry in &self.geometries {
            let pose = *link_transform * geometry.local;
            let primitive = &mut primitives[geometry.key];
            primitive.set_translation(pose.position);
            primitive.set_rotation(pose.rotation);
            let aabb = primitive.compute_aabb();

            self.index.update(geometry.key, aabb);
            updated.push(Proxy::new(geometry.key, aabb));
        }
        updated
    }

    /// Unregister every primitive from the environment and free them
    pub(super) fn reset(&mut self, ctx: &mut CacheContext<'_>) {
        let keys = self.keys();
        ctx.environment.unregister_all(&keys);
        for key in keys {
            ctx.primitives.remove(key);
        }
        self.index.clear();
        self.geometries.clear();
    }

    /// Move the members into a fresh index of the factory's algorithm
    pub(super) fn recreate_index(&mut self, factory: &IndexFactory) {
        super::recreate_index(&mut self.index, factory);
    }
}
