//! Per-body collision cache
//!
//! A body cache shadows one [`KinBody`]: one [`LinkCache`] per link, in link
//! order, plus a body-level index holding the union of every link's
//! primitives. It remembers the update stamp it last synchronized against so
//! unchanged bodies cost nothing to synchronize.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::broadphase::{BroadPhaseIndex, IndexFactory};
use crate::collision::{PrimitiveArena, PrimitiveKey};
use crate::scene::{BodyId, KinBody, SubscriptionId};

use super::link_cache::LinkCache;
use super::{CacheContext, SpaceError};

/// Geometry-changed subscription owned by a cache
///
/// Released explicitly when the cache is reset; dropping it without
/// [`release`](Self::release) leaves the callback registered on the body.
#[derive(Debug)]
pub struct GeometrySubscription {
    body: Weak<KinBody>,
    id: SubscriptionId,
}

impl GeometrySubscription {
    /// Subscribe `body` to push its id onto `queue` whenever its geometry changes
    fn subscribe(body: &Rc<KinBody>, queue: &Rc<RefCell<Vec<BodyId>>>) -> Self {
        let queue = Rc::downgrade(queue);
        let id = body.subscribe_geometry_changed(Rc::new(move |changed| {
            if let Some(queue) = queue.upgrade() {
                queue.borrow_mut().push(changed);
            }
        }));
        Self {
            body: Rc::downgrade(body),
            id,
        }
    }

    /// Unsubscribe; false if the body is gone or no longer knew the callback
    pub fn release(self) -> bool {
        self.body
            .upgrade()
            .is_some_and(|body| body.unsubscribe_geometry_changed(self.id))
    }
}

/// Collision cache of one body
#[derive(Debug)]
pub struct BodyCache {
    body: Weak<KinBody>,
    id: BodyId,
    name: String,
    last_sync_stamp: u64,
    links: Vec<LinkCache>,
    index: Box<dyn BroadPhaseIndex>,
    subscription: Option<GeometrySubscription>,
}

impl BodyCache {
    pub(super) fn new(body: &Rc<KinBody>, index_factory: &IndexFactory) -> Self {
        Self {
            body: Rc::downgrade(body),
            id: body.id(),
            name: body.name().to_string(),
            last_sync_stamp: body.update_stamp().wrapping_sub(1),
            links: Vec::new(),
            index: index_factory.create(),
            subscription: None,
        }
    }

    /// Id of the shadowed body
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Name of the shadowed body
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shadowed body, if the scene still has it
    pub fn body(&self) -> Option<Rc<KinBody>> {
        self.body.upgrade()
    }

    /// Update stamp of the last synchronization
    pub fn last_sync_stamp(&self) -> u64 {
        self.last_sync_stamp
    }

    /// Link caches, in link order
    pub fn links(&self) -> &[LinkCache] {
        &self.links
    }

    /// Cache of one link
    pub fn link(&self, link: usize) -> Result<&LinkCache, SpaceError> {
        self.links
            .get(link)
            .ok_or(SpaceError::LinkOutOfRange { body: self.id, link })
    }

    /// The body-level index
    pub fn index(&self) -> &dyn BroadPhaseIndex {
        self.index.as_ref()
    }

    /// Keys of every primitive of this body, in link then geometry order
    pub fn collision_objects(&self) -> Vec<PrimitiveKey> {
        self.links.iter().flat_map(LinkCache::keys).collect()
    }

    /// True while the geometry-changed subscription is held
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Rebuild every link cache from the body's current geometry
    ///
    /// Old primitives are unregistered from the environment and freed first.
    /// New ones land in the link, body and environment indices. The stamp
    /// is set so the next synchronization always runs.
    pub(super) fn rebuild(&mut self, body: &Rc<KinBody>, ctx: &mut CacheContext<'_>) {
        self.clear_links(ctx);

        for link in body.links().iter() {
            let cache = LinkCache::build(body, link, ctx);
            for proxy in cache.index().members() {
                self.index.register(proxy);
                ctx.environment.register(proxy);
            }
            self.links.push(cache);
        }

        if self.subscription.is_none() {
            self.subscription = Some(GeometrySubscription::subscribe(body, ctx.pending));
        }
        self.last_sync_stamp = body.update_stamp().wrapping_sub(1);

        log::debug!(
            "Built collision cache for body '{}': {} links, {} primitives",
            self.name,
            self.links.len(),
            self.index.len()
        );
    }

    /// Free every primitive and drop the subscription
    pub(super) fn reset(&mut self, ctx: &mut CacheContext<'_>) {
        self.clear_links(ctx);
        if let Some(subscription) = self.subscription.take() {
            if !subscription.release() {
                log::debug!("Body '{}' dropped before its subscription was released", self.name);
            }
        }
    }

    fn clear_links(&mut self, ctx: &mut CacheContext<'_>) {
        for link in &mut self.links {
            link.reset(ctx);
        }
        self.links.clear();
        self.index.clear();
    }

    /// Move every index of this body to a fresh index of the factory's algorithm
    pub(super) fn recreate_indices(&mut self, factory: &IndexFactory) {
        super::recreate_index(&mut self.index, factory);
        for link in &mut self.links {
            link.recreate_index(factory);
        }
    }

    /// Push the body's current link poses into the primitives and indices
    ///
    /// Returns whether anything changed, i.e. whether the live update stamp
    /// differed from the last synchronized one.
    ///
    /// # Panics
    /// If the body's link count no longer matches the cache; the cache must
    /// be rebuilt after structural changes to the body.
    pub(super) fn synchronize(
        &mut self,
        body: &KinBody,
        primitives: &mut PrimitiveArena,
        environment: &mut dyn BroadPhaseIndex,
    ) -> bool {
        debug_assert_eq!(body.id(), self.id);
        let stamp = body.update_stamp();
        if stamp == self.last_sync_stamp {
            return false;
        }

        let transforms = body.link_transforms();
        assert_eq!(
            transforms.len(),
            self.links.len(),
            "collision cache of body '{}' is stale: body has {} links, cache has {}",
            self.name,
            transforms.len(),
            self.links.len()
        );

        for (link, link_transform) in self.links.iter_mut().zip(&transforms) {
            for proxy in link.synchronize(link_transform, primitives) {
                self.index.update(proxy.key, proxy.aabb);
                environment.update(proxy.key, proxy.aabb);
            }
        }

        self.last_sync_stamp = stamp;
        log::trace!("Synchronized body '{}' at stamp {}", self.name, stamp);
        true
    }
}
