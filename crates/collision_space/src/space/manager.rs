//! The collision space manager

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::broadphase::{BroadPhaseAlgorithm, BroadPhaseIndex, IndexFactory};
use crate::collision::{BoundingVolumeKind, CollisionPrimitive, PrimitiveArena, PrimitiveFactory, PrimitiveKey};
use crate::config::{Config, SpaceConfig};
use crate::scene::{BodyId, KinBody};

use super::body_cache::BodyCache;
use super::link_cache::LinkCache;
use super::scoped::{ScopedIndexView, ViewPolicy};
use super::{recreate_index, CacheContext, SpaceError};

/// Observer invoked once per body after its poses were resynchronized
pub type SynchronizeCallback = Box<dyn FnMut(&BodyCache)>;

/// Associated data left on a body so its cache can be found from the body
#[derive(Debug, Clone, Copy)]
struct CacheTicket {
    body: BodyId,
}

/// Owner of every collision cache and of the environment index
///
/// Bodies are added lazily through [`get_or_create_cache`](Self::get_or_create_cache)
/// or explicitly through [`init_body`](Self::init_body). Before running a
/// query, call [`synchronize`](Self::synchronize) so every index reflects the
/// latest link poses.
pub struct SpaceManager {
    user_data_key: String,
    geometry_group: String,
    factory: PrimitiveFactory,
    index_factory: IndexFactory,
    primitives: PrimitiveArena,
    environment: Box<dyn BroadPhaseIndex>,
    caches: BTreeMap<BodyId, BodyCache>,
    pending: Rc<RefCell<Vec<BodyId>>>,
    on_synchronized: Option<SynchronizeCallback>,
}

impl fmt::Debug for SpaceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceManager")
            .field("geometry_group", &self.geometry_group)
            .field("bounding_volume", &self.factory.bounding_volume())
            .field("broad_phase", &self.index_factory.algorithm())
            .field("bodies", &self.caches.len())
            .field("primitives", &self.primitives.len())
            .finish_non_exhaustive()
    }
}

impl Default for SpaceManager {
    fn default() -> Self {
        Self::from_validated(SpaceConfig::default())
    }
}

impl SpaceManager {
    /// Create an empty space
    pub fn new(config: SpaceConfig) -> Result<Self, SpaceError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Create an empty space from a TOML or RON configuration file
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, SpaceError> {
        Self::new(SpaceConfig::load_from_file(path)?)
    }

    fn from_validated(config: SpaceConfig) -> Self {
        log::info!(
            "Creating collision space: {} bounding volumes, {} broad phase",
            config.bounding_volume,
            config.broad_phase
        );
        let index_factory = IndexFactory::new(config.broad_phase, config.index_settings());
        Self {
            environment: index_factory.create(),
            index_factory,
            factory: PrimitiveFactory::new(config.bounding_volume),
            user_data_key: config.user_data_key,
            geometry_group: config.geometry_group,
            primitives: PrimitiveArena::with_key(),
            caches: BTreeMap::new(),
            pending: Rc::new(RefCell::new(Vec::new())),
            on_synchronized: None,
        }
    }

    fn parts(&mut self) -> (CacheContext<'_>, &mut BTreeMap<BodyId, BodyCache>) {
        let ctx = CacheContext {
            factory: &self.factory,
            index_factory: &self.index_factory,
            primitives: &mut self.primitives,
            environment: self.environment.as_mut(),
            group: &self.geometry_group,
            pending: &self.pending,
        };
        (ctx, &mut self.caches)
    }

    /// Build or rebuild the cache of `body`, then synchronize it
    fn init_cache(&mut self, body: &Rc<KinBody>) {
        let id = body.id();
        let (mut ctx, caches) = self.parts();
        let cache = caches
            .entry(id)
            .or_insert_with(|| BodyCache::new(body, ctx.index_factory));
        cache.rebuild(body, &mut ctx);
        self.sync_live(body);
    }

    /// Synchronize a body known to be alive; false if it has no cache
    fn sync_live(&mut self, body: &KinBody) -> bool {
        let Some(cache) = self.caches.get_mut(&body.id()) else {
            return false;
        };
        let changed = cache.synchronize(body, &mut self.primitives, self.environment.as_mut());
        if changed {
            if let Some(callback) = self.on_synchronized.as_mut() {
                callback(&*cache);
            }
        }
        changed
    }

    /// Remove the cache of `id` and free its primitives
    fn detach(&mut self, id: BodyId) -> Option<BodyCache> {
        let mut cache = self.caches.remove(&id)?;
        let (mut ctx, _) = self.parts();
        cache.reset(&mut ctx);
        log::debug!("Released collision cache of body '{}'", cache.name());
        Some(cache)
    }

    fn ticket(&self, body: &KinBody) -> Option<BodyId> {
        let data = body.user_data(&self.user_data_key)?;
        let id = data.downcast_ref::<CacheTicket>()?.body;
        self.caches.contains_key(&id).then_some(id)
    }

    /// Build the cache of `body` from scratch, or rebuild it in place
    ///
    /// The cache is attached to the body under the configured user-data key
    /// and synchronized immediately.
    pub fn init_body(&mut self, body: &Rc<KinBody>) -> &BodyCache {
        let id = body.id();
        self.init_cache(body);
        body.set_user_data(&self.user_data_key, Rc::new(CacheTicket { body: id }));
        &self.caches[&id]
    }

    /// Cache of `body`, creating it on first use
    ///
    /// The flag is true when the cache was created by this call.
    pub fn get_or_create_cache(&mut self, body: &Rc<KinBody>) -> (&BodyCache, bool) {
        self.process_geometry_changes();
        match self.ticket(body) {
            Some(id) => (&self.caches[&id], false),
            None => (self.init_body(body), true),
        }
    }

    /// Cache of an initialized body
    pub fn cache(&self, id: BodyId) -> Option<&BodyCache> {
        self.caches.get(&id)
    }

    /// Cache found through the body's associated data
    pub fn cache_of(&self, body: &KinBody) -> Option<&BodyCache> {
        self.ticket(body).and_then(|id| self.caches.get(&id))
    }

    /// True if `id` has a cache
    pub fn is_initialized(&self, id: BodyId) -> bool {
        self.caches.contains_key(&id)
    }

    /// Every body with a cache, in id order
    pub fn initialized_bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.caches.keys().copied()
    }

    /// Key of the associated-data slot used on bodies
    pub fn user_data_key(&self) -> &str {
        &self.user_data_key
    }

    /// Geometry group caches are built from
    pub fn geometry_group(&self) -> &str {
        &self.geometry_group
    }

    /// Select the geometry group and rebuild every cache if it changed
    ///
    /// An empty name, or a name a link does not define, means that link's
    /// default geometry.
    pub fn set_geometry_group(&mut self, group: &str) {
        if group == self.geometry_group {
            return;
        }
        log::info!("Collision geometry group '{}' -> '{}'", self.geometry_group, group);
        self.geometry_group = group.to_string();

        let ids: Vec<BodyId> = self.caches.keys().copied().collect();
        for id in ids {
            match self.caches.get(&id).and_then(BodyCache::body) {
                Some(body) => self.init_cache(&body),
                None => log::warn!("Body {id:?} was dropped by the scene, not rebuilding its cache"),
            }
        }
    }

    /// Bounding volume of meshes built from now on
    pub fn bounding_volume_kind(&self) -> BoundingVolumeKind {
        self.factory.bounding_volume()
    }

    /// Select the bounding volume of future meshes
    ///
    /// Existing primitives keep the volume they were built with until their
    /// cache is rebuilt for another reason.
    pub fn set_bounding_volume_kind(&mut self, kind: BoundingVolumeKind) {
        if kind == self.factory.bounding_volume() {
            return;
        }
        log::info!("Collision bounding volume {} -> {}", self.factory.bounding_volume(), kind);
        self.factory.set_bounding_volume(kind);
    }

    /// [`set_bounding_volume_kind`](Self::set_bounding_volume_kind) by configuration name
    pub fn set_bounding_volume_by_name(&mut self, name: &str) -> Result<(), SpaceError> {
        let kind = name.parse()?;
        self.set_bounding_volume_kind(kind);
        Ok(())
    }

    /// Algorithm of every index
    pub fn broad_phase_algorithm(&self) -> BroadPhaseAlgorithm {
        self.index_factory.algorithm()
    }

    /// Switch every index to `algorithm`
    ///
    /// Members are moved into fresh indices as they are; no primitive is
    /// rebuilt.
    pub fn set_broad_phase_algorithm(&mut self, algorithm: BroadPhaseAlgorithm) {
        if algorithm == self.index_factory.algorithm() {
            return;
        }
        log::info!("Collision broad phase {} -> {}", self.index_factory.algorithm(), algorithm);
        self.index_factory = IndexFactory::new(algorithm, self.index_factory.settings());

        recreate_index(&mut self.environment, &self.index_factory);
        for cache in self.caches.values_mut() {
            cache.recreate_indices(&self.index_factory);
        }
    }

    /// [`set_broad_phase_algorithm`](Self::set_broad_phase_algorithm) by configuration name
    pub fn set_broad_phase_algorithm_by_name(&mut self, name: &str) -> Result<(), SpaceError> {
        let algorithm = name.parse()?;
        self.set_broad_phase_algorithm(algorithm);
        Ok(())
    }

    /// Drop the cache of `body` and its associated data
    ///
    /// Returns false, and does nothing, if the body had no cache.
    pub fn remove_body(&mut self, body: &KinBody) -> bool {
        if self.detach(body.id()).is_none() {
            return false;
        }
        if !body.remove_user_data(&self.user_data_key) {
            log::warn!("Inconsistent collision space user data on body '{}'", body.name());
        }
        true
    }

    /// Synchronize every initialized body
    ///
    /// Returns how many bodies had moved. Fails without touching any index
    /// if the scene dropped an initialized body; remove it first.
    pub fn synchronize(&mut self) -> Result<usize, SpaceError> {
        self.process_geometry_changes();

        let bodies = self
            .caches
            .values()
            .map(|cache| cache.body().ok_or(SpaceError::BodyExpired(cache.id())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut moved = 0;
        for body in &bodies {
            if self.sync_live(body) {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Synchronize one body, creating its cache on first use
    ///
    /// Returns whether any pose changed, counting the initial placement of a
    /// freshly created cache.
    pub fn synchronize_body(&mut self, body: &Rc<KinBody>) -> bool {
        let created = self.get_or_create_cache(body).1;
        let changed = self.sync_live(body);
        created || changed
    }

    /// Install or clear the post-synchronization observer
    pub fn set_synchronization_callback(&mut self, callback: Option<SynchronizeCallback>) {
        self.on_synchronized = callback;
    }

    /// Rebuild caches whose body reported a geometry change
    ///
    /// Runs automatically at the start of every synchronization and cache
    /// lookup, and when a view opens. Returns how many caches were rebuilt.
    pub fn process_geometry_changes(&mut self) -> usize {
        let mut pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return 0;
        }
        pending.sort_unstable();
        pending.dedup();

        let mut rebuilt = 0;
        for id in pending {
            let Some(cache) = self.caches.get(&id) else {
                continue;
            };
            match cache.body() {
                Some(body) => {
                    log::debug!("Geometry of body '{}' changed, rebuilding its cache", body.name());
                    self.init_cache(&body);
                    rebuilt += 1;
                }
                None => {
                    log::warn!("Geometry change reported by dropped body {id:?}, clearing its cache");
                    self.detach(id);
                }
            }
        }
        rebuilt
    }

    /// Release every cache
    ///
    /// Best effort: bodies the scene already dropped are cleaned up on the
    /// space side and reported with a warning.
    pub fn destroy(&mut self) {
        let ids: Vec<BodyId> = self.caches.keys().copied().collect();
        for id in ids {
            let Some(cache) = self.detach(id) else {
                continue;
            };
            match cache.body() {
                Some(body) => {
                    if !body.remove_user_data(&self.user_data_key) {
                        log::warn!("Inconsistent collision space user data on body '{}'", body.name());
                    }
                }
                None => log::warn!("Body '{}' was destroyed before the collision space", cache.name()),
            }
        }
        self.pending.borrow_mut().clear();
        if !self.environment.is_empty() {
            log::warn!("{} primitives left in the environment index after destroy", self.environment.len());
            self.environment.clear();
        }
    }

    /// Index of every initialized body's primitives
    pub fn environment_index(&self) -> &dyn BroadPhaseIndex {
        self.environment.as_ref()
    }

    pub(super) fn environment_mut(&mut self) -> &mut dyn BroadPhaseIndex {
        self.environment.as_mut()
    }

    /// Factory of every index of this space
    pub fn index_factory(&self) -> &IndexFactory {
        &self.index_factory
    }

    fn cache_or_err(&self, id: BodyId) -> Result<&BodyCache, SpaceError> {
        self.caches.get(&id).ok_or(SpaceError::BodyNotInitialized(id))
    }

    /// Index of one body's primitives
    pub fn body_index(&self, id: BodyId) -> Result<&dyn BroadPhaseIndex, SpaceError> {
        self.cache_or_err(id).map(BodyCache::index)
    }

    /// Index of one link's primitives
    pub fn link_index(&self, id: BodyId, link: usize) -> Result<&dyn BroadPhaseIndex, SpaceError> {
        self.cache_or_err(id)?.link(link).map(LinkCache::index)
    }

    /// Primitives of one body, in link then geometry order
    pub fn collision_objects(&self, id: BodyId) -> Result<Vec<PrimitiveKey>, SpaceError> {
        self.cache_or_err(id).map(BodyCache::collision_objects)
    }

    /// Primitives of one link, in geometry order
    pub fn link_collision_objects(&self, id: BodyId, link: usize) -> Result<Vec<PrimitiveKey>, SpaceError> {
        self.cache_or_err(id)?.link(link).map(LinkCache::keys)
    }

    /// Look up a primitive
    pub fn primitive(&self, key: PrimitiveKey) -> Option<&CollisionPrimitive> {
        self.primitives.get(key)
    }

    /// Number of live primitives
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Number of shapes handed to the primitive factory so far
    pub fn factory_build_count(&self) -> usize {
        self.factory.build_count()
    }

    /// View holding only the registered bodies; they leave the environment meanwhile
    pub fn borrow_view(&mut self) -> ScopedIndexView<'_> {
        ScopedIndexView::new(self, ViewPolicy::Borrow)
    }

    /// View holding copies of the registered bodies; the environment is untouched
    pub fn wrap_view(&mut self) -> ScopedIndexView<'_> {
        ScopedIndexView::new(self, ViewPolicy::Wrap)
    }

    /// The environment minus the registered bodies
    pub fn exclusion_view(&mut self) -> ScopedIndexView<'_> {
        ScopedIndexView::new(self, ViewPolicy::Exclude)
    }
}

impl Drop for SpaceManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
